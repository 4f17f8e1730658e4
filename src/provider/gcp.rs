//! Google Cloud Platform.
//!
//! Projects are the scopes. `gcloud` pages through list results itself, so
//! every query is a single project-wide call; zones and locations found on
//! each record are reduced to a region for filtering.

pub mod config;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ProviderConfig;
use crate::error::{CensusError, Result};
use crate::model::{CloudContext, GcpContext, Provider, ProviderScope, ResourceRecord};
use crate::provider::gcp::config::{GcloudConfig, GcloudEnv};
use crate::provider::{
    CloudProvider, Pagination, Placement, ResourceQuery, configured_scopes, items, last_segment,
    str_at, u64_at,
};
use crate::runner::CommandRunner;

pub struct GcpProvider;

#[async_trait]
impl CloudProvider for GcpProvider {
    fn provider(&self) -> Provider {
        Provider::Gcp
    }

    async fn authenticate(
        &self,
        config: &ProviderConfig,
        runner: &dyn CommandRunner,
    ) -> Result<CloudContext> {
        authenticate_with(&GcloudEnv::from_process(), config, runner).await
    }

    async fn discover_scopes(
        &self,
        ctx: &CloudContext,
        config: &ProviderConfig,
        runner: &dyn CommandRunner,
    ) -> Result<Vec<ProviderScope>> {
        if !config.scopes.is_empty() {
            return Ok(configured_scopes(config));
        }

        let mut args = strings(&["projects", "list", "--format=json"]);
        args.extend(global_args(ctx));

        let projects = match runner.run_json(ctx.cli(), &args).await {
            Ok(projects) => projects,
            Err(err) if err.is_permission() => {
                warn!(%err, "Cannot list projects, falling back to the configured project");
                Value::Null
            }
            Err(err) => return Err(err),
        };

        let mut scopes: Vec<ProviderScope> = items(&projects, "")
            .filter(|project| {
                config.include_disabled
                    || str_at(project, "/lifecycleState").as_deref() == Some("ACTIVE")
            })
            .filter_map(|project| {
                let id = str_at(project, "/projectId")?;
                let name = str_at(project, "/name").unwrap_or_else(|| id.clone());
                Some(
                    ProviderScope::new(id)
                        .with_name(name)
                        .with_regions(config.regions.clone()),
                )
            })
            .collect();

        if scopes.is_empty()
            && let CloudContext::Gcp(GcpContext {
                project_id: Some(project),
                ..
            }) = ctx
        {
            scopes.push(ProviderScope::new(project.clone()).with_regions(config.regions.clone()));
        }

        info!(count = scopes.len(), "Discovered GCP projects");
        Ok(scopes)
    }

    fn queries(&self) -> &'static [ResourceQuery] {
        QUERIES
    }

    fn notes(&self) -> &'static [&'static str] {
        &[
            "'Virtual Machines' includes Compute Engine instances in all states.",
            "'Container Hosts (GKE Nodes)' reports potential nodes per node pool (maxNodeCount when autoscaling, else initialNodeCount).",
            "'Container Registries (Artifact Registry)' counts Docker-format repositories only.",
        ]
    }
}

/// Pick the gcloud configuration to run under.
///
/// An explicit `--profile` must exist; otherwise the active configuration
/// is used when present and gcloud's own choice when it is not.
fn select_config<'c>(
    configs: &'c [GcloudConfig],
    profile: Option<&str>,
    env: &GcloudEnv,
) -> Result<Option<&'c GcloudConfig>> {
    if let Some(name) = profile {
        return configs
            .iter()
            .find(|c| c.name == name)
            .map(Some)
            .ok_or_else(|| {
                CensusError::Authentication(format!("gcloud configuration '{name}' not found"))
            });
    }

    let name = env.active_config_name();
    let selected = configs.iter().find(|c| c.name == name);
    if selected.is_none() {
        debug!(configuration = %name, "Active gcloud configuration not found on disk");
    }
    Ok(selected)
}

async fn authenticate_with(
    env: &GcloudEnv,
    config: &ProviderConfig,
    runner: &dyn CommandRunner,
) -> Result<CloudContext> {
    let cli = config
        .cli
        .clone()
        .unwrap_or_else(|| Provider::Gcp.default_cli().to_string());

    let configs = env.configs();
    let selected = select_config(&configs, config.profile.as_deref(), env)?;

    let configuration = selected.map(|c| c.name.clone());
    let mut args = strings(&["auth", "list", "--filter=status:ACTIVE", "--format=json"]);
    if let Some(name) = &configuration {
        args.extend(strings(&["--configuration", name.as_str()]));
    }

    let active = runner.run_json(&cli, &args).await.map_err(|err| match err {
        CensusError::Authentication(_) => err,
        other => CensusError::Authentication(format!("could not list gcloud accounts: {other}")),
    })?;

    let accounts: Vec<String> = items(&active, "")
        .filter_map(|a| str_at(a, "/account"))
        .collect();
    let Some(first) = accounts.first() else {
        return Err(CensusError::Authentication(
            "no active gcloud account; run `gcloud auth login`".to_string(),
        ));
    };

    let configured = selected.and_then(|c| c.core.account.as_ref());
    let account = match configured {
        Some(account) if accounts.contains(account) => account.clone(),
        Some(account) => {
            warn!(
                configured = %account,
                active = %first,
                "Configured gcloud account has no active credentials"
            );
            first.clone()
        }
        None => first.clone(),
    };

    info!(%account, configuration = ?configuration, "Authenticated with GCP");

    Ok(CloudContext::Gcp(GcpContext {
        cli,
        configuration,
        project_id: selected.and_then(|c| c.core.project.clone()),
        account,
    }))
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}

fn global_args(ctx: &CloudContext) -> Vec<String> {
    let mut args = strings(&["--quiet"]);
    if let CloudContext::Gcp(GcpContext {
        configuration: Some(name),
        ..
    }) = ctx
    {
        args.extend(strings(&["--configuration", name.as_str()]));
    }
    args
}

fn project_call(command: &[&str], ctx: &CloudContext, scope: &ProviderScope) -> Vec<String> {
    let mut args = strings(command);
    args.extend(strings(&["--project", scope.id.as_str(), "--format=json"]));
    args.extend(global_args(ctx));
    args
}

/// Reduce a zone (`us-central1-a`) to its region; regions pass through.
pub fn region_of(location: &str) -> String {
    let location = last_segment(location).to_ascii_lowercase();
    match location.rsplit_once('-') {
        Some((region, zone)) if zone.len() == 1 && region.contains('-') => region.to_string(),
        _ => location,
    }
}

/// Location segment of a resource name such as
/// `projects/p/locations/us-central1/functions/f`.
fn location_in_name(name: &str) -> Option<String> {
    let mut segments = name.split('/');
    segments
        .by_ref()
        .find(|segment| *segment == "locations")
        .and_then(|_| segments.next())
        .map(region_of)
}

fn record(scope: &ProviderScope, resource_type: &str, region: Option<String>) -> ResourceRecord {
    ResourceRecord::new(Provider::Gcp, scope.id.clone(), resource_type).in_region(region)
}

/// Potential nodes for one GKE cluster.
pub fn potential_nodes(cluster: &Value) -> u64 {
    let pools: Vec<&Value> = items(cluster, "/nodePools").collect();
    if pools.is_empty() {
        return u64_at(cluster, "/currentNodeCount").unwrap_or(0);
    }
    pools
        .into_iter()
        .map(|pool| {
            let autoscaling = pool
                .pointer("/autoscaling/enabled")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let max = u64_at(pool, "/autoscaling/maxNodeCount")
                .or_else(|| u64_at(pool, "/autoscaling/totalMaxNodeCount"));
            match (autoscaling, max) {
                (true, Some(max)) => max,
                _ => u64_at(pool, "/initialNodeCount").unwrap_or(0),
            }
        })
        .sum()
}

static QUERIES: &[ResourceQuery] = &[
    ResourceQuery {
        key: "compute-instances",
        resource_types: &["gcp::compute::instance"],
        placement: Placement::ScopeWide,
        pagination: Pagination::None,
        command: |ctx, scope, _| project_call(&["compute", "instances", "list"], ctx, scope),
        extract: |value, scope, _| {
            items(value, "")
                .map(|instance| {
                    record(
                        scope,
                        "gcp::compute::instance",
                        str_at(instance, "/zone").map(|z| region_of(&z)),
                    )
                    .with_kind(str_at(instance, "/status"))
                })
                .collect()
        },
    },
    ResourceQuery {
        key: "gke-clusters",
        resource_types: &["gcp::container::cluster"],
        placement: Placement::ScopeWide,
        pagination: Pagination::None,
        command: |ctx, scope, _| project_call(&["container", "clusters", "list"], ctx, scope),
        extract: |value, scope, _| {
            items(value, "")
                .map(|cluster| {
                    record(
                        scope,
                        "gcp::container::cluster",
                        str_at(cluster, "/location").map(|l| region_of(&l)),
                    )
                    .with_weight(potential_nodes(cluster))
                })
                .collect()
        },
    },
    ResourceQuery {
        key: "cloud-run-services",
        resource_types: &["gcp::run::service"],
        placement: Placement::ScopeWide,
        pagination: Pagination::None,
        command: |ctx, scope, _| project_call(&["run", "services", "list"], ctx, scope),
        extract: |value, scope, _| {
            items(value, "")
                .map(|service| {
                    record(
                        scope,
                        "gcp::run::service",
                        str_at(service, "/metadata/labels/cloud.googleapis.com~1location"),
                    )
                })
                .collect()
        },
    },
    ResourceQuery {
        key: "cloud-functions",
        resource_types: &["gcp::functions::function"],
        placement: Placement::ScopeWide,
        pagination: Pagination::None,
        command: |ctx, scope, _| project_call(&["functions", "list"], ctx, scope),
        extract: |value, scope, _| {
            items(value, "")
                .map(|function| {
                    record(
                        scope,
                        "gcp::functions::function",
                        str_at(function, "/name").and_then(|n| location_in_name(&n)),
                    )
                })
                .collect()
        },
    },
    ResourceQuery {
        key: "storage-buckets",
        resource_types: &["gcp::storage::bucket"],
        placement: Placement::ScopeWide,
        pagination: Pagination::None,
        command: |ctx, scope, _| project_call(&["storage", "buckets", "list"], ctx, scope),
        extract: |value, scope, _| {
            items(value, "")
                .map(|bucket| {
                    record(
                        scope,
                        "gcp::storage::bucket",
                        str_at(bucket, "/location").map(|l| l.to_ascii_lowercase()),
                    )
                })
                .collect()
        },
    },
    ResourceQuery {
        key: "sql-instances",
        resource_types: &["gcp::sql::instance"],
        placement: Placement::ScopeWide,
        pagination: Pagination::None,
        command: |ctx, scope, _| project_call(&["sql", "instances", "list"], ctx, scope),
        extract: |value, scope, _| {
            items(value, "")
                .map(|instance| {
                    record(scope, "gcp::sql::instance", str_at(instance, "/region"))
                        .with_kind(str_at(instance, "/databaseVersion"))
                })
                .collect()
        },
    },
    ResourceQuery {
        key: "artifact-repositories",
        resource_types: &["gcp::artifacts::repository"],
        placement: Placement::ScopeWide,
        pagination: Pagination::None,
        command: |ctx, scope, _| {
            project_call(&["artifacts", "repositories", "list"], ctx, scope)
        },
        extract: |value, scope, _| {
            items(value, "")
                .map(|repository| {
                    record(
                        scope,
                        "gcp::artifacts::repository",
                        str_at(repository, "/name").and_then(|n| location_in_name(&n)),
                    )
                    .with_kind(str_at(repository, "/format"))
                })
                .collect()
        },
    },
];
