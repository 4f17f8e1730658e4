//! Microsoft Azure.
//!
//! Subscriptions are the scopes. Every query is subscription-wide through
//! the `az` CLI; records carry their `location` and are filtered against
//! the requested regions afterwards.
//!
//! Virtual machines and AKS clusters come from dedicated list calls, so the
//! generic `az resource list` query drops those types to avoid counting them
//! twice. AKS clusters are weighted by their potential node count: the sum
//! of `maxCount` over agent pools, falling back to `count` when autoscaling
//! is off.

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, warn};

use crate::config::ProviderConfig;
use crate::error::{CensusError, Result};
use crate::model::{AzureContext, CloudContext, Provider, ProviderScope, ResourceRecord};
use crate::provider::{
    CloudProvider, Pagination, Placement, ResourceQuery, configured_scopes, items, str_at, u64_at,
};
use crate::runner::CommandRunner;

const VIRTUAL_MACHINE: &str = "microsoft.compute/virtualmachines";
const MANAGED_CLUSTER: &str = "microsoft.containerservice/managedclusters";

/// Types `az resource list` must not count.
const EXCLUDED_FROM_RESOURCE_LIST: &[&str] =
    &[VIRTUAL_MACHINE, MANAGED_CLUSTER, "microsoft.synapse/workspaces"];

pub struct AzureProvider;

#[async_trait]
impl CloudProvider for AzureProvider {
    fn provider(&self) -> Provider {
        Provider::Azure
    }

    async fn authenticate(
        &self,
        config: &ProviderConfig,
        runner: &dyn CommandRunner,
    ) -> Result<CloudContext> {
        let cli = config
            .cli
            .clone()
            .unwrap_or_else(|| Provider::Azure.default_cli().to_string());

        let account = runner
            .run_json(&cli, &args(&["account", "show", "--output", "json"]))
            .await
            .map_err(|err| match err {
                CensusError::Authentication(_) => err,
                other => CensusError::Authentication(format!(
                    "could not read the signed-in Azure account: {other}"
                )),
            })?;

        let tenant_id = str_at(&account, "/tenantId").ok_or_else(|| {
            CensusError::Authentication("az account show returned no tenant".to_string())
        })?;
        let user = str_at(&account, "/user/name").unwrap_or_else(|| "unknown".to_string());
        let subscription = str_at(&account, "/id").unwrap_or_default();

        info!(%tenant_id, %user, %subscription, "Authenticated with Azure");

        Ok(CloudContext::Azure(AzureContext {
            cli,
            tenant_id,
            user,
        }))
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

        let subscriptions = runner
            .run_json(ctx.cli(), &args(&["account", "list", "--all", "--output", "json"]))
            .await?;

        let mut scopes = Vec::new();
        for subscription in items(&subscriptions, "") {
            let Some(id) = str_at(subscription, "/id") else {
                continue;
            };
            let name = str_at(subscription, "/name").unwrap_or_else(|| id.clone());
            let state = str_at(subscription, "/state").unwrap_or_default();

            if state != "Enabled" && !config.include_disabled {
                warn!(subscription = %name, %state, "Skipping subscription that is not enabled");
                continue;
            }

            scopes.push(
                ProviderScope::new(id)
                    .with_name(name)
                    .with_regions(config.regions.clone()),
            );
        }

        info!(count = scopes.len(), "Discovered Azure subscriptions");
        Ok(scopes)
    }

    fn queries(&self) -> &'static [ResourceQuery] {
        QUERIES
    }

    fn notes(&self) -> &'static [&'static str] {
        &[
            "The 'Virtual Machines' total includes all states (Running, Stopped, Deallocated, etc.).",
            "'Container Hosts (AKS Clusters)' reports the total potential node count (maxCount for autoscale or count for manual).",
            "'Cloud Buckets' counts Storage Accounts (excluding Classic/ADLS Gen1).",
            "'Container Registries (ACR)' counts the registries found, not container images.",
        ]
    }
}

fn args(values: &[&str]) -> Vec<String> {
    values.iter().map(ToString::to_string).collect()
}

fn subscription_call(command: &[&str], scope: &ProviderScope) -> Vec<String> {
    let mut call = args(command);
    call.extend(args(&["--subscription", scope.id.as_str(), "--output", "json"]));
    call
}

fn location(value: &Value) -> Option<String> {
    str_at(value, "/location").map(|l| l.to_ascii_lowercase())
}

/// Potential nodes for one AKS cluster: per agent pool `maxCount`, else `count`.
pub fn potential_nodes(cluster: &Value) -> u64 {
    items(cluster, "/agentPoolProfiles")
        .filter_map(|pool| u64_at(pool, "/maxCount").or_else(|| u64_at(pool, "/count")))
        .sum()
}

static QUERIES: &[ResourceQuery] = &[
    ResourceQuery {
        key: "virtual-machines",
        resource_types: &[VIRTUAL_MACHINE],
        placement: Placement::ScopeWide,
        pagination: Pagination::None,
        command: |_, scope, _| subscription_call(&["vm", "list"], scope),
        extract: |value, scope, _| {
            items(value, "")
                .map(|vm| {
                    ResourceRecord::new(Provider::Azure, scope.id.clone(), VIRTUAL_MACHINE)
                        .in_region(location(vm))
                })
                .collect()
        },
    },
    ResourceQuery {
        key: "aks-clusters",
        resource_types: &[MANAGED_CLUSTER],
        placement: Placement::ScopeWide,
        pagination: Pagination::None,
        command: |_, scope, _| subscription_call(&["aks", "list"], scope),
        extract: |value, scope, _| {
            items(value, "")
                .map(|cluster| {
                    ResourceRecord::new(Provider::Azure, scope.id.clone(), MANAGED_CLUSTER)
                        .in_region(location(cluster))
                        .with_weight(potential_nodes(cluster))
                })
                .collect()
        },
    },
    ResourceQuery {
        key: "resources",
        resource_types: &[
            "microsoft.containerinstance/containergroups",
            "microsoft.app/containerapps",
            "microsoft.web/sites",
            "microsoft.storage/storageaccounts",
            "microsoft.sql/servers",
            "microsoft.sql/managedinstances",
            "microsoft.documentdb/databaseaccounts",
            "microsoft.cache/redis",
            "microsoft.dbformysql/servers",
            "microsoft.dbformysql/flexibleservers",
            "microsoft.dbforpostgresql/servergroupsv2",
            "microsoft.dbforpostgresql/flexibleservers",
            "microsoft.dbforpostgresql/servers",
            "microsoft.containerregistry/registries",
        ],
        placement: Placement::ScopeWide,
        pagination: Pagination::None,
        command: |_, scope, _| subscription_call(&["resource", "list"], scope),
        extract: |value, scope, _| {
            items(value, "")
                .filter_map(|resource| {
                    let resource_type = str_at(resource, "/type")?.to_ascii_lowercase();
                    if EXCLUDED_FROM_RESOURCE_LIST.contains(&resource_type.as_str()) {
                        return None;
                    }
                    Some(
                        ResourceRecord::new(Provider::Azure, scope.id.clone(), resource_type)
                            .in_region(location(resource))
                            .with_kind(str_at(resource, "/kind")),
                    )
                })
                .collect()
        },
    },
];
