//! Amazon Web Services.
//!
//! Calls the `aws` CLI (v2). Regional services are queried once per
//! enabled region; S3 is listed once per account. AWS CLI pagination is
//! driven explicitly through `--max-items` / `--starting-token`.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::config::ProviderConfig;
use crate::error::{CensusError, Result};
use crate::model::{AwsContext, CloudContext, Provider, ProviderScope, ResourceRecord};
use crate::provider::{CloudProvider, Pagination, Placement, ResourceQuery, items, str_at};
use crate::runner::CommandRunner;

/// Region used for account-level calls that need one.
const BOOTSTRAP_REGION: &str = "us-east-1";

const PAGINATED: Pagination = Pagination::Token {
    next_field: "NextToken",
    start_arg: "--starting-token",
    size_arg: "--max-items",
};

pub struct AwsProvider;

#[async_trait]
impl CloudProvider for AwsProvider {
    fn provider(&self) -> Provider {
        Provider::Aws
    }

    async fn authenticate(
        &self,
        config: &ProviderConfig,
        runner: &dyn CommandRunner,
    ) -> Result<CloudContext> {
        let cli = config
            .cli
            .clone()
            .unwrap_or_else(|| Provider::Aws.default_cli().to_string());

        let mut args = strings(&["sts", "get-caller-identity", "--output", "json"]);
        if let Some(profile) = &config.profile {
            args.extend(strings(&["--profile", profile.as_str()]));
        }

        let identity = runner.run_json(&cli, &args).await.map_err(|err| match err {
            CensusError::Authentication(_) => err,
            other => CensusError::Authentication(format!("could not verify AWS identity: {other}")),
        })?;

        let account_id = str_at(&identity, "/Account").ok_or_else(|| {
            CensusError::Authentication("sts get-caller-identity returned no account".to_string())
        })?;
        let arn = str_at(&identity, "/Arn").unwrap_or_default();

        info!(account = %account_id, %arn, "Authenticated with AWS");

        Ok(CloudContext::Aws(AwsContext {
            cli,
            profile: config
                .profile
                .clone()
                .or_else(|| std::env::var("AWS_PROFILE").ok()),
            account_id,
        }))
    }

    async fn discover_scopes(
        &self,
        ctx: &CloudContext,
        config: &ProviderConfig,
        runner: &dyn CommandRunner,
    ) -> Result<Vec<ProviderScope>> {
        let CloudContext::Aws(aws) = ctx else {
            return Err(CensusError::Config("AWS scopes need an AWS context".to_string()));
        };

        if let Some(foreign) = config.scopes.iter().find(|s| *s != &aws.account_id) {
            return Err(CensusError::Config(format!(
                "account {foreign} is not reachable: the active credentials belong to account {}; \
                 select another account with --profile",
                aws.account_id
            )));
        }

        let regions = if config.regions.is_empty() {
            discover_regions(ctx, runner).await?
        } else {
            config.regions.clone()
        };
        debug!(count = regions.len(), "Enumerating AWS regions");

        Ok(vec![ProviderScope::new(aws.account_id.clone()).with_regions(regions)])
    }

    fn queries(&self) -> &'static [ResourceQuery] {
        QUERIES
    }

    fn notes(&self) -> &'static [&'static str] {
        &[
            "'Virtual Machines' includes EC2 instances in all states (running, stopped, etc.).",
            "'Cloud Buckets (S3)' are listed once per account; buckets are global.",
            "'Container Hosts (EKS Clusters)' counts clusters, not worker nodes.",
        ]
    }
}

async fn discover_regions(ctx: &CloudContext, runner: &dyn CommandRunner) -> Result<Vec<String>> {
    let mut args = base_args(ctx, Some(BOOTSTRAP_REGION));
    args.splice(0..0, strings(&["ec2", "describe-regions"]));

    let value = runner.run_json(ctx.cli(), &args).await?;
    let mut regions: Vec<String> = items(&value, "/Regions")
        .filter(|r| str_at(r, "/OptInStatus").as_deref() != Some("not-opted-in"))
        .filter_map(|r| str_at(r, "/RegionName"))
        .collect();
    regions.sort();
    Ok(regions)
}

fn strings(args: &[&str]) -> Vec<String> {
    args.iter().map(ToString::to_string).collect()
}

fn base_args(ctx: &CloudContext, region: Option<&str>) -> Vec<String> {
    let mut args = strings(&["--output", "json"]);
    if let CloudContext::Aws(AwsContext {
        profile: Some(profile),
        ..
    }) = ctx
    {
        args.extend(strings(&["--profile", profile.as_str()]));
    }
    if let Some(region) = region {
        args.extend(strings(&["--region", region]));
    }
    args
}

fn call(service: &str, operation: &str, ctx: &CloudContext, region: Option<&str>) -> Vec<String> {
    let mut args = strings(&[service, operation]);
    args.extend(base_args(ctx, region));
    args
}

fn record(scope: &ProviderScope, resource_type: &str, region: Option<&str>) -> ResourceRecord {
    ResourceRecord::new(Provider::Aws, scope.id.clone(), resource_type)
        .in_region(region.map(str::to_string))
}

static QUERIES: &[ResourceQuery] = &[
    ResourceQuery {
        key: "ec2-instances",
        resource_types: &["aws::ec2::instance"],
        placement: Placement::Regional,
        pagination: PAGINATED,
        command: |ctx, _, region| call("ec2", "describe-instances", ctx, region),
        extract: |value, scope, region| {
            items(value, "/Reservations")
                .flat_map(|reservation| items(reservation, "/Instances"))
                .map(|instance| {
                    record(scope, "aws::ec2::instance", region)
                        .with_kind(str_at(instance, "/State/Name"))
                })
                .collect()
        },
    },
    ResourceQuery {
        key: "eks-clusters",
        resource_types: &["aws::eks::cluster"],
        placement: Placement::Regional,
        pagination: PAGINATED,
        command: |ctx, _, region| call("eks", "list-clusters", ctx, region),
        extract: |value, scope, region| {
            items(value, "/clusters")
                .map(|_| record(scope, "aws::eks::cluster", region))
                .collect()
        },
    },
    ResourceQuery {
        key: "ecs-clusters",
        resource_types: &["aws::ecs::cluster"],
        placement: Placement::Regional,
        pagination: PAGINATED,
        command: |ctx, _, region| call("ecs", "list-clusters", ctx, region),
        extract: |value, scope, region| {
            items(value, "/clusterArns")
                .map(|_| record(scope, "aws::ecs::cluster", region))
                .collect()
        },
    },
    ResourceQuery {
        key: "lambda-functions",
        resource_types: &["aws::lambda::function"],
        placement: Placement::Regional,
        pagination: PAGINATED,
        command: |ctx, _, region| call("lambda", "list-functions", ctx, region),
        extract: |value, scope, region| {
            items(value, "/Functions")
                .map(|function| {
                    record(scope, "aws::lambda::function", region)
                        .with_kind(str_at(function, "/Runtime"))
                })
                .collect()
        },
    },
    ResourceQuery {
        key: "s3-buckets",
        resource_types: &["aws::s3::bucket"],
        placement: Placement::ScopeWide,
        pagination: PAGINATED,
        command: |ctx, _, _| call("s3api", "list-buckets", ctx, None),
        extract: |value, scope, _| {
            items(value, "/Buckets")
                .map(|bucket| {
                    ResourceRecord::new(Provider::Aws, scope.id.clone(), "aws::s3::bucket")
                        .in_region(str_at(bucket, "/BucketRegion"))
                })
                .collect()
        },
    },
    ResourceQuery {
        key: "rds-instances",
        resource_types: &["aws::rds::dbinstance"],
        placement: Placement::Regional,
        pagination: PAGINATED,
        command: |ctx, _, region| call("rds", "describe-db-instances", ctx, region),
        extract: |value, scope, region| {
            items(value, "/DBInstances")
                .map(|db| record(scope, "aws::rds::dbinstance", region).with_kind(str_at(db, "/Engine")))
                .collect()
        },
    },
    ResourceQuery {
        key: "dynamodb-tables",
        resource_types: &["aws::dynamodb::table"],
        placement: Placement::Regional,
        pagination: PAGINATED,
        command: |ctx, _, region| call("dynamodb", "list-tables", ctx, region),
        extract: |value, scope, region| {
            items(value, "/TableNames")
                .map(|_| record(scope, "aws::dynamodb::table", region))
                .collect()
        },
    },
    ResourceQuery {
        key: "ecr-repositories",
        resource_types: &["aws::ecr::repository"],
        placement: Placement::Regional,
        pagination: PAGINATED,
        command: |ctx, _, region| call("ecr", "describe-repositories", ctx, region),
        extract: |value, scope, region| {
            items(value, "/repositories")
                .map(|_| record(scope, "aws::ecr::repository", region))
                .collect()
        },
    },
];
