//! Runs every query of a provider over its scopes and assembles the report.
//!
//! Work is split into tasks of `scope × query × region` (scope-wide queries
//! run once per scope). Tasks are polled through `buffer_unordered`, each one
//! folding its records into its own [`Tally`]; the partial tallies are merged
//! per scope once the stream is drained or the run is cancelled.

use std::time::Duration;

use chrono::Utc;
use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::EnumerationConfig;
use crate::enumerate::{Enumerator, RetryPolicy};
use crate::error::{CensusError, Result};
use crate::model::{CloudContext, ProviderScope};
use crate::provider::{CloudProvider, Placement, ResourceQuery};
use crate::report::{QueryError, ScopeCensus, SizingReport, SkippedCategory};
use crate::runner::CommandRunner;
use crate::tally::{self, Tally};
use crate::taxonomy::Taxonomy;

#[derive(Debug, Clone, Copy)]
pub struct CensusOptions {
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub page_size: u32,
}

impl CensusOptions {
    pub fn from_config(config: &EnumerationConfig) -> Self {
        Self {
            concurrency: config.concurrency.max(1),
            retry: RetryPolicy::new(
                config.max_retries,
                Duration::from_millis(config.retry_base_delay_ms),
            ),
            page_size: config.page_size,
        }
    }
}

struct Task<'a> {
    scope_index: usize,
    scope: &'a ProviderScope,
    query: &'static ResourceQuery,
    region: Option<&'a str>,
}

enum Outcome {
    Counted(usize, Tally),
    Skipped(SkippedCategory),
    Failed(QueryError),
    Fatal(CensusError),
}

fn plan<'a>(queries: &'static [ResourceQuery], scopes: &'a [ProviderScope]) -> Vec<Task<'a>> {
    let mut tasks = Vec::new();
    for (scope_index, scope) in scopes.iter().enumerate() {
        for query in queries {
            match query.placement {
                Placement::Regional if !scope.regions.is_empty() => {
                    tasks.extend(scope.regions.iter().map(|region| Task {
                        scope_index,
                        scope,
                        query,
                        region: Some(region.as_str()),
                    }));
                }
                Placement::Regional | Placement::ScopeWide => tasks.push(Task {
                    scope_index,
                    scope,
                    query,
                    region: None,
                }),
            }
        }
    }
    tasks
}

async fn run_task(enumerator: &Enumerator<'_>, taxonomy: &Taxonomy, task: Task<'_>) -> Outcome {
    let result = tally::aggregate(
        taxonomy,
        enumerator.records(task.query, task.scope, task.region),
    )
    .await;

    let scope_id = task.scope.id.clone();
    let region = task.region.map(str::to_string);
    let query = task.query.key.to_string();

    match result {
        Ok(tally) => Outcome::Counted(task.scope_index, tally),
        Err(err) if err.is_authentication() => Outcome::Fatal(err),
        Err(err) if err.is_permission() => {
            let categories: Vec<String> = taxonomy
                .categories_for_types(task.query.resource_types)
                .into_iter()
                .map(|c| c.name.clone())
                .collect();
            warn!(
                scope = task.scope.display_name(),
                region = region.as_deref().unwrap_or("-"),
                query = %query,
                categories = %categories.join(", "),
                %err,
                "Permission denied, skipping"
            );
            Outcome::Skipped(SkippedCategory {
                scope_id,
                region,
                query,
                categories,
                reason: err.to_string(),
            })
        }
        Err(err) => {
            error!(
                scope = task.scope.display_name(),
                region = region.as_deref().unwrap_or("-"),
                query = %query,
                %err,
                "Query failed"
            );
            Outcome::Failed(QueryError {
                scope_id,
                region,
                query,
                message: err.to_string(),
            })
        }
    }
}

/// Enumerate and count every scope, producing the finished report.
///
/// Permission and API failures are recorded in the report; an authentication
/// failure aborts the run. Cancelling `cancel` stops outstanding work and
/// returns what was counted so far, flagged as interrupted.
pub async fn run(
    provider: &dyn CloudProvider,
    ctx: &CloudContext,
    scopes: &[ProviderScope],
    taxonomy: &Taxonomy,
    runner: &dyn CommandRunner,
    options: CensusOptions,
    cancel: &CancellationToken,
) -> Result<SizingReport> {
    let tasks = plan(provider.queries(), scopes);
    info!(
        provider = %provider.provider(),
        scopes = scopes.len(),
        tasks = tasks.len(),
        concurrency = options.concurrency,
        "Starting census"
    );

    let enumerator = Enumerator::new(runner, ctx, options.retry, options.page_size);
    let outcomes = stream::iter(tasks)
        .map(|task| run_task(&enumerator, taxonomy, task))
        .buffer_unordered(options.concurrency.max(1));
    tokio::pin!(outcomes);

    let mut tallies = vec![Tally::new(); scopes.len()];
    let mut skipped = Vec::new();
    let mut errors = Vec::new();
    let mut interrupted = false;

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                warn!("Census interrupted, reporting partial counts");
                interrupted = true;
                break;
            }
            next = outcomes.next() => match next {
                None => break,
                Some(Outcome::Counted(index, tally)) => tallies[index].merge(tally),
                Some(Outcome::Skipped(entry)) => skipped.push(entry),
                Some(Outcome::Failed(entry)) => errors.push(entry),
                Some(Outcome::Fatal(err)) => return Err(err),
            },
        }
    }

    skipped.sort_by(|a: &SkippedCategory, b| {
        (&a.scope_id, &a.region, &a.query).cmp(&(&b.scope_id, &b.region, &b.query))
    });
    errors.sort_by(|a: &QueryError, b| {
        (&a.scope_id, &a.region, &a.query).cmp(&(&b.scope_id, &b.region, &b.query))
    });

    let mut total = Tally::new();
    let mut censuses = Vec::with_capacity(scopes.len());
    for (scope, tally) in scopes.iter().zip(tallies) {
        censuses.push(ScopeCensus {
            scope: scope.clone(),
            categories: tally.category_counts(taxonomy),
            unclassified: tally.unclassified(),
        });
        total.merge(tally);
    }

    info!(
        skipped = skipped.len(),
        errors = errors.len(),
        unclassified = total.unclassified(),
        interrupted,
        "Census complete"
    );

    Ok(SizingReport {
        provider: provider.provider(),
        generated_at: Utc::now(),
        tool_version: env!("CARGO_PKG_VERSION").to_string(),
        context: ctx.to_string(),
        scopes: censuses,
        totals: total.category_counts(taxonomy),
        skipped,
        errors,
        notes: provider.notes().iter().map(ToString::to_string).collect(),
        interrupted,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::{Value, json};

    use super::*;
    use crate::model::{AwsContext, AzureContext, Provider};
    use crate::provider::aws::AwsProvider;
    use crate::provider::azure::AzureProvider;
    use crate::runner::mock::{MockRunner, Reply};

    fn aws_context() -> CloudContext {
        CloudContext::Aws(AwsContext {
            cli: "aws".into(),
            profile: None,
            account_id: "111122223333".into(),
        })
    }

    fn two_regions() -> Vec<ProviderScope> {
        vec![
            ProviderScope::new("111122223333")
                .with_regions(vec!["us-east-1".into(), "eu-west-1".into()]),
        ]
    }

    fn instances(n: usize) -> Value {
        let instances: Vec<_> = (0..n)
            .map(|i| json!({"InstanceId": format!("i-{i}"), "State": {"Name": "running"}}))
            .collect();
        json!({"Reservations": [{"Instances": instances}]})
    }

    fn options() -> CensusOptions {
        CensusOptions {
            concurrency: 3,
            retry: RetryPolicy::new(1, Duration::from_millis(1)),
            page_size: 50,
        }
    }

    fn example_runner() -> MockRunner {
        MockRunner::new()
            .on(&["describe-instances", "us-east-1"], Reply::Json(instances(2)))
            .on(&["describe-instances", "eu-west-1"], Reply::Json(instances(1)))
            .on(
                &["s3api", "list-buckets"],
                Reply::Json(json!({"Buckets": [
                    {"Name": "logs", "BucketRegion": "us-east-1"},
                    {"Name": "backups", "BucketRegion": "eu-west-1"},
                ]})),
            )
    }

    async fn census(runner: &MockRunner, options: CensusOptions) -> Result<SizingReport> {
        let provider = AwsProvider;
        let taxonomy = provider.default_taxonomy();
        run(
            &provider,
            &aws_context(),
            &two_regions(),
            &taxonomy,
            runner,
            options,
            &CancellationToken::new(),
        )
        .await
    }

    #[tokio::test]
    async fn test_instances_and_buckets_across_two_regions() {
        let runner = example_runner();
        let report = census(&runner, options()).await.unwrap();
        let counts = report.counts();

        assert_eq!(counts["Virtual Machines (VMs)"], 3);
        assert_eq!(counts["Cloud Buckets (S3)"], 2);
        let others: u64 = counts
            .iter()
            .filter(|(name, _)| !matches!(name.as_str(), "Virtual Machines (VMs)" | "Cloud Buckets (S3)"))
            .map(|(_, count)| count)
            .sum();
        assert_eq!(others, 0);

        assert_eq!(report.scopes.len(), 1);
        assert_eq!(report.scopes[0].categories, report.totals);
        assert!(report.skipped.is_empty());
        assert!(!report.has_errors());
        assert!(!report.interrupted);
        assert_eq!(runner.calls_matching(&["s3api", "list-buckets"]), 1);
        assert_eq!(runner.calls_matching(&["describe-instances"]), 2);
    }

    #[tokio::test]
    async fn test_sequential_and_concurrent_runs_agree() {
        let sequential = census(
            &example_runner(),
            CensusOptions {
                concurrency: 1,
                ..options()
            },
        )
        .await
        .unwrap();
        let concurrent = census(
            &example_runner(),
            CensusOptions {
                concurrency: 16,
                ..options()
            },
        )
        .await
        .unwrap();

        assert_eq!(sequential.counts(), concurrent.counts());
    }

    #[tokio::test]
    async fn test_zero_resources_yields_zero_counts() {
        let runner = MockRunner::new();
        let report = census(&runner, options()).await.unwrap();

        assert_eq!(report.totals.len(), 7);
        assert!(report.totals.iter().all(|c| c.count == 0));
    }

    #[tokio::test]
    async fn test_permission_error_skips_only_affected_categories() {
        let runner = example_runner().on(
            &["lambda", "list-functions", "eu-west-1"],
            Reply::Permission("AccessDeniedException"),
        );
        let report = census(&runner, options()).await.unwrap();

        assert_eq!(report.counts()["Virtual Machines (VMs)"], 3);
        assert_eq!(report.counts()["Cloud Buckets (S3)"], 2);
        assert_eq!(report.skipped.len(), 1);

        let skipped = &report.skipped[0];
        assert_eq!(skipped.query, "lambda-functions");
        assert_eq!(skipped.region.as_deref(), Some("eu-west-1"));
        assert_eq!(skipped.categories, vec!["Serverless Functions".to_string()]);
        assert!(!report.has_errors());
    }

    #[tokio::test]
    async fn test_exhausted_retries_are_reported_as_errors() {
        let runner = example_runner().on(&["rds"], Reply::Transient("Throttling"));
        let report = census(&runner, options()).await.unwrap();

        assert_eq!(report.errors.len(), 2);
        assert!(report.errors.iter().all(|e| e.query == "rds-instances"));
        assert_eq!(report.counts()["Virtual Machines (VMs)"], 3);
        assert_eq!(runner.calls_matching(&["rds"]), 4);
    }

    #[tokio::test]
    async fn test_authentication_error_is_fatal() {
        let runner = example_runner().on(&["ecs"], Reply::Auth("ExpiredToken"));
        let err = census(&runner, options()).await.unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn test_cancelled_run_is_marked_interrupted() {
        let provider = AwsProvider;
        let taxonomy = provider.default_taxonomy();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = run(
            &provider,
            &aws_context(),
            &two_regions(),
            &taxonomy,
            &example_runner(),
            options(),
            &cancel,
        )
        .await
        .unwrap();

        assert!(report.interrupted);
        assert!(report.totals.iter().all(|c| c.count == 0));
    }

    #[tokio::test]
    async fn test_azure_scope_wide_queries_filter_regions() {
        let runner = MockRunner::new()
            .on(
                &["vm", "list"],
                Reply::Json(json!([
                    {"location": "westeurope"},
                    {"location": "eastus"},
                    {"location": "westeurope"},
                ])),
            )
            .on(
                &["aks", "list"],
                Reply::Json(json!([
                    {"location": "westeurope", "agentPoolProfiles": [{"count": 3, "maxCount": 5}]},
                ])),
            )
            .on(
                &["resource", "list"],
                Reply::Json(json!([
                    {"type": "Microsoft.Web/sites", "kind": "functionapp", "location": "westeurope"},
                    {"type": "Microsoft.Storage/storageAccounts", "location": "eastus"},
                ])),
            );
        let ctx = CloudContext::Azure(AzureContext {
            cli: "az".into(),
            tenant_id: "t".into(),
            user: "me".into(),
        });
        let scopes = vec![
            ProviderScope::new("sub-1")
                .with_name("Production")
                .with_regions(vec!["westeurope".into()]),
        ];
        let taxonomy = AzureProvider.default_taxonomy();

        let report = run(
            &AzureProvider,
            &ctx,
            &scopes,
            &taxonomy,
            &runner,
            options(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let counts = report.counts();
        assert_eq!(report.provider, Provider::Azure);
        assert_eq!(counts["Virtual Machines (VMs)"], 2);
        assert_eq!(counts["Container Hosts (AKS Clusters)"], 5);
        assert_eq!(counts["Serverless Functions"], 1);
        assert_eq!(counts["Cloud Buckets (Storage Accounts)"], 0);
        assert_eq!(runner.calls().len(), 3);
        assert_eq!(report.notes.len(), 4);
    }
}
