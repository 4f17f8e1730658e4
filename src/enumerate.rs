//! Lazy, paginated enumeration of provider resources.
//!
//! [`Enumerator::records`] turns one [`ResourceQuery`] for one scope (and
//! region) into a stream of [`ResourceRecord`]s. Pages are only fetched as
//! the stream is polled, continuation tokens are followed until the
//! provider stops returning one, and transient failures are retried with
//! exponential backoff before being surfaced.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use futures::stream::{self, Stream, TryStreamExt};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{CensusError, Result};
use crate::model::{CloudContext, ProviderScope, ResourceRecord};
use crate::provider::{Pagination, ResourceQuery};
use crate::runner::CommandRunner;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    #[cfg(test)]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt))
    }

    /// Run `op`, retrying only [`CensusError::Transient`] failures.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Err(err) if err.is_transient() && attempt < self.max_retries => {
                    let delay = self.delay(attempt);
                    attempt += 1;
                    warn!(
                        call = label,
                        attempt,
                        max = self.max_retries,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        %err,
                        "Transient error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                other => return other,
            }
        }
    }
}

/// One fetched page of a query.
#[derive(Debug)]
pub struct Page {
    pub records: Vec<ResourceRecord>,
    pub next_token: Option<String>,
}

pub struct Enumerator<'a> {
    runner: &'a dyn CommandRunner,
    context: &'a CloudContext,
    retry: RetryPolicy,
    page_size: u32,
}

impl<'a> Enumerator<'a> {
    pub const fn new(
        runner: &'a dyn CommandRunner,
        context: &'a CloudContext,
        retry: RetryPolicy,
        page_size: u32,
    ) -> Self {
        Self {
            runner,
            context,
            retry,
            page_size,
        }
    }

    /// Fetch a single page, starting at `token` when given.
    pub async fn fetch_page(
        &self,
        query: &ResourceQuery,
        scope: &ProviderScope,
        region: Option<&str>,
        token: Option<&str>,
    ) -> Result<Page> {
        let mut args = (query.command)(self.context, scope, region);

        if let Pagination::Token {
            start_arg,
            size_arg,
            ..
        } = query.pagination
        {
            args.push(size_arg.to_string());
            args.push(self.page_size.max(1).to_string());
            if let Some(token) = token {
                args.push(start_arg.to_string());
                args.push(token.to_string());
            }
        }

        let program = self.context.cli();
        let value = self
            .retry
            .run(query.key, || self.runner.run_json(program, &args))
            .await?;

        let records = (query.extract)(&value, scope, region);
        let next_token = next_token(&value, query.pagination);

        debug!(
            query = query.key,
            scope = %scope.id,
            region = region.unwrap_or("-"),
            records = records.len(),
            more = next_token.is_some(),
            "Fetched page"
        );

        Ok(Page {
            records,
            next_token,
        })
    }

    /// Stream every record of `query`, following pagination lazily.
    ///
    /// Records whose location falls outside the scope's regions are dropped.
    /// The stream ends after the first error; a continuation token seen
    /// before is reported as an API error.
    pub fn records<'s>(
        &'s self,
        query: &'s ResourceQuery,
        scope: &'s ProviderScope,
        region: Option<&'s str>,
    ) -> impl Stream<Item = Result<ResourceRecord>> + 's {
        enum Cursor {
            Start,
            Next(String),
            Done,
        }

        let start = (Cursor::Start, HashSet::new());
        stream::try_unfold(start, move |(cursor, mut seen)| async move {
            let token = match cursor {
                Cursor::Done => return Ok(None),
                Cursor::Start => None,
                Cursor::Next(token) => Some(token),
            };

            let page = self
                .fetch_page(query, scope, region, token.as_deref())
                .await?;

            let next = match page.next_token {
                Some(next) if !seen.insert(next.clone()) => {
                    return Err(CensusError::Api(format!(
                        "{} returned pagination token '{next}' a second time",
                        query.key
                    )));
                }
                Some(next) => Cursor::Next(next),
                None => Cursor::Done,
            };

            Ok::<_, CensusError>(Some((page.records, (next, seen))))
        })
        .map_ok(|records| stream::iter(records.into_iter().map(Ok::<_, CensusError>)))
        .try_flatten()
        .try_filter(move |record| {
            std::future::ready(scope.contains_region(record.region.as_deref()))
        })
    }
}

fn next_token(value: &Value, pagination: Pagination) -> Option<String> {
    match pagination {
        Pagination::None => None,
        Pagination::Token { next_field, .. } => value
            .get(next_field)
            .and_then(Value::as_str)
            .filter(|t| !t.is_empty())
            .map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use serde_json::json;

    use super::*;
    use crate::model::{AwsContext, Provider};
    use crate::provider::Placement;
    use crate::runner::mock::{MockRunner, Reply};

    static PAGED: ResourceQuery = ResourceQuery {
        key: "widgets",
        resource_types: &["test::widget"],
        placement: Placement::Regional,
        pagination: Pagination::Token {
            next_field: "NextToken",
            start_arg: "--starting-token",
            size_arg: "--max-items",
        },
        command: |_, _, region| {
            vec![
                "widgets".to_string(),
                "--region".to_string(),
                region.unwrap_or("none").to_string(),
            ]
        },
        extract: |value, scope, region| {
            crate::provider::items(value, "/Widgets")
                .map(|w| {
                    ResourceRecord::new(Provider::Aws, scope.id.clone(), "test::widget")
                        .in_region(crate::provider::str_at(w, "/Region").or(region.map(str::to_string)))
                })
                .collect()
        },
    };

    fn context() -> CloudContext {
        CloudContext::Aws(AwsContext {
            cli: "aws".into(),
            profile: None,
            account_id: "1".into(),
        })
    }

    fn widgets(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({"Id": i})).collect()
    }

    #[tokio::test]
    async fn test_pagination_total_is_sum_of_pages() {
        let runner = MockRunner::new()
            .on(
                &["--starting-token", "t2"],
                Reply::Json(json!({"Widgets": widgets(1)})),
            )
            .on(
                &["--starting-token", "t1"],
                Reply::Json(json!({"Widgets": widgets(4), "NextToken": "t2"})),
            )
            .on(
                &["widgets"],
                Reply::Json(json!({"Widgets": widgets(5), "NextToken": "t1"})),
            );
        let ctx = context();
        let enumerator = Enumerator::new(&runner, &ctx, RetryPolicy::none(), 5);
        let scope = ProviderScope::new("1");

        let records: Vec<_> = enumerator
            .records(&PAGED, &scope, Some("us-east-1"))
            .try_collect()
            .await
            .unwrap();

        assert_eq!(records.len(), 5 + 4 + 1);
        assert_eq!(runner.calls().len(), 3);
        assert_eq!(runner.calls_matching(&["--max-items", "5"]), 3);
    }

    #[tokio::test]
    async fn test_pages_are_fetched_lazily() {
        let runner = MockRunner::new().on(
            &["widgets"],
            Reply::Json(json!({"Widgets": widgets(2), "NextToken": "more"})),
        );
        let ctx = context();
        let enumerator = Enumerator::new(&runner, &ctx, RetryPolicy::none(), 2);
        let scope = ProviderScope::new("1");

        let stream = enumerator.records(&PAGED, &scope, None);
        futures::pin_mut!(stream);
        let first = stream.try_next().await.unwrap();

        assert!(first.is_some());
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_repeated_token_is_an_error() {
        let runner = MockRunner::new().on(
            &["widgets"],
            Reply::Json(json!({"Widgets": widgets(1), "NextToken": "same"})),
        );
        let ctx = context();
        let enumerator = Enumerator::new(&runner, &ctx, RetryPolicy::none(), 1);
        let scope = ProviderScope::new("1");

        let result: Result<Vec<_>> = enumerator.records(&PAGED, &scope, None).try_collect().await;
        assert!(matches!(result, Err(CensusError::Api(_))));
    }

    #[tokio::test]
    async fn test_token_cycle_is_an_error() {
        let runner = MockRunner::new()
            .on(
                &["--starting-token", "B"],
                Reply::Json(json!({"Widgets": widgets(1), "NextToken": "A"})),
            )
            .on(
                &["--starting-token", "A"],
                Reply::Json(json!({"Widgets": widgets(1), "NextToken": "B"})),
            )
            .on(
                &["widgets"],
                Reply::Json(json!({"Widgets": widgets(1), "NextToken": "A"})),
            );
        let ctx = context();
        let enumerator = Enumerator::new(&runner, &ctx, RetryPolicy::none(), 1);
        let scope = ProviderScope::new("1");

        let result: Result<Vec<_>> = enumerator.records(&PAGED, &scope, None).try_collect().await;

        assert!(matches!(result, Err(CensusError::Api(_))));
        assert_eq!(runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_transient_errors_are_retried() {
        let runner = MockRunner::new().on_sequence(
            &["widgets"],
            vec![
                Reply::Transient("Throttling"),
                Reply::Transient("Throttling"),
                Reply::Json(json!({"Widgets": widgets(3)})),
            ],
        );
        let ctx = context();
        let enumerator =
            Enumerator::new(&runner, &ctx, RetryPolicy::new(2, Duration::from_millis(1)), 10);
        let scope = ProviderScope::new("1");

        let records: Vec<_> = enumerator
            .records(&PAGED, &scope, None)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(records.len(), 3);
        assert_eq!(runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let runner = MockRunner::new().on(&["widgets"], Reply::Transient("Throttling"));
        let ctx = context();
        let enumerator =
            Enumerator::new(&runner, &ctx, RetryPolicy::new(2, Duration::from_millis(1)), 10);
        let scope = ProviderScope::new("1");

        let result: Result<Vec<_>> = enumerator.records(&PAGED, &scope, None).try_collect().await;

        assert!(matches!(result, Err(CensusError::Transient(_))));
        assert_eq!(runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_permission_errors_are_not_retried() {
        let runner = MockRunner::new().on(&["widgets"], Reply::Permission("AccessDenied"));
        let ctx = context();
        let enumerator =
            Enumerator::new(&runner, &ctx, RetryPolicy::new(5, Duration::from_millis(1)), 10);
        let scope = ProviderScope::new("1");

        let result: Result<Vec<_>> = enumerator.records(&PAGED, &scope, None).try_collect().await;

        assert!(matches!(result, Err(CensusError::Permission(_))));
        assert_eq!(runner.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_out_of_scope_regions_are_dropped() {
        let runner = MockRunner::new().on(
            &["widgets"],
            Reply::Json(json!({"Widgets": [
                {"Region": "eu-west-1"},
                {"Region": "us-east-1"},
                {},
            ]})),
        );
        let ctx = context();
        let enumerator = Enumerator::new(&runner, &ctx, RetryPolicy::none(), 10);
        let scope = ProviderScope::new("1").with_regions(vec!["eu-west-1".into()]);

        let records: Vec<_> = enumerator
            .records(&PAGED, &scope, None)
            .try_collect()
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.region.as_deref() != Some("us-east-1")));
    }
}
