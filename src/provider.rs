//! Cloud provider integrations.
//!
//! Each provider implements [`CloudProvider`]: it loads credentials into a
//! [`CloudContext`], discovers the scopes to enumerate, and declares the
//! list/describe calls ([`ResourceQuery`]) whose results get counted. All
//! providers are registered with the [`ProviderRegistry`] at startup.

pub mod aws;
pub mod azure;
pub mod gcp;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::model::{CloudContext, Provider, ProviderScope, ResourceRecord};
use crate::registry::ProviderRegistry;
use crate::runner::CommandRunner;
use crate::taxonomy::{self, Taxonomy};

/// Builds the CLI arguments (without the program) for one call.
pub type CommandBuilder = fn(&CloudContext, &ProviderScope, Option<&str>) -> Vec<String>;

/// Reduces one page of CLI output to resource records.
pub type Extractor = fn(&Value, &ProviderScope, Option<&str>) -> Vec<ResourceRecord>;

/// Where a query runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Once per region in the scope.
    Regional,
    /// Once per scope; records carry their own location.
    ScopeWide,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pagination {
    /// The CLI returns everything in one response.
    None,
    /// The response carries a continuation token in `next_field` that is
    /// passed back through `start_arg`; `size_arg` bounds each page.
    Token {
        next_field: &'static str,
        start_arg: &'static str,
        size_arg: &'static str,
    },
}

/// One list/describe call a provider makes for every scope (and region).
pub struct ResourceQuery {
    pub key: &'static str,
    /// Resource types this query can produce, used to tell which categories
    /// are affected when the query is denied.
    pub resource_types: &'static [&'static str],
    pub placement: Placement,
    pub pagination: Pagination,
    pub command: CommandBuilder,
    pub extract: Extractor,
}

impl std::fmt::Debug for ResourceQuery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceQuery")
            .field("key", &self.key)
            .field("placement", &self.placement)
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait CloudProvider: Send + Sync {
    fn provider(&self) -> Provider;

    /// Verify credentials and return the session used for the rest of the run.
    ///
    /// # Errors
    /// Returns [`CensusError::Authentication`](crate::error::CensusError) when
    /// the CLI is missing or credentials are absent or invalid.
    async fn authenticate(
        &self,
        config: &ProviderConfig,
        runner: &dyn CommandRunner,
    ) -> Result<CloudContext>;

    /// Resolve the scopes to enumerate, from configuration or discovery.
    async fn discover_scopes(
        &self,
        ctx: &CloudContext,
        config: &ProviderConfig,
        runner: &dyn CommandRunner,
    ) -> Result<Vec<ProviderScope>>;

    fn queries(&self) -> &'static [ResourceQuery];

    fn default_taxonomy(&self) -> Taxonomy {
        taxonomy::for_provider(self.provider())
    }

    /// Caveats printed with every report for this provider.
    fn notes(&self) -> &'static [&'static str] {
        &[]
    }
}

/// Register all providers with the given registry.
pub fn register_all(registry: &mut ProviderRegistry) {
    registry.register(aws::AwsProvider);
    registry.register(azure::AzureProvider);
    registry.register(gcp::GcpProvider);
}

/// Scopes given verbatim in configuration, all sharing the configured regions.
pub fn configured_scopes(config: &ProviderConfig) -> Vec<ProviderScope> {
    config
        .scopes
        .iter()
        .map(|id| ProviderScope::new(id.clone()).with_regions(config.regions.clone()))
        .collect()
}

// === JSON helpers ===

/// Array elements at a JSON pointer; missing or non-array values are empty.
pub fn items<'a>(value: &'a Value, pointer: &str) -> impl Iterator<Item = &'a Value> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
}

pub fn str_at(value: &Value, pointer: &str) -> Option<String> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

pub fn u64_at(value: &Value, pointer: &str) -> Option<u64> {
    value.pointer(pointer).and_then(Value::as_u64)
}

/// Last path segment of a resource URL or name.
pub fn last_segment(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
