use crate::model::Provider;

/// One raw item returned by a provider list/describe call.
///
/// Provider payloads are reduced to the fields the aggregator needs.
/// `weight` is the number of units the item contributes to its category,
/// which is 1 except for managed Kubernetes clusters where it is the
/// configured node capacity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    pub provider: Provider,
    pub scope_id: String,
    pub region: Option<String>,
    /// Normalized lowercase resource type (e.g. `microsoft.compute/virtualmachines`).
    pub resource_type: String,
    pub kind: Option<String>,
    pub weight: u64,
}

impl ResourceRecord {
    pub fn new(
        provider: Provider,
        scope_id: impl Into<String>,
        resource_type: impl AsRef<str>,
    ) -> Self {
        Self {
            provider,
            scope_id: scope_id.into(),
            region: None,
            resource_type: resource_type.as_ref().to_ascii_lowercase(),
            kind: None,
            weight: 1,
        }
    }

    #[must_use]
    pub fn in_region(mut self, region: Option<String>) -> Self {
        self.region = region.filter(|r| !r.is_empty());
        self
    }

    #[must_use]
    pub fn with_kind(mut self, kind: Option<String>) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub const fn with_weight(mut self, weight: u64) -> Self {
        self.weight = weight;
        self
    }
}
