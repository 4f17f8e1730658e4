use std::fmt;

use serde::{Deserialize, Serialize};

/// The boundary over which enumeration occurs.
///
/// `id` is the AWS account id, Azure subscription id, or GCP project id.
/// An empty `regions` list means every region the provider reports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderScope {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub regions: Vec<String>,
}

impl ProviderScope {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            regions: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_regions(mut self, regions: Vec<String>) -> Self {
        self.regions = regions;
        self
    }

    /// Whether a record located in `region` falls inside this scope.
    ///
    /// Records without a location (global resources) are always in scope.
    pub fn contains_region(&self, region: Option<&str>) -> bool {
        match region {
            None => true,
            Some(_) if self.regions.is_empty() => true,
            Some(region) => self.regions.iter().any(|r| r.eq_ignore_ascii_case(region)),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

impl fmt::Display for ProviderScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) if name != &self.id => write!(f, "{name} ({})", self.id),
            _ => write!(f, "{}", self.id),
        }
    }
}
