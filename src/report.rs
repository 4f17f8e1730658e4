//! The sizing report and its serialized forms.

mod render;

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{Provider, ProviderScope};

pub use render::emit;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Text,
    Csv,
    Json,
}

/// Count for one licensing category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryCount {
    pub name: String,
    pub count: u64,
    pub unit: String,
}

/// Per-scope breakdown.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScopeCensus {
    pub scope: ProviderScope,
    pub categories: Vec<CategoryCount>,
    #[serde(default)]
    pub unclassified: u64,
}

/// Categories that could not be counted because a query was denied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedCategory {
    pub scope_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub query: String,
    pub categories: Vec<String>,
    pub reason: String,
}

/// A query that failed after retries and left its categories undercounted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryError {
    pub scope_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    pub query: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizingReport {
    pub provider: Provider,
    pub generated_at: DateTime<Utc>,
    pub tool_version: String,
    /// Identity the census ran as, e.g. "AWS - Profile: default, Account: 123".
    pub context: String,
    pub scopes: Vec<ScopeCensus>,
    pub totals: Vec<CategoryCount>,
    #[serde(default)]
    pub skipped: Vec<SkippedCategory>,
    #[serde(default)]
    pub errors: Vec<QueryError>,
    #[serde(default)]
    pub notes: Vec<String>,
    #[serde(default)]
    pub interrupted: bool,
}

impl SizingReport {
    /// Grand totals keyed by category name.
    pub fn counts(&self) -> BTreeMap<String, u64> {
        self.totals
            .iter()
            .map(|c| (c.name.clone(), c.count))
            .collect()
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read a report previously written with `--format json`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}
