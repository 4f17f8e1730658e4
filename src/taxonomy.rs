//! Resource type to licensing category mapping.
//!
//! A [`Taxonomy`] is an ordered list of categories plus rules that map
//! normalized resource types (optionally narrowed by kind) onto them. Every
//! provider ships a default taxonomy; users can replace it with a TOML file
//! of the same shape:
//!
//! ```toml
//! [[category]]
//! name = "Serverless Functions"
//! unit = "functions"
//!
//! [[rule]]
//! resource_type = "microsoft.web/sites"
//! kind_contains = "functionapp"
//! category = "Serverless Functions"
//! ```

mod defaults;

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

pub use defaults::for_provider;

use crate::error::{CensusError, Result};
use crate::model::ResourceRecord;

fn default_unit() -> String {
    "resources".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryDef {
    pub name: String,
    #[serde(default = "default_unit")]
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryRule {
    pub resource_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind_contains: Option<String>,
    pub category: String,
}

impl CategoryRule {
    fn matches(&self, record: &ResourceRecord) -> bool {
        if self.resource_type != record.resource_type {
            return false;
        }
        match (&self.kind_contains, &record.kind) {
            (None, _) => true,
            (Some(needle), Some(kind)) => kind.to_ascii_lowercase().contains(needle.as_str()),
            (Some(_), None) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Taxonomy {
    #[serde(rename = "category")]
    categories: Vec<CategoryDef>,
    #[serde(rename = "rule", default)]
    rules: Vec<CategoryRule>,
}

impl Taxonomy {
    /// Build a taxonomy, normalizing rule casing and rejecting rules that
    /// point at undeclared categories.
    pub fn new(categories: Vec<CategoryDef>, rules: Vec<CategoryRule>) -> Result<Self> {
        if categories.is_empty() {
            return Err(CensusError::Config(
                "taxonomy declares no categories".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for category in &categories {
            if category.name.trim().is_empty() {
                return Err(CensusError::Config("category with empty name".to_string()));
            }
            if !seen.insert(category.name.as_str()) {
                return Err(CensusError::Config(format!(
                    "category '{}' declared twice",
                    category.name
                )));
            }
        }

        let mut normalized = Vec::with_capacity(rules.len());
        for rule in rules {
            if rule.resource_type.trim().is_empty() {
                return Err(CensusError::Config(format!(
                    "rule for category '{}' has an empty resource_type",
                    rule.category
                )));
            }
            if !seen.contains(rule.category.as_str()) {
                return Err(CensusError::Config(format!(
                    "rule for '{}' references unknown category '{}'",
                    rule.resource_type, rule.category
                )));
            }
            normalized.push(CategoryRule {
                resource_type: rule.resource_type.trim().to_ascii_lowercase(),
                kind_contains: rule.kind_contains.map(|k| k.to_ascii_lowercase()),
                category: rule.category,
            });
        }

        Ok(Self {
            categories,
            rules: normalized,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let raw: Self = toml::from_str(content)?;
        Self::new(raw.categories, raw.rules)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|err| match err {
            CensusError::Config(msg) => CensusError::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| CensusError::Config(e.to_string()))
    }

    /// Categories in report order.
    pub fn categories(&self) -> &[CategoryDef] {
        &self.categories
    }

    pub fn category(&self, name: &str) -> Option<&CategoryDef> {
        self.categories.iter().find(|c| c.name == name)
    }

    /// First category whose rule matches the record.
    pub fn classify(&self, record: &ResourceRecord) -> Option<&CategoryDef> {
        self.rules
            .iter()
            .find(|rule| rule.matches(record))
            .and_then(|rule| self.category(&rule.category))
    }

    /// Categories that any of the given resource types can feed, in report order.
    pub fn categories_for_types(&self, resource_types: &[&str]) -> Vec<&CategoryDef> {
        self.categories
            .iter()
            .filter(|category| {
                self.rules.iter().any(|rule| {
                    rule.category == category.name
                        && resource_types
                            .iter()
                            .any(|t| t.eq_ignore_ascii_case(&rule.resource_type))
                })
            })
            .collect()
    }
}
