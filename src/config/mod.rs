pub mod loader;

use std::path::PathBuf;

pub use loader::{load, load_from};
use serde::{Deserialize, Serialize};

use crate::model::Provider;
use crate::report::ReportFormat;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: ReportFormat,
    /// Default file to write the report to.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnumerationConfig {
    /// Maximum number of provider calls in flight. 1 means sequential.
    pub concurrency: usize,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub call_timeout_secs: u64,
    pub page_size: u32,
}

impl Default for EnumerationConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_retries: 2,
            retry_base_delay_ms: 500,
            call_timeout_secs: 120,
            page_size: 100,
        }
    }
}

/// Per-provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// AWS named profile or gcloud configuration name.
    pub profile: Option<String>,
    /// Accounts, subscriptions or projects to enumerate. Empty means discover.
    pub scopes: Vec<String>,
    /// Regions to enumerate. Empty means all.
    pub regions: Vec<String>,
    /// Category taxonomy file replacing the built-in mapping.
    pub taxonomy: Option<PathBuf>,
    /// Path to the provider CLI when it is not on PATH.
    pub cli: Option<String>,
    /// Also enumerate disabled subscriptions / inactive projects.
    pub include_disabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub enumeration: EnumerationConfig,
    #[serde(default)]
    pub aws: ProviderConfig,
    #[serde(default)]
    pub azure: ProviderConfig,
    #[serde(default)]
    pub gcp: ProviderConfig,
}

impl AppConfig {
    pub const fn provider(&self, provider: Provider) -> &ProviderConfig {
        match provider {
            Provider::Aws => &self.aws,
            Provider::Azure => &self.azure,
            Provider::Gcp => &self.gcp,
        }
    }

    pub fn provider_mut(&mut self, provider: Provider) -> &mut ProviderConfig {
        match provider {
            Provider::Aws => &mut self.aws,
            Provider::Azure => &mut self.azure,
            Provider::Gcp => &mut self.gcp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.enumeration.concurrency, 4);
        assert_eq!(config.enumeration.max_retries, 2);
        assert_eq!(config.output.format, ReportFormat::Text);
        assert!(config.aws.scopes.is_empty());
    }

    #[test]
    fn test_partial_sections() {
        let config: AppConfig = toml::from_str(
            r#"
            [output]
            format = "json"

            [enumeration]
            concurrency = 8

            [azure]
            scopes = ["sub-a", "sub-b"]
            include_disabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.output.format, ReportFormat::Json);
        assert_eq!(config.enumeration.concurrency, 8);
        assert_eq!(config.enumeration.call_timeout_secs, 120);
        assert_eq!(config.provider(Provider::Azure).scopes, vec!["sub-a", "sub-b"]);
        assert!(config.azure.include_disabled);
        assert!(!config.gcp.include_disabled);
    }
}
