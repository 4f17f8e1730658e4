use std::fmt;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Cloud provider types supported by cloudcensus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    /// Amazon Web Services
    Aws,
    /// Microsoft Azure
    Azure,
    /// Google Cloud Platform
    Gcp,
}

impl Provider {
    /// Human-readable display name for the provider.
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::Aws => "AWS",
            Self::Azure => "Azure",
            Self::Gcp => "GCP",
        }
    }

    /// Short lowercase identifier for the provider.
    pub const fn id(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
        }
    }

    /// Name of the provider's official CLI binary.
    pub const fn default_cli(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "az",
            Self::Gcp => "gcloud",
        }
    }

    /// What the provider calls its top-level enumeration boundary.
    pub const fn scope_label(&self) -> &'static str {
        match self {
            Self::Aws => "Account",
            Self::Azure => "Subscription",
            Self::Gcp => "Project",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Provider::Azure).unwrap(), "\"azure\"");
        let parsed: Provider = serde_json::from_str("\"gcp\"").unwrap();
        assert_eq!(parsed, Provider::Gcp);
    }

    #[test]
    fn test_provider_cli_names() {
        assert_eq!(Provider::Aws.default_cli(), "aws");
        assert_eq!(Provider::Azure.default_cli(), "az");
        assert_eq!(Provider::Gcp.default_cli(), "gcloud");
    }
}
