use std::fmt;

use crate::model::provider::Provider;

/// Authenticated session for one cloud provider.
///
/// Produced once by the credential loader and passed explicitly to every
/// enumeration call. Each variant carries the identity that was verified
/// and the CLI invocation details needed to reach that provider's APIs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudContext {
    /// AWS context with profile and caller identity
    Aws(AwsContext),
    /// Azure context with tenant and signed-in user
    Azure(AzureContext),
    /// GCP context with gcloud configuration and account
    Gcp(GcpContext),
}

impl CloudContext {
    /// Get the provider for this context.
    pub const fn provider(&self) -> Provider {
        match self {
            Self::Aws(_) => Provider::Aws,
            Self::Azure(_) => Provider::Azure,
            Self::Gcp(_) => Provider::Gcp,
        }
    }

    /// Get a short display name for this context.
    pub fn name(&self) -> &str {
        match self {
            Self::Aws(ctx) => ctx.profile.as_deref().unwrap_or("default"),
            Self::Azure(ctx) => &ctx.user,
            Self::Gcp(ctx) => ctx.configuration.as_deref().unwrap_or("default"),
        }
    }

    /// Program used to talk to the provider (e.g. `aws`, `/opt/az/bin/az`).
    pub fn cli(&self) -> &str {
        match self {
            Self::Aws(ctx) => &ctx.cli,
            Self::Azure(ctx) => &ctx.cli,
            Self::Gcp(ctx) => &ctx.cli,
        }
    }
}

impl fmt::Display for CloudContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aws(ctx) => write!(
                f,
                "AWS - Profile: {}, Account: {}",
                self.name(),
                ctx.account_id
            ),
            Self::Azure(ctx) => write!(f, "Azure - User: {}, Tenant: {}", ctx.user, ctx.tenant_id),
            Self::Gcp(ctx) => write!(f, "GCP - {} ({})", self.name(), ctx.account),
        }
    }
}

/// AWS connection context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsContext {
    pub cli: String,
    /// Named profile from the shared credentials file, if any
    pub profile: Option<String>,
    /// Account id returned by `sts get-caller-identity`
    pub account_id: String,
}

/// Azure connection context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureContext {
    pub cli: String,
    pub tenant_id: String,
    /// Signed-in user or service principal name
    pub user: String,
}

/// GCP connection context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcpContext {
    pub cli: String,
    /// gcloud configuration passed as `--configuration` (e.g., "prod").
    /// `None` leaves the choice to gcloud.
    pub configuration: Option<String>,
    /// Project set in the configuration, if any
    pub project_id: Option<String>,
    /// Account email (e.g., "user@example.com")
    pub account: String,
}
