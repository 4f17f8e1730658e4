//! Domain models for cloudcensus.
//!
//! This module contains the core types shared by every stage of a run:
//! - [`Provider`] - Cloud provider enumeration (AWS, GCP, Azure)
//! - [`CloudContext`] - Authenticated session for a provider
//! - [`ProviderScope`] - Account/subscription/project plus regions to enumerate
//! - [`ResourceRecord`] - One raw item returned by a list/describe call

pub mod context;
pub mod provider;
pub mod record;
pub mod scope;

pub use context::{AwsContext, AzureContext, CloudContext, GcpContext};
pub use provider::Provider;
pub use record::ResourceRecord;
pub use scope::ProviderScope;
