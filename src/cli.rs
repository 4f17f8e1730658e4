use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::config::AppConfig;
use crate::model::Provider;
use crate::report::ReportFormat;

#[derive(Parser, Debug)]
#[command(
    name = "cloudcensus",
    version,
    about = "Count cloud resources across accounts, subscriptions and projects for licensing estimates"
)]
pub struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(long, global = true, env = "CLOUDCENSUS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log more to stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Enumerate a provider and report resource counts per category
    Count(CountArgs),
    /// Print the category taxonomy used for a provider as TOML
    Categories {
        #[arg(value_enum)]
        provider: Provider,

        /// Taxonomy file to validate and print instead of the built-in one
        #[arg(long)]
        taxonomy: Option<PathBuf>,
    },
    /// Re-render a report saved with `--format json`
    Render {
        report: PathBuf,

        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(ClapArgs, Debug)]
pub struct CountArgs {
    #[arg(value_enum)]
    pub provider: Provider,

    /// AWS named profile or gcloud configuration
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Account, subscription or project id (repeatable)
    #[arg(short, long = "scope")]
    pub scopes: Vec<String>,

    /// Region to enumerate (repeatable)
    #[arg(short, long = "region")]
    pub regions: Vec<String>,

    #[arg(short, long, value_enum)]
    pub format: Option<ReportFormat>,

    /// Also write the report to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Category taxonomy file
    #[arg(long)]
    pub taxonomy: Option<PathBuf>,

    /// Maximum provider calls in flight
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Retries for throttled or timed out calls
    #[arg(long)]
    pub retries: Option<u32>,

    /// Include disabled subscriptions and inactive projects
    #[arg(long)]
    pub include_disabled: bool,

    /// Do not print the text report when writing to a file
    #[arg(short, long)]
    pub quiet: bool,
}

impl CountArgs {
    /// Overlay command-line flags on the loaded configuration.
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(format) = self.format {
            config.output.format = format;
        }
        if let Some(output) = &self.output {
            config.output.path = Some(output.clone());
        }
        if let Some(concurrency) = self.concurrency {
            config.enumeration.concurrency = concurrency.max(1);
        }
        if let Some(retries) = self.retries {
            config.enumeration.max_retries = retries;
        }

        let provider = config.provider_mut(self.provider);
        if let Some(profile) = &self.profile {
            provider.profile = Some(profile.clone());
        }
        if !self.scopes.is_empty() {
            provider.scopes.clone_from(&self.scopes);
        }
        if !self.regions.is_empty() {
            provider.regions.clone_from(&self.regions);
        }
        if let Some(taxonomy) = &self.taxonomy {
            provider.taxonomy = Some(taxonomy.clone());
        }
        if self.include_disabled {
            provider.include_disabled = true;
        }
    }
}
