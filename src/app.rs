use std::io::Write;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::census::{self, CensusOptions};
use crate::cli::CountArgs;
use crate::config::AppConfig;
use crate::error::{CensusError, Result};
use crate::model::Provider;
use crate::registry::ProviderRegistry;
use crate::report::{self, ReportFormat, SizingReport};
use crate::runner::{CommandRunner, ProcessRunner};
use crate::taxonomy::Taxonomy;

pub const EXIT_OK: u8 = 0;
pub const EXIT_CONFIG: u8 = 1;
pub const EXIT_AUTHENTICATION: u8 = 2;
pub const EXIT_API: u8 = 3;
pub const EXIT_INTERRUPTED: u8 = 130;

/// Process exit status for a run that ended with `err`.
pub fn exit_status(err: &CensusError) -> u8 {
    match err {
        CensusError::Authentication(_) => EXIT_AUTHENTICATION,
        CensusError::Permission(_)
        | CensusError::Transient(_)
        | CensusError::Api(_)
        | CensusError::Parse(_) => EXIT_API,
        CensusError::Config(_)
        | CensusError::Io(_)
        | CensusError::Json(_)
        | CensusError::Toml(_)
        | CensusError::Csv(_) => EXIT_CONFIG,
    }
}

/// Exit status for a report that was produced.
pub fn report_status(report: &SizingReport) -> u8 {
    if report.interrupted {
        EXIT_INTERRUPTED
    } else if report.has_errors() {
        EXIT_API
    } else {
        EXIT_OK
    }
}

pub struct App {
    registry: ProviderRegistry,
    config: AppConfig,
}

impl App {
    pub const fn new(registry: ProviderRegistry, config: AppConfig) -> Self {
        Self { registry, config }
    }

    fn taxonomy(&self, provider: Provider, path: Option<&Path>) -> Result<Taxonomy> {
        if let Some(path) = path.or(self.config.provider(provider).taxonomy.as_deref()) {
            info!(path = %path.display(), "Loading taxonomy");
            return Taxonomy::load(path);
        }

        self.registry
            .get(provider)
            .map(|p| p.default_taxonomy())
            .ok_or_else(|| CensusError::Config(format!("provider {provider} is not available")))
    }

    /// Authenticate, discover scopes and count everything for `provider`.
    pub async fn census(
        &self,
        provider: Provider,
        runner: &dyn CommandRunner,
        cancel: &CancellationToken,
    ) -> Result<SizingReport> {
        let cloud = self
            .registry
            .get(provider)
            .ok_or_else(|| CensusError::Config(format!("provider {provider} is not available")))?;
        let config = self.config.provider(provider);
        let taxonomy = self.taxonomy(provider, None)?;

        let ctx = cloud.authenticate(config, runner).await?;
        info!(provider = %ctx.provider(), context = %ctx, "Credentials loaded");

        let scopes = cloud.discover_scopes(&ctx, config, runner).await?;
        if scopes.is_empty() {
            warn!(
                provider = %provider,
                "No {}s to enumerate",
                provider.scope_label().to_lowercase()
            );
        }

        census::run(
            cloud.as_ref(),
            &ctx,
            &scopes,
            &taxonomy,
            runner,
            CensusOptions::from_config(&self.config.enumeration),
            cancel,
        )
        .await
    }

    /// `cloudcensus count`.
    pub async fn count(&mut self, args: &CountArgs) -> color_eyre::Result<ExitCode> {
        args.apply(&mut self.config);

        let runner = ProcessRunner::new(Duration::from_secs(
            self.config.enumeration.call_timeout_secs,
        ));

        let cancel = CancellationToken::new();
        let interrupt = tokio::spawn({
            let cancel = cancel.clone();
            async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping enumeration");
                    cancel.cancel();
                }
            }
        });

        let result = self.census(args.provider, &runner, &cancel).await;
        interrupt.abort();

        let report = match result {
            Ok(report) => report,
            Err(err) => {
                error!(%err, "Census failed");
                eprintln!("Error: {err}");
                return Ok(ExitCode::from(exit_status(&err)));
            }
        };

        info!(totals = ?report.counts(), "Census finished");

        let output = self.config.output.path.clone();
        let mut stdout = std::io::stdout().lock();
        if let Err(err) = report::emit(
            &mut stdout,
            &report,
            self.config.output.format,
            output.as_deref(),
            args.quiet,
        ) {
            error!(%err, "Could not emit report");
            eprintln!("Error: {err}");
            return Ok(ExitCode::from(exit_status(&err)));
        }

        Ok(ExitCode::from(report_status(&report)))
    }

    /// `cloudcensus categories`.
    pub fn categories(
        &self,
        provider: Provider,
        taxonomy: Option<&Path>,
    ) -> color_eyre::Result<ExitCode> {
        let taxonomy = self.taxonomy(provider, taxonomy)?;
        let mut stdout = std::io::stdout().lock();
        stdout.write_all(taxonomy.to_toml()?.as_bytes())?;
        Ok(ExitCode::SUCCESS)
    }

    /// `cloudcensus render`.
    pub fn render(
        path: &Path,
        format: ReportFormat,
        output: Option<&Path>,
    ) -> color_eyre::Result<ExitCode> {
        let report = SizingReport::load(path)?;
        let mut stdout = std::io::stdout().lock();
        report::emit(&mut stdout, &report, format, output, false)?;
        Ok(ExitCode::from(report_status(&report)))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::provider;
    use crate::runner::mock::{MockRunner, Reply};

    fn app(config: AppConfig) -> App {
        let mut registry = ProviderRegistry::new();
        provider::register_all(&mut registry);
        App::new(registry, config)
    }

    fn azure_runner() -> MockRunner {
        MockRunner::new()
            .on(
                &["account", "show"],
                Reply::Json(json!({"id": "sub-1", "tenantId": "t-1", "user": {"name": "auditor@example.com"}})),
            )
            .on(
                &["account", "list"],
                Reply::Json(json!([
                    {"id": "sub-1", "name": "Production", "state": "Enabled"},
                    {"id": "sub-2", "name": "Sandbox", "state": "Enabled"},
                ])),
            )
            .on(
                &["vm", "list", "sub-1"],
                Reply::Json(json!([{"location": "westeurope"}, {"location": "westeurope"}])),
            )
            .on(
                &["vm", "list", "sub-2"],
                Reply::Json(json!([{"location": "eastus"}])),
            )
            .on(
                &["resource", "list", "sub-2"],
                Reply::Json(json!([
                    {"type": "Microsoft.ContainerRegistry/registries", "location": "eastus"},
                ])),
            )
    }

    #[tokio::test]
    async fn test_census_end_to_end() {
        let app = app(AppConfig::default());
        let runner = azure_runner();

        let report = app
            .census(Provider::Azure, &runner, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.scopes.len(), 2);
        assert_eq!(report.scopes[0].scope.display_name(), "Production");
        assert_eq!(report.counts()["Virtual Machines (VMs)"], 3);
        assert_eq!(report.counts()["Container Registries (ACR)"], 1);
        assert_eq!(report.context, "Azure - User: auditor@example.com, Tenant: t-1");
        assert_eq!(report_status(&report), EXIT_OK);
    }

    #[tokio::test]
    async fn test_authentication_failure_maps_to_exit_code() {
        let app = app(AppConfig::default());
        let runner = MockRunner::new().on(&["account", "show"], Reply::Auth("Please run 'az login'"));

        let err = app
            .census(Provider::Azure, &runner, &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(err.is_authentication());
        assert_eq!(exit_status(&err), EXIT_AUTHENTICATION);
    }

    #[tokio::test]
    async fn test_custom_taxonomy_replaces_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy.toml");
        std::fs::write(
            &path,
            r#"
[[category]]
name = "Compute"
unit = "machines"

[[rule]]
resource_type = "microsoft.compute/virtualmachines"
category = "Compute"
"#,
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.azure.taxonomy = Some(path);
        let app = app(config);

        let report = app
            .census(Provider::Azure, &azure_runner(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.totals.len(), 1);
        assert_eq!(report.counts()["Compute"], 3);
        assert_eq!(report.scopes[1].unclassified, 1);
    }

    #[tokio::test]
    async fn test_invalid_taxonomy_fails_before_authentication() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("taxonomy.toml");
        std::fs::write(
            &path,
            "[[category]]\nname = \"Compute\"\n\n[[rule]]\nresource_type = \"x\"\ncategory = \"Storage\"\n",
        )
        .unwrap();

        let mut config = AppConfig::default();
        config.azure.taxonomy = Some(path);
        let app = app(config);
        let runner = azure_runner();

        let err = app
            .census(Provider::Azure, &runner, &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(exit_status(&err), EXIT_CONFIG);
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_report_status() {
        let mut report = crate::report::tests::sample_report();
        assert_eq!(report_status(&report), EXIT_OK);

        report.errors.push(crate::report::QueryError {
            scope_id: "1".into(),
            region: None,
            query: "q".into(),
            message: "boom".into(),
        });
        assert_eq!(report_status(&report), EXIT_API);

        report.interrupted = true;
        assert_eq!(report_status(&report), EXIT_INTERRUPTED);
    }
}
