use std::process::ExitCode;

use clap::Parser;
use color_eyre::Result;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Layer, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::App;
use crate::cli::Command;
use crate::registry::ProviderRegistry;

mod app;
mod census;
mod cli;
mod config;
mod enumerate;
mod error;
mod model;
mod provider;
mod registry;
mod report;
mod runner;
mod tally;
mod taxonomy;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    color_eyre::install()?;
    let args = cli::Args::parse();
    let _guard = initialize_logging(args.verbose)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting cloudcensus");

    let config = match &args.config {
        Some(path) => config::load_from(path)?,
        None => config::load()?,
    };

    let mut registry = ProviderRegistry::new();
    provider::register_all(&mut registry);

    let mut app = App::new(registry, config);
    match args.command {
        Command::Count(count) => app.count(&count).await,
        Command::Categories { provider, taxonomy } => app.categories(provider, taxonomy.as_deref()),
        Command::Render {
            report,
            format,
            output,
        } => App::render(&report, format, output.as_deref()),
    }
}

fn initialize_logging(verbose: u8) -> Result<WorkerGuard> {
    let directory = dirs::data_local_dir().map_or_else(
        || std::path::PathBuf::from("logs"),
        |path| path.join("cloudcensus").join("logs"),
    );
    std::fs::create_dir_all(&directory)?;

    let file_appender = tracing_appender::rolling::daily(&directory, "cloudcensus.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("cloudcensus=info"));
    let stderr_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(EnvFilter::new(format!("cloudcensus={stderr_level}"))),
        )
        .init();

    Ok(guard)
}
