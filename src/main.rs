mod cli;
mod config;
mod loader;
mod output;
mod scanner;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, OutputFormat};
use crate::config::Config;
use crate::output::OutputWriter;
use crate::scanner::Scanner;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli)?;

    let mut config = Config::load().context("failed to load configuration")?;
    if let Some(timeout) = cli.timeout {
        config.limits.timeout_ms = timeout;
    }
    if let Some(concurrency) = cli.concurrency {
        config.limits.concurrency = concurrency;
    }
    if let Some(port) = cli.default_port {
        config.probe.default_port = port;
    }
    config.validate()?;

    let candidates = loader::load_candidates(&cli.input, config.probe.default_port)?;

    let scanner = Scanner::new(&config, !cli.skip_cert_scan, !cli.no_progress)?;
    let report = scanner.scan(candidates).await?;

    OutputWriter::new(OutputFormat::Json, Some(cli.output_file.clone())).write(&report)?;
    tracing::info!("results written to {}", cli.output_file.display());

    if cli.output_format == OutputFormat::Human {
        OutputWriter::new(OutputFormat::Human, None).write(&report)?;
    }

    Ok(())
}

/// Console logging on stderr, with an optional plain-text debug log file.
/// External crates stay quiet unless RUST_LOG says otherwise.
fn init_tracing(cli: &Cli) -> Result<()> {
    let level = if cli.debug {
        "debug"
    } else if cli.verbose {
        "info"
    } else {
        "warn"
    };
    let filter_str = format!("apiprobe={level},reqwest=warn,hyper=warn,rustls=warn");
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer);

    if let Some(path) = &cli.log_file {
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create log file {}", path.display()))?;
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(std::sync::Arc::new(file));
        registry.with(file_layer).init();
    } else {
        registry.init();
    }

    Ok(())
}
