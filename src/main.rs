//! codeql-bundle command-line entry point

use anyhow::anyhow;
use clap::Parser;
use std::process;
use tracing_subscriber::EnvFilter;

use codeql_bundle::cli::{BundleDriver, Cli, CliContext, LogLevel};

fn main() {
    let cli = Cli::parse();
    let context = CliContext::new(cli.verbose, cli.quiet);

    if let Err(e) = init_tracing(cli.log) {
        context.warn(&format!("{:#}", e));
    }

    let driver = BundleDriver::new(context.clone());
    if let Err(e) = driver.run(&cli) {
        context.error(&format!("{}: {}", e.kind(), e));
        process::exit(1);
    }
}

/// `RUST_LOG` takes precedence over `--log`
fn init_tracing(level: LogLevel) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(level == LogLevel::Debug)
        .try_init()
        .map_err(|e| anyhow!(e).context("failed to install the log subscriber"))
}
