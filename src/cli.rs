//! Command-line interface for the bundle builder
//!
//! This module provides the argument parser, the user-facing output context
//! and the driver that turns parsed arguments into a bundling run.

use clap::{Parser, ValueEnum};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Instant;

use crate::bundle::BundlePlatform;
use crate::bundler::{BundleOutcome, BundleRequest, CustomBundle};
use crate::error::BundleResult;
use crate::package::{resolve_workspace_root, PackageName};
use crate::settings::BundlerSettings;

/// Build a CodeQL bundle with customization packs and additional packs
#[derive(Parser, Debug)]
#[command(name = "codeql-bundle")]
#[command(about = "Build a custom CodeQL bundle from a base bundle and workspace packs")]
#[command(version)]
pub struct Cli {
    /// Base CodeQL bundle archive (or an extracted bundle directory)
    #[arg(short, long)]
    pub bundle: PathBuf,

    /// Output archive ending in '.tar.gz', or a directory for the bundle(s)
    #[arg(short, long)]
    pub output: PathBuf,

    /// Directory containing 'codeql-workspace.yml', or the file itself
    #[arg(short, long, default_value = ".")]
    pub workspace: PathBuf,

    /// Produce a platform-specific bundle (repeatable)
    #[arg(short, long = "platform", value_enum, ignore_case = true)]
    pub platforms: Vec<BundlePlatform>,

    /// Log level
    #[arg(short, long, value_enum, ignore_case = true, default_value = "warning")]
    pub log: LogLevel,

    /// Do not pre-compile the bundle
    #[arg(long)]
    pub no_precompile: bool,

    /// Code Scanning configuration to install as the bundle default
    #[arg(short = 'c', long)]
    pub code_scanning_config: Option<PathBuf>,

    /// Number of packs processed in parallel
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Keep the scratch directory for inspection
    #[arg(long)]
    pub keep_scratch: bool,

    /// CodeQL launcher to compile with instead of the bundle's own
    #[arg(long)]
    pub codeql: Option<PathBuf>,

    /// Settings file (default: <workspace>/codeql-bundle.toml)
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Show progress and extra status lines
    #[arg(short, long)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long)]
    pub quiet: bool,

    /// Packs to add to the bundle
    #[arg(required = true, num_args = 1..)]
    pub packs: Vec<PackageName>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    /// `tracing` filter directive for this level
    pub fn directive(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error | LogLevel::Critical => "error",
        }
    }
}

impl Cli {
    /// Settings file, then environment, then flags
    pub fn resolve_settings<F>(&self, env: F) -> BundleResult<BundlerSettings>
    where
        F: Fn(&str) -> Option<String>,
    {
        let workspace_root = resolve_workspace_root(&self.workspace);
        let mut settings = BundlerSettings::discover(self.config.as_deref(), &workspace_root)?;
        settings.apply_env(env)?;

        if let Some(jobs) = self.jobs {
            settings.jobs = jobs;
        }
        if self.keep_scratch {
            settings.keep_scratch = true;
        }
        if self.no_precompile {
            settings.precompile = false;
        }
        if let Some(codeql) = &self.codeql {
            settings.codeql = Some(codeql.clone());
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn request(&self) -> BundleRequest {
        BundleRequest {
            bundle: self.bundle.clone(),
            workspace: self.workspace.clone(),
            packs: self.packs.clone(),
            platforms: self.platforms.clone(),
            output: self.output.clone(),
            code_scanning_config: self.code_scanning_config.clone(),
        }
    }
}

/// CLI execution context
#[derive(Clone)]
pub struct CliContext {
    pub verbose: bool,
    pub quiet: bool,
    pub start_time: Instant,
}

impl CliContext {
    pub fn new(verbose: bool, quiet: bool) -> Self {
        Self {
            verbose,
            quiet,
            start_time: Instant::now(),
        }
    }

    /// Print info message if not quiet
    pub fn info(&self, message: &str) {
        if !self.quiet {
            println!("{}", message);
        }
    }

    /// Print verbose message if verbose mode enabled
    pub fn verbose(&self, message: &str) {
        if self.verbose && !self.quiet {
            println!("{} {}", "verbose:".dimmed(), message.dimmed());
        }
    }

    /// Print warning message
    pub fn warn(&self, message: &str) {
        if !self.quiet {
            eprintln!("{} {}", "warning:".yellow().bold(), message);
        }
    }

    /// Print error message
    pub fn error(&self, message: &str) {
        eprintln!("{} {}", "error:".red().bold(), message);
    }

    /// Print success message
    pub fn success(&self, message: &str) {
        if !self.quiet {
            println!("{} {}", "success:".green().bold(), message);
        }
    }

    /// Progress bar over plan steps, shown in verbose mode
    pub fn progress_bar(&self, message: &str) -> Option<ProgressBar> {
        if self.quiet || !self.verbose {
            return None;
        }

        let pb = ProgressBar::new(0);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        pb.set_message(message.to_string());
        Some(pb)
    }

    /// Get elapsed time since CLI started
    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }
}

/// Turns parsed arguments into a bundling run and reports the result
pub struct BundleDriver {
    context: CliContext,
}

impl BundleDriver {
    pub fn new(context: CliContext) -> Self {
        Self { context }
    }

    pub fn run(&self, cli: &Cli) -> BundleResult<BundleOutcome> {
        let settings = cli.resolve_settings(|key| std::env::var(key).ok())?;
        self.context.verbose(&format!(
            "Creating a custom bundle of {} with pack(s) from {}",
            cli.bundle.display(),
            cli.workspace.display()
        ));
        self.context.verbose(&format!("Using {} worker(s)", settings.jobs));

        let mut bundle = CustomBundle::new(cli.request(), settings);
        if let Some(progress) = self.context.progress_bar("Bundling") {
            bundle = bundle.with_progress(progress);
        }
        let outcome = bundle.run()?;

        for diagnostic in &outcome.diagnostics {
            self.context.warn(&format!(
                "Skipped {}: {}",
                diagnostic.path.display(),
                diagnostic.message
            ));
        }
        self.context.verbose(&format!(
            "Processed {} pack(s), compiled {}",
            outcome.plan.len(),
            outcome.report.compiled.len()
        ));
        for archive in &outcome.archives {
            self.context.info(&format!("Wrote {}", archive.display()));
        }
        let elapsed = self.context.elapsed();
        self.context.success(&format!(
            "Built {} bundle(s) in {:.2}s",
            outcome.archives.len(),
            elapsed.as_secs_f64()
        ));
        Ok(outcome)
    }
}
