//! The end-to-end bundling pipeline
//!
//! Scan the workspace and unpack the base bundle side by side, validate the
//! merged dependency graph, plan and run the recompilation, then write the
//! requested archives. Nothing is written to the output location unless every
//! earlier stage succeeded.

use crate::build::{BuildReport, CodeqlCli, Orchestrator, PackCompiler, Scheduler};
use crate::bundle::{ArchiveAssembler, ArchiveCodec, BundleIndex, BundlePlatform, TarGzCodec};
use crate::error::{BundleError, BundleResult};
use crate::graph::DependencyGraph;
use crate::package::{PackageCatalog, PackageName, ScanDiagnostic, WorkspaceScanner};
use crate::plan::BuildPlan;
use crate::settings::BundlerSettings;
use indicatif::ProgressBar;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};

/// What to build
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleRequest {
    /// Base bundle archive or extracted bundle directory
    pub bundle: PathBuf,
    /// Workspace directory or its `codeql-workspace.yml`
    pub workspace: PathBuf,
    /// Packs to add, in request order
    pub packs: Vec<PackageName>,
    /// Platform-specific bundles to produce; empty means one agnostic bundle
    pub platforms: Vec<BundlePlatform>,
    /// Output archive path or directory
    pub output: PathBuf,
    /// Optional default Code Scanning configuration
    pub code_scanning_config: Option<PathBuf>,
}

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct BundleOutcome {
    pub archives: Vec<PathBuf>,
    /// Packages in plan order
    pub plan: Vec<PackageName>,
    pub report: BuildReport,
    /// Manifests skipped while scanning the workspace
    pub diagnostics: Vec<ScanDiagnostic>,
}

/// A custom bundle build
pub struct CustomBundle {
    request: BundleRequest,
    settings: BundlerSettings,
    codec: Arc<dyn ArchiveCodec>,
    compiler: Option<Arc<dyn PackCompiler>>,
    progress: Option<ProgressBar>,
}

impl CustomBundle {
    pub fn new(request: BundleRequest, settings: BundlerSettings) -> Self {
        CustomBundle {
            request,
            settings,
            codec: Arc::new(TarGzCodec),
            compiler: None,
            progress: None,
        }
    }

    /// Use `compiler` instead of the CodeQL CLI
    pub fn with_compiler(mut self, compiler: Arc<dyn PackCompiler>) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn with_codec(mut self, codec: Arc<dyn ArchiveCodec>) -> Self {
        self.codec = codec;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn request(&self) -> &BundleRequest {
        &self.request
    }

    pub fn settings(&self) -> &BundlerSettings {
        &self.settings
    }

    pub fn run(&self) -> BundleResult<BundleOutcome> {
        if self.request.packs.is_empty() {
            return Err(BundleError::Config("at least one pack must be requested".to_string()));
        }
        self.settings.validate()?;
        if let Some(config) = &self.request.code_scanning_config {
            if !config.is_file() {
                return Err(BundleError::Config(format!(
                    "Code Scanning configuration {} does not exist",
                    config.display()
                )));
            }
        }
        ArchiveAssembler::output_paths(&self.request.output, &self.request.platforms)?;

        let (workspace, index) = self.load_inputs()?;
        index.check_platforms(&self.request.platforms)?;

        let graph = DependencyGraph::build(&workspace, index.catalog())?;
        let plan = BuildPlan::new(&graph, &self.request.packs)?;
        info!(
            "Build plan: {}",
            plan.order()
                .iter()
                .map(|name| name.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let cli;
        let compiler: Option<&dyn PackCompiler> = match (&self.compiler, self.settings.precompile) {
            (_, false) => None,
            (Some(compiler), true) => Some(compiler.as_ref()),
            (None, true) => {
                let launcher = self
                    .settings
                    .codeql
                    .clone()
                    .unwrap_or_else(|| index.codeql_launcher());
                cli = CodeqlCli::new(&launcher, self.settings.compiler_threads)?;
                Some(&cli)
            }
        };

        let mut orchestrator = Orchestrator::new(&graph, &index.qlpacks_dir())
            .with_scheduler(Scheduler::with_worker_count(self.settings.jobs));
        if let Some(compiler) = compiler {
            orchestrator = orchestrator.with_compiler(compiler);
        }
        if let Some(progress) = &self.progress {
            progress.set_length(plan.len() as u64);
            orchestrator = orchestrator.with_progress(progress.clone());
        }
        let report = orchestrator.execute(&plan)?;
        if let Some(progress) = &self.progress {
            progress.finish_and_clear();
        }

        if let Some(config) = &self.request.code_scanning_config {
            index.add_code_scanning_config(config)?;
        }

        let archives = ArchiveAssembler::new(self.codec.as_ref()).assemble(
            index.root(),
            index.platforms(),
            &self.request.platforms,
            &self.request.output,
        )?;

        Ok(BundleOutcome {
            archives,
            plan: plan.order().into_iter().cloned().collect(),
            report,
            diagnostics: workspace.diagnostics,
        })
    }

    /// Scan the workspace and materialize the bundle concurrently
    fn load_inputs(&self) -> BundleResult<(PackageCatalog, BundleIndex)> {
        let codec = self.codec.as_ref();
        let (workspace, index) = thread::scope(|scope| {
            let scan = scope.spawn(|| {
                let scanner = WorkspaceScanner::new(&self.request.workspace)?;
                debug!("Scanning workspace {}", scanner.root().display());
                scanner.scan_for(&self.request.packs)
            });
            let unpack = scope.spawn(|| {
                BundleIndex::open(&self.request.bundle, codec, self.settings.keep_scratch)
            });
            (join(scan), join(unpack))
        });
        // Report workspace problems first; a failed scan drops the index and its scratch tree.
        let workspace = workspace?;
        let index = index?;
        Ok((workspace, index))
    }
}

fn join<T>(handle: thread::ScopedJoinHandle<'_, T>) -> T {
    match handle.join() {
        Ok(value) => value,
        Err(panic) => std::panic::resume_unwind(panic),
    }
}
