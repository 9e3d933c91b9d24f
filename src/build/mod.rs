//! Build orchestration for the scratch bundle
//!
//! This module provides functionality for:
//! - Installing customization and workspace packs into the bundle
//! - Wiring customization packs into the standard packs they extend
//! - Clearing stale compilation state and recompiling affected packs
//! - Running independent steps in parallel on a bounded worker pool

pub mod compiler;
pub mod scheduler;

pub use compiler::{CodeqlCli, CompileRequest, PackCompiler, QLX_MIN_VERSION};
pub use scheduler::Scheduler;

use crate::error::{BuildStage, BundleError, BundleResult};
use crate::fsutil;
use crate::graph::{DependencyGraph, PackKind, PackNode, PackOrigin};
use crate::package::{PackManifest, PackageDescriptor, PackageName, LOCK_FILE_NAME};
use crate::plan::{BuildPlan, PlanStep, StepAction};
use indicatif::ProgressBar;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Name of the module every standard pack exposes for customizations
pub const CUSTOMIZATIONS_MODULE: &str = "Customizations.qll";

/// Outcome of a successful plan execution
#[derive(Debug, Clone, Default)]
pub struct BuildReport {
    /// Packs in the order their steps finished
    pub completed: Vec<PackageName>,
    /// Packs handed to the compiler
    pub compiled: Vec<PackageName>,
}

/// Executes a build plan against the scratch bundle
pub struct Orchestrator<'a> {
    graph: &'a DependencyGraph,
    qlpacks: PathBuf,
    compiler: Option<&'a dyn PackCompiler>,
    scheduler: Scheduler,
    progress: Option<ProgressBar>,
}

impl<'a> Orchestrator<'a> {
    /// Without a compiler, compile steps only prepare the packs
    pub fn new(graph: &'a DependencyGraph, qlpacks: &Path) -> Self {
        Orchestrator {
            graph,
            qlpacks: qlpacks.to_path_buf(),
            compiler: None,
            scheduler: Scheduler::new(),
            progress: None,
        }
    }

    pub fn with_compiler(mut self, compiler: &'a dyn PackCompiler) -> Self {
        self.compiler = Some(compiler);
        self
    }

    pub fn with_scheduler(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Run every step of `plan`, stopping at the first failure
    pub fn execute(&self, plan: &BuildPlan) -> BundleResult<BuildReport> {
        let steps = plan.steps();
        info!(
            "Executing {} step(s) on {} worker(s)",
            steps.len(),
            self.scheduler.worker_count()
        );
        let waits_on: Vec<Vec<usize>> = steps.iter().map(|step| step.waits_on.clone()).collect();
        let compiled = Mutex::new(Vec::new());

        let order = self.scheduler.run(&waits_on, |idx| {
            let step = &steps[idx];
            if let Some(progress) = &self.progress {
                progress.set_message(step.name.to_string());
            }
            let compiled_pack = self.run_step(step)?;
            if compiled_pack {
                compiled
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(step.name.clone());
            }
            if let Some(progress) = &self.progress {
                progress.inc(1);
            }
            Ok::<(), BundleError>(())
        })?;

        let compiled = compiled.into_inner().unwrap_or_else(PoisonError::into_inner);
        Ok(BuildReport {
            completed: order.into_iter().map(|idx| steps[idx].name.clone()).collect(),
            compiled,
        })
    }

    /// Returns whether the compiler ran for this step
    fn run_step(&self, step: &PlanStep) -> BundleResult<bool> {
        let node = self.graph.node(step.node);
        match &step.action {
            StepAction::InstallCustomization { target } => {
                info!("Bundling the customization pack {}", node.name());
                staged(node.name(), BuildStage::Install, self.install_customization(node, *target))?;
                Ok(false)
            }
            StepAction::InjectCustomizations { customizations } => {
                info!("Bundling the standard library pack {}", node.name());
                let root = staged(node.name(), BuildStage::Install, self.materialize(node))?;
                staged(node.name(), BuildStage::Inject, self.inject(node, &root, customizations))?;
                self.compile(node, &root)
            }
            StepAction::Compile => {
                info!("Recompiling the pack {}", node.name());
                let root = staged(node.name(), BuildStage::Install, self.materialize(node))?;
                staged(node.name(), BuildStage::Prepare, self.link_customization_targets(node, &root))?;
                self.compile(node, &root)
            }
            StepAction::Install => {
                info!("Bundling the library pack {}", node.name());
                staged(node.name(), BuildStage::Install, self.materialize(node))?;
                Ok(false)
            }
        }
    }

    /// Where a pack lives inside the scratch bundle after its step
    pub fn bundle_root(&self, node: &PackNode) -> PathBuf {
        match node.origin {
            PackOrigin::Bundle => node.descriptor.root.clone(),
            PackOrigin::Workspace => node.descriptor.bundle_location(&self.qlpacks),
        }
    }

    /// Copy a workspace pack into the bundle, replacing any bundled copy
    fn materialize(&self, node: &PackNode) -> BundleResult<PathBuf> {
        let destination = self.bundle_root(node);
        if node.origin == PackOrigin::Bundle {
            return Ok(destination);
        }
        if let Some(shadowed) = &node.shadowed {
            debug!(
                "Removing bundled {} at {} in preparation for replacement",
                node.name(),
                shadowed.root.display()
            );
            fsutil::remove_dir_if_exists(&shadowed.root)?;
        }
        fsutil::remove_dir_if_exists(&destination)?;
        debug!(
            "Copying {} to {}",
            node.descriptor.root.display(),
            destination.display()
        );
        fsutil::copy_tree(&node.descriptor.root, &destination, is_compilation_state)?;
        Ok(destination)
    }

    fn manifest_at(&self, node: &PackNode, root: &Path) -> PathBuf {
        node.descriptor.relocated(root).manifest_path
    }

    fn install_customization(&self, node: &PackNode, target: usize) -> BundleResult<()> {
        let root = self.materialize(node)?;
        let manifest_path = self.manifest_at(node, &root);
        let mut manifest = PackManifest::from_file(&manifest_path)?;
        let target_name = self.graph.node(target).name();
        debug!("Removing dependency {} from {}", target_name, node.name());
        manifest.remove_dependency(target_name);
        manifest.write_to_file(&manifest_path)
    }

    fn inject(&self, node: &PackNode, root: &Path, customizations: &[usize]) -> BundleResult<()> {
        let manifest_path = self.manifest_at(node, root);
        let mut manifest = PackManifest::from_file(&manifest_path)?;
        for &idx in customizations {
            let custom = &self.graph.node(idx).descriptor;
            debug!("Adding dependency {} to {}", custom.name, node.name());
            manifest.set_dependency(&custom.name, &custom.version);
        }
        manifest.write_to_file(&manifest_path)?;

        let module = root.join(CUSTOMIZATIONS_MODULE);
        if !module.is_file() {
            add_customization_support(node.name(), root)?;
        }

        let mut contents = fs::read_to_string(&module)
            .map_err(|e| BundleError::io(format!("reading {}", module.display()), e))?;
        for &idx in customizations {
            if !contents.is_empty() && !contents.ends_with('\n') {
                contents.push('\n');
            }
            let import = format!("import {}.Customizations\n", self.graph.node(idx).name().module_name());
            contents.push_str(&import);
        }
        fs::write(&module, contents).map_err(|e| BundleError::io(format!("writing {}", module.display()), e))
    }

    /// Workspace query packs built against a customization pack also need the
    /// standard pack it customizes
    fn link_customization_targets(&self, node: &PackNode, root: &Path) -> BundleResult<()> {
        if node.origin != PackOrigin::Workspace || node.kind != PackKind::Query {
            return Ok(());
        }
        let targets: Vec<&PackageDescriptor> = node
            .descriptor
            .dependencies
            .keys()
            .filter_map(|dep| self.graph.index_of(dep))
            .filter_map(|idx| self.graph.customization_target(idx))
            .map(|target| &self.graph.node(target).descriptor)
            .filter(|target| !node.descriptor.dependencies.contains_key(&target.name))
            .collect();
        if targets.is_empty() {
            return Ok(());
        }

        let manifest_path = self.manifest_at(node, root);
        let mut manifest = PackManifest::from_file(&manifest_path)?;
        for target in targets {
            debug!("Adding dependency {} to {}", target.name, node.name());
            manifest.set_dependency(&target.name, &target.version);
        }
        manifest.write_to_file(&manifest_path)
    }

    fn compile(&self, node: &PackNode, root: &Path) -> BundleResult<bool> {
        staged(node.name(), BuildStage::Prepare, clear_compilation_state(root))?;
        let Some(compiler) = self.compiler else {
            debug!("Precompilation disabled, not compiling {}", node.name());
            return Ok(false);
        };
        let request = CompileRequest {
            name: node.name().clone(),
            root: root.to_path_buf(),
            library: node.is_library(),
            search_path: self.qlpacks.clone(),
        };
        compiler
            .compile(&request)
            .map_err(|message| BundleError::CompilationFailure {
                package: node.name().clone(),
                stage: BuildStage::Compile,
                message,
            })?;
        Ok(true)
    }
}

/// Attach the stage to errors that do not already name a pack
fn staged<T>(package: &PackageName, stage: BuildStage, result: BundleResult<T>) -> BundleResult<T> {
    result.map_err(|e| match e {
        BundleError::Injection { .. } | BundleError::CompilationFailure { .. } => e,
        other => BundleError::CompilationFailure {
            package: package.clone(),
            stage,
            message: other.to_string(),
        },
    })
}

/// Top-level entries produced by pack installation and compilation
fn is_compilation_state(relative: &Path) -> bool {
    relative == Path::new(".codeql")
        || relative == Path::new(".cache")
        || relative == Path::new(LOCK_FILE_NAME)
}

/// Remove the lock file, vendored dependencies, the query cache and `.qlx` files
pub fn clear_compilation_state(root: &Path) -> BundleResult<()> {
    fsutil::remove_file_if_exists(&root.join(LOCK_FILE_NAME))?;
    fsutil::remove_dir_if_exists(&root.join(".codeql"))?;
    fsutil::remove_dir_if_exists(&root.join(".cache"))?;

    let qlx: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| entry.path().extension().is_some_and(|ext| ext == "qlx"))
        .map(|entry| entry.into_path())
        .collect();
    for path in qlx {
        fsutil::remove_file_if_exists(&path)?;
    }
    Ok(())
}

/// Give a `<lang>-all` pack a root `Customizations` module imported by `<lang>.qll`
pub fn add_customization_support(name: &PackageName, root: &Path) -> BundleResult<()> {
    let injection_error = |reason: String| BundleError::Injection {
        package: name.clone(),
        reason,
    };
    let language = name.name().strip_suffix("-all").ok_or_else(|| {
        injection_error("it has no 'Customizations' module and is not a '<language>-all' pack".to_string())
    })?;
    let library = root.join(format!("{}.qll", language));
    if !library.is_file() {
        return Err(injection_error(format!(
            "it has no 'Customizations' module and no language module {}.qll",
            language
        )));
    }
    debug!("Adding a 'Customizations' module to {}", name);

    let source = fs::read_to_string(&library)
        .map_err(|e| BundleError::io(format!("reading {}", library.display()), e))?;
    let mut lines: Vec<&str> = source.split_inclusive('\n').collect();
    let first_import = lines
        .iter()
        .position(|line| line.starts_with("import"))
        .ok_or_else(|| injection_error(format!("{}.qll has no import statement", language)))?;
    lines.insert(first_import, "import Customizations\n");
    fs::write(&library, lines.concat())
        .map_err(|e| BundleError::io(format!("writing {}", library.display()), e))?;

    let module = root.join(CUSTOMIZATIONS_MODULE);
    fs::write(&module, format!("import {}\n", language))
        .map_err(|e| BundleError::io(format!("writing {}", module.display()), e))
}
