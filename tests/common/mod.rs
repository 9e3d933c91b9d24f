//! Shared fixtures for the integration tests
#![allow(dead_code)]

use codeql_bundle::build::{CompileRequest, PackCompiler};
use codeql_bundle::bundle::{ArchiveCodec, PlatformFilter, TarGzCodec};
use codeql_bundle::package::PackageName;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

pub const CPP_LIBRARY: &str = "/** Provides classes for working with C/C++ code. */\n\nimport semmle.code.cpp.Element\nimport semmle.code.cpp.File\n";

/// Write a manifest for `name` into `dir`
pub fn write_pack(dir: &Path, name: &str, version: &str, library: bool, deps: &[(&str, &str)]) -> PathBuf {
    fs::create_dir_all(dir).unwrap();
    let mut yaml = format!("name: {}\nversion: {}\n", name, version);
    if library {
        yaml.push_str("library: true\n");
    }
    if !deps.is_empty() {
        yaml.push_str("dependencies:\n");
        for (dep, version) in deps {
            yaml.push_str(&format!("  {}: \"{}\"\n", dep, version));
        }
    }
    yaml.push_str("extractor: cpp\n");
    fs::write(dir.join("qlpack.yml"), yaml).unwrap();
    dir.to_path_buf()
}

/// Add `<scope_>/<name_>/Customizations.qll` to a pack
pub fn write_customizations_module(pack_root: &Path, name: &str) {
    let name: PackageName = name.parse().unwrap();
    let module = pack_root.join(name.customizations_module_path());
    fs::create_dir_all(module.parent().unwrap()).unwrap();
    fs::write(module, "import cpp\n\nclass MySource extends Expr { }\n").unwrap();
}

/// An extracted bundle with tooling for every platform and no packs
pub fn empty_bundle(root: &Path) -> PathBuf {
    let bundle = root.join("codeql");
    for platform in ["linux64", "osx64", "win64"] {
        let tools = bundle.join("tools").join(platform);
        fs::create_dir_all(&tools).unwrap();
        fs::write(tools.join("codeql-tool"), platform).unwrap();
        let extractor = bundle.join("cpp").join("tools").join(platform);
        fs::create_dir_all(&extractor).unwrap();
        fs::write(extractor.join("extractor"), platform).unwrap();
    }
    fs::create_dir_all(bundle.join("qlpacks")).unwrap();
    fs::write(bundle.join("codeql"), "#!/bin/sh\n").unwrap();
    fs::write(bundle.join("codeql.exe"), "MZ").unwrap();
    bundle
}

/// Pack root for `scope/name` at `version` inside a bundle
pub fn bundle_pack_dir(bundle: &Path, name: &str, version: &str) -> PathBuf {
    let (scope, pack) = name.split_once('/').unwrap();
    bundle.join("qlpacks").join(scope).join(pack).join(version)
}

/// Bundle with `codeql/cpp-all`, an already compiled `acme/cpp-queries` and
/// an unrelated `codeql/java-all`/`codeql/java-queries` pair
pub fn cpp_bundle(root: &Path) -> PathBuf {
    let bundle = empty_bundle(root);

    let cpp_all = write_pack(&bundle_pack_dir(&bundle, "codeql/cpp-all", "1.0.0"), "codeql/cpp-all", "1.0.0", true, &[]);
    fs::write(cpp_all.join("cpp.qll"), CPP_LIBRARY).unwrap();

    let queries = write_pack(
        &bundle_pack_dir(&bundle, "acme/cpp-queries", "1.0.0"),
        "acme/cpp-queries",
        "1.0.0",
        false,
        &[("codeql/cpp-all", "1.0.0")],
    );
    fs::write(queries.join("Query.ql"), "import cpp\nselect 1\n").unwrap();
    fs::write(queries.join("Query.qlx"), "compiled").unwrap();
    fs::write(queries.join("codeql-pack.lock.yml"), "lockVersion: 1.0.0\n").unwrap();
    fs::create_dir_all(queries.join(".codeql").join("libraries")).unwrap();
    fs::write(queries.join(".codeql").join("libraries").join("stale"), "stale").unwrap();

    let java_all = write_pack(&bundle_pack_dir(&bundle, "codeql/java-all", "2.0.0"), "codeql/java-all", "2.0.0", true, &[]);
    fs::write(java_all.join("java.qll"), "import semmle.code.java.Element\n").unwrap();
    fs::write(java_all.join("Customizations.qll"), "import java\n").unwrap();
    let java_queries = write_pack(
        &bundle_pack_dir(&bundle, "codeql/java-queries", "2.0.0"),
        "codeql/java-queries",
        "2.0.0",
        false,
        &[("codeql/java-all", "2.0.0")],
    );
    fs::write(java_queries.join("Query.qlx"), "compiled").unwrap();

    bundle
}

/// Workspace holding a `foo/cpp-customizations` pack for `codeql/cpp-all`
pub fn customization_workspace(root: &Path) -> PathBuf {
    let workspace = root.join("workspace");
    fs::create_dir_all(&workspace).unwrap();
    fs::write(
        workspace.join("codeql-workspace.yml"),
        "provide:\n  - \"**/qlpack.yml\"\n",
    )
    .unwrap();
    let pack = write_pack(
        &workspace.join("cpp-customizations"),
        "foo/cpp-customizations",
        "0.1.0",
        true,
        &[("codeql/cpp-all", "*")],
    );
    write_customizations_module(&pack, "foo/cpp-customizations");
    workspace
}

/// Pack a bundle directory into a `.tar.gz` using the crate's own codec
pub fn archive_bundle(bundle: &Path, archive: &Path) -> PathBuf {
    TarGzCodec.create(bundle, &PlatformFilter::all(), archive).unwrap();
    archive.to_path_buf()
}

/// Compiler double that records requests and can fail for one pack
#[derive(Default)]
pub struct RecordingCompiler {
    pub calls: Mutex<Vec<CompileRequest>>,
    pub fail_on: Option<PackageName>,
    /// Whether stale compilation state was gone when each call happened
    pub clean_roots: Mutex<Vec<bool>>,
}

impl RecordingCompiler {
    pub fn failing_on(name: &str) -> Self {
        RecordingCompiler {
            fail_on: Some(name.parse().unwrap()),
            ..Default::default()
        }
    }

    pub fn compiled(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|request| request.name.to_string())
            .collect()
    }
}

impl PackCompiler for RecordingCompiler {
    fn compile(&self, request: &CompileRequest) -> Result<(), String> {
        let root = &request.root;
        let clean = !root.join("codeql-pack.lock.yml").exists()
            && !root.join(".codeql").exists()
            && !root.join("Query.qlx").exists();
        self.clean_roots.lock().unwrap().push(clean);
        self.calls.lock().unwrap().push(request.clone());
        if self.fail_on.as_ref() == Some(&request.name) {
            return Err(format!("ERROR: could not compile {}", request.name));
        }
        Ok(())
    }
}

/// Every file under `root` with its contents, relative paths sorted
pub fn snapshot(root: &Path) -> Vec<(PathBuf, Vec<u8>)> {
    let mut files: Vec<(PathBuf, Vec<u8>)> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| {
            (
                entry.path().strip_prefix(root).unwrap().to_path_buf(),
                fs::read(entry.path()).unwrap(),
            )
        })
        .collect();
    files.sort();
    files
}

/// Entry names of a `.tar.gz` archive
pub fn archive_entries(archive: &Path) -> Vec<String> {
    let file = fs::File::open(archive).unwrap();
    let mut reader = tar::Archive::new(flate2::read::GzDecoder::new(file));
    reader
        .entries()
        .unwrap()
        .map(|entry| {
            entry
                .unwrap()
                .path()
                .unwrap()
                .to_string_lossy()
                .trim_end_matches('/')
                .to_string()
        })
        .collect()
}
