//! Integration tests for the codeql-bundle CLI
//!
//! Tests argument parsing and how settings from the settings file, the
//! environment and command-line flags are combined.

use clap::Parser;
use codeql_bundle::bundle::BundlePlatform;
use codeql_bundle::cli::{Cli, CliContext, LogLevel};
use codeql_bundle::settings::{BundlerSettings, JOBS_ENV, KEEP_SCRATCH_ENV, SETTINGS_FILE_NAME};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn parse(args: &[&str]) -> Cli {
    let mut argv = vec!["codeql-bundle"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

fn no_env(_: &str) -> Option<String> {
    None
}

#[test]
fn test_cli_context() {
    let context = CliContext::new(true, false);

    context.verbose("This is a verbose message");
    context.info("This is an info message");
    context.success("This is a success message");
    context.warn("This is a warning message");
    context.error("This is an error message");
    assert!(context.progress_bar("Bundling").is_some());

    let quiet = CliContext::new(true, true);
    assert!(quiet.progress_bar("Bundling").is_none());
    assert!(CliContext::new(false, false).progress_bar("Bundling").is_none());
}

#[test]
fn test_parse_minimal_arguments() {
    let cli = parse(&["-b", "codeql-bundle.tar.gz", "-o", "out", "foo/cpp-customizations"]);
    assert_eq!(cli.bundle, PathBuf::from("codeql-bundle.tar.gz"));
    assert_eq!(cli.output, PathBuf::from("out"));
    assert_eq!(cli.workspace, PathBuf::from("."));
    assert_eq!(cli.log, LogLevel::Warning);
    assert!(cli.platforms.is_empty());
    assert!(!cli.no_precompile);
    assert_eq!(cli.packs.len(), 1);
    assert_eq!(cli.packs[0].to_string(), "foo/cpp-customizations");
}

#[test]
fn test_parse_full_arguments() {
    let cli = parse(&[
        "--bundle",
        "base.tar.gz",
        "--output",
        "bundles",
        "--workspace",
        "ws/codeql-workspace.yml",
        "-p",
        "linux64",
        "--platform",
        "WIN64",
        "--log",
        "DEBUG",
        "--no-precompile",
        "-c",
        "config.yml",
        "-j",
        "3",
        "--keep-scratch",
        "foo/cpp-customizations",
        "foo/cpp-queries",
    ]);
    assert_eq!(cli.platforms, vec![BundlePlatform::Linux64, BundlePlatform::Win64]);
    assert_eq!(cli.log, LogLevel::Debug);
    assert!(cli.no_precompile);
    assert!(cli.keep_scratch);
    assert_eq!(cli.jobs, Some(3));
    assert_eq!(cli.code_scanning_config, Some(PathBuf::from("config.yml")));

    let request = cli.request();
    assert_eq!(request.packs.len(), 2);
    assert_eq!(request.workspace, PathBuf::from("ws/codeql-workspace.yml"));
    assert_eq!(request.platforms, cli.platforms);
}

#[test]
fn test_rejects_invalid_arguments() {
    // No packs
    assert!(Cli::try_parse_from(["codeql-bundle", "-b", "b", "-o", "o"]).is_err());
    // Unscoped pack name
    assert!(Cli::try_parse_from(["codeql-bundle", "-b", "b", "-o", "o", "cpp-all"]).is_err());
    // Unknown platform
    assert!(Cli::try_parse_from(["codeql-bundle", "-b", "b", "-o", "o", "-p", "arm64", "a/b"]).is_err());
    // Missing bundle
    assert!(Cli::try_parse_from(["codeql-bundle", "-o", "o", "a/b"]).is_err());
}

#[test]
fn test_log_level_directives() {
    assert_eq!(LogLevel::Debug.directive(), "debug");
    assert_eq!(LogLevel::Info.directive(), "info");
    assert_eq!(LogLevel::Warning.directive(), "warn");
    assert_eq!(LogLevel::Error.directive(), "error");
    assert_eq!(LogLevel::Critical.directive(), "error");
}

fn workspace_with_settings(content: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let workspace = temp_dir.path().join("ws");
    fs::create_dir_all(&workspace).unwrap();
    fs::write(workspace.join(SETTINGS_FILE_NAME), content).unwrap();
    (temp_dir, workspace)
}

fn args_for(workspace: &Path, extra: &[&str]) -> Cli {
    let workspace = workspace.to_str().unwrap();
    let mut args = vec!["-b", "b.tar.gz", "-o", "o", "-w", workspace];
    args.extend_from_slice(extra);
    args.push("foo/cpp-customizations");
    parse(&args)
}

#[test]
fn test_settings_defaults_without_file() {
    let temp_dir = TempDir::new().unwrap();
    let cli = args_for(temp_dir.path(), &[]);

    let settings = cli.resolve_settings(no_env).unwrap();
    assert_eq!(settings, BundlerSettings::default());
    assert!(settings.precompile);
    assert!(settings.jobs >= 1);
}

#[test]
fn test_settings_file_is_discovered_in_workspace() {
    let (_temp_dir, workspace) = workspace_with_settings("jobs = 2\nprecompile = false\ncompiler_threads = 4\n");

    // The workspace file path resolves to its directory
    let cli = args_for(&workspace.join("codeql-workspace.yml"), &[]);
    let settings = cli.resolve_settings(no_env).unwrap();
    assert_eq!(settings.jobs, 2);
    assert!(!settings.precompile);
    assert_eq!(settings.compiler_threads, Some(4));
}

#[test]
fn test_environment_overrides_file_and_flags_override_environment() {
    let (_temp_dir, workspace) = workspace_with_settings("jobs = 2\n");
    let env: HashMap<&str, &str> = [(JOBS_ENV, "5"), (KEEP_SCRATCH_ENV, "yes")].into_iter().collect();
    let lookup = |key: &str| env.get(key).map(|value| value.to_string());

    let settings = args_for(&workspace, &[]).resolve_settings(lookup).unwrap();
    assert_eq!(settings.jobs, 5);
    assert!(settings.keep_scratch);

    let settings = args_for(&workspace, &["-j", "7", "--codeql", "/opt/codeql/codeql"])
        .resolve_settings(lookup)
        .unwrap();
    assert_eq!(settings.jobs, 7);
    assert_eq!(settings.codeql, Some(PathBuf::from("/opt/codeql/codeql")));
}

#[test]
fn test_explicit_settings_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("custom.toml");
    fs::write(&path, "keep_scratch = true\n").unwrap();

    let cli = args_for(temp_dir.path(), &["--config", path.to_str().unwrap()]);
    let settings = cli.resolve_settings(no_env).unwrap();
    assert!(settings.keep_scratch);
}

#[test]
fn test_invalid_settings_are_config_errors() {
    let (_temp_dir, workspace) = workspace_with_settings("jobs = 0\n");
    let err = args_for(&workspace, &[]).resolve_settings(no_env).unwrap_err();
    assert_eq!(err.kind(), "ConfigError");

    let (_temp_dir, workspace) = workspace_with_settings("unknown_key = 1\n");
    let err = args_for(&workspace, &[]).resolve_settings(no_env).unwrap_err();
    assert_eq!(err.kind(), "ConfigError");
    assert!(err.to_string().contains(SETTINGS_FILE_NAME));

    let temp_dir = TempDir::new().unwrap();
    let err = args_for(temp_dir.path(), &[])
        .resolve_settings(|key| (key == JOBS_ENV).then(|| "many".to_string()))
        .unwrap_err();
    assert_eq!(err.kind(), "ConfigError");

    // A zero from the command line is rejected too
    let err = args_for(temp_dir.path(), &["-j", "0"]).resolve_settings(no_env).unwrap_err();
    assert_eq!(err.kind(), "ConfigError");
}
