//! Integration tests for recompilation planning

mod common;

use codeql_bundle::graph::DependencyGraph;
use codeql_bundle::package::{scan_directory, PackageName, WorkspaceScanner};
use codeql_bundle::plan::{BuildPlan, StepAction};
use codeql_bundle::BundleError;
use common::*;
use quickcheck_macros::quickcheck;
use std::path::Path;
use tempfile::TempDir;

fn name(s: &str) -> PackageName {
    s.parse().unwrap()
}

fn graph_for(workspace: &Path, bundle: &Path) -> DependencyGraph {
    let workspace = WorkspaceScanner::new(workspace).unwrap().scan().unwrap();
    let bundle = scan_directory(&bundle.join("qlpacks"), None).unwrap();
    DependencyGraph::build(&workspace, &bundle).unwrap()
}

fn order(plan: &BuildPlan) -> Vec<String> {
    plan.order().iter().map(|n| n.to_string()).collect()
}

#[test]
fn test_customization_plan() {
    let temp_dir = TempDir::new().unwrap();
    let bundle = empty_bundle(temp_dir.path());
    write_pack(&bundle_pack_dir(&bundle, "codeql/cpp-all", "1.0.0"), "codeql/cpp-all", "1.0.0", true, &[]);
    write_pack(
        &bundle_pack_dir(&bundle, "acme/cpp-queries", "1.0.0"),
        "acme/cpp-queries",
        "1.0.0",
        false,
        &[("codeql/cpp-all", "1.0.0")],
    );
    let workspace = customization_workspace(temp_dir.path());
    let graph = graph_for(&workspace, &bundle);

    let plan = BuildPlan::new(&graph, &[name("foo/cpp-customizations")]).unwrap();
    assert_eq!(
        order(&plan),
        vec!["foo/cpp-customizations", "codeql/cpp-all", "acme/cpp-queries"]
    );

    let steps = plan.steps();
    let cpp_all = graph.index_of(&name("codeql/cpp-all")).unwrap();
    let custom = graph.index_of(&name("foo/cpp-customizations")).unwrap();
    assert_eq!(steps[0].action, StepAction::InstallCustomization { target: cpp_all });
    assert_eq!(
        steps[1].action,
        StepAction::InjectCustomizations {
            customizations: vec![custom]
        }
    );
    assert_eq!(steps[1].waits_on, vec![0]);
    assert_eq!(steps[2].action, StepAction::Compile);
    assert_eq!(steps[2].waits_on, vec![1]);
}

#[test]
fn test_unaffected_packs_are_not_planned() {
    let temp_dir = TempDir::new().unwrap();
    let bundle = cpp_bundle(temp_dir.path());
    let workspace = customization_workspace(temp_dir.path());
    let graph = graph_for(&workspace, &bundle);

    let plan = BuildPlan::new(&graph, &[name("foo/cpp-customizations")]).unwrap();
    assert!(plan.position(&name("codeql/java-all")).is_none());
    assert!(plan.position(&name("codeql/java-queries")).is_none());
    assert_eq!(plan.len(), 3);
}

#[test]
fn test_transitive_dependents_are_recompiled() {
    let temp_dir = TempDir::new().unwrap();
    let bundle = cpp_bundle(temp_dir.path());
    write_pack(
        &bundle_pack_dir(&bundle, "codeql/cpp-ext", "1.0.0"),
        "codeql/cpp-ext",
        "1.0.0",
        true,
        &[("codeql/cpp-all", "1.0.0")],
    );
    write_pack(
        &bundle_pack_dir(&bundle, "codeql/cpp-ext-queries", "1.0.0"),
        "codeql/cpp-ext-queries",
        "1.0.0",
        false,
        &[("codeql/cpp-ext", "1.0.0")],
    );
    let workspace = customization_workspace(temp_dir.path());
    // Workspace packs are never pulled in implicitly
    write_pack(&workspace.join("q"), "foo/cpp-queries", "0.1.0", false, &[("codeql/cpp-all", "*")]);
    let graph = graph_for(&workspace, &bundle);

    let plan = BuildPlan::new(&graph, &[name("foo/cpp-customizations")]).unwrap();
    assert_eq!(
        order(&plan),
        vec![
            "foo/cpp-customizations",
            "codeql/cpp-all",
            "acme/cpp-queries",
            "codeql/cpp-ext",
            "codeql/cpp-ext-queries",
        ]
    );
}

#[test]
fn test_several_customizations_of_one_target() {
    let temp_dir = TempDir::new().unwrap();
    let bundle = cpp_bundle(temp_dir.path());
    let workspace = customization_workspace(temp_dir.path());
    let other = write_pack(&workspace.join("bar"), "bar/cpp-customizations", "0.2.0", true, &[("codeql/cpp-all", "*")]);
    write_customizations_module(&other, "bar/cpp-customizations");
    let graph = graph_for(&workspace, &bundle);

    let plan = BuildPlan::new(
        &graph,
        &[name("foo/cpp-customizations"), name("bar/cpp-customizations")],
    )
    .unwrap();
    assert_eq!(
        order(&plan),
        vec![
            "bar/cpp-customizations",
            "foo/cpp-customizations",
            "codeql/cpp-all",
            "acme/cpp-queries",
        ]
    );
    assert_eq!(plan.steps()[2].waits_on, vec![0, 1]);
}

#[test]
fn test_requested_workspace_packs() {
    let temp_dir = TempDir::new().unwrap();
    let bundle = cpp_bundle(temp_dir.path());
    let workspace = customization_workspace(temp_dir.path());
    write_pack(&workspace.join("lib"), "foo/cpp-lib", "0.1.0", true, &[("codeql/cpp-all", "*")]);
    write_pack(
        &workspace.join("queries"),
        "foo/cpp-queries",
        "0.1.0",
        false,
        &[("foo/cpp-customizations", "*"), ("foo/cpp-lib", "*")],
    );
    let graph = graph_for(&workspace, &bundle);

    let plan = BuildPlan::new(
        &graph,
        &[
            name("foo/cpp-queries"),
            name("foo/cpp-lib"),
            name("foo/cpp-customizations"),
        ],
    )
    .unwrap();
    let names = order(&plan);
    let pos = |n: &str| names.iter().position(|x| x == n).unwrap();
    assert!(pos("foo/cpp-customizations") < pos("codeql/cpp-all"));
    assert!(pos("codeql/cpp-all") < pos("foo/cpp-lib"));
    assert!(pos("foo/cpp-lib") < pos("foo/cpp-queries"));
    assert_eq!(plan.steps()[pos("foo/cpp-lib")].action, StepAction::Install);
    assert_eq!(plan.steps()[pos("foo/cpp-queries")].action, StepAction::Compile);
}

#[test]
fn test_cycle_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let bundle = empty_bundle(temp_dir.path());
    write_pack(&bundle_pack_dir(&bundle, "codeql/cpp-all", "1.0.0"), "codeql/cpp-all", "1.0.0", true, &[]);
    write_pack(
        &bundle_pack_dir(&bundle, "codeql/a", "1.0.0"),
        "codeql/a",
        "1.0.0",
        true,
        &[("codeql/cpp-all", "*"), ("codeql/b", "*")],
    );
    write_pack(&bundle_pack_dir(&bundle, "codeql/b", "1.0.0"), "codeql/b", "1.0.0", true, &[("codeql/a", "*")]);
    let workspace = customization_workspace(temp_dir.path());
    let graph = graph_for(&workspace, &bundle);

    let err = BuildPlan::new(&graph, &[name("foo/cpp-customizations")]).unwrap_err();
    assert_eq!(err.kind(), "CyclicDependencyError");
    match err {
        BundleError::CyclicDependency { cycle } => {
            let mut members: Vec<String> = cycle.iter().map(|n| n.to_string()).collect();
            members.sort();
            assert_eq!(members, vec!["codeql/a", "codeql/b"]);
        }
        other => panic!("unexpected error: {}", other),
    }
}

/// Random bundles of library packs where pack `i` may depend on any pack `j < i`
#[quickcheck]
fn prop_plan_is_topological(edges: Vec<(u8, u8)>) -> bool {
    let temp_dir = TempDir::new().unwrap();
    let bundle = empty_bundle(temp_dir.path());
    let count = 8u8;
    let mut deps: Vec<Vec<String>> = vec![Vec::new(); count as usize];
    for (a, b) in edges {
        let (a, b) = (a % count, b % count);
        if b < a {
            let dep = format!("codeql/p{}", b);
            if !deps[a as usize].contains(&dep) {
                deps[a as usize].push(dep);
            }
        }
    }
    // Pack 0 is the customization target
    for (i, pack_deps) in deps.iter().enumerate() {
        let pack = format!("codeql/p{}", i);
        let pairs: Vec<(&str, &str)> = pack_deps.iter().map(|d| (d.as_str(), "*")).collect();
        write_pack(&bundle_pack_dir(&bundle, &pack, "1.0.0"), &pack, "1.0.0", i % 2 == 0, &pairs);
    }
    let workspace = temp_dir.path().join("workspace");
    let custom = write_pack(&workspace.join("custom"), "foo/p0-customizations", "0.1.0", true, &[("codeql/p0", "*")]);
    write_customizations_module(&custom, "foo/p0-customizations");
    let graph = graph_for(&workspace, &bundle);

    let plan = BuildPlan::new(&graph, &[name("foo/p0-customizations")]).unwrap();
    let steps = plan.steps();
    steps.iter().enumerate().all(|(pos, step)| {
        let in_order = graph.dependencies(step.node).iter().all(|dep| {
            steps
                .iter()
                .position(|s| s.node == *dep)
                .map_or(true, |dep_pos| step.node == steps[0].node || dep_pos < pos)
        });
        let waits_earlier = step.waits_on.iter().all(|&w| w < pos);
        in_order && waits_earlier
    }) && steps[0].name == name("foo/p0-customizations")
        && steps[1].name == name("codeql/p0")
}
