//! Recompilation planning
//!
//! This module provides functionality for:
//! - Computing the set of packs affected by the requested customizations
//! - Ordering that set so every pack follows its in-plan dependencies
//! - Placing each customization pack right before the pack it customizes
//! - Reporting a witness cycle when no such order exists

use crate::error::{BundleError, BundleResult};
use crate::graph::{DependencyGraph, PackKind, PackOrigin};
use crate::package::PackageName;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// What the orchestrator does for one step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    /// Copy a customization pack into the bundle and drop its target edge
    InstallCustomization { target: usize },
    /// Wire customization packs into their standard pack, then compile it
    InjectCustomizations { customizations: Vec<usize> },
    /// Recompile a pack whose dependencies changed
    Compile,
    /// Copy a workspace library pack into the bundle
    Install,
}

/// One step of a build plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanStep {
    /// Graph node index
    pub node: usize,
    pub name: PackageName,
    pub action: StepAction,
    /// Indices of earlier plan steps that must finish first
    pub waits_on: Vec<usize>,
}

/// Immutable ordered list of steps
#[derive(Debug, Clone, Default)]
pub struct BuildPlan {
    steps: Vec<PlanStep>,
}

impl BuildPlan {
    /// Plan the recompilation needed to ship `requested` inside the bundle
    pub fn new(graph: &DependencyGraph, requested: &[PackageName]) -> BundleResult<Self> {
        let mut missing = Vec::new();
        let mut requested_nodes = BTreeSet::new();
        for name in requested {
            match graph.index_of(name) {
                Some(idx) => {
                    requested_nodes.insert(idx);
                }
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(BundleError::UnresolvedTarget {
                names: missing,
                details: Vec::new(),
            });
        }

        // Customizations grouped by target; BTreeSet keeps them in name order.
        let mut customizations: BTreeMap<usize, BTreeSet<usize>> = BTreeMap::new();
        let mut standalone = BTreeSet::new();
        for &idx in &requested_nodes {
            match graph.node(idx).kind {
                PackKind::Customization { target } => {
                    customizations.entry(target).or_default().insert(idx);
                }
                _ => {
                    standalone.insert(idx);
                }
            }
        }

        let affected = affected_set(graph, customizations.keys().copied(), &standalone);
        debug!("{} pack(s) affected by the requested packs", affected.len());

        let order = topological_order(graph, &affected)?;

        let mut steps: Vec<PlanStep> = Vec::new();
        let mut position: BTreeMap<usize, usize> = BTreeMap::new();
        for idx in order {
            let node = graph.node(idx);
            let action = if let Some(custom) = customizations.get(&idx) {
                for &custom_idx in custom {
                    position.insert(custom_idx, steps.len());
                    steps.push(PlanStep {
                        node: custom_idx,
                        name: graph.node(custom_idx).name().clone(),
                        action: StepAction::InstallCustomization { target: idx },
                        waits_on: Vec::new(),
                    });
                }
                StepAction::InjectCustomizations {
                    customizations: custom.iter().copied().collect(),
                }
            } else if node.origin == PackOrigin::Workspace
                && node.is_library()
                && standalone.contains(&idx)
                && node.shadowed.is_none()
            {
                StepAction::Install
            } else {
                StepAction::Compile
            };

            let mut waits = BTreeSet::new();
            for dep in effective_dependencies(graph, idx) {
                if let Some(&pos) = position.get(&dep) {
                    waits.insert(pos);
                }
            }
            if let StepAction::InjectCustomizations { customizations } = &action {
                waits.extend(customizations.iter().filter_map(|c| position.get(c).copied()));
            }

            position.insert(idx, steps.len());
            steps.push(PlanStep {
                node: idx,
                name: node.name().clone(),
                action,
                waits_on: waits.into_iter().collect(),
            });
        }

        Ok(BuildPlan { steps })
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Package names in plan order
    pub fn order(&self) -> Vec<&PackageName> {
        self.steps.iter().map(|step| &step.name).collect()
    }

    pub fn position(&self, name: &PackageName) -> Option<usize> {
        self.steps.iter().position(|step| &step.name == name)
    }
}

/// Targets, every bundle pack reachable from them through reverse edges, and
/// the explicitly requested non-customization packs
fn affected_set(
    graph: &DependencyGraph,
    targets: impl Iterator<Item = usize>,
    standalone: &BTreeSet<usize>,
) -> BTreeSet<usize> {
    let mut affected: BTreeSet<usize> = BTreeSet::new();
    let mut stack: Vec<usize> = targets.collect();
    while let Some(idx) = stack.pop() {
        if !affected.insert(idx) {
            continue;
        }
        for &dependent in graph.dependents(idx) {
            let node = graph.node(dependent);
            if !node.is_customization() && node.in_bundle() && !affected.contains(&dependent) {
                stack.push(dependent);
            }
        }
    }
    affected.extend(standalone.iter().copied());
    affected
}

/// Dependencies a pack has once the plan is applied.
///
/// A pack depending on a customization pack is placed after that pack's
/// target, since the customization is emitted right before the target.
fn effective_dependencies(graph: &DependencyGraph, idx: usize) -> Vec<usize> {
    if graph.node(idx).is_customization() {
        return Vec::new();
    }
    let mut deps = Vec::new();
    for &dep in graph.dependencies(idx) {
        deps.push(dep);
        if let Some(target) = graph.customization_target(dep) {
            if target != idx {
                deps.push(target);
            }
        }
    }
    deps
}

/// Kahn's algorithm over `affected`, breaking ties by ascending name
fn topological_order(graph: &DependencyGraph, affected: &BTreeSet<usize>) -> BundleResult<Vec<usize>> {
    let mut in_degree: BTreeMap<usize, usize> = affected.iter().map(|&idx| (idx, 0)).collect();
    let mut dependents: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
    for &idx in affected {
        let deps: BTreeSet<usize> = effective_dependencies(graph, idx)
            .into_iter()
            .filter(|dep| affected.contains(dep))
            .collect();
        for dep in deps {
            *in_degree.entry(idx).or_insert(0) += 1;
            dependents.entry(dep).or_default().push(idx);
        }
    }

    // Node indices follow name order, so the smallest index is the smallest name.
    let mut ready: BTreeSet<usize> = in_degree
        .iter()
        .filter(|(_, &degree)| degree == 0)
        .map(|(&idx, _)| idx)
        .collect();
    let mut order = Vec::with_capacity(affected.len());

    while let Some(idx) = ready.pop_first() {
        order.push(idx);
        if let Some(next) = dependents.get(&idx) {
            for &dependent in next {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert(dependent);
                    }
                }
            }
        }
    }

    if order.len() == affected.len() {
        return Ok(order);
    }

    let remaining: BTreeSet<usize> = in_degree
        .into_iter()
        .filter(|(_, degree)| *degree > 0)
        .map(|(idx, _)| idx)
        .collect();
    Err(BundleError::CyclicDependency {
        cycle: find_cycle(graph, &remaining)
            .into_iter()
            .map(|idx| graph.node(idx).name().clone())
            .collect(),
    })
}

/// Walk dependency edges inside `remaining` until a node repeats.
///
/// Every node left over by Kahn's algorithm has a predecessor that is also
/// left over, so the walk always closes a cycle.
fn find_cycle(graph: &DependencyGraph, remaining: &BTreeSet<usize>) -> Vec<usize> {
    let Some(&start) = remaining.first() else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut seen: BTreeMap<usize, usize> = BTreeMap::from([(start, 0)]);
    let mut current = start;
    loop {
        let next = effective_dependencies(graph, current)
            .into_iter()
            .filter(|dep| remaining.contains(dep))
            .min();
        let Some(next) = next else {
            return path;
        };
        if let Some(&pos) = seen.get(&next) {
            return path.split_off(pos);
        }
        seen.insert(next, path.len());
        path.push(next);
        current = next;
    }
}
