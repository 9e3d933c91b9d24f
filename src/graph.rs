//! Dependency graph over workspace and bundle packs
//!
//! Nodes live in an arena indexed by position; forward and reverse edges are
//! adjacency lists of those indices. Nodes are stored in ascending name order,
//! so index order doubles as the deterministic tie-break order.

use crate::error::{BundleError, BundleResult};
use crate::package::{PackageCatalog, PackageDescriptor, PackageName};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Where a pack was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackOrigin {
    Workspace,
    Bundle,
}

/// Classification assigned once during validation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackKind {
    /// Library pack extending exactly one standard pack (by node index)
    Customization { target: usize },
    /// Bundle library pack targeted by at least one customization pack
    Standard,
    /// Any other library pack
    Library,
    /// Non-library pack
    Query,
}

/// A pack in the graph
#[derive(Debug, Clone)]
pub struct PackNode {
    pub descriptor: PackageDescriptor,
    pub origin: PackOrigin,
    pub kind: PackKind,
    /// Bundle copy replaced by a same-named workspace pack
    pub shadowed: Option<PackageDescriptor>,
}

impl PackNode {
    pub fn name(&self) -> &PackageName {
        &self.descriptor.name
    }

    pub fn is_library(&self) -> bool {
        self.descriptor.library
    }

    pub fn is_customization(&self) -> bool {
        matches!(self.kind, PackKind::Customization { .. })
    }

    /// Whether the base bundle ships a pack of this name
    pub fn in_bundle(&self) -> bool {
        self.origin == PackOrigin::Bundle || self.shadowed.is_some()
    }
}

/// Validated, read-only dependency graph
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    nodes: Vec<PackNode>,
    index: BTreeMap<PackageName, usize>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// Merge workspace and bundle packs and validate the result.
    ///
    /// Workspace packs shadow bundle packs of the same name. Validation is
    /// all-or-nothing: any unresolved edge or malformed customization pack
    /// fails the whole build.
    pub fn build(workspace: &PackageCatalog, bundle: &PackageCatalog) -> BundleResult<Self> {
        let mut merged: BTreeMap<PackageName, PackNode> = BTreeMap::new();
        for descriptor in bundle.packages.values() {
            merged.insert(
                descriptor.name.clone(),
                PackNode {
                    descriptor: descriptor.clone(),
                    origin: PackOrigin::Bundle,
                    kind: PackKind::Query,
                    shadowed: None,
                },
            );
        }
        for descriptor in workspace.packages.values() {
            let shadowed = merged.remove(&descriptor.name).map(|node| node.descriptor);
            if let Some(bundled) = &shadowed {
                if bundled.dependencies.keys().ne(descriptor.dependencies.keys()) {
                    warn!(
                        "Workspace pack {} shadows the bundled pack at {} with a different dependency set",
                        descriptor.name,
                        bundled.root.display()
                    );
                } else {
                    debug!("Workspace pack {} shadows the bundled pack", descriptor.name);
                }
            }
            merged.insert(
                descriptor.name.clone(),
                PackNode {
                    descriptor: descriptor.clone(),
                    origin: PackOrigin::Workspace,
                    kind: PackKind::Query,
                    shadowed,
                },
            );
        }

        let index: BTreeMap<PackageName, usize> = merged
            .keys()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        let nodes: Vec<PackNode> = merged.into_values().collect();

        let mut graph = DependencyGraph {
            dependencies: vec![Vec::new(); nodes.len()],
            dependents: vec![Vec::new(); nodes.len()],
            nodes,
            index,
        };
        graph.resolve_edges()?;
        graph.classify()?;
        Ok(graph)
    }

    fn resolve_edges(&mut self) -> BundleResult<()> {
        for (idx, node) in self.nodes.iter().enumerate() {
            for dep in node.descriptor.dependencies.keys() {
                let target = *self.index.get(dep).ok_or_else(|| BundleError::UnresolvedDependency {
                    source_pack: node.name().clone(),
                    target: dep.clone(),
                })?;
                self.dependencies[idx].push(target);
                self.dependents[target].push(idx);
            }
        }
        Ok(())
    }

    fn classify(&mut self) -> BundleResult<()> {
        let has_module: Vec<bool> = self
            .nodes
            .iter()
            .map(|node| node.is_library() && node.descriptor.has_customizations_module())
            .collect();
        // Customizations already installed in the bundle were validated when
        // they were bundled and are treated as plain libraries
        let candidates: Vec<bool> = self
            .nodes
            .iter()
            .zip(&has_module)
            .map(|(node, &module)| module && node.origin == PackOrigin::Workspace)
            .collect();

        let mut kinds: Vec<PackKind> = self
            .nodes
            .iter()
            .map(|node| if node.is_library() { PackKind::Library } else { PackKind::Query })
            .collect();

        for (idx, node) in self.nodes.iter().enumerate() {
            if !candidates[idx] {
                continue;
            }
            let edges = &self.dependencies[idx];
            let invalid = |reason: String| BundleError::InvalidCustomizationPackage {
                package: node.name().clone(),
                edge_count: edges.len(),
                reason,
            };
            let target = match edges.as_slice() {
                [target] => *target,
                [] => return Err(invalid("a customization pack must depend on its standard library pack".to_string())),
                _ => {
                    return Err(invalid(
                        "a customization pack may only depend on the standard library pack it customizes".to_string(),
                    ))
                }
            };
            let target_node = &self.nodes[target];
            if has_module[target] {
                return Err(invalid(format!(
                    "its dependency {} is itself a customization pack",
                    target_node.name()
                )));
            }
            if !target_node.is_library() || !target_node.in_bundle() {
                return Err(invalid(format!(
                    "its dependency {} is not a library pack of the base bundle",
                    target_node.name()
                )));
            }
            kinds[idx] = PackKind::Customization { target };
            kinds[target] = PackKind::Standard;
        }

        for (node, kind) in self.nodes.iter_mut().zip(kinds) {
            node.kind = kind;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, idx: usize) -> &PackNode {
        &self.nodes[idx]
    }

    pub fn nodes(&self) -> &[PackNode] {
        &self.nodes
    }

    pub fn index_of(&self, name: &PackageName) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn get(&self, name: &PackageName) -> Option<&PackNode> {
        self.index_of(name).map(|idx| &self.nodes[idx])
    }

    pub fn kind_of(&self, name: &PackageName) -> Option<PackKind> {
        self.get(name).map(|node| node.kind)
    }

    /// Direct dependencies of a node
    pub fn dependencies(&self, idx: usize) -> &[usize] {
        &self.dependencies[idx]
    }

    /// Nodes depending directly on a node
    pub fn dependents(&self, idx: usize) -> &[usize] {
        &self.dependents[idx]
    }

    /// Target of a customization pack
    pub fn customization_target(&self, idx: usize) -> Option<usize> {
        match self.nodes[idx].kind {
            PackKind::Customization { target } => Some(target),
            _ => None,
        }
    }
}
