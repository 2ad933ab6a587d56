//! Package dependency graph.
//!
//! This module builds a directed graph of sibling-package dependencies and
//! answers the ordering questions the orchestrator asks:
//! - full topological order (fatal on cycles)
//! - depth waves for barrier-separated parallel transpiling
//! - reverse-dependency lookups and rebundle impact analysis for watch mode

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet, VecDeque};

use petgraph::Direction;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use thiserror::Error;
use tracing::warn;

use crate::package::PackageRegistry;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
  /// The dependency graph has a cycle. This is a configuration bug.
  #[error("dependency cycle detected between packages: {}", .packages.join(" -> "))]
  Cycle { packages: Vec<String> },
}

/// A `(dependent, dependency)` pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Edge {
  pub dependent: String,
  pub dependency: String,
}

/// One edge per relevant dependency of every package in the registry.
///
/// Packages without relevant dependencies get a self-loop edge so isolated
/// nodes still show up in an edge-list based sort.
pub fn dependency_edges(registry: &PackageRegistry) -> Vec<Edge> {
  let mut edges = Vec::new();
  for name in registry.names() {
    let deps = registry.wordpress_dependencies(name);
    if deps.is_empty() {
      edges.push(Edge {
        dependent: name.to_string(),
        dependency: name.to_string(),
      });
    }
    for dep in deps {
      edges.push(Edge {
        dependent: name.to_string(),
        dependency: dep,
      });
    }
  }
  edges
}

/// Memoized package depths, owned by the caller.
///
/// Each build run holds its own cache so runs never share state.
#[derive(Debug, Default, Clone)]
pub struct DepthCache {
  depths: HashMap<String, usize>,
}

impl DepthCache {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn get(&self, name: &str) -> Option<usize> {
    self.depths.get(name).copied()
  }

  pub fn len(&self) -> usize {
    self.depths.len()
  }

  pub fn is_empty(&self) -> bool {
    self.depths.is_empty()
  }
}

/// Directed graph of sibling dependencies, edges pointing from dependency to dependent.
#[derive(Debug)]
pub struct DependencyGraph {
  graph: DiGraph<String, ()>,
  nodes: HashMap<String, NodeIndex>,
  boundaries: HashSet<String>,
}

impl DependencyGraph {
  /// Build the graph from a registry.
  ///
  /// Self-loop edges from [`dependency_edges`] only mark isolated nodes and are
  /// not added to the graph. Cycles are not rejected here; see
  /// [`topological_sort`](Self::topological_sort).
  pub fn from_registry(registry: &PackageRegistry) -> Self {
    let mut graph = DiGraph::new();
    let mut nodes = HashMap::new();

    for name in registry.names() {
      let idx = graph.add_node(name.to_string());
      nodes.insert(name.to_string(), idx);
    }

    for edge in dependency_edges(registry) {
      if edge.dependent == edge.dependency {
        continue;
      }
      if let (Some(&dep_idx), Some(&dependent_idx)) = (nodes.get(&edge.dependency), nodes.get(&edge.dependent)) {
        graph.add_edge(dep_idx, dependent_idx, ());
      }
    }

    let boundaries = registry
      .iter()
      .filter(|p| p.capabilities.is_boundary())
      .map(|p| p.name.clone())
      .collect();

    Self {
      graph,
      nodes,
      boundaries,
    }
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  pub fn contains(&self, name: &str) -> bool {
    self.nodes.contains_key(name)
  }

  pub fn is_boundary(&self, name: &str) -> bool {
    self.boundaries.contains(name)
  }

  /// Verify that the graph is acyclic.
  pub fn verify_acyclic(&self) -> Result<(), GraphError> {
    self.topological_sort().map(|_| ())
  }

  /// Packages ordered so every dependency precedes its dependents.
  ///
  /// A cycle aborts with [`GraphError::Cycle`] listing the packages involved.
  pub fn topological_sort(&self) -> Result<Vec<String>, GraphError> {
    let sorted = toposort(&self.graph, None).map_err(|cycle| self.cycle_error(cycle.node_id()))?;
    Ok(sorted.into_iter().map(|idx| self.graph[idx].clone()).collect())
  }

  fn cycle_error(&self, start: NodeIndex) -> GraphError {
    let mut packages: Vec<String> = tarjan_scc(&self.graph)
      .into_iter()
      .find(|component| component.contains(&start))
      .unwrap_or_else(|| vec![start])
      .into_iter()
      .map(|idx| self.graph[idx].clone())
      .collect();
    packages.sort();
    GraphError::Cycle { packages }
  }

  /// Group packages into waves by longest dependency chain.
  ///
  /// depth(P) = 1 + max(depth(dep)), or 0 without dependencies. Waves are
  /// ordered by depth and names within a wave are sorted. A package revisited
  /// while its own depth is still being computed counts as depth 0, which breaks
  /// cycles silently; callers wanting cycle errors run
  /// [`verify_acyclic`](Self::verify_acyclic) first.
  pub fn group_by_depth(&self, cache: &mut DepthCache) -> Vec<Vec<String>> {
    let mut levels: BTreeMap<usize, BTreeSet<String>> = BTreeMap::new();
    let mut visiting = HashSet::new();

    for name in self.nodes.keys() {
      let depth = self.depth_of(name, cache, &mut visiting);
      levels.entry(depth).or_default().insert(name.clone());
    }

    levels.into_values().map(|wave| wave.into_iter().collect()).collect()
  }

  fn depth_of(&self, name: &str, cache: &mut DepthCache, visiting: &mut HashSet<String>) -> usize {
    if let Some(depth) = cache.get(name) {
      return depth;
    }

    if !visiting.insert(name.to_string()) {
      warn!(package = %name, "package revisited while computing depth, treating as depth 0");
      return 0;
    }

    let depth = self
      .dependencies(name)
      .iter()
      .map(|dep| self.depth_of(dep, cache, visiting) + 1)
      .max()
      .unwrap_or(0);

    visiting.remove(name);
    cache.depths.insert(name.to_string(), depth);
    depth
  }

  /// Direct sibling dependencies of a package, sorted.
  pub fn dependencies(&self, name: &str) -> Vec<String> {
    self.neighbors(name, Direction::Incoming)
  }

  /// Packages that directly depend on `name`, sorted.
  pub fn reverse_dependencies(&self, name: &str) -> Vec<String> {
    self.neighbors(name, Direction::Outgoing)
  }

  fn neighbors(&self, name: &str, direction: Direction) -> Vec<String> {
    let Some(&idx) = self.nodes.get(name) else {
      return Vec::new();
    };

    let mut names: Vec<String> = self
      .graph
      .neighbors_directed(idx, direction)
      .map(|n| self.graph[n].clone())
      .collect();
    names.sort();
    names.dedup();
    names
  }

  /// Boundary packages whose bundles must be rebuilt after `changed` changes.
  ///
  /// Breadth-first over reverse dependencies: a boundary dependent is collected
  /// and not traversed further (its own consumers load it at runtime); a plain
  /// dependent is inlined into its consumers' bundles, so traversal continues
  /// through it. `changed` itself is never returned.
  pub fn find_scripts_to_rebundle(&self, changed: &str) -> Vec<String> {
    let mut found = BTreeSet::new();
    let mut visited = HashSet::from([changed.to_string()]);
    let mut queue = VecDeque::from([changed.to_string()]);

    while let Some(current) = queue.pop_front() {
      for dependent in self.reverse_dependencies(&current) {
        if !visited.insert(dependent.clone()) {
          continue;
        }
        if self.is_boundary(&dependent) {
          found.insert(dependent);
        } else {
          queue.push_back(dependent);
        }
      }
    }

    found.into_iter().collect()
  }
}
