//! Dependency graph over manifest nodes.

use crate::error::{CoreError, CoreResult};
use crate::manifest::Manifest;
use crate::unique_id::UniqueId;
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use std::collections::{HashMap, HashSet};

/// Directed graph with an edge from every dependency to its dependent.
#[derive(Debug)]
pub struct NodeGraph {
    graph: DiGraph<UniqueId, ()>,
    node_map: HashMap<UniqueId, NodeIndex>,
}

impl NodeGraph {
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            node_map: HashMap::new(),
        }
    }

    /// Add a node, returning its index. Adding twice is a no-op.
    pub fn add_node(&mut self, id: &UniqueId) -> NodeIndex {
        if let Some(&idx) = self.node_map.get(id) {
            return idx;
        }
        let idx = self.graph.add_node(id.clone());
        self.node_map.insert(id.clone(), idx);
        idx
    }

    /// Record that `dependent` depends on `dependency`.
    pub fn add_dependency(&mut self, dependent: &UniqueId, dependency: &UniqueId) {
        let from = self.add_node(dependency);
        let to = self.add_node(dependent);
        self.graph.update_edge(from, to, ());
    }

    /// Build the graph of a manifest's nodes and sources and reject cycles.
    ///
    /// Dependencies on ids the manifest does not know are ignored here; the
    /// resolver reports those when the template is rendered.
    pub fn from_manifest(manifest: &Manifest) -> CoreResult<Self> {
        let mut graph = Self::new();
        for id in manifest.nodes.keys().chain(manifest.sources.keys()) {
            graph.add_node(id);
        }
        for (id, node) in &manifest.nodes {
            for dep in &node.depends_on {
                if graph.contains(dep) {
                    graph.add_dependency(id, dep);
                }
            }
        }
        graph.validate()?;
        Ok(graph)
    }

    /// Fail with the offending path if the graph has a cycle.
    pub fn validate(&self) -> CoreResult<()> {
        self.topological_order().map(|_| ())
    }

    /// Node ids with every dependency before its dependents.
    pub fn topological_order(&self) -> CoreResult<Vec<UniqueId>> {
        match toposort(&self.graph, None) {
            Ok(indices) => Ok(indices
                .into_iter()
                .map(|idx| self.graph[idx].clone())
                .collect()),
            Err(cycle) => Err(CoreError::CircularDependency {
                cycle: self.find_cycle_path(cycle.node_id()),
            }),
        }
    }

    /// Walk the strongly connected component containing `start` back to
    /// `start`, producing `a -> b -> a`.
    fn find_cycle_path(&self, start: NodeIndex) -> String {
        let component: HashSet<NodeIndex> = tarjan_scc(&self.graph)
            .into_iter()
            .find(|scc| scc.contains(&start))
            .map(|scc| scc.into_iter().collect())
            .unwrap_or_default();

        let mut path = vec![self.graph[start].to_string()];
        let mut visited = HashSet::from([start]);
        let mut current = start;
        loop {
            let mut next = None;
            for edge in self.graph.edges(current) {
                let target = edge.target();
                if target == start {
                    next = Some(target);
                    break;
                }
                if component.contains(&target) && !visited.contains(&target) && next.is_none() {
                    next = Some(target);
                }
            }
            match next {
                Some(target) if target == start => {
                    path.push(self.graph[start].to_string());
                    break;
                }
                Some(target) => {
                    visited.insert(target);
                    path.push(self.graph[target].to_string());
                    current = target;
                }
                None => {
                    path.push(self.graph[start].to_string());
                    break;
                }
            }
        }
        path.join(" -> ")
    }

    /// Direct dependencies of a node.
    pub fn parents(&self, id: &str) -> Vec<UniqueId> {
        self.neighbors(id, Direction::Incoming)
    }

    /// Direct dependents of a node.
    pub fn children(&self, id: &str) -> Vec<UniqueId> {
        self.neighbors(id, Direction::Outgoing)
    }

    fn neighbors(&self, id: &str, direction: Direction) -> Vec<UniqueId> {
        match self.node_map.get(id) {
            Some(&idx) => {
                let mut out: Vec<UniqueId> = self
                    .graph
                    .neighbors_directed(idx, direction)
                    .map(|n| self.graph[n].clone())
                    .collect();
                out.sort();
                out
            }
            None => Vec::new(),
        }
    }

    /// All transitive dependencies of a node.
    pub fn ancestors(&self, id: &str) -> Vec<UniqueId> {
        self.collect_reachable(id, Direction::Incoming)
    }

    /// All transitive dependents of a node.
    pub fn descendants(&self, id: &str) -> Vec<UniqueId> {
        self.collect_reachable(id, Direction::Outgoing)
    }

    fn collect_reachable(&self, id: &str, direction: Direction) -> Vec<UniqueId> {
        let Some(&start) = self.node_map.get(id) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![start];
        while let Some(idx) = stack.pop() {
            for neighbor in self.graph.neighbors_directed(idx, direction) {
                if visited.insert(neighbor) {
                    result.push(self.graph[neighbor].clone());
                    stack.push(neighbor);
                }
            }
        }
        result
    }

    pub fn contains(&self, id: &str) -> bool {
        self.node_map.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

impl Default for NodeGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "dag_test.rs"]
mod tests;
