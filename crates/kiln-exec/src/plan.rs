//! Execution plan: the closure of a selection and its barrier levels.
//!
//! The closure is the selection plus every executable ancestor, found by
//! walking through ephemeral models and sources without scheduling them.
//! A node's level is one more than the highest level among its ancestors
//! inside the closure, so nodes sharing a level never depend on each other.

use crate::error::{ExecError, ExecResult};
use kiln_core::{Manifest, NodeGraph, UniqueId};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    /// Selected nodes in selection order, then pulled-in ancestors in
    /// topological order
    order: Vec<UniqueId>,
    levels: Vec<Vec<UniqueId>>,
    level_of: HashMap<UniqueId, usize>,
}

impl ExecutionPlan {
    /// Plan the run of `selected`.
    ///
    /// Every selected id must be an enabled node. Selected ephemeral nodes
    /// contribute their ancestors but are never scheduled themselves.
    pub fn build(manifest: &Manifest, graph: &NodeGraph, selected: &[UniqueId]) -> ExecResult<Self> {
        let is_executable = |id: &UniqueId| manifest.nodes.get(id).is_some_and(|n| n.is_executable());

        // closure membership and selection order are tracked apart: a
        // selected id may already be in the closure as an earlier pick's ancestor
        let mut members: HashSet<UniqueId> = HashSet::new();
        let mut listed: HashSet<UniqueId> = HashSet::new();
        let mut order: Vec<UniqueId> = Vec::new();
        for id in selected {
            if !manifest.nodes.contains_key(id) {
                return Err(ExecError::UnknownSelection(id.to_string()));
            }
            if is_executable(id) {
                members.insert(id.clone());
                if listed.insert(id.clone()) {
                    order.push(id.clone());
                }
            }
            for ancestor in graph.ancestors(id) {
                if is_executable(&ancestor) {
                    members.insert(ancestor);
                }
            }
        }

        let topo = graph.topological_order()?;
        order.extend(
            topo.iter()
                .filter(|id| members.contains(*id) && !listed.contains(*id))
                .cloned(),
        );

        // reach[n]: lowest level a closure node downstream of n may take
        let mut reach: HashMap<&UniqueId, usize> = HashMap::new();
        let mut level_of: HashMap<UniqueId, usize> = HashMap::new();
        for id in &topo {
            let base = graph
                .parents(id)
                .iter()
                .filter_map(|p| reach.get(p).copied())
                .max()
                .unwrap_or(0);
            if members.contains(id) {
                level_of.insert(id.clone(), base);
                reach.insert(id, base + 1);
            } else {
                reach.insert(id, base);
            }
        }

        let depth = level_of.values().max().map_or(0, |max| max + 1);
        let mut levels: Vec<Vec<UniqueId>> = vec![Vec::new(); depth];
        for id in &order {
            if let Some(&level) = level_of.get(id) {
                levels[level].push(id.clone());
            }
        }

        log::debug!(
            "Planned {} nodes in {} levels ({} selected)",
            order.len(),
            levels.len(),
            selected.len()
        );
        Ok(Self {
            order,
            levels,
            level_of,
        })
    }

    /// Every scheduled node, in result order.
    pub fn order(&self) -> &[UniqueId] {
        &self.order
    }

    pub fn levels(&self) -> &[Vec<UniqueId>] {
        &self.levels
    }

    pub fn level_of(&self, id: &str) -> Option<usize> {
        self.level_of.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.level_of.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Scheduled nodes downstream of `id`, through unscheduled ones too.
    pub fn descendants(&self, graph: &NodeGraph, id: &str) -> Vec<UniqueId> {
        graph
            .descendants(id)
            .into_iter()
            .filter(|d| self.contains(d))
            .collect()
    }
}

#[cfg(test)]
#[path = "plan_test.rs"]
mod tests;
