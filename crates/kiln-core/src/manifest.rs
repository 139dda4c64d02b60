//! The in-memory project graph.
//!
//! A [`Manifest`] owns every node, source, macro and doc of a project.
//! Dependencies are recorded on each node's `depends_on` set while templates
//! are rendered; [`Manifest::build_edges`] then derives the parent and child
//! maps used by scheduling and by the written artifact.

use crate::error::{CoreError, CoreResult};
use crate::node::{ColumnInfo, Node, NodeKind};
use crate::unique_id::UniqueId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// A reusable template macro.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Macro {
    pub unique_id: UniqueId,
    pub name: String,
    pub package_name: String,
    pub path: PathBuf,
    pub macro_sql: String,
}

impl Macro {
    pub fn new(package_name: &str, name: &str, macro_sql: &str) -> Self {
        Self {
            unique_id: UniqueId::new(format!("macro.{}.{}", package_name, name)),
            name: name.to_string(),
            package_name: package_name.to_string(),
            path: PathBuf::from(format!("macros/{}.sql", name)),
            macro_sql: macro_sql.to_string(),
        }
    }
}

/// A named documentation block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Doc {
    pub unique_id: UniqueId,
    pub name: String,
    pub package_name: String,
    pub block_contents: String,
}

impl Doc {
    pub fn new(package_name: &str, name: &str, block_contents: &str) -> Self {
        Self {
            unique_id: UniqueId::new(format!("doc.{}.{}", package_name, name)),
            name: name.to_string(),
            package_name: package_name.to_string(),
            block_contents: block_contents.to_string(),
        }
    }
}

/// Properties declared for a node outside its template (schema files).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodePatch {
    pub name: String,
    pub package_name: String,
    pub resource_type: NodeKind,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub columns: Vec<ColumnInfo>,
}

/// Why a name lookup failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    NotFound,
    /// Only a disabled node matched
    Disabled,
    /// More than one node matched; holds the candidate ids
    Ambiguous(Vec<String>),
}

impl LookupError {
    /// Attach the referring node and a description of the target.
    pub fn into_core(self, referrer: &UniqueId, target: String) -> CoreError {
        let referrer = referrer.to_string();
        match self {
            LookupError::NotFound => CoreError::TargetNotFound { referrer, target },
            LookupError::Disabled => CoreError::DisabledTarget { referrer, target },
            LookupError::Ambiguous(candidates) => CoreError::AmbiguousReference {
                referrer,
                target,
                candidates: candidates.join(", "),
            },
        }
    }
}

/// The project graph.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub nodes: BTreeMap<UniqueId, Node>,
    pub sources: BTreeMap<UniqueId, Node>,
    pub macros: BTreeMap<UniqueId, Macro>,
    pub docs: BTreeMap<UniqueId, Doc>,
    pub disabled: BTreeMap<UniqueId, Node>,
    forward_edges: BTreeMap<UniqueId, Vec<UniqueId>>,
    backward_edges: BTreeMap<UniqueId, Vec<UniqueId>>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert parsed nodes.
    ///
    /// Nodes whose config has `enabled: false` are kept aside in
    /// [`Manifest::disabled`]. Sources go to [`Manifest::sources`].
    pub fn add_nodes(&mut self, nodes: impl IntoIterator<Item = Node>) -> CoreResult<()> {
        for node in nodes {
            if let Some(existing) = self
                .nodes
                .get(&node.unique_id)
                .or_else(|| self.sources.get(&node.unique_id))
                .or_else(|| self.disabled.get(&node.unique_id))
            {
                return Err(CoreError::DuplicateResourceName {
                    unique_id: node.unique_id.to_string(),
                    first_path: existing.path.display().to_string(),
                    second_path: node.path.display().to_string(),
                });
            }
            if !node.config.enabled {
                log::debug!("Node '{}' is disabled", node.unique_id);
                self.disabled.insert(node.unique_id.clone(), node);
            } else if node.resource_type == NodeKind::Source {
                self.sources.insert(node.unique_id.clone(), node);
            } else {
                self.nodes.insert(node.unique_id.clone(), node);
            }
        }
        Ok(())
    }

    pub fn add_macro(&mut self, m: Macro) -> CoreResult<()> {
        if let Some(existing) = self.macros.get(&m.unique_id) {
            return Err(CoreError::DuplicateResourceName {
                unique_id: m.unique_id.to_string(),
                first_path: existing.path.display().to_string(),
                second_path: m.path.display().to_string(),
            });
        }
        self.macros.insert(m.unique_id.clone(), m);
        Ok(())
    }

    pub fn add_doc(&mut self, doc: Doc) -> CoreResult<()> {
        if self.docs.contains_key(&doc.unique_id) {
            return Err(CoreError::DuplicateResourceName {
                unique_id: doc.unique_id.to_string(),
                first_path: format!("docs block '{}'", doc.name),
                second_path: format!("docs block '{}'", doc.name),
            });
        }
        self.docs.insert(doc.unique_id.clone(), doc);
        Ok(())
    }

    /// Move an enabled node to the disabled set.
    pub fn disable(&mut self, id: &UniqueId) -> Option<&Node> {
        let node = self.nodes.remove(id)?;
        self.disabled.insert(id.clone(), node);
        self.disabled.get(id)
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id).or_else(|| self.sources.get(id))
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Node> {
        match self.nodes.get_mut(id) {
            Some(node) => Some(node),
            None => self.sources.get_mut(id),
        }
    }

    /// Like [`Manifest::get`] but an absent id is an error.
    pub fn expect_node(&self, id: &UniqueId) -> CoreResult<&Node> {
        self.get(id).ok_or_else(|| CoreError::NodeNotFound {
            unique_id: id.to_string(),
        })
    }

    /// Rebuild the child (forward) and parent (backward) maps from each
    /// node's `depends_on`.
    ///
    /// Every known id gets an entry, so leaf nodes map to an empty list.
    /// Dependencies on ids outside the manifest are kept in the parent map
    /// only. Values are sorted.
    pub fn build_edges(&mut self) {
        let mut forward: BTreeMap<UniqueId, Vec<UniqueId>> = self
            .nodes
            .keys()
            .chain(self.sources.keys())
            .map(|id| (id.clone(), Vec::new()))
            .collect();
        let mut backward: BTreeMap<UniqueId, Vec<UniqueId>> = BTreeMap::new();

        for (id, node) in &self.nodes {
            backward.insert(id.clone(), node.depends_on.iter().cloned().collect());
            for dep in &node.depends_on {
                if let Some(children) = forward.get_mut(dep) {
                    children.push(id.clone());
                }
            }
        }
        for id in self.sources.keys() {
            backward.insert(id.clone(), Vec::new());
        }

        for values in forward.values_mut().chain(backward.values_mut()) {
            values.sort();
        }
        self.forward_edges = forward;
        self.backward_edges = backward;
    }

    /// id -> direct dependents. Empty until [`Manifest::build_edges`] runs.
    pub fn forward_edges(&self) -> &BTreeMap<UniqueId, Vec<UniqueId>> {
        &self.forward_edges
    }

    /// id -> direct dependencies. Empty until [`Manifest::build_edges`] runs.
    pub fn backward_edges(&self) -> &BTreeMap<UniqueId, Vec<UniqueId>> {
        &self.backward_edges
    }

    /// Resolve a refable node by name.
    ///
    /// With an explicit `package` only that package is searched. Otherwise
    /// a match in `current_package` wins, then a unique match in any
    /// package. Only nodes whose kind is in `kinds` are considered.
    pub fn find_by_name(
        &self,
        name: &str,
        package: Option<&str>,
        current_package: &str,
        kinds: &[NodeKind],
    ) -> Result<&Node, LookupError> {
        let matches = |node: &&Node| {
            node.name == name
                && kinds.contains(&node.resource_type)
                && package.map_or(true, |p| node.package_name == p)
        };
        let candidates: Vec<&Node> = self.nodes.values().filter(|n| matches(n)).collect();
        if candidates.is_empty() {
            return if self.disabled.values().any(|n| matches(&n)) {
                Err(LookupError::Disabled)
            } else {
                Err(LookupError::NotFound)
            };
        }
        pick_candidate(candidates, current_package)
    }

    /// Resolve `source(source_name, table_name)`.
    pub fn find_source(
        &self,
        source_name: &str,
        table_name: &str,
        current_package: &str,
    ) -> Result<&Node, LookupError> {
        let matches = |node: &&Node| {
            node.name == table_name && node.source_name.as_deref() == Some(source_name)
        };
        let candidates: Vec<&Node> = self.sources.values().filter(|n| matches(n)).collect();
        if candidates.is_empty() {
            return if self.disabled.values().any(|n| matches(&n)) {
                Err(LookupError::Disabled)
            } else {
                Err(LookupError::NotFound)
            };
        }
        pick_candidate(candidates, current_package)
    }

    /// Resolve `doc(name)` or `doc(name, package)`.
    ///
    /// Without a package the current package wins; otherwise the name must
    /// be unique across packages.
    pub fn find_doc(
        &self,
        name: &str,
        package: Option<&str>,
        current_package: &str,
    ) -> Result<&Doc, LookupError> {
        let named: Vec<&Doc> = self
            .docs
            .values()
            .filter(|d| d.name == name && package.map_or(true, |p| d.package_name == p))
            .collect();
        let local: Vec<&Doc> = named
            .iter()
            .copied()
            .filter(|d| d.package_name == current_package)
            .collect();
        let pool = if local.is_empty() { named } else { local };
        match pool.as_slice() {
            [] => Err(LookupError::NotFound),
            [single] => Ok(*single),
            many => Err(LookupError::Ambiguous(
                many.iter().map(|d| d.unique_id.to_string()).collect(),
            )),
        }
    }

    /// Attach declared properties to existing nodes.
    ///
    /// Patches naming a node that does not exist are logged and their names
    /// returned; they never fail the parse.
    pub fn patch_nodes(&mut self, patches: impl IntoIterator<Item = NodePatch>) -> Vec<String> {
        let mut unmatched = Vec::new();
        for patch in patches {
            let id = UniqueId::for_node(patch.resource_type, &patch.package_name, &patch.name);
            let target = match self.nodes.get_mut(&id) {
                Some(node) => Some(node),
                None => self.disabled.get_mut(&id),
            };
            match target {
                Some(node) => {
                    node.description = patch.description;
                    for column in patch.columns {
                        node.columns.insert(column.name.clone(), column);
                    }
                }
                None => {
                    log::warn!(
                        "Did not find matching node for patch with name '{}' in package '{}'",
                        patch.name,
                        patch.package_name
                    );
                    unmatched.push(patch.name);
                }
            }
        }
        unmatched
    }

    /// Ids in the manifest that may be dispatched to the warehouse.
    pub fn executable_ids(&self) -> Vec<UniqueId> {
        self.nodes
            .values()
            .filter(|n| n.is_executable())
            .map(|n| n.unique_id.clone())
            .collect()
    }

    pub(crate) fn set_edges(
        &mut self,
        forward: BTreeMap<UniqueId, Vec<UniqueId>>,
        backward: BTreeMap<UniqueId, Vec<UniqueId>>,
    ) {
        self.forward_edges = forward;
        self.backward_edges = backward;
    }
}

fn pick_candidate<'a>(candidates: Vec<&'a Node>, current_package: &str) -> Result<&'a Node, LookupError> {
    let local: Vec<&Node> = candidates
        .iter()
        .copied()
        .filter(|n| n.package_name == current_package)
        .collect();
    let pool = if local.is_empty() { candidates } else { local };
    match pool.as_slice() {
        [single] => Ok(*single),
        many => Err(LookupError::Ambiguous(
            many.iter().map(|n| n.unique_id.to_string()).collect(),
        )),
    }
}

#[cfg(test)]
#[path = "manifest_test.rs"]
mod tests;
