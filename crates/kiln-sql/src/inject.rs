//! Recursive CTE injection over the manifest.
//!
//! Every ephemeral ancestor of a node, however deep, becomes one CTE in the
//! node's SQL. Ancestors are injected first, so an ephemeral's own ancestors
//! precede it in the list and a diamond-shaped ancestor appears once.

use crate::error::{SqlError, SqlResult};
use crate::inline::inject_ctes_into_sql;
use indexmap::IndexMap;
use kiln_core::{InjectedCte, Manifest, UniqueId};
use std::collections::HashSet;

/// Compute `extra_ctes` and `injected_sql` for `id`.
///
/// Nodes already marked `injected` are left untouched, so calling this again
/// never duplicates CTEs. Ephemeral ancestors are injected as a side effect.
pub fn inject_ctes(manifest: &mut Manifest, id: &UniqueId) -> SqlResult<()> {
    let mut visiting = HashSet::new();
    prepend_ctes(manifest, id, &mut visiting).map(|_| ())
}

fn prepend_ctes(
    manifest: &mut Manifest,
    id: &UniqueId,
    visiting: &mut HashSet<UniqueId>,
) -> SqlResult<Vec<InjectedCte>> {
    let node = manifest.get(id).ok_or_else(|| SqlError::NodeNotFound {
        node: id.to_string(),
    })?;
    if node.injected {
        return Ok(node.extra_ctes.clone());
    }
    if !visiting.insert(id.clone()) {
        return Err(SqlError::CteCycle {
            node: id.to_string(),
        });
    }

    let deps: Vec<UniqueId> = node.depends_on.iter().cloned().collect();
    // keyed by node id; aliases are derived from it
    let mut ctes: IndexMap<UniqueId, InjectedCte> = IndexMap::new();
    for dep in &deps {
        let Some(dep_node) = manifest.get(dep) else {
            continue;
        };
        if !dep_node.is_ephemeral() {
            continue;
        }
        let Some(sql) = dep_node.compiled_code.clone() else {
            return Err(SqlError::MissingCompiledSql {
                node: id.to_string(),
                dependency: dep.to_string(),
            });
        };
        let alias = dep_node.cte_alias();
        for cte in prepend_ctes(manifest, dep, visiting)? {
            ctes.entry(cte.id.clone()).or_insert(cte);
        }
        ctes.entry(dep.clone()).or_insert(InjectedCte {
            id: dep.clone(),
            alias,
            sql,
        });
    }
    let extra_ctes: Vec<InjectedCte> = ctes.into_values().collect();

    let node = manifest.get_mut(id).ok_or_else(|| SqlError::NodeNotFound {
        node: id.to_string(),
    })?;
    let compiled = node
        .compiled_code
        .as_deref()
        .ok_or_else(|| SqlError::NotCompiled {
            node: id.to_string(),
        })?;
    node.injected_sql = Some(inject_ctes_into_sql(compiled, &extra_ctes)?);
    node.extra_ctes = extra_ctes.clone();
    node.injected = true;
    visiting.remove(id);

    if !node.extra_ctes.is_empty() {
        log::debug!("Injected {} CTEs into {}", node.extra_ctes.len(), id);
    }
    Ok(extra_ctes)
}

#[cfg(test)]
#[path = "inject_test.rs"]
mod tests;
