//! ref() and source() resolution.
//!
//! A [`RefResolver`] is bound to the node being rendered. Each successful
//! call records the target as a dependency of that node. A reference to an
//! ephemeral node returns the CTE alias it will be inlined under; any other
//! target returns its fully qualified relation name.

use indexmap::IndexSet;
use kiln_core::{CoreError, CoreResult, Manifest, Node, NodeKind, QuotePolicy, UniqueId};
use minijinja::{Error, ErrorKind, Value};
use std::sync::{Arc, Mutex};

/// What a render resolved, captured for the node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedRefs {
    /// Targets in first-reference order
    pub depends_on: IndexSet<UniqueId>,
    /// First resolution failure, if any
    pub error: Option<CoreError>,
}

struct ResolverState {
    manifest: Arc<Manifest>,
    node_id: UniqueId,
    package: String,
    this: String,
    quoting: QuotePolicy,
    captured: Mutex<ResolvedRefs>,
}

/// Resolves references on behalf of one node.
#[derive(Clone)]
pub struct RefResolver {
    state: Arc<ResolverState>,
}

impl RefResolver {
    /// Bind a resolver to `node`, looking targets up in `manifest`.
    pub fn new(manifest: Arc<Manifest>, node: &Node, quoting: QuotePolicy) -> Self {
        Self {
            state: Arc::new(ResolverState {
                manifest,
                node_id: node.unique_id.clone(),
                package: node.package_name.clone(),
                this: node.relation(quoting).render(),
                quoting,
                captured: Mutex::new(ResolvedRefs::default()),
            }),
        }
    }

    /// Resolve `ref(name[, package])`.
    pub fn resolve_ref(&self, name: &str, package: Option<&str>) -> CoreResult<String> {
        let state = &self.state;
        let target = state
            .manifest
            .find_by_name(name, package, &state.package, NodeKind::REFABLE)
            .map_err(|e| e.into_core(&state.node_id, describe_ref(name, package)))?;
        self.record(&target.unique_id);
        if target.is_ephemeral() {
            Ok(target.cte_alias())
        } else {
            Ok(target.relation(state.quoting).render())
        }
    }

    /// Resolve `source(source_name, table_name)`.
    pub fn resolve_source(&self, source_name: &str, table_name: &str) -> CoreResult<String> {
        let state = &self.state;
        let target = state
            .manifest
            .find_source(source_name, table_name, &state.package)
            .map_err(|e| {
                e.into_core(
                    &state.node_id,
                    format!("source('{}', '{}')", source_name, table_name),
                )
            })?;
        self.record(&target.unique_id);
        Ok(target.relation(state.quoting).render())
    }

    /// Relation name of the node itself.
    pub fn this(&self) -> &str {
        &self.state.this
    }

    pub fn node_id(&self) -> &UniqueId {
        &self.state.node_id
    }

    /// The template-callable `ref` function.
    pub fn ref_function(&self) -> Value {
        let resolver = self.clone();
        Value::from_function(move |name: &str, package: Option<&str>| {
            resolver
                .resolve_ref(name, package)
                .map_err(|e| resolver.fail(e))
        })
    }

    /// The template-callable `source` function.
    pub fn source_function(&self) -> Value {
        let resolver = self.clone();
        Value::from_function(move |source_name: &str, table_name: &str| {
            resolver
                .resolve_source(source_name, table_name)
                .map_err(|e| resolver.fail(e))
        })
    }

    /// First resolution failure seen so far.
    pub fn first_error(&self) -> Option<CoreError> {
        self.lock().error.clone()
    }

    /// Take everything captured so far, leaving the resolver empty.
    pub fn take(&self) -> ResolvedRefs {
        std::mem::take(&mut *self.lock())
    }

    fn record(&self, id: &UniqueId) {
        self.lock().depends_on.insert(id.clone());
    }

    fn fail(&self, err: CoreError) -> Error {
        let message = err.to_string();
        let mut captured = self.lock();
        if captured.error.is_none() {
            captured.error = Some(err);
        }
        Error::new(ErrorKind::InvalidOperation, message)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ResolvedRefs> {
        self.state
            .captured
            .lock()
            .unwrap_or_else(|p| p.into_inner())
    }
}

fn describe_ref(name: &str, package: Option<&str>) -> String {
    match package {
        Some(p) => format!("ref('{}', '{}')", name, p),
        None => format!("ref('{}')", name),
    }
}

#[cfg(test)]
#[path = "resolver_test.rs"]
mod tests;
