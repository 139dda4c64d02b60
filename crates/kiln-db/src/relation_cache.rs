//! Relation-existence cache shared by every worker of a run.
//!
//! Schemas are loaded lazily from the catalog the first time they are
//! consulted; afterwards the adapter keeps the cache current as it creates,
//! drops and renames relations. All mutations go through one mutex.

use kiln_core::RelationKind;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

type SchemaEntries = HashMap<String, RelationKind>;

/// Known relations per schema.
#[derive(Debug, Default)]
pub struct RelationCache {
    schemas: Mutex<HashMap<String, SchemaEntries>>,
}

impl RelationCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cached contents of `schema`.
    pub fn load_schema(&self, schema: &str, entries: impl IntoIterator<Item = (String, RelationKind)>) {
        let entries: SchemaEntries = entries.into_iter().collect();
        log::debug!("relation cache: loaded {} relations for schema {}", entries.len(), schema);
        self.lock().insert(schema.to_string(), entries);
    }

    /// `None` when the schema was never loaded; `Some(None)` when it was
    /// loaded and the relation is absent.
    pub fn lookup(&self, schema: &str, identifier: &str) -> Option<Option<RelationKind>> {
        self.lock()
            .get(schema)
            .map(|entries| entries.get(identifier).copied())
    }

    /// Record a created relation. No-op for schemas that were never loaded.
    pub fn add(&self, schema: &str, identifier: &str, kind: RelationKind) {
        if let Some(entries) = self.lock().get_mut(schema) {
            entries.insert(identifier.to_string(), kind);
        }
    }

    pub fn drop(&self, schema: &str, identifier: &str) {
        if let Some(entries) = self.lock().get_mut(schema) {
            entries.remove(identifier);
        }
    }

    pub fn rename(&self, schema: &str, from: &str, to: &str) {
        if let Some(entries) = self.lock().get_mut(schema) {
            if let Some(kind) = entries.remove(from) {
                entries.insert(to.to_string(), kind);
            }
        }
    }

    /// Forget everything; the next lookup reloads from the catalog.
    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, SchemaEntries>> {
        self.schemas.lock().unwrap_or_else(|p| p.into_inner())
    }
}
