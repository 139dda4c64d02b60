//! Serialized manifest artifact.
//!
//! The artifact is a JSON snapshot of the manifest plus its edge maps,
//! stamped with a schema version. Loading refuses artifacts written with a
//! different version.

use crate::error::{CoreError, CoreResult};
use crate::manifest::{Doc, Macro, Manifest};
use crate::node::Node;
use crate::unique_id::UniqueId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Current artifact schema version.
pub const MANIFEST_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub schema_version: u32,
    pub generated_at: DateTime<Utc>,
    pub invocation_id: String,
    pub project_name: String,
}

/// On-disk form of a [`Manifest`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WritableManifest {
    pub metadata: ManifestMetadata,
    pub nodes: BTreeMap<UniqueId, Node>,
    pub sources: BTreeMap<UniqueId, Node>,
    pub macros: BTreeMap<UniqueId, Macro>,
    pub docs: BTreeMap<UniqueId, Doc>,
    pub disabled: BTreeMap<UniqueId, Node>,
    pub parent_map: BTreeMap<UniqueId, Vec<UniqueId>>,
    pub child_map: BTreeMap<UniqueId, Vec<UniqueId>>,
}

#[derive(Deserialize)]
struct VersionHeader {
    metadata: HeaderMetadata,
}

#[derive(Deserialize)]
struct HeaderMetadata {
    schema_version: u32,
}

impl Manifest {
    /// Snapshot the manifest for writing.
    pub fn writable(&self, project_name: &str, invocation_id: &str) -> WritableManifest {
        WritableManifest {
            metadata: ManifestMetadata {
                schema_version: MANIFEST_SCHEMA_VERSION,
                generated_at: Utc::now(),
                invocation_id: invocation_id.to_string(),
                project_name: project_name.to_string(),
            },
            nodes: self.nodes.clone(),
            sources: self.sources.clone(),
            macros: self.macros.clone(),
            docs: self.docs.clone(),
            disabled: self.disabled.clone(),
            parent_map: self.backward_edges().clone(),
            child_map: self.forward_edges().clone(),
        }
    }
}

impl WritableManifest {
    /// Write the artifact as pretty JSON.
    ///
    /// The file is written next to `path` first and renamed into place, so
    /// readers never observe a partial artifact.
    pub fn write(&self, path: &Path) -> CoreResult<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| CoreError::Serialization {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
            }
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| io_error(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| io_error(path, e))?;
        log::debug!("Wrote manifest artifact to {}", path.display());
        Ok(())
    }

    /// Read an artifact, rejecting any other schema version.
    pub fn read(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        let serde_error = |e: serde_json::Error| CoreError::Serialization {
            path: path.display().to_string(),
            message: e.to_string(),
        };
        let header: VersionHeader = serde_json::from_str(&content).map_err(serde_error)?;
        if header.metadata.schema_version != MANIFEST_SCHEMA_VERSION {
            return Err(CoreError::IncompatibleManifest {
                found: header.metadata.schema_version,
                expected: MANIFEST_SCHEMA_VERSION,
            });
        }
        serde_json::from_str(&content).map_err(serde_error)
    }

    /// Rebuild an in-memory manifest.
    pub fn into_manifest(self) -> Manifest {
        let mut manifest = Manifest::new();
        manifest.nodes = self.nodes;
        manifest.sources = self.sources;
        manifest.macros = self.macros;
        manifest.docs = self.docs;
        manifest.disabled = self.disabled;
        manifest.set_edges(self.child_map, self.parent_map);
        manifest
    }
}

fn io_error(path: &Path, err: std::io::Error) -> CoreError {
    CoreError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
#[path = "artifact_test.rs"]
mod tests;
