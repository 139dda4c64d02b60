//! kiln-core - Core library for kiln
//!
//! Shared types used across the kiln crates: the project manifest and its
//! nodes, the dependency graph, project configuration, run events, and run
//! results.

pub mod artifact;
pub mod config;
pub mod dag;
pub mod error;
pub mod events;
pub mod manifest;
pub mod node;
pub mod relation;
pub mod run_result;
pub mod unique_id;

pub use artifact::{ManifestMetadata, WritableManifest, MANIFEST_SCHEMA_VERSION};
pub use config::Config;
pub use dag::NodeGraph;
pub use error::{CoreError, CoreResult};
pub use events::{CollectingSink, Event, EventSink, HookPhase, LogSink, NullSink};
pub use manifest::{Doc, LookupError, Macro, Manifest, NodePatch};
pub use node::{ColumnInfo, InjectedCte, Materialization, Node, NodeConfig, NodeKind, Severity};
pub use relation::{QuotePolicy, Relation, RelationKind};
pub use run_result::{ResultCollector, RunReport, RunResult, RunStatus, RunSummary};
pub use unique_id::UniqueId;
