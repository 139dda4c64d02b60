//! kiln-exec - compilation and scheduling for kiln
//!
//! [`Engine`] compiles a [`kiln_core::Manifest`] and runs a selection of it
//! level by level against a [`kiln_db::Adapter`].

pub mod capability;
pub mod compile;
pub mod engine;
pub mod error;
pub mod executor;
pub mod hooks;
pub mod plan;
mod runner;

pub use capability::{capability, Capability};
pub use compile::{apply_patches, CompiledManifest, Compiler};
pub use engine::{Engine, MANIFEST_FILE};
pub use error::{ExecError, ExecResult};
pub use executor::{Executor, RunOptions};
pub use hooks::hook_id;
pub use plan::ExecutionPlan;
pub use runner::{SNAPSHOT_AT_COLUMN, TMP_SUFFIX};
