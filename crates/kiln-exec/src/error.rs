//! Error types for kiln-exec

use kiln_core::CoreError;
use kiln_db::DbError;
use kiln_jinja::JinjaError;
use kiln_sql::SqlError;
use thiserror::Error;

/// Errors raised while compiling or running a manifest
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecError {
    /// A node's template or references could not be compiled (X001)
    #[error("[X001] Compilation error in {node} ({path}): {message}")]
    Compilation {
        node: String,
        path: String,
        message: String,
    },

    /// A selected id is not an enabled node of the manifest (X002)
    #[error("[X002] Selected node '{0}' is not in the manifest")]
    UnknownSelection(String),

    /// An invariant of the graph, cache or scheduler was violated (X003)
    #[error("[X003] Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Sql(#[from] SqlError),

    #[error(transparent)]
    Jinja(#[from] JinjaError),

    #[error(transparent)]
    Db(#[from] DbError),
}

impl ExecError {
    /// Whether this error must abort the whole run.
    pub fn is_internal(&self) -> bool {
        match self {
            ExecError::Internal(_) => true,
            ExecError::Db(e) => e.is_internal(),
            _ => false,
        }
    }
}

/// Result type alias for ExecError
pub type ExecResult<T> = Result<T, ExecError>;
