//! Error types for kiln-sql

use thiserror::Error;

/// CTE injection errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SqlError {
    /// SQL could not be tokenized (S001)
    #[error("[S001] SQL tokenize error at line {line}, column {column}: {message}")]
    Tokenize {
        message: String,
        line: u64,
        column: u64,
    },

    /// Node has not been compiled (S002)
    #[error("[S002] Node '{node}' has no compiled SQL")]
    NotCompiled { node: String },

    /// Ephemeral dependency has no compiled SQL to inline (S003)
    #[error("[S003] Node '{node}' depends on ephemeral '{dependency}' which did not compile")]
    MissingCompiledSql { node: String, dependency: String },

    /// Ephemeral nodes depend on each other in a loop (S004)
    #[error("[S004] Ephemeral dependency cycle through '{node}'")]
    CteCycle { node: String },

    /// Node id not present in the manifest (S005)
    #[error("[S005] Node not found: {node}")]
    NodeNotFound { node: String },
}

/// Result type alias for SqlError
pub type SqlResult<T> = Result<T, SqlError>;
