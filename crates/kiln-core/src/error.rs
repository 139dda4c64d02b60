//! Error types for kiln-core

use thiserror::Error;

/// Core error type for kiln
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    /// E001: Failed to parse configuration
    #[error("[E001] Failed to parse config: {message}")]
    ConfigParseError { message: String },

    /// E002: Invalid configuration or selection input
    #[error("[E002] Validation error: {message}")]
    Validation { message: String },

    /// E003: Two resources produced the same unique id
    #[error("[E003] Duplicate resource '{unique_id}' found in {first_path} and {second_path}")]
    DuplicateResourceName {
        unique_id: String,
        first_path: String,
        second_path: String,
    },

    /// E004: ref()/source() target does not exist
    #[error("[E004] Node '{referrer}' depends on {target} which was not found")]
    TargetNotFound { referrer: String, target: String },

    /// E005: ref() target exists but is disabled
    #[error("[E005] Node '{referrer}' depends on {target} which is disabled")]
    DisabledTarget { referrer: String, target: String },

    /// E006: ref() target matched more than one package
    #[error("[E006] Node '{referrer}' references {target} ambiguously; candidates: {candidates}")]
    AmbiguousReference {
        referrer: String,
        target: String,
        candidates: String,
    },

    /// E007: Circular dependency detected
    #[error("[E007] Circular dependency detected: {cycle}")]
    CircularDependency { cycle: String },

    /// E008: Lookup of a node id that is not in the manifest
    #[error("[E008] Node not found: {unique_id}")]
    NodeNotFound { unique_id: String },

    /// E009: Manifest artifact written by an incompatible version
    #[error("[E009] Incompatible manifest schema version {found} (expected {expected})")]
    IncompatibleManifest { found: u32, expected: u32 },

    /// E010: IO error
    #[error("[E010] IO error at {path}: {message}")]
    Io { path: String, message: String },

    /// E011: Artifact (de)serialization error
    #[error("[E011] Failed to (de)serialize {path}: {message}")]
    Serialization { path: String, message: String },
}

/// Result type alias for CoreError
pub type CoreResult<T> = Result<T, CoreError>;

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        CoreError::ConfigParseError {
            message: err.to_string(),
        }
    }
}
