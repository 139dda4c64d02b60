//! Error types for kiln-jinja

use kiln_core::CoreError;
use thiserror::Error;

/// Jinja templating errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum JinjaError {
    /// Template render error (J001)
    #[error("[J001] Jinja render error: {0}")]
    RenderError(String),

    /// ref() or source() could not be resolved (J002)
    #[error("[J002] {0}")]
    Resolution(CoreError),

    /// config() received a value kiln cannot use (J003)
    #[error("[J003] Invalid config() call: {message}")]
    InvalidConfig { message: String },

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for JinjaError
pub type JinjaResult<T> = Result<T, JinjaError>;

impl From<minijinja::Error> for JinjaError {
    fn from(err: minijinja::Error) -> Self {
        JinjaError::RenderError(err.to_string())
    }
}
