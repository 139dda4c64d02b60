//! Project configuration parsed from `kiln.yml`.

use crate::error::{CoreError, CoreResult};
use crate::node::Materialization;
use crate::relation::QuotePolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Main project configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Project (root package) name
    pub name: String,

    /// Database (catalog) relations are built in. Empty means the adapter's
    /// current catalog, filled in when an engine is created.
    #[serde(default)]
    pub database: String,

    /// Default schema for built relations
    #[serde(default = "default_schema")]
    pub schema: String,

    /// Name of the active target, exposed to templates as `target.name`
    #[serde(default = "default_target_name")]
    pub target_name: String,

    /// Maximum number of nodes executing at once
    #[serde(default = "default_threads")]
    pub threads: usize,

    /// Default materialization for models
    #[serde(default)]
    pub materialization: Materialization,

    /// Which relation name parts are quoted
    #[serde(default)]
    pub quoting: QuotePolicy,

    /// Variables available through `var()`
    #[serde(default)]
    pub vars: HashMap<String, serde_yaml::Value>,

    /// SQL run before any node, in order
    #[serde(default)]
    pub on_run_start: Vec<String>,

    /// SQL run after all nodes, even when some failed
    #[serde(default)]
    pub on_run_end: Vec<String>,

    /// Stop dispatching new levels after the first failure
    #[serde(default)]
    pub fail_fast: bool,

    /// Directory the manifest artifact is written to
    #[serde(default = "default_target_path")]
    pub target_path: String,
}

fn default_schema() -> String {
    "main".to_string()
}

fn default_target_name() -> String {
    "dev".to_string()
}

fn default_threads() -> usize {
    4
}

fn default_target_path() -> String {
    "target".to_string()
}

impl Config {
    /// Minimal config for a project, everything else defaulted.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            database: String::new(),
            schema: default_schema(),
            target_name: default_target_name(),
            threads: default_threads(),
            materialization: Materialization::default(),
            quoting: QuotePolicy::default(),
            vars: HashMap::new(),
            on_run_start: Vec::new(),
            on_run_end: Vec::new(),
            fail_fast: false,
            target_path: default_target_path(),
        }
    }

    /// Load configuration from a file path
    pub fn load(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml_str(content: &str) -> CoreResult<Self> {
        let config: Config = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::Validation {
                message: "project name cannot be empty".to_string(),
            });
        }
        if self.threads == 0 {
            return Err(CoreError::Validation {
                message: "threads must be at least 1".to_string(),
            });
        }
        if self.materialization.is_ephemeral() {
            log::debug!("Project default materialization is ephemeral");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
