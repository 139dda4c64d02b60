//! Graph nodes: models, seeds, snapshots, tests, sources and operations.

use crate::error::{CoreError, CoreResult};
use crate::relation::{QuotePolicy, Relation};
use crate::unique_id::UniqueId;
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Prefix of the alias an ephemeral node is inlined under.
pub const CTE_PREFIX: &str = "__kiln__cte__";

/// Resource type of a node.
///
/// | kind        | refable | executable | capability                   |
/// |-------------|---------|------------|------------------------------|
/// | `model`     | yes     | yes        | materialize                  |
/// | `seed`      | yes     | yes        | load CSV                     |
/// | `snapshot`  | yes     | yes        | create-or-append with stamp  |
/// | `test`      | no      | yes        | count failing rows           |
/// | `operation` | no      | yes        | run SQL verbatim             |
/// | `source`    | via `source()` | no  | none                         |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Model,
    Seed,
    Snapshot,
    Test,
    Source,
    Operation,
}

impl NodeKind {
    /// Kinds that `ref()` may resolve to.
    pub const REFABLE: &'static [NodeKind] = &[NodeKind::Model, NodeKind::Seed, NodeKind::Snapshot];

    pub fn as_str(self) -> &'static str {
        match self {
            NodeKind::Model => "model",
            NodeKind::Seed => "seed",
            NodeKind::Snapshot => "snapshot",
            NodeKind::Test => "test",
            NodeKind::Source => "source",
            NodeKind::Operation => "operation",
        }
    }

    pub fn is_refable(self) -> bool {
        Self::REFABLE.contains(&self)
    }

    /// Whether the template of this kind is rendered at compile time.
    pub fn has_template(self) -> bool {
        !matches!(self, NodeKind::Seed | NodeKind::Source)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Materialization strategy of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Materialization {
    #[default]
    View,
    Table,
    /// Append-only table: created on first run, inserted into afterwards
    Incremental,
    /// Never built; inlined as a CTE into dependents
    Ephemeral,
}

impl Materialization {
    pub fn is_ephemeral(self) -> bool {
        self == Materialization::Ephemeral
    }
}

impl fmt::Display for Materialization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Materialization::View => write!(f, "view"),
            Materialization::Table => write!(f, "table"),
            Materialization::Incremental => write!(f, "incremental"),
            Materialization::Ephemeral => write!(f, "ephemeral"),
        }
    }
}

impl FromStr for Materialization {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "view" => Ok(Materialization::View),
            "table" => Ok(Materialization::Table),
            "incremental" => Ok(Materialization::Incremental),
            "ephemeral" => Ok(Materialization::Ephemeral),
            other => Err(CoreError::Validation {
                message: format!("unknown materialization '{}'", other),
            }),
        }
    }
}

/// How a failing test is reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Error,
    Warn,
}

/// Per-node configuration, set at parse time and by `config()` in templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub materialized: Materialization,
    pub enabled: bool,
    pub tags: Vec<String>,
    /// Schema override; replaces the project schema when set
    pub schema: Option<String>,
    /// Relation identifier override
    pub alias: Option<String>,
    pub pre_hook: Vec<String>,
    pub post_hook: Vec<String>,
    pub severity: Severity,
    /// Keys passed to `config()` that kiln does not interpret
    pub meta: BTreeMap<String, serde_json::Value>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            materialized: Materialization::default(),
            enabled: true,
            tags: Vec::new(),
            schema: None,
            alias: None,
            pre_hook: Vec::new(),
            post_hook: Vec::new(),
            severity: Severity::default(),
            meta: BTreeMap::new(),
        }
    }
}

impl NodeConfig {
    /// Apply the keyword arguments captured from a template's `config()` call.
    pub fn apply_overrides(&mut self, values: &BTreeMap<String, serde_json::Value>) -> CoreResult<()> {
        for (key, value) in values {
            match key.as_str() {
                "materialized" => {
                    self.materialized = expect_str(key, value)?.parse()?;
                }
                "enabled" => {
                    self.enabled = value.as_bool().ok_or_else(|| invalid(key, "a boolean"))?;
                }
                "tags" => self.tags = string_or_list(key, value)?,
                "schema" => self.schema = Some(expect_str(key, value)?.to_string()),
                "alias" => self.alias = Some(expect_str(key, value)?.to_string()),
                "pre_hook" | "pre-hook" => self.pre_hook = string_or_list(key, value)?,
                "post_hook" | "post-hook" => self.post_hook = string_or_list(key, value)?,
                "severity" => {
                    self.severity = match expect_str(key, value)?.to_ascii_lowercase().as_str() {
                        "warn" => Severity::Warn,
                        "error" => Severity::Error,
                        _ => return Err(invalid(key, "'warn' or 'error'")),
                    }
                }
                _ => {
                    self.meta.insert(key.clone(), value.clone());
                }
            }
        }
        Ok(())
    }
}

fn invalid(key: &str, expected: &str) -> CoreError {
    CoreError::Validation {
        message: format!("config key '{}' must be {}", key, expected),
    }
}

fn expect_str<'a>(key: &str, value: &'a serde_json::Value) -> CoreResult<&'a str> {
    value.as_str().ok_or_else(|| invalid(key, "a string"))
}

fn string_or_list(key: &str, value: &serde_json::Value) -> CoreResult<Vec<String>> {
    match value {
        serde_json::Value::String(s) => Ok(vec![s.clone()]),
        serde_json::Value::Array(items) => items
            .iter()
            .map(|item| expect_str(key, item).map(str::to_string))
            .collect(),
        _ => Err(invalid(key, "a string or a list of strings")),
    }
}

/// Column documentation attached by a patch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// An ephemeral ancestor inlined into a node's SQL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InjectedCte {
    /// The ephemeral node this CTE inlines
    pub id: UniqueId,
    pub alias: String,
    pub sql: String,
}

/// A single vertex of the project graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub unique_id: UniqueId,
    pub name: String,
    pub package_name: String,
    pub fqn: Vec<String>,
    pub resource_type: NodeKind,
    /// File the node was parsed from, relative to the project root
    pub path: PathBuf,
    pub database: String,
    pub schema: String,
    pub raw_code: String,
    #[serde(default)]
    pub compiled_code: Option<String>,
    #[serde(default)]
    pub injected_sql: Option<String>,
    #[serde(default)]
    pub extra_ctes: Vec<InjectedCte>,
    #[serde(default)]
    pub injected: bool,
    #[serde(default)]
    pub config: NodeConfig,
    #[serde(default)]
    pub depends_on: IndexSet<UniqueId>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub columns: BTreeMap<String, ColumnInfo>,
    /// Owning source block, set for `source` nodes only
    #[serde(default)]
    pub source_name: Option<String>,
    /// Physical table name of a source when it differs from its name
    #[serde(default)]
    pub identifier: Option<String>,
}

impl Node {
    pub fn new(
        resource_type: NodeKind,
        package_name: impl Into<String>,
        name: impl Into<String>,
        raw_code: impl Into<String>,
    ) -> Self {
        let package_name = package_name.into();
        let name = name.into();
        Self {
            unique_id: UniqueId::for_node(resource_type, &package_name, &name),
            fqn: vec![package_name.clone(), name.clone()],
            path: PathBuf::from(format!("{}.sql", name)),
            name,
            package_name,
            resource_type,
            database: String::new(),
            schema: String::new(),
            raw_code: raw_code.into(),
            compiled_code: None,
            injected_sql: None,
            extra_ctes: Vec::new(),
            injected: false,
            config: NodeConfig::default(),
            depends_on: IndexSet::new(),
            description: String::new(),
            columns: BTreeMap::new(),
            source_name: None,
            identifier: None,
        }
    }

    /// Shorthand for a model node.
    pub fn model(package_name: &str, name: &str, raw_code: &str) -> Self {
        Self::new(NodeKind::Model, package_name, name, raw_code)
    }

    /// A source table declared under `source_name`.
    pub fn source(package_name: &str, source_name: &str, table_name: &str) -> Self {
        let mut node = Self::new(NodeKind::Source, package_name, table_name, "");
        node.unique_id = UniqueId::for_source(package_name, source_name, table_name);
        node.fqn = vec![
            package_name.to_string(),
            source_name.to_string(),
            table_name.to_string(),
        ];
        node.path = PathBuf::from("sources.yml");
        node.source_name = Some(source_name.to_string());
        node
    }

    /// Set the file path and derive the fqn from its directories.
    ///
    /// The top-level resource directory is not part of the fqn, so
    /// `models/staging/orders.sql` becomes `[package, staging, orders]`.
    pub fn with_path(mut self, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let dirs: Vec<String> = path
            .parent()
            .map(|p| {
                p.components()
                    .skip(1)
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        self.path = path.to_path_buf();
        if self.resource_type != NodeKind::Source {
            let mut fqn = vec![self.package_name.clone()];
            fqn.extend(dirs);
            fqn.push(self.name.clone());
            self.fqn = fqn;
        }
        self
    }

    pub fn with_config(mut self, config: NodeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_materialization(mut self, materialized: Materialization) -> Self {
        self.config.materialized = materialized;
        self
    }

    /// True for models inlined as CTEs instead of being built.
    pub fn is_ephemeral(&self) -> bool {
        self.resource_type == NodeKind::Model && self.config.materialized.is_ephemeral()
    }

    /// Whether the scheduler dispatches this node to the warehouse.
    pub fn is_executable(&self) -> bool {
        self.resource_type != NodeKind::Source && !self.is_ephemeral()
    }

    /// Physical identifier: alias, then source identifier, then name.
    pub fn relation_identifier(&self) -> &str {
        self.config
            .alias
            .as_deref()
            .or(self.identifier.as_deref())
            .unwrap_or(&self.name)
    }

    pub fn relation(&self, policy: QuotePolicy) -> Relation {
        Relation::new(&self.database, &self.schema, self.relation_identifier())
            .with_quote_policy(policy)
    }

    /// Alias this node is inlined under when ephemeral.
    ///
    /// Package and name both appear, so same-named ephemerals from
    /// different packages never share an alias.
    pub fn cte_alias(&self) -> String {
        format!(
            "{}{}__{}",
            CTE_PREFIX,
            sanitize_identifier(&self.package_name),
            sanitize_identifier(&self.name)
        )
    }

    /// SQL sent to the warehouse: injected when available, else compiled.
    pub fn executable_sql(&self) -> Option<&str> {
        self.injected_sql
            .as_deref()
            .or(self.compiled_code.as_deref())
    }
}

/// Replace anything that is not `[A-Za-z0-9_]` so the result is a bare SQL identifier.
fn sanitize_identifier(raw: &str) -> String {
    raw.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
#[path = "node_test.rs"]
mod tests;
