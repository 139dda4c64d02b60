//! Adapter trait definition

use crate::error::DbResult;
use async_trait::async_trait;
use kiln_core::Relation;
use serde::Serialize;

/// Rows returned by [`Adapter::execute`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl QueryResult {
    /// Value of the first column of the first row, if any.
    pub fn first_value(&self) -> Option<&serde_json::Value> {
        self.rows.first().and_then(|row| row.first())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A column of a physical relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Column {
    pub name: String,
    pub data_type: String,
}

/// Warehouse abstraction the executor drives.
///
/// Implementations must be Send + Sync: one adapter is shared by every
/// worker of a level. The executor awaits one call at a time per node and
/// never retries a failed statement.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Execute a single statement and return its rows
    async fn execute(&self, sql: &str) -> DbResult<QueryResult>;

    /// Execute one or more statements, discarding results
    async fn execute_batch(&self, sql: &str) -> DbResult<()>;

    /// Create a table from a SELECT statement
    async fn create_table_as(&self, relation: &Relation, select: &str) -> DbResult<()>;

    /// Create a view from a SELECT statement
    async fn create_view_as(&self, relation: &Relation, select: &str) -> DbResult<()>;

    /// Create a schema if it does not exist
    async fn create_schema(&self, database: &str, schema: &str) -> DbResult<()>;

    /// Drop a table or view if it exists
    async fn drop_relation(&self, relation: &Relation) -> DbResult<()>;

    /// Rename a relation in place, keeping its database and schema
    async fn rename_relation(&self, from: &Relation, to_identifier: &str) -> DbResult<()>;

    /// Check whether a table or view exists
    async fn already_exists(&self, schema: &str, identifier: &str) -> DbResult<bool>;

    /// Columns of a relation, in ordinal order
    async fn get_columns_in_table(&self, schema: &str, identifier: &str) -> DbResult<Vec<Column>>;

    /// Load a CSV file into a table, replacing it
    async fn load_csv(&self, relation: &Relation, path: &str) -> DbResult<()>;

    /// Best-effort interruption of in-flight statements
    fn cancel(&self) {}

    /// Catalog the connection resolves unqualified names against
    fn default_database(&self) -> &str;

    /// Adapter type identifier for logging
    fn adapter_type(&self) -> &'static str;
}
