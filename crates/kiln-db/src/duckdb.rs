//! DuckDB adapter implementation

use crate::error::{DbError, DbResult};
use crate::relation_cache::RelationCache;
use crate::traits::{Adapter, Column, QueryResult};
use async_trait::async_trait;
use duckdb::types::ValueRef;
use duckdb::Connection;
use kiln_core::relation::{escape_sql_string, quote_ident};
use kiln_core::{Relation, RelationKind};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// DuckDB adapter
pub struct DuckDbBackend {
    conn: Mutex<Connection>,
    cache: RelationCache,
    catalog: String,
}

impl DuckDbBackend {
    /// Create a new in-memory DuckDB connection. Its catalog is named `memory`.
    pub fn in_memory() -> DbResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Self::from_connection(conn)
    }

    /// Create a new DuckDB connection from a file path
    pub fn from_path(path: &Path) -> DbResult<Self> {
        let conn = Connection::open(path).map_err(|e| DbError::ConnectionError(e.to_string()))?;
        Self::from_connection(conn)
    }

    /// Create from path string (handles :memory: special case)
    pub fn new(path: &str) -> DbResult<Self> {
        if path == ":memory:" {
            Self::in_memory()
        } else {
            Self::from_path(Path::new(path))
        }
    }

    fn from_connection(conn: Connection) -> DbResult<Self> {
        let catalog: String = conn
            .query_row("select current_database()", [], |row| row.get(0))
            .map_err(|e| DbError::ConnectionError(e.to_string()))?;
        log::debug!("DuckDB connection opened on catalog {}", catalog);
        Ok(Self {
            conn: Mutex::new(conn),
            cache: RelationCache::new(),
            catalog,
        })
    }

    /// Relation-existence cache backing `already_exists`.
    pub fn relation_cache(&self) -> &RelationCache {
        &self.cache
    }

    fn lock(&self) -> DbResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| DbError::MutexPoisoned(e.to_string()))
    }

    /// Execute a statement and collect its rows.
    ///
    /// DuckDB panics on `stmt.column_count()` before execution, so rows are
    /// collected via `query_map` first and column metadata read afterwards.
    fn query_sync(&self, sql: &str) -> DbResult<QueryResult> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql).map_err(|e| with_sql(e, sql))?;

        let rows: Vec<Vec<serde_json::Value>> = stmt
            .query_map([], |row| {
                let col_count = row.as_ref().column_count();
                Ok((0..col_count).map(|i| column_value(row, i)).collect())
            })
            .map_err(|e| with_sql(e, sql))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| with_sql(e, sql))?;

        let columns: Vec<String> = (0..stmt.column_count())
            .map(|i| {
                stmt.column_name(i)
                    .map_or("?".to_string(), |v| v.to_string())
            })
            .collect();

        Ok(QueryResult { columns, rows })
    }

    /// Execute a statement whose result is not needed
    fn execute_sync(&self, sql: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute(sql, []).map_err(|e| with_sql(e, sql))?;
        Ok(())
    }

    fn execute_batch_sync(&self, sql: &str) -> DbResult<()> {
        let conn = self.lock()?;
        conn.execute_batch(sql).map_err(|e| with_sql(e, sql))
    }

    /// Tables and views of `schema` in the current catalog
    fn catalog_relations(&self, schema: &str) -> DbResult<Vec<(String, RelationKind)>> {
        let sql = format!(
            "SELECT table_name, table_type FROM information_schema.tables \
             WHERE table_catalog = current_database() AND table_schema = '{}'",
            escape_sql_string(schema)
        );
        let result = self.query_sync(&sql)?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| {
                let name = row.first()?.as_str()?.to_string();
                let kind = match row.get(1).and_then(|v| v.as_str()) {
                    Some("VIEW") => RelationKind::View,
                    _ => RelationKind::Table,
                };
                Some((name, kind))
            })
            .collect())
    }

    /// Kind of an existing relation, consulting the catalog when the cache
    /// has not seen the schema yet.
    fn relation_kind(&self, schema: &str, identifier: &str) -> DbResult<Option<RelationKind>> {
        if let Some(kind) = self.cache.lookup(schema, identifier) {
            return Ok(kind);
        }
        let entries = self.catalog_relations(schema)?;
        let kind = entries
            .iter()
            .find(|(name, _)| name == identifier)
            .map(|(_, kind)| *kind);
        self.cache.load_schema(schema, entries);
        Ok(kind)
    }

    /// Arbitrary statements may create or drop relations behind the cache's back.
    fn invalidate_after(&self, sql: &str) {
        if !is_read_only(sql) {
            self.cache.clear();
        }
    }

    fn create_as(&self, relation: &Relation, kind: RelationKind, select: &str) -> DbResult<()> {
        let sql = format!("create {} {} as\n{}", kind.as_sql(), relation.render(), select);
        self.execute_sync(&sql)?;
        self.cache.add(&relation.schema, &relation.identifier, kind);
        Ok(())
    }
}

#[async_trait]
impl Adapter for DuckDbBackend {
    async fn execute(&self, sql: &str) -> DbResult<QueryResult> {
        let result = self.query_sync(sql);
        self.invalidate_after(sql);
        result
    }

    async fn execute_batch(&self, sql: &str) -> DbResult<()> {
        let result = self.execute_batch_sync(sql);
        self.invalidate_after(sql);
        result
    }

    async fn create_table_as(&self, relation: &Relation, select: &str) -> DbResult<()> {
        self.create_as(relation, RelationKind::Table, select)
    }

    async fn create_view_as(&self, relation: &Relation, select: &str) -> DbResult<()> {
        self.create_as(relation, RelationKind::View, select)
    }

    async fn create_schema(&self, database: &str, schema: &str) -> DbResult<()> {
        let sql = if database.is_empty() {
            format!("create schema if not exists {}", quote_ident(schema))
        } else {
            format!(
                "create schema if not exists {}.{}",
                quote_ident(database),
                quote_ident(schema)
            )
        };
        self.execute_sync(&sql)
    }

    async fn drop_relation(&self, relation: &Relation) -> DbResult<()> {
        match self.relation_kind(&relation.schema, &relation.identifier)? {
            Some(kind) => {
                self.execute_sync(&format!("drop {} if exists {}", kind.as_sql(), relation.render()))?;
            }
            None => {
                // Not in the catalog under this exact name; identifiers may
                // still match case-insensitively, so try both kinds.
                for kind in [RelationKind::View, RelationKind::Table] {
                    let sql = format!("drop {} if exists {}", kind.as_sql(), relation.render());
                    if let Err(e) = self.execute_sync(&sql) {
                        log::debug!("ignoring failed fallback drop of {}: {}", relation, e);
                    }
                }
            }
        }
        self.cache.drop(&relation.schema, &relation.identifier);
        Ok(())
    }

    async fn rename_relation(&self, from: &Relation, to_identifier: &str) -> DbResult<()> {
        let kind = self
            .relation_kind(&from.schema, &from.identifier)?
            .ok_or_else(|| DbError::TableNotFound(from.render()))?;
        let target = if from.quote_policy.identifier {
            quote_ident(to_identifier)
        } else {
            to_identifier.to_string()
        };
        let sql = format!("alter {} {} rename to {}", kind.as_sql(), from.render(), target);
        self.execute_sync(&sql)?;
        self.cache.rename(&from.schema, &from.identifier, to_identifier);
        Ok(())
    }

    async fn already_exists(&self, schema: &str, identifier: &str) -> DbResult<bool> {
        Ok(self.relation_kind(schema, identifier)?.is_some())
    }

    async fn get_columns_in_table(&self, schema: &str, identifier: &str) -> DbResult<Vec<Column>> {
        let sql = format!(
            "SELECT column_name, data_type FROM information_schema.columns \
             WHERE table_catalog = current_database() AND table_schema = '{}' AND table_name = '{}' \
             ORDER BY ordinal_position",
            escape_sql_string(schema),
            escape_sql_string(identifier)
        );
        let result = self.query_sync(&sql)?;
        Ok(result
            .rows
            .into_iter()
            .map(|row| {
                let text = |i: usize| {
                    row.get(i)
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string()
                };
                Column {
                    name: text(0),
                    data_type: text(1),
                }
            })
            .collect())
    }

    async fn load_csv(&self, relation: &Relation, path: &str) -> DbResult<()> {
        if self.relation_kind(&relation.schema, &relation.identifier)? == Some(RelationKind::View) {
            self.execute_sync(&format!("drop view if exists {}", relation.render()))?;
        }
        let sql = format!(
            "create or replace table {} as select * from read_csv_auto('{}')",
            relation.render(),
            escape_sql_string(path)
        );
        self.execute_sync(&sql).map_err(|e| match e {
            DbError::ExecutionError(msg) => DbError::CsvError(msg),
            other => other,
        })?;
        self.cache
            .add(&relation.schema, &relation.identifier, RelationKind::Table);
        Ok(())
    }

    fn default_database(&self) -> &str {
        &self.catalog
    }

    fn adapter_type(&self) -> &'static str {
        "duckdb"
    }
}

/// Attach the failing statement to execution errors.
fn with_sql(err: duckdb::Error, sql: &str) -> DbError {
    match DbError::from(err) {
        DbError::ExecutionError(msg) => DbError::ExecutionError(format!("{}: {}", msg, sql)),
        other => other,
    }
}

/// Read a column value as JSON, trying DuckDB types from narrowest to widest.
fn column_value(row: &duckdb::Row<'_>, idx: usize) -> serde_json::Value {
    match row.get_ref(idx) {
        Ok(ValueRef::Null) => return serde_json::Value::Null,
        Ok(ValueRef::Boolean(b)) => return serde_json::Value::Bool(b),
        Ok(ValueRef::Float(f)) => return float_value(f64::from(f)),
        Ok(ValueRef::Double(f)) => return float_value(f),
        _ => {}
    }
    if let Ok(n) = row.get::<_, i64>(idx) {
        return serde_json::Value::from(n);
    }
    if let Ok(f) = row.get::<_, f64>(idx) {
        return float_value(f);
    }
    if let Ok(s) = row.get::<_, String>(idx) {
        return serde_json::Value::String(s);
    }
    serde_json::Value::Null
}

fn float_value(f: f64) -> serde_json::Value {
    serde_json::Number::from_f64(f)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

fn is_read_only(sql: &str) -> bool {
    let first = sql
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase();
    matches!(
        first.as_str(),
        "select" | "with" | "show" | "describe" | "explain" | "from" | "values"
    )
}

#[cfg(test)]
#[path = "duckdb_test.rs"]
mod tests;
