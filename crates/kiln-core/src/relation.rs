//! Physical relation naming and identifier quoting.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Quote a SQL identifier, doubling any embedded double quotes.
///
/// # Examples
/// ```
/// use kiln_core::relation::quote_ident;
/// assert_eq!(quote_ident("orders"), r#""orders""#);
/// assert_eq!(quote_ident(r#"my"table"#), r#""my""table""#);
/// ```
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Escape a value for use inside a single-quoted SQL string literal.
pub fn escape_sql_string(value: &str) -> String {
    value.replace('\'', "''")
}

/// Which parts of a relation name are quoted when rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct QuotePolicy {
    pub database: bool,
    pub schema: bool,
    pub identifier: bool,
}

impl Default for QuotePolicy {
    fn default() -> Self {
        Self {
            database: true,
            schema: true,
            identifier: true,
        }
    }
}

/// Kind of object a relation is stored as in the warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Table,
    View,
}

impl RelationKind {
    /// SQL keyword for DDL statements.
    pub fn as_sql(self) -> &'static str {
        match self {
            RelationKind::Table => "table",
            RelationKind::View => "view",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A fully qualified `database.schema.identifier` triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relation {
    pub database: String,
    pub schema: String,
    pub identifier: String,
    #[serde(default)]
    pub quote_policy: QuotePolicy,
}

impl Relation {
    pub fn new(
        database: impl Into<String>,
        schema: impl Into<String>,
        identifier: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            schema: schema.into(),
            identifier: identifier.into(),
            quote_policy: QuotePolicy::default(),
        }
    }

    pub fn with_quote_policy(mut self, policy: QuotePolicy) -> Self {
        self.quote_policy = policy;
        self
    }

    /// Same location, different identifier.
    pub fn with_identifier(&self, identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            ..self.clone()
        }
    }

    /// Render the relation as it appears in compiled SQL. An empty database
    /// renders as `schema.identifier`, which resolves against the
    /// connection's current catalog.
    pub fn render(&self) -> String {
        let part = |value: &str, quoted: bool| {
            if quoted {
                quote_ident(value)
            } else {
                value.to_string()
            }
        };
        let tail = format!(
            "{}.{}",
            part(&self.schema, self.quote_policy.schema),
            part(&self.identifier, self.quote_policy.identifier),
        );
        if self.database.is_empty() {
            tail
        } else {
            format!("{}.{}", part(&self.database, self.quote_policy.database), tail)
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_with_embedded_quotes() {
        assert_eq!(quote_ident(r#"a"b"#), r#""a""b""#);
    }

    #[test]
    fn test_render_fully_quoted() {
        let rel = Relation::new("memory", "main", "orders");
        assert_eq!(rel.render(), r#""memory"."main"."orders""#);
    }

    #[test]
    fn test_render_respects_policy() {
        let rel = Relation::new("memory", "main", "orders").with_quote_policy(QuotePolicy {
            database: false,
            schema: false,
            identifier: true,
        });
        assert_eq!(rel.render(), r#"memory.main."orders""#);
    }

    #[test]
    fn test_render_without_database() {
        let rel = Relation::new("", "main", "orders");
        assert_eq!(rel.render(), r#""main"."orders""#);
    }

    #[test]
    fn test_with_identifier_keeps_location() {
        let rel = Relation::new("db", "analytics", "orders");
        let tmp = rel.with_identifier("orders__kiln_tmp");
        assert_eq!(tmp.schema, "analytics");
        assert_eq!(tmp.identifier, "orders__kiln_tmp");
    }

    #[test]
    fn test_escape_sql_string() {
        assert_eq!(escape_sql_string("it's"), "it''s");
    }
}
