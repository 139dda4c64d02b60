//! kiln-sql - SQL layer for kiln
//!
//! Inlines ephemeral models into the SQL of their dependents as common
//! table expressions.

pub mod error;
pub mod inject;
pub mod inline;

pub use error::{SqlError, SqlResult};
pub use inject::inject_ctes;
pub use inline::{inject_ctes_into_sql, render_ctes};
