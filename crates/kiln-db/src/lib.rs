//! kiln-db - Warehouse adapter layer for kiln
//!
//! This crate provides the `Adapter` trait the executor drives, a
//! relation-existence cache shared across workers, and the DuckDB adapter.

pub mod duckdb;
pub mod error;
pub mod relation_cache;
pub mod traits;

pub use crate::duckdb::DuckDbBackend;
pub use error::{DbError, DbResult};
pub use relation_cache::RelationCache;
pub use traits::{Adapter, Column, QueryResult};
