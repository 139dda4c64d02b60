//! Strongly-typed node identifier.

use crate::node::NodeKind;
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

/// Globally unique, stable identifier of a graph node.
///
/// Formatted as `<kind>.<package>.<name>`; sources use
/// `source.<package>.<source_name>.<table_name>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UniqueId(String);

impl UniqueId {
    /// Wrap an existing id string.
    pub fn new(id: impl Into<String>) -> Self {
        let s = id.into();
        debug_assert!(!s.is_empty(), "UniqueId must not be empty");
        Self(s)
    }

    /// Build the id of a non-source node.
    pub fn for_node(kind: NodeKind, package: &str, name: &str) -> Self {
        Self(format!("{}.{}.{}", kind, package, name))
    }

    /// Build the id of a source table.
    pub fn for_source(package: &str, source_name: &str, table_name: &str) -> Self {
        Self(format!("source.{}.{}.{}", package, source_name, table_name))
    }

    /// Return the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The resource-type prefix (`model`, `seed`, ...).
    pub fn resource_prefix(&self) -> &str {
        self.0.split('.').next().unwrap_or_default()
    }
}

impl fmt::Display for UniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for UniqueId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Deref for UniqueId {
    type Target = str;
    fn deref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for UniqueId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for UniqueId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UniqueId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl PartialEq<str> for UniqueId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for UniqueId {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}
