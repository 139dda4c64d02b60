//! What the executor does with each kind of node.

use kiln_core::NodeKind;

/// Executor behavior selected per [`NodeKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Build the node's relation according to its materialization
    Materialize,
    /// Load the node's CSV file into a table
    LoadSeed,
    /// Append the current query result with a capture timestamp
    Snapshot,
    /// Count rows returned by the test query
    AssertNoRows,
    /// Run the SQL as written
    ExecuteStatements,
    /// Never dispatched
    NotExecutable,
}

/// Look up the executor behavior for a node kind.
pub fn capability(kind: NodeKind) -> Capability {
    match kind {
        NodeKind::Model => Capability::Materialize,
        NodeKind::Seed => Capability::LoadSeed,
        NodeKind::Snapshot => Capability::Snapshot,
        NodeKind::Test => Capability::AssertNoRows,
        NodeKind::Operation => Capability::ExecuteStatements,
        NodeKind::Source => Capability::NotExecutable,
    }
}
