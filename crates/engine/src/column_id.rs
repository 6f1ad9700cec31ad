//! Column identity for the dependency graph.
//!
//! A `ColumnId` names one column of one page. Page names are unique within a
//! session, so the pair is unique too. Renames produce a new id; the graph is
//! rebuilt after every structural change, so ids never go stale inside it.

use serde::{Deserialize, Serialize};

/// Unique identifier for a column in a session.
///
/// Used as graph nodes in the dependency graph. Ordering is by page then
/// column, which keeps graph traversals deterministic.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnId {
    pub page: String,
    pub column: String,
}

impl ColumnId {
    pub fn new(page: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            page: page.into(),
            column: column.into(),
        }
    }
}

impl std::fmt::Display for ColumnId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page, self.column)
    }
}
