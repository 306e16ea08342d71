use serde::Serialize;

use crate::changeset::ChangeKind;
use crate::value::{NamedValues, Value};

/// One conflicting column of a conflict entry.
///
/// `base` is the value both sides started from, `their` the value the other
/// side (or the incoming changeset) wanted, `local` the value found or
/// intended locally. A `None` means the row does not exist on that side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictCell {
    pub column: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub their: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local: Option<Value>,
}

/// A row-level conflict. One conflicting operation produces one entry,
/// carrying every cell that disagreed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Conflict {
    pub table: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub key: NamedValues,
    pub changes: Vec<ConflictCell>,
}

impl Conflict {
    pub fn new(table: impl Into<String>, kind: ChangeKind, key: NamedValues) -> Self {
        Self {
            table: table.into(),
            kind,
            key,
            changes: Vec::new(),
        }
    }

    pub fn with_cell(
        mut self,
        column: impl Into<String>,
        base: Option<Value>,
        their: Option<Value>,
        local: Option<Value>,
    ) -> Self {
        self.changes.push(ConflictCell {
            column: column.into(),
            base,
            their,
            local,
        });
        self
    }
}

/// Conflicts produced by one engine invocation, in the order they arose.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    pub conflicts: Vec<Conflict>,
}

impl ConflictReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, conflict: Conflict) {
        self.conflicts.push(conflict);
    }

    pub fn extend(&mut self, conflicts: impl IntoIterator<Item = Conflict>) {
        self.conflicts.extend(conflicts);
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }
}

impl From<Vec<Conflict>> for ConflictReport {
    fn from(conflicts: Vec<Conflict>) -> Self {
        Self { conflicts }
    }
}
