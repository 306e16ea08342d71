use std::fmt;

use serde::Serialize;

use crate::schema::TableSchema;
use crate::value::{RowKey, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

impl ChangeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Insert => "insert",
            ChangeKind::Update => "update",
            ChangeKind::Delete => "delete",
        }
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Old and new value of one non-key column touched by an update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellChange {
    pub column: usize,
    pub old: Value,
    pub new: Value,
}

impl CellChange {
    pub fn new(column: usize, old: Value, new: Value) -> Self {
        Self { column, old, new }
    }
}

/// A single row-level change.
///
/// Inserts and deletes carry the full row; updates carry only the columns
/// that differ, in ascending column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operation {
    Insert { key: RowKey, values: Vec<Value> },
    Update { key: RowKey, cells: Vec<CellChange> },
    Delete { key: RowKey, values: Vec<Value> },
}

impl Operation {
    pub fn kind(&self) -> ChangeKind {
        match self {
            Operation::Insert { .. } => ChangeKind::Insert,
            Operation::Update { .. } => ChangeKind::Update,
            Operation::Delete { .. } => ChangeKind::Delete,
        }
    }

    pub fn key(&self) -> &RowKey {
        match self {
            Operation::Insert { key, .. }
            | Operation::Update { key, .. }
            | Operation::Delete { key, .. } => key,
        }
    }

    /// The logical inverse: inserts become deletes, updates swap old and new.
    pub fn inverted(&self) -> Operation {
        match self {
            Operation::Insert { key, values } => Operation::Delete {
                key: key.clone(),
                values: values.clone(),
            },
            Operation::Delete { key, values } => Operation::Insert {
                key: key.clone(),
                values: values.clone(),
            },
            Operation::Update { key, cells } => Operation::Update {
                key: key.clone(),
                cells: cells
                    .iter()
                    .map(|c| CellChange::new(c.column, c.new.clone(), c.old.clone()))
                    .collect(),
            },
        }
    }
}

/// All operations of a changeset that target one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableChanges {
    pub schema: TableSchema,
    pub operations: Vec<Operation>,
}

impl TableChanges {
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            operations: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.schema.name
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn push(&mut self, op: Operation) {
        self.operations.push(op);
    }

    /// True when keys are strictly ascending.
    pub fn is_ordered(&self) -> bool {
        self.operations
            .windows(2)
            .all(|w| w[0].key() < w[1].key())
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.operations.iter().filter(|op| op.kind() == kind).count()
    }

    pub fn find(&self, key: &RowKey) -> Option<&Operation> {
        self.operations
            .binary_search_by(|op| op.key().cmp(key))
            .ok()
            .map(|i| &self.operations[i])
    }
}

/// Ordered sequence of row operations, grouped by table.
///
/// Each table appears at most once and never without operations; within a
/// table operations are sorted by ascending primary key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Changeset {
    tables: Vec<TableChanges>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the changes of one table. Empty tables are dropped.
    pub fn push_table(&mut self, table: TableChanges) {
        if !table.is_empty() {
            self.tables.push(table);
        }
    }

    pub fn tables(&self) -> &[TableChanges] {
        &self.tables
    }

    pub fn into_tables(self) -> Vec<TableChanges> {
        self.tables
    }

    pub fn table(&self, name: &str) -> Option<&TableChanges> {
        self.tables.iter().find(|t| t.name() == name)
    }

    /// Operations in changeset order, each paired with its table schema.
    pub fn iter(&self) -> impl Iterator<Item = (&TableSchema, &Operation)> {
        self.tables
            .iter()
            .flat_map(|t| t.operations.iter().map(move |op| (&t.schema, op)))
    }

    pub fn len(&self) -> usize {
        self.tables.iter().map(|t| t.operations.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn inverted(&self) -> Changeset {
        Changeset {
            tables: self
                .tables
                .iter()
                .map(|t| TableChanges {
                    schema: t.schema.clone(),
                    operations: t.operations.iter().map(Operation::inverted).collect(),
                })
                .collect(),
        }
    }
}

impl FromIterator<TableChanges> for Changeset {
    fn from_iter<I: IntoIterator<Item = TableChanges>>(iter: I) -> Self {
        let mut changeset = Changeset::new();
        for table in iter {
            changeset.push_table(table);
        }
        changeset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Column;

    fn schema() -> TableSchema {
        TableSchema::new(
            "t",
            vec![Column::key("id", "INTEGER", 0), Column::new("x", "INTEGER")],
        )
    }

    fn key(i: i64) -> RowKey {
        RowKey::new(vec![Value::Integer(i)])
    }

    #[test]
    fn test_empty_tables_are_dropped() {
        let mut cs = Changeset::new();
        cs.push_table(TableChanges::new(schema()));
        assert!(cs.is_empty());
        assert_eq!(cs.len(), 0);
    }

    #[test]
    fn test_invert_swaps_roles() {
        let insert = Operation::Insert {
            key: key(1),
            values: vec![Value::Integer(1), Value::Integer(5)],
        };
        assert_eq!(insert.inverted().kind(), ChangeKind::Delete);
        assert_eq!(insert.inverted().inverted(), insert);

        let update = Operation::Update {
            key: key(2),
            cells: vec![CellChange::new(1, Value::Integer(1), Value::Integer(2))],
        };
        match update.inverted() {
            Operation::Update { cells, .. } => {
                assert_eq!(cells[0].old, Value::Integer(2));
                assert_eq!(cells[0].new, Value::Integer(1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ordering_and_lookup() {
        let mut table = TableChanges::new(schema());
        for i in [1, 3, 8] {
            table.push(Operation::Delete {
                key: key(i),
                values: vec![Value::Integer(i), Value::Null],
            });
        }
        assert!(table.is_ordered());
        assert!(table.find(&key(3)).is_some());
        assert!(table.find(&key(4)).is_none());

        table.push(Operation::Delete {
            key: key(2),
            values: vec![Value::Integer(2), Value::Null],
        });
        assert!(!table.is_ordered());
    }

    #[test]
    fn test_iter_visits_tables_in_order() {
        let mut a = TableChanges::new(schema());
        a.push(Operation::Delete { key: key(1), values: vec![] });
        let mut b_schema = schema();
        b_schema.name = "u".into();
        let mut b = TableChanges::new(b_schema);
        b.push(Operation::Delete { key: key(1), values: vec![] });
        b.push(Operation::Delete { key: key(2), values: vec![] });

        let cs: Changeset = vec![a, b].into_iter().collect();
        let names: Vec<&str> = cs.iter().map(|(s, _)| s.name.as_str()).collect();
        assert_eq!(names, vec!["t", "u", "u"]);
        assert_eq!(cs.len(), 3);
    }
}
