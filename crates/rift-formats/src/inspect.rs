//! Read-only views of a changeset: change listing, per-table summary, counts.

use std::collections::BTreeMap;

use serde::Serialize;

use rift_core::{ChangeKind, Changeset, NamedValues, Operation, TableSchema, Value};

/// One operation as presented to users and tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeEntry {
    pub table: String,
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub key: NamedValues,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old: Option<NamedValues>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new: Option<NamedValues>,
}

impl ChangeEntry {
    pub fn from_operation(schema: &TableSchema, op: &Operation) -> Self {
        let key: NamedValues = schema.named_key(op.key()).into_iter().collect();
        let (old, new) = match op {
            Operation::Insert { values, .. } => (None, Some(full_row(schema, values))),
            Operation::Delete { values, .. } => (Some(full_row(schema, values)), None),
            Operation::Update { cells, .. } => {
                let old = cells
                    .iter()
                    .map(|c| (schema.column_name(c.column).to_string(), c.old.clone()))
                    .collect();
                let new = cells
                    .iter()
                    .map(|c| (schema.column_name(c.column).to_string(), c.new.clone()))
                    .collect();
                (Some(old), Some(new))
            }
        };
        Self {
            table: schema.name.clone(),
            kind: op.kind(),
            key,
            old,
            new,
        }
    }
}

fn full_row(schema: &TableSchema, values: &[Value]) -> NamedValues {
    schema
        .columns
        .iter()
        .zip(values)
        .map(|(c, v)| (c.name.clone(), v.clone()))
        .collect()
}

/// Insert/update/delete counts of one table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableSummary {
    pub insert: usize,
    pub update: usize,
    pub delete: usize,
}

impl TableSummary {
    pub fn total(&self) -> usize {
        self.insert + self.update + self.delete
    }
}

/// Every operation, in changeset order.
pub fn list_changes(changeset: &Changeset) -> Vec<ChangeEntry> {
    changeset
        .iter()
        .map(|(schema, op)| ChangeEntry::from_operation(schema, op))
        .collect()
}

/// Per-table operation counts, keyed by table name.
pub fn list_changes_summary(changeset: &Changeset) -> BTreeMap<String, TableSummary> {
    let mut summary: BTreeMap<String, TableSummary> = BTreeMap::new();
    for table in changeset.tables() {
        let entry = summary.entry(table.name().to_string()).or_default();
        entry.insert += table.count(ChangeKind::Insert);
        entry.update += table.count(ChangeKind::Update);
        entry.delete += table.count(ChangeKind::Delete);
    }
    summary
}

pub fn changes_count(changeset: &Changeset) -> usize {
    changeset.len()
}

pub fn has_changes(changeset: &Changeset) -> bool {
    changes_count(changeset) > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rift_core::{CellChange, Column, RowKey, TableChanges};

    fn sample() -> Changeset {
        let schema = TableSchema::new(
            "trees",
            vec![
                Column::key("fid", "INTEGER", 0),
                Column::new("species", "TEXT"),
                Column::new("height", "REAL"),
            ],
        );
        let key = |i: i64| RowKey::new(vec![Value::Integer(i)]);
        let mut trees = TableChanges::new(schema);
        trees.push(Operation::Insert {
            key: key(1),
            values: vec![Value::Integer(1), Value::from("kauri"), Value::Real(30.5)],
        });
        trees.push(Operation::Update {
            key: key(2),
            cells: vec![CellChange::new(2, Value::Real(4.0), Value::Real(4.5))],
        });
        trees.push(Operation::Delete {
            key: key(3),
            values: vec![Value::Integer(3), Value::from("rimu"), Value::Null],
        });
        trees.push(Operation::Delete {
            key: key(4),
            values: vec![Value::Integer(4), Value::Null, Value::Null],
        });

        let mut notes = TableChanges::new(TableSchema::new(
            "notes",
            vec![Column::key("id", "INTEGER", 0), Column::new("body", "TEXT")],
        ));
        notes.push(Operation::Insert {
            key: key(9),
            values: vec![Value::Integer(9), Value::from("hello")],
        });
        vec![trees, notes].into_iter().collect()
    }

    #[test]
    fn test_list_changes_json() {
        let json = serde_json::to_value(list_changes(&sample())).unwrap();
        assert_eq!(
            json[0],
            serde_json::json!({
                "table": "trees",
                "type": "insert",
                "key": {"fid": 1},
                "new": {"fid": 1, "species": "kauri", "height": 30.5}
            })
        );
        assert_eq!(
            json[1],
            serde_json::json!({
                "table": "trees",
                "type": "update",
                "key": {"fid": 2},
                "old": {"height": 4.0},
                "new": {"height": 4.5}
            })
        );
        assert_eq!(json[2]["type"], "delete");
        assert!(json[2].get("new").is_none());
        assert_eq!(json[4]["table"], "notes");
    }

    #[test]
    fn test_summary_agrees_with_count() {
        let cs = sample();
        let summary = list_changes_summary(&cs);
        assert_eq!(
            summary["trees"],
            TableSummary {
                insert: 1,
                update: 1,
                delete: 2
            }
        );
        assert_eq!(summary["notes"].total(), 1);
        let total: usize = summary.values().map(TableSummary::total).sum();
        assert_eq!(total, changes_count(&cs));
        assert_eq!(list_changes(&cs).len(), changes_count(&cs));
        assert!(has_changes(&cs));
    }

    #[test]
    fn test_empty_changeset() {
        let cs = Changeset::new();
        assert!(list_changes(&cs).is_empty());
        assert!(list_changes_summary(&cs).is_empty());
        assert_eq!(changes_count(&cs), 0);
        assert!(!has_changes(&cs));
    }
}
