//! Concatenation of sequential changesets into one.
//!
//! Operations on the same row are folded together:
//!
//! | First  | Later  | Result |
//! |--------|--------|--------|
//! | INSERT | UPDATE | INSERT with updated values |
//! | INSERT | DELETE | nothing |
//! | UPDATE | UPDATE | single UPDATE original to final, nothing if it reverts |
//! | UPDATE | DELETE | DELETE of the original row |
//! | DELETE | INSERT | UPDATE of the differing columns, nothing if identical |
//! | other  |        | first kept, later ignored |

use std::collections::BTreeMap;

use tracing::{debug, warn};

use rift_core::{
    CellChange, Changeset, Error, Operation, Result, RowKey, TableChanges, TableSchema,
};

struct TableFold {
    schema: TableSchema,
    rows: BTreeMap<RowKey, Operation>,
}

/// Combine `changesets`, applied in order, into a single changeset.
pub fn concat_changesets(changesets: &[Changeset]) -> Result<Changeset> {
    let mut tables: BTreeMap<String, TableFold> = BTreeMap::new();
    for changeset in changesets {
        for table in changeset.tables() {
            let fold = tables
                .entry(table.name().to_string())
                .or_insert_with(|| TableFold {
                    schema: table.schema.clone(),
                    rows: BTreeMap::new(),
                });
            fold.schema
                .check_compatible(&table.schema)
                .map_err(Error::SchemaMismatch)?;
            for op in &table.operations {
                let key = op.key().clone();
                let merged = match fold.rows.remove(&key) {
                    Some(first) => combine(&fold.schema, first, op.clone()),
                    None => Some(op.clone()),
                };
                if let Some(merged) = merged {
                    fold.rows.insert(key, merged);
                }
            }
        }
    }

    let combined: Changeset = tables
        .into_values()
        .map(|fold| TableChanges {
            schema: fold.schema,
            operations: fold.rows.into_values().collect(),
        })
        .collect();
    debug!(
        inputs = changesets.len(),
        operations = combined.len(),
        "changesets concatenated"
    );
    Ok(combined)
}

fn combine(schema: &TableSchema, first: Operation, later: Operation) -> Option<Operation> {
    match (first, later) {
        (Operation::Insert { key, mut values }, Operation::Update { cells, .. }) => {
            for cell in cells {
                values[cell.column] = cell.new;
            }
            Some(Operation::Insert { key, values })
        }
        (Operation::Insert { .. }, Operation::Delete { .. }) => None,
        (Operation::Update { key, cells: first }, Operation::Update { cells: later, .. }) => {
            let mut merged: BTreeMap<usize, CellChange> =
                first.into_iter().map(|c| (c.column, c)).collect();
            for cell in later {
                match merged.get_mut(&cell.column) {
                    Some(existing) => existing.new = cell.new,
                    None => {
                        merged.insert(cell.column, cell);
                    }
                }
            }
            let cells: Vec<CellChange> = merged.into_values().filter(|c| c.old != c.new).collect();
            if cells.is_empty() {
                None
            } else {
                Some(Operation::Update { key, cells })
            }
        }
        (Operation::Update { cells, .. }, Operation::Delete { key, mut values }) => {
            for cell in cells {
                values[cell.column] = cell.old;
            }
            Some(Operation::Delete { key, values })
        }
        (Operation::Delete { key, values: old }, Operation::Insert { values: new, .. }) => {
            let cells: Vec<CellChange> = (0..schema.column_count())
                .filter(|&i| !schema.is_key_column(i) && old[i] != new[i])
                .map(|i| CellChange::new(i, old[i].clone(), new[i].clone()))
                .collect();
            if cells.is_empty() {
                None
            } else {
                Some(Operation::Update { key, cells })
            }
        }
        (first, later) => {
            warn!(
                table = %schema.name,
                key = %first.key(),
                first = %first.kind(),
                later = %later.kind(),
                "ignoring operation that cannot follow the earlier one"
            );
            Some(first)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rift_core::{Column, Value};

    fn schema() -> TableSchema {
        TableSchema::new(
            "stops",
            vec![Column::key("id", "INTEGER", 0), Column::new("name", "TEXT")],
        )
    }

    fn key(id: i64) -> RowKey {
        RowKey::new(vec![Value::Integer(id)])
    }

    fn row(id: i64, name: &str) -> Vec<Value> {
        vec![Value::Integer(id), Value::from(name)]
    }

    fn rename(id: i64, from: &str, to: &str) -> Operation {
        Operation::Update {
            key: key(id),
            cells: vec![CellChange::new(1, Value::from(from), Value::from(to))],
        }
    }

    fn changeset(ops: Vec<Operation>) -> Changeset {
        let mut table = TableChanges::new(schema());
        for op in ops {
            table.push(op);
        }
        std::iter::once(table).collect()
    }

    #[test]
    fn test_insert_then_update_and_delete() {
        let first = changeset(vec![
            Operation::Insert { key: key(1), values: row(1, "a") },
            Operation::Insert { key: key(2), values: row(2, "b") },
        ]);
        let second = changeset(vec![
            rename(1, "a", "z"),
            Operation::Delete { key: key(2), values: row(2, "b") },
        ]);
        let combined = concat_changesets(&[first, second]).unwrap();
        assert_eq!(
            combined,
            changeset(vec![Operation::Insert { key: key(1), values: row(1, "z") }])
        );
    }

    #[test]
    fn test_update_chain() {
        let steps = [
            changeset(vec![rename(1, "a", "b"), rename(2, "x", "y")]),
            changeset(vec![rename(1, "b", "c"), rename(2, "y", "x")]),
        ];
        let combined = concat_changesets(&steps).unwrap();
        assert_eq!(combined, changeset(vec![rename(1, "a", "c")]));
    }

    #[test]
    fn test_update_then_delete_restores_original_row() {
        let steps = [
            changeset(vec![rename(3, "old", "new")]),
            changeset(vec![Operation::Delete { key: key(3), values: row(3, "new") }]),
        ];
        let combined = concat_changesets(&steps).unwrap();
        assert_eq!(
            combined,
            changeset(vec![Operation::Delete { key: key(3), values: row(3, "old") }])
        );
    }

    #[test]
    fn test_delete_then_insert() {
        let steps = [
            changeset(vec![
                Operation::Delete { key: key(1), values: row(1, "a") },
                Operation::Delete { key: key(2), values: row(2, "b") },
            ]),
            changeset(vec![
                Operation::Insert { key: key(1), values: row(1, "a") },
                Operation::Insert { key: key(2), values: row(2, "c") },
            ]),
        ];
        let combined = concat_changesets(&steps).unwrap();
        assert_eq!(combined, changeset(vec![rename(2, "b", "c")]));
    }

    #[test]
    fn test_invalid_sequence_keeps_first() {
        let steps = [
            changeset(vec![Operation::Insert { key: key(1), values: row(1, "a") }]),
            changeset(vec![Operation::Insert { key: key(1), values: row(1, "b") }]),
        ];
        let combined = concat_changesets(&steps).unwrap();
        assert_eq!(combined, steps[0]);
    }

    #[test]
    fn test_tables_merged_in_name_order() {
        let mut other = TableChanges::new(TableSchema::new(
            "agencies",
            vec![Column::key("code", "TEXT", 0)],
        ));
        other.push(Operation::Insert {
            key: RowKey::new(vec![Value::from("mta")]),
            values: vec![Value::from("mta")],
        });
        let steps = [
            changeset(vec![rename(1, "a", "b")]),
            std::iter::once(other).collect(),
        ];
        let combined = concat_changesets(&steps).unwrap();
        let names: Vec<&str> = combined.tables().iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["agencies", "stops"]);
        assert_eq!(combined.len(), 2);
    }

    #[test]
    fn test_schema_conflict() {
        let mut other = TableChanges::new(TableSchema::new(
            "stops",
            vec![Column::key("id", "INTEGER", 0)],
        ));
        other.push(Operation::Insert {
            key: key(5),
            values: vec![Value::Integer(5)],
        });
        let steps = [changeset(vec![rename(1, "a", "b")]), std::iter::once(other).collect()];
        let err = concat_changesets(&steps).unwrap_err();
        assert_eq!(err.kind(), rift_core::ErrorKind::SchemaMismatch);
    }

    #[test]
    fn test_empty_input() {
        assert!(concat_changesets(&[]).unwrap().is_empty());
    }
}
