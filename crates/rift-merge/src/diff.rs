//! Differ: row-level changes between two database snapshots.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use rusqlite::Connection;
use tracing::{debug, info, warn};

use rift_core::{
    CellChange, Changeset, Error, Operation, Result, TableChanges, TableFilter, TableSchema,
};
use rift_store::db::{self, KeyedRow};

/// Merge-join two key-sorted row sets of the same table.
///
/// Keys only in `modified` become inserts, keys only in `base` deletes, and
/// keys in both an update carrying the differing non-key columns.
pub fn diff_table(schema: &TableSchema, base: &[KeyedRow], modified: &[KeyedRow]) -> TableChanges {
    let mut changes = TableChanges::new(schema.clone());
    let (mut b, mut m) = (0, 0);

    while b < base.len() || m < modified.len() {
        let order = match (base.get(b), modified.get(m)) {
            (Some((bk, _)), Some((mk, _))) => bk.cmp(mk),
            (Some(_), None) => Ordering::Less,
            (None, _) => Ordering::Greater,
        };
        match order {
            Ordering::Less => {
                let (key, values) = &base[b];
                changes.push(Operation::Delete {
                    key: key.clone(),
                    values: values.clone(),
                });
                b += 1;
            }
            Ordering::Greater => {
                let (key, values) = &modified[m];
                changes.push(Operation::Insert {
                    key: key.clone(),
                    values: values.clone(),
                });
                m += 1;
            }
            Ordering::Equal => {
                let (key, old) = &base[b];
                let new = &modified[m].1;
                let cells: Vec<CellChange> = (0..schema.column_count())
                    .filter(|&i| !schema.is_key_column(i) && old[i] != new[i])
                    .map(|i| CellChange::new(i, old[i].clone(), new[i].clone()))
                    .collect();
                if !cells.is_empty() {
                    changes.push(Operation::Update {
                        key: key.clone(),
                        cells,
                    });
                }
                b += 1;
                m += 1;
            }
        }
    }
    changes
}

fn tables_by_name(conn: &Connection, filter: &TableFilter) -> Result<BTreeMap<String, TableSchema>> {
    Ok(db::list_tables(conn, filter)?
        .into_iter()
        .map(|t| (t.name.clone(), t))
        .collect())
}

/// Changeset turning `base` into `modified`. Tables are visited by name.
pub fn diff_connections(
    base: &Connection,
    modified: &Connection,
    filter: &TableFilter,
) -> Result<Changeset> {
    let base_tables = tables_by_name(base, filter)?;
    let modified_tables = tables_by_name(modified, filter)?;
    let names: BTreeSet<&String> = base_tables.keys().chain(modified_tables.keys()).collect();

    let mut changeset = Changeset::new();
    for name in names {
        let table = match (base_tables.get(name), modified_tables.get(name)) {
            (Some(old), Some(new)) => {
                old.check_compatible(new).map_err(Error::SchemaMismatch)?;
                if !old.same_declared_types(new) {
                    warn!(table = %name, "declared column types differ between snapshots");
                }
                diff_table(new, &db::read_rows(base, old)?, &db::read_rows(modified, new)?)
            }
            (Some(old), None) => {
                debug!(table = %name, "table removed");
                diff_table(old, &db::read_rows(base, old)?, &[])
            }
            (None, Some(new)) => {
                debug!(table = %name, "table added");
                diff_table(new, &[], &db::read_rows(modified, new)?)
            }
            (None, None) => continue,
        };
        debug!(table = %name, operations = table.operations.len(), "diffed table");
        changeset.push_table(table);
    }
    info!(
        tables = changeset.tables().len(),
        operations = changeset.len(),
        "changeset created"
    );
    Ok(changeset)
}

/// Every row of every table as inserts.
pub fn dump_connection(conn: &Connection, filter: &TableFilter) -> Result<Changeset> {
    let mut changeset = Changeset::new();
    for schema in db::list_tables(conn, filter)? {
        let rows = db::read_rows(conn, &schema)?;
        changeset.push_table(diff_table(&schema, &[], &rows));
    }
    info!(operations = changeset.len(), "database dumped");
    Ok(changeset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rift_core::{ChangeKind, Column, RowKey, Value};

    fn schema() -> TableSchema {
        TableSchema::new(
            "wells",
            vec![
                Column::key("id", "INTEGER", 0),
                Column::new("depth", "REAL"),
                Column::new("note", "TEXT"),
            ],
        )
    }

    fn row(id: i64, depth: f64, note: &str) -> KeyedRow {
        (
            RowKey::new(vec![Value::Integer(id)]),
            vec![Value::Integer(id), Value::Real(depth), Value::from(note)],
        )
    }

    #[test]
    fn test_merge_join() {
        let base = vec![row(1, 10.0, "a"), row(2, 20.0, "b"), row(4, 40.0, "d")];
        let modified = vec![row(2, 25.0, "b"), row(3, 30.0, "c"), row(4, 40.0, "d")];
        let changes = diff_table(&schema(), &base, &modified);

        let kinds: Vec<ChangeKind> = changes.operations.iter().map(Operation::kind).collect();
        assert_eq!(
            kinds,
            vec![ChangeKind::Delete, ChangeKind::Update, ChangeKind::Insert]
        );
        assert!(changes.is_ordered());
        match &changes.operations[1] {
            Operation::Update { cells, .. } => {
                assert_eq!(
                    cells,
                    &vec![CellChange::new(1, Value::Real(20.0), Value::Real(25.0))]
                );
            }
            other => panic!("expected update, got {:?}", other),
        }
    }

    #[test]
    fn test_identical_rows_yield_nothing() {
        let rows = vec![row(1, 1.0, "x"), row(2, 2.0, "y")];
        assert!(diff_table(&schema(), &rows, &rows).is_empty());
    }

    #[test]
    fn test_one_sided_tables() {
        let rows = vec![row(1, 1.0, "x"), row(2, 2.0, "y")];
        let added = diff_table(&schema(), &[], &rows);
        assert_eq!(added.count(ChangeKind::Insert), 2);
        let removed = diff_table(&schema(), &rows, &[]);
        assert_eq!(removed.count(ChangeKind::Delete), 2);
    }

    #[test]
    fn test_integer_and_real_differ() {
        let base = vec![(
            RowKey::new(vec![Value::Integer(1)]),
            vec![Value::Integer(1), Value::Integer(5), Value::Null],
        )];
        let modified = vec![(
            RowKey::new(vec![Value::Integer(1)]),
            vec![Value::Integer(1), Value::Real(5.0), Value::Null],
        )];
        assert_eq!(diff_table(&schema(), &base, &modified).operations.len(), 1);
    }

    #[test]
    fn test_schema_mismatch() {
        let base = Connection::open_in_memory().unwrap();
        base.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT);")
            .unwrap();
        let modified = Connection::open_in_memory().unwrap();
        modified
            .execute_batch("CREATE TABLE t (id INTEGER, v TEXT PRIMARY KEY);")
            .unwrap();
        let err = diff_connections(&base, &modified, &TableFilter::default()).unwrap_err();
        assert_eq!(err.kind(), rift_core::ErrorKind::SchemaMismatch);
    }
}
