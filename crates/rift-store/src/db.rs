use std::path::Path;
use std::time::Duration;

use rusqlite::{params_from_iter, Connection, DatabaseName, OpenFlags, Row};
use tracing::{debug, warn};

use rift_core::{CellChange, Column, RowKey, TableFilter, TableSchema, Value};

use crate::sql::{self, quote_ident, value_from_ref, SqlValue};
use crate::{StoreError, StoreResult};

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A row read from a table, with its primary key extracted.
pub type KeyedRow = (RowKey, Vec<Value>);

/// Open an existing database for reading and writing.
pub fn open(path: &Path) -> StoreResult<Connection> {
    open_with(path, OpenFlags::SQLITE_OPEN_READ_WRITE)
}

/// Open an existing database read-only.
pub fn open_read_only(path: &Path) -> StoreResult<Connection> {
    open_with(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
}

fn open_with(path: &Path, mode: OpenFlags) -> StoreResult<Connection> {
    if !path.is_file() {
        return Err(StoreError::NotFound(path.to_path_buf()));
    }
    let conn = Connection::open_with_flags(path, mode | OpenFlags::SQLITE_OPEN_NO_MUTEX)?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

/// Schemas of all tables that take part in diffing, ordered by name.
///
/// Internal tables, tables matched by `filter`, virtual tables and tables
/// without a primary key are left out.
pub fn list_tables(conn: &Connection, filter: &TableFilter) -> StoreResult<Vec<TableSchema>> {
    let mut stmt =
        conn.prepare("SELECT name, sql FROM sqlite_master WHERE type = 'table' ORDER BY name")?;
    let entries = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut tables = Vec::new();
    for (name, ddl) in entries {
        if TableFilter::is_internal(&name) {
            debug!(table = %name, "skipping internal table");
            continue;
        }
        if filter.is_skipped(&name) {
            debug!(table = %name, "skipping table excluded by configuration");
            continue;
        }
        let is_virtual = ddl
            .as_deref()
            .is_some_and(|sql| sql.trim_start().to_ascii_uppercase().starts_with("CREATE VIRTUAL"));
        if is_virtual {
            warn!(table = %name, "skipping virtual table");
            continue;
        }
        match table_schema(conn, &name)? {
            Some(schema) if schema.has_primary_key() => tables.push(schema),
            _ => warn!(table = %name, "skipping table without a primary key"),
        }
    }
    Ok(tables)
}

/// Column layout of one table, or None when it does not exist.
pub fn table_schema(conn: &Connection, name: &str) -> StoreResult<Option<TableSchema>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(name)))?;
    let columns = stmt
        .query_map([], |row| {
            let column: String = row.get(1)?;
            let decl_type = row.get::<_, Option<String>>(2)?.unwrap_or_default();
            let pk: i64 = row.get(5)?;
            Ok(if pk > 0 {
                Column::key(column, decl_type, (pk - 1) as usize)
            } else {
                Column::new(column, decl_type)
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    if columns.is_empty() {
        return Ok(None);
    }
    Ok(Some(TableSchema::new(name, columns)))
}

fn read_values(row: &Row<'_>, count: usize) -> rusqlite::Result<Vec<Value>> {
    (0..count).map(|i| row.get_ref(i).map(value_from_ref)).collect()
}

/// Every row of a table, sorted by ascending key.
///
/// Rows whose key contains NULL cannot be addressed and are skipped.
pub fn read_rows(conn: &Connection, schema: &TableSchema) -> StoreResult<Vec<KeyedRow>> {
    let mut stmt = conn.prepare(&sql::select_all(schema))?;
    let mut rows = stmt.query([])?;
    let mut out = Vec::new();
    let mut skipped = 0usize;
    while let Some(row) = rows.next()? {
        let values = read_values(row, schema.column_count())?;
        let key = schema.key_of(&values);
        if key.has_null() {
            skipped += 1;
            continue;
        }
        out.push((key, values));
    }
    if skipped > 0 {
        warn!(table = %schema.name, rows = skipped, "skipped rows with NULL in the primary key");
    }
    // SQLite orders mixed integer/real keys differently from RowKey.
    out.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(out)
}

pub fn find_row(
    conn: &Connection,
    schema: &TableSchema,
    key: &RowKey,
) -> StoreResult<Option<Vec<Value>>> {
    let mut stmt = conn.prepare_cached(&sql::select_by_key(schema))?;
    let mut rows = stmt.query(params_from_iter(key.values().iter().map(SqlValue)))?;
    let found = match rows.next()? {
        Some(row) => Some(read_values(row, schema.column_count())?),
        None => None,
    };
    Ok(found)
}

pub fn insert_row(conn: &Connection, schema: &TableSchema, values: &[Value]) -> StoreResult<()> {
    let mut stmt = conn.prepare_cached(&sql::insert(schema))?;
    stmt.execute(params_from_iter(values.iter().map(SqlValue)))?;
    Ok(())
}

/// Write the `new` side of each cell. Returns the number of rows changed.
pub fn update_cells(
    conn: &Connection,
    schema: &TableSchema,
    key: &RowKey,
    cells: &[CellChange],
) -> StoreResult<usize> {
    if cells.is_empty() {
        return Ok(0);
    }
    let columns: Vec<usize> = cells.iter().map(|c| c.column).collect();
    let mut stmt = conn.prepare_cached(&sql::update(schema, &columns))?;
    let params = cells
        .iter()
        .map(|c| SqlValue(&c.new))
        .chain(key.values().iter().map(SqlValue));
    Ok(stmt.execute(params_from_iter(params))?)
}

/// Returns the number of rows deleted.
pub fn delete_row(conn: &Connection, schema: &TableSchema, key: &RowKey) -> StoreResult<usize> {
    let mut stmt = conn.prepare_cached(&sql::delete(schema))?;
    Ok(stmt.execute(params_from_iter(key.values().iter().map(SqlValue)))?)
}

/// Consistent copy of `src` into `dst` through the SQLite backup API.
/// An existing `dst` is overwritten.
pub fn make_copy(src: &Path, dst: &Path) -> StoreResult<()> {
    let conn = open_read_only(src)?;
    conn.backup(DatabaseName::Main, dst, None)?;
    debug!(src = %src.display(), dst = %dst.display(), "copied database");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn fixture(dir: &tempfile::TempDir, name: &str, ddl: &str) -> PathBuf {
        let path = dir.path().join(name);
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(ddl).unwrap();
        path
    }

    const TOWN: &str = "
        CREATE TABLE roads (fid INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT, lanes INTEGER);
        CREATE TABLE parcels (zone TEXT, block INTEGER, owner TEXT, PRIMARY KEY (zone, block));
        CREATE TABLE scratch (a, b);
        INSERT INTO roads (name, lanes) VALUES ('Main', 2), ('High', 4);
        INSERT INTO parcels VALUES ('b', 1, 'ann'), ('a', 2, 'bob'), ('a', 1, 'cy');
    ";

    #[test]
    fn test_open_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = open(&dir.path().join("absent.sqlite")).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
        let core: rift_core::Error = err.into();
        assert_eq!(core.kind(), rift_core::ErrorKind::Io);
    }

    #[test]
    fn test_list_tables() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open(&fixture(&dir, "town.sqlite", TOWN)).unwrap();

        let tables = list_tables(&conn, &TableFilter::default()).unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
        // sqlite_sequence is internal, scratch has no key
        assert_eq!(names, vec!["parcels", "roads"]);

        let parcels = &tables[0];
        assert_eq!(parcels.key_columns(), vec![0, 1]);
        assert_eq!(parcels.columns[2].decl_type, "TEXT");

        let filter = TableFilter::new(&["par.*".to_string()]).unwrap();
        let tables = list_tables(&conn, &filter).unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].name, "roads");
    }

    #[test]
    fn test_table_schema_missing() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(table_schema(&conn, "nothing").unwrap().is_none());
    }

    #[test]
    fn test_read_rows_sorted_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let conn = open(&fixture(&dir, "town.sqlite", TOWN)).unwrap();
        let schema = table_schema(&conn, "parcels").unwrap().unwrap();

        let rows = read_rows(&conn, &schema).unwrap();
        let owners: Vec<&Value> = rows.iter().map(|(_, v)| &v[2]).collect();
        assert_eq!(
            owners,
            vec![&Value::from("cy"), &Value::from("bob"), &Value::from("ann")]
        );
        assert_eq!(
            rows[0].0,
            RowKey::new(vec![Value::from("a"), Value::Integer(1)])
        );
    }

    #[test]
    fn test_null_keys_skipped() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "CREATE TABLE tags (name TEXT PRIMARY KEY, n INTEGER);
             INSERT INTO tags VALUES (NULL, 1), ('x', 2);",
        )
        .unwrap();
        let schema = table_schema(&conn, "tags").unwrap().unwrap();
        let rows = read_rows(&conn, &schema).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].1[1], Value::Integer(2));
    }

    #[test]
    fn test_row_writes_roll_back_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let mut conn = open(&fixture(&dir, "town.sqlite", TOWN)).unwrap();
        let schema = table_schema(&conn, "roads").unwrap().unwrap();
        let key = |i: i64| RowKey::new(vec![Value::Integer(i)]);

        {
            let tx = conn.transaction().unwrap();
            insert_row(&tx, &schema, &[Value::Integer(9), Value::from("Quay"), Value::Null])
                .unwrap();
            let changed = update_cells(
                &tx,
                &schema,
                &key(1),
                &[CellChange::new(2, Value::Integer(2), Value::Integer(3))],
            )
            .unwrap();
            assert_eq!(changed, 1);
            assert_eq!(delete_row(&tx, &schema, &key(2)).unwrap(), 1);
            assert_eq!(delete_row(&tx, &schema, &key(2)).unwrap(), 0);

            assert_eq!(
                find_row(&tx, &schema, &key(1)).unwrap(),
                Some(vec![Value::Integer(1), Value::from("Main"), Value::Integer(3)])
            );
            assert!(find_row(&tx, &schema, &key(9)).unwrap().is_some());
        }

        assert_eq!(read_rows(&conn, &schema).unwrap().len(), 2);
        assert_eq!(
            find_row(&conn, &schema, &key(1)).unwrap().unwrap()[2],
            Value::Integer(2)
        );
    }

    #[test]
    fn test_make_copy() {
        let dir = tempfile::tempdir().unwrap();
        let src = fixture(&dir, "town.sqlite", TOWN);
        let dst = dir.path().join("copy.sqlite");
        make_copy(&src, &dst).unwrap();

        let conn = open_read_only(&dst).unwrap();
        let schema = table_schema(&conn, "parcels").unwrap().unwrap();
        assert_eq!(read_rows(&conn, &schema).unwrap().len(), 3);
    }
}
