//! JSON documents written to files: change listings, summaries, conflict
//! reports and database schemas.

use std::io::Write;
use std::path::Path;

use serde::Serialize;

use rift_core::{ConflictReport, Error, Result, TableSchema};

use crate::inspect::{list_changes, list_changes_summary};
use rift_core::Changeset;

/// Pretty-print `value` as JSON into `writer`, with a trailing newline.
pub fn write_json<W: Write, T: Serialize + ?Sized>(mut writer: W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.write_all(b"\n")?;
    Ok(())
}

/// Write `value` as JSON to `path`, replacing any existing file.
pub fn write_json_file<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path)
        .map_err(|e| Error::Io(format!("cannot create {}: {}", path.display(), e)))?;
    write_json(std::io::BufWriter::new(file), value)
}

pub fn write_changes(path: &Path, changeset: &Changeset) -> Result<()> {
    write_json_file(path, &list_changes(changeset))
}

pub fn write_summary(path: &Path, changeset: &Changeset) -> Result<()> {
    write_json_file(path, &list_changes_summary(changeset))
}

pub fn write_conflicts<W: Write>(writer: W, report: &ConflictReport) -> Result<()> {
    write_json(writer, report)
}

pub fn write_conflicts_file(path: &Path, report: &ConflictReport) -> Result<()> {
    write_json_file(path, report)
}

/// Make the file at `path` describe `report`: written when there are
/// conflicts, removed when a clean run leaves an older report behind.
pub fn sync_conflicts_file(path: &Path, report: &ConflictReport) -> Result<()> {
    if !report.is_empty() {
        return write_conflicts_file(path, report);
    }
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::Io(format!(
            "cannot remove stale {}: {}",
            path.display(),
            e
        ))),
    }
}

#[derive(Debug, Serialize)]
struct SchemaDto<'a> {
    tables: Vec<TableDto<'a>>,
}

#[derive(Debug, Serialize)]
struct TableDto<'a> {
    name: &'a str,
    columns: Vec<ColumnDto<'a>>,
}

#[derive(Debug, Serialize)]
struct ColumnDto<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    decl_type: &'a str,
    primary_key: bool,
}

/// Database schema as `{"tables": [{"name", "columns": [{"name", "type", "primary_key"}]}]}`.
pub fn schema_json(tables: &[TableSchema]) -> serde_json::Value {
    let dto = SchemaDto {
        tables: tables
            .iter()
            .map(|t| TableDto {
                name: &t.name,
                columns: t
                    .columns
                    .iter()
                    .map(|c| ColumnDto {
                        name: &c.name,
                        decl_type: &c.decl_type,
                        primary_key: c.is_key(),
                    })
                    .collect(),
            })
            .collect(),
    };
    serde_json::to_value(dto).unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rift_core::{ChangeKind, Column, Conflict, NamedValues, Value};

    #[test]
    fn test_conflict_report_output() {
        let report = ConflictReport::from(vec![Conflict::new(
            "roads",
            ChangeKind::Update,
            vec![("fid".to_string(), Value::Integer(4))].into_iter().collect::<NamedValues>(),
        )
        .with_cell("lanes", Some(Value::Integer(1)), Some(Value::Integer(2)), Some(Value::Integer(3)))]);

        let mut out = Vec::new();
        write_conflicts(&mut out, &report).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["conflicts"][0]["changes"][0]["their"], 2);
        assert_eq!(parsed["conflicts"][0]["changes"][0]["local"], 3);
        assert!(out.ends_with(b"\n"));
    }

    #[test]
    fn test_schema_json() {
        let tables = vec![TableSchema::new(
            "roads",
            vec![Column::key("fid", "INTEGER", 0), Column::new("name", "TEXT")],
        )];
        assert_eq!(
            schema_json(&tables),
            serde_json::json!({
                "tables": [{
                    "name": "roads",
                    "columns": [
                        {"name": "fid", "type": "INTEGER", "primary_key": true},
                        {"name": "name", "type": "TEXT", "primary_key": false}
                    ]
                }]
            })
        );
    }

    #[test]
    fn test_write_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("out.json");
        let err = write_conflicts_file(&path, &ConflictReport::new()).unwrap_err();
        assert_eq!(err.kind(), rift_core::ErrorKind::Io);
    }

    #[test]
    fn test_sync_conflicts_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conflicts.json");

        sync_conflicts_file(&path, &ConflictReport::new()).unwrap();
        assert!(!path.exists());

        let report = ConflictReport::from(vec![Conflict::new(
            "roads",
            ChangeKind::Delete,
            vec![("fid".to_string(), Value::Integer(9))].into_iter().collect::<NamedValues>(),
        )]);
        sync_conflicts_file(&path, &report).unwrap();
        assert!(path.exists());

        sync_conflicts_file(&path, &ConflictReport::new()).unwrap();
        assert!(!path.exists());

        let unwritable = dir.path().join("nope").join("conflicts.json");
        assert!(sync_conflicts_file(&unwritable, &ConflictReport::new()).is_ok());
        assert!(sync_conflicts_file(&unwritable, &report).is_err());
    }
}
