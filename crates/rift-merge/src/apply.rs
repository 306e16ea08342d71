//! Applier: optimistic replay of a changeset onto a database.
//!
//! Every update and delete carries the values it expects to find. When the
//! target disagrees, the target wins: the operation is skipped and recorded
//! as a [`Conflict`]. Structural failures roll the whole transaction back.

use rusqlite::Connection;
use tracing::{debug, error, info};

use rift_core::{
    CellChange, Changeset, Conflict, ConflictReport, Error, NamedValues, Operation, Result,
    TableChanges, TableFilter, TableSchema, Value,
};
use rift_store::{db, StoreError, StoreResult};

/// Apply `changeset` to `conn` in a single transaction.
///
/// Returns the conflicts found; an `Err` means nothing was written.
pub fn apply_changeset(
    conn: &mut Connection,
    changeset: &Changeset,
    filter: &TableFilter,
) -> Result<ConflictReport> {
    apply_changeset_with(conn, changeset, filter, |_| Ok(()))
}

/// Like [`apply_changeset`], but hands the conflicts to `before_commit`
/// while the transaction is still open. An error from it rolls back.
pub fn apply_changeset_with<F>(
    conn: &mut Connection,
    changeset: &Changeset,
    filter: &TableFilter,
    before_commit: F,
) -> Result<ConflictReport>
where
    F: FnOnce(&ConflictReport) -> Result<()>,
{
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::from(e).into_apply())?;
    let report = match replay(&tx, changeset, filter)
        .map(ConflictReport::from)
        .and_then(|report| before_commit(&report).map(|_| report))
    {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "apply failed, rolling back");
            return Err(e);
        }
    };
    tx.commit().map_err(|e| StoreError::from(e).into_apply())?;
    info!(
        operations = changeset.len(),
        conflicts = report.len(),
        "changeset applied"
    );
    Ok(report)
}

/// Replay `changeset` inside an already open transaction.
pub(crate) fn replay(
    conn: &Connection,
    changeset: &Changeset,
    filter: &TableFilter,
) -> Result<Vec<Conflict>> {
    let mut conflicts = Vec::new();
    for table in changeset.tables() {
        if filter.is_skipped(table.name()) {
            debug!(table = table.name(), "table skipped");
            continue;
        }
        let target = db::table_schema(conn, table.name())
            .map_err(StoreError::into_apply)?
            .ok_or_else(|| {
                Error::Apply(format!("table '{}' does not exist in the target", table.name()))
            })?;
        table.schema.check_compatible(&target).map_err(Error::Apply)?;
        replay_table(conn, table, &mut conflicts).map_err(StoreError::into_apply)?;
    }
    Ok(conflicts)
}

fn replay_table(
    conn: &Connection,
    table: &TableChanges,
    conflicts: &mut Vec<Conflict>,
) -> StoreResult<()> {
    let before = conflicts.len();
    for op in &table.operations {
        if let Some(conflict) = replay_operation(conn, &table.schema, op)? {
            conflicts.push(conflict);
        }
    }
    debug!(
        table = table.name(),
        operations = table.operations.len(),
        conflicts = conflicts.len() - before,
        "table replayed"
    );
    Ok(())
}

fn replay_operation(
    conn: &Connection,
    schema: &TableSchema,
    op: &Operation,
) -> StoreResult<Option<Conflict>> {
    let current = db::find_row(conn, schema, op.key())?;
    let conflict = match (op, current) {
        (Operation::Insert { values, .. }, None) => {
            db::insert_row(conn, schema, values)?;
            None
        }
        (Operation::Insert { values, .. }, Some(row)) => {
            Some(insert_conflict(schema, op, values, &row))
        }
        (Operation::Update { key, cells }, Some(row))
            if cells.iter().all(|c| row[c.column] == c.old) =>
        {
            db::update_cells(conn, schema, key, cells)?;
            None
        }
        (Operation::Update { cells, .. }, row) => {
            Some(update_conflict(schema, op, cells, row.as_deref()))
        }
        (Operation::Delete { key, values }, Some(row)) if row == *values => {
            db::delete_row(conn, schema, key)?;
            None
        }
        (Operation::Delete { values, .. }, row) => {
            Some(delete_conflict(schema, op, values, row.as_deref()))
        }
    };
    Ok(conflict)
}

pub(crate) fn conflict_for(schema: &TableSchema, op: &Operation) -> Conflict {
    let key: NamedValues = schema.named_key(op.key()).into_iter().collect();
    Conflict::new(schema.name.clone(), op.kind(), key)
}

/// Existing row kept; cells list where it differs from the incoming one.
fn insert_conflict(
    schema: &TableSchema,
    op: &Operation,
    values: &[Value],
    existing: &[Value],
) -> Conflict {
    let mut conflict = conflict_for(schema, op);
    for (i, (incoming, current)) in values.iter().zip(existing).enumerate() {
        if incoming != current {
            conflict = conflict.with_cell(
                schema.column_name(i),
                None,
                Some(incoming.clone()),
                Some(current.clone()),
            );
        }
    }
    conflict
}

fn update_conflict(
    schema: &TableSchema,
    op: &Operation,
    cells: &[CellChange],
    existing: Option<&[Value]>,
) -> Conflict {
    let mut conflict = conflict_for(schema, op);
    for cell in cells {
        let current = existing.map(|row| row[cell.column].clone());
        if current.as_ref() != Some(&cell.old) {
            conflict = conflict.with_cell(
                schema.column_name(cell.column),
                Some(cell.old.clone()),
                Some(cell.new.clone()),
                current,
            );
        }
    }
    conflict
}

fn delete_conflict(
    schema: &TableSchema,
    op: &Operation,
    values: &[Value],
    existing: Option<&[Value]>,
) -> Conflict {
    let mut conflict = conflict_for(schema, op);
    if let Some(row) = existing {
        for (i, (expected, current)) in values.iter().zip(row).enumerate() {
            if expected != current {
                conflict = conflict.with_cell(
                    schema.column_name(i),
                    Some(expected.clone()),
                    None,
                    Some(current.clone()),
                );
            }
        }
    }
    conflict
}
