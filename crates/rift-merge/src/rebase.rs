//! Three-way merge of two histories sharing a base snapshot.
//!
//! The core works on changesets only: each local operation is paired with
//! the operation their side made on the same row, if any, and is kept,
//! dropped, or reported as a conflict. [`rebase_files`] drives the same core
//! against database files through a staging copy, so a failed rebase never
//! touches the local file.

use std::path::{Path, PathBuf};

use rusqlite::Connection;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use rift_core::{
    CellChange, Changeset, Conflict, ConflictPolicy, ConflictReport, Error, Operation, Result,
    RowKey, TableChanges, TableFilter, TableSchema, Value,
};
use rift_store::{db, StoreError};

use crate::apply::{conflict_for, replay};
use crate::diff::diff_connections;

/// Rebase `local` onto `their`. Both must start from the same snapshot.
///
/// Returns the local changes re-expressed on top of `their`, plus one
/// conflict per local operation that collided with their edits.
pub fn rebase_changeset(
    local: &Changeset,
    their: &Changeset,
    policy: ConflictPolicy,
) -> Result<(Changeset, Vec<Conflict>)> {
    let mut rebased = Changeset::new();
    let mut conflicts = Vec::new();
    for table in local.tables() {
        let out = match their.table(table.name()) {
            None => table.clone(),
            Some(theirs) => {
                table
                    .schema
                    .check_compatible(&theirs.schema)
                    .map_err(Error::SchemaMismatch)?;
                rebase_table(table, theirs, policy, &mut conflicts)
            }
        };
        rebased.push_table(out);
    }
    debug!(
        operations = rebased.len(),
        conflicts = conflicts.len(),
        "changeset rebased"
    );
    Ok((rebased, conflicts))
}

fn rebase_table(
    local: &TableChanges,
    their: &TableChanges,
    policy: ConflictPolicy,
    conflicts: &mut Vec<Conflict>,
) -> TableChanges {
    let mut out = TableChanges::new(local.schema.clone());
    for op in &local.operations {
        let resolved = match their.find(op.key()) {
            None => Some(op.clone()),
            Some(their_op) => {
                let (resolved, conflict) = resolve(&local.schema, op, their_op, policy);
                conflicts.extend(conflict);
                resolved
            }
        };
        if let Some(op) = resolved {
            out.push(op);
        }
    }
    out
}

fn with_cells(values: &[Value], cells: &[CellChange]) -> Vec<Value> {
    let mut row = values.to_vec();
    for cell in cells {
        row[cell.column] = cell.new.clone();
    }
    row
}

fn update_or_nothing(key: &RowKey, cells: Vec<CellChange>) -> Option<Operation> {
    if cells.is_empty() {
        None
    } else {
        Some(Operation::Update {
            key: key.clone(),
            cells,
        })
    }
}

/// Decide what becomes of `local` given that `their` touched the same row.
fn resolve(
    schema: &TableSchema,
    local: &Operation,
    their: &Operation,
    policy: ConflictPolicy,
) -> (Option<Operation>, Option<Conflict>) {
    let keep_local = policy == ConflictPolicy::Local;
    let mut conflict = conflict_for(schema, local);
    let key = local.key();

    let resolved = match (local, their) {
        (Operation::Insert { values: mine, .. }, Operation::Insert { values: theirs, .. }) => {
            let differing: Vec<usize> = (0..schema.column_count())
                .filter(|&i| !schema.is_key_column(i) && mine[i] != theirs[i])
                .collect();
            if differing.is_empty() {
                return (None, None);
            }
            for &i in &differing {
                conflict = conflict.with_cell(
                    schema.column_name(i),
                    None,
                    Some(theirs[i].clone()),
                    Some(mine[i].clone()),
                );
            }
            let cells = differing
                .into_iter()
                .map(|i| CellChange::new(i, theirs[i].clone(), mine[i].clone()))
                .collect();
            update_or_nothing(key, cells)
        }
        (Operation::Insert { values: mine, .. }, Operation::Update { cells: theirs, .. }) => {
            let mut cells = Vec::new();
            for t in theirs.iter().filter(|t| t.new != mine[t.column]) {
                conflict = conflict.with_cell(
                    schema.column_name(t.column),
                    Some(t.old.clone()),
                    Some(t.new.clone()),
                    Some(mine[t.column].clone()),
                );
                cells.push(CellChange::new(t.column, t.new.clone(), mine[t.column].clone()));
            }
            update_or_nothing(key, cells)
        }
        (Operation::Insert { values: mine, .. }, Operation::Delete { values: theirs, .. }) => {
            for i in 0..schema.column_count() {
                conflict = conflict.with_cell(
                    schema.column_name(i),
                    Some(theirs[i].clone()),
                    None,
                    Some(mine[i].clone()),
                );
            }
            Some(local.clone())
        }
        (Operation::Update { cells: mine, .. }, Operation::Insert { values: theirs, .. }) => {
            let mut cells = Vec::new();
            for c in mine.iter().filter(|c| c.new != theirs[c.column]) {
                conflict = conflict.with_cell(
                    schema.column_name(c.column),
                    Some(c.old.clone()),
                    Some(theirs[c.column].clone()),
                    Some(c.new.clone()),
                );
                cells.push(CellChange::new(c.column, theirs[c.column].clone(), c.new.clone()));
            }
            update_or_nothing(key, cells)
        }
        (Operation::Update { cells: mine, .. }, Operation::Update { cells: theirs, .. }) => {
            let mut kept = Vec::new();
            for c in mine {
                match theirs.iter().find(|t| t.column == c.column) {
                    None => kept.push(c.clone()),
                    Some(t) if t.new == c.new => {}
                    Some(t) => {
                        conflict = conflict.with_cell(
                            schema.column_name(c.column),
                            Some(c.old.clone()),
                            Some(t.new.clone()),
                            Some(c.new.clone()),
                        );
                        if keep_local {
                            kept.push(CellChange::new(c.column, t.new.clone(), c.new.clone()));
                        }
                    }
                }
            }
            let conflict = (!conflict.changes.is_empty()).then_some(conflict);
            return (update_or_nothing(key, kept), conflict);
        }
        (Operation::Update { cells: mine, .. }, Operation::Delete { values: base, .. }) => {
            for c in mine {
                conflict = conflict.with_cell(
                    schema.column_name(c.column),
                    Some(c.old.clone()),
                    None,
                    Some(c.new.clone()),
                );
            }
            Some(Operation::Insert {
                key: key.clone(),
                values: with_cells(base, mine),
            })
        }
        (Operation::Delete { values: mine, .. }, Operation::Insert { values: theirs, .. }) => {
            for i in 0..schema.column_count() {
                conflict = conflict.with_cell(
                    schema.column_name(i),
                    Some(mine[i].clone()),
                    Some(theirs[i].clone()),
                    None,
                );
            }
            Some(Operation::Delete {
                key: key.clone(),
                values: theirs.clone(),
            })
        }
        (Operation::Delete { values: mine, .. }, Operation::Update { cells: theirs, .. }) => {
            for t in theirs {
                conflict = conflict.with_cell(
                    schema.column_name(t.column),
                    Some(t.old.clone()),
                    Some(t.new.clone()),
                    None,
                );
            }
            Some(Operation::Delete {
                key: key.clone(),
                values: with_cells(mine, theirs),
            })
        }
        (Operation::Delete { .. }, Operation::Delete { .. }) => return (None, None),
    };

    debug!(table = %schema.name, key = %key, "rebase conflict");
    (resolved.filter(|_| keep_local), Some(conflict))
}

/// Diff `local` against `base` and rebase the result onto `their`, an
/// existing changeset from the same base.
pub fn create_rebased_changeset(
    base: &Connection,
    local: &Connection,
    their: &Changeset,
    filter: &TableFilter,
    policy: ConflictPolicy,
) -> Result<(Changeset, ConflictReport)> {
    let local_changes = diff_connections(base, local, filter)?;
    let (rebased, conflicts) = rebase_changeset(&local_changes, their, policy)?;
    info!(
        operations = rebased.len(),
        conflicts = conflicts.len(),
        "rebased changeset created"
    );
    Ok((rebased, ConflictReport::from(conflicts)))
}

/// Rebase the database file `local` onto `their`; both derive from `base`.
///
/// On success `local` holds their changes plus the surviving local ones and
/// the conflicts are returned. `before_persist` sees the conflicts before the
/// rebased file replaces `local`; on any error, its own included, `local` is
/// unchanged.
pub fn rebase_files<F>(
    base: &Path,
    their: &Path,
    local: &Path,
    filter: &TableFilter,
    policy: ConflictPolicy,
    before_persist: F,
) -> Result<ConflictReport>
where
    F: FnOnce(&ConflictReport) -> Result<()>,
{
    let (local_changes, their_changes) = {
        let base_conn = db::open_read_only(base)?;
        let local_conn = db::open_read_only(local)?;
        let their_conn = db::open_read_only(their)?;
        (
            diff_connections(&base_conn, &local_conn, filter)?,
            diff_connections(&base_conn, &their_conn, filter)?,
        )
    };
    let (rebased, conflicts) = rebase_changeset(&local_changes, &their_changes, policy)?;
    let mut report = ConflictReport::from(conflicts);

    let staging = StagingCopy::create(local)?;
    debug!(path = %staging.path.display(), "staging copy created");
    let late = match replay_rebase(&staging.path, &local_changes, &their_changes, &rebased, filter) {
        Ok(late) => late,
        Err(e) => {
            error!(error = %e, "rebase failed, local database left untouched");
            return Err(e);
        }
    };
    if !late.is_empty() {
        warn!(conflicts = late.len(), "rebased changes did not apply cleanly");
    }
    report.extend(late);
    if let Err(e) = before_persist(&report) {
        error!(error = %e, "rebase aborted, local database left untouched");
        return Err(e);
    }
    staging.persist(local)?;

    info!(
        local_operations = local_changes.len(),
        their_operations = their_changes.len(),
        conflicts = report.len(),
        "rebase finished"
    );
    Ok(report)
}

/// Revert local, apply theirs, then the rebased local changes, all in one
/// transaction on the staging file.
fn replay_rebase(
    staging: &Path,
    local_changes: &Changeset,
    their_changes: &Changeset,
    rebased: &Changeset,
    filter: &TableFilter,
) -> Result<Vec<Conflict>> {
    let mut conn = db::open(staging)?;
    let tx = conn
        .transaction()
        .map_err(|e| StoreError::from(e).into_apply())?;
    expect_clean(replay(&tx, &local_changes.inverted(), filter)?, "reverting local changes")?;
    expect_clean(replay(&tx, their_changes, filter)?, "applying their changes")?;
    let late = replay(&tx, rebased, filter)?;
    tx.commit().map_err(|e| StoreError::from(e).into_apply())?;
    Ok(late)
}

/// Conflicts before the rebased stage mean another writer changed the file.
fn expect_clean(conflicts: Vec<Conflict>, stage: &str) -> Result<()> {
    if conflicts.is_empty() {
        return Ok(());
    }
    Err(Error::Apply(format!(
        "{} conflicts while {}; the database was modified during the rebase",
        conflicts.len(),
        stage
    )))
}

/// Temporary copy of a database next to the original, removed on drop
/// unless persisted.
struct StagingCopy {
    path: PathBuf,
    persisted: bool,
}

impl StagingCopy {
    fn create(original: &Path) -> Result<Self> {
        let name = original
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let staging = Self {
            path: original.with_file_name(format!(".{}.{}.rebase", name, Uuid::new_v4().simple())),
            persisted: false,
        };
        db::make_copy(original, &staging.path)?;
        Ok(staging)
    }

    /// Move the staging file over `target`.
    fn persist(mut self, target: &Path) -> Result<()> {
        std::fs::rename(&self.path, target)
            .map_err(|e| Error::Io(format!("cannot replace {}: {}", target.display(), e)))?;
        self.persisted = true;
        Ok(())
    }
}

impl Drop for StagingCopy {
    fn drop(&mut self) {
        if !self.persisted {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}
