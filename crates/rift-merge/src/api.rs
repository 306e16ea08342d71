//! Path-based entry points, one per engine operation.
//!
//! Changesets are read from and written to files in the binary format, JSON
//! documents go to files, and databases are named by path. Every call checks
//! its paths first and fails with [`Error::Usage`] on empty paths or when an
//! output would overwrite an input.

use std::path::{Path, PathBuf};

use tracing::info;

use rift_core::logging::{self, LogCallback};
use rift_core::{Changeset, Config, ConflictReport, Error, Result, TableFilter, TableSchema};
use rift_formats::{codec, inspect, report};
use rift_store::db;

use crate::{apply, concat, diff, invert, rebase};

/// Engine handle carrying configuration and an optional log sink.
///
/// Holds no open databases; each call opens and releases what it needs.
#[derive(Clone)]
pub struct Rift {
    config: Config,
    filter: TableFilter,
    logger: Option<LogCallback>,
}

impl std::fmt::Debug for Rift {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rift")
            .field("config", &self.config)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

type Named<'a> = (&'a str, &'a Path);

fn check_paths(inputs: &[Named<'_>], outputs: &[Named<'_>]) -> Result<()> {
    for (name, path) in inputs.iter().chain(outputs) {
        if path.as_os_str().is_empty() {
            return Err(Error::Usage(format!("{} path is empty", name)));
        }
    }
    for (out_name, out) in outputs {
        for (in_name, input) in inputs {
            if out == input {
                return Err(Error::Usage(format!(
                    "{} and {} must be different files",
                    out_name, in_name
                )));
            }
        }
    }
    Ok(())
}

impl Rift {
    pub fn new(config: Config) -> Result<Self> {
        let filter = config.table_filter()?;
        Ok(Self {
            config,
            filter,
            logger: None,
        })
    }

    /// Engine configured from `RIFT_LOGGER_LEVEL` and `RIFT_SKIP_TABLES`.
    pub fn from_env() -> Result<Self> {
        Self::new(Config::from_env()?)
    }

    /// Deliver diagnostics of every call to `logger`, filtered by the
    /// configured log level.
    pub fn with_logger(mut self, logger: LogCallback) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn run<T>(&self, f: impl FnOnce() -> Result<T>) -> Result<T> {
        match &self.logger {
            Some(logger) => logging::with_callback(self.config.log_level, logger.clone(), f),
            None => f(),
        }
    }

    /// Write the changes turning `base` into `modified` to `changeset`.
    pub fn create_changeset(&self, base: &Path, modified: &Path, changeset: &Path) -> Result<()> {
        check_paths(
            &[("base", base), ("modified", modified)],
            &[("changeset", changeset)],
        )?;
        self.run(|| {
            let base_conn = db::open_read_only(base)?;
            let modified_conn = db::open_read_only(modified)?;
            let changes = diff::diff_connections(&base_conn, &modified_conn, &self.filter)?;
            codec::write_file(changeset, &changes)
        })
    }

    pub fn invert_changeset(&self, changeset: &Path, inverted: &Path) -> Result<()> {
        check_paths(&[("changeset", changeset)], &[("inverted changeset", inverted)])?;
        self.run(|| {
            let changes = codec::read_file(changeset)?;
            codec::write_file(inverted, &invert::invert_changeset(&changes))
        })
    }

    /// Apply `changeset` to `database` in place. Conflicting operations are
    /// skipped and returned.
    pub fn apply_changeset(&self, database: &Path, changeset: &Path) -> Result<ConflictReport> {
        check_paths(&[("database", database), ("changeset", changeset)], &[])?;
        self.run(|| {
            let changes = codec::read_file(changeset)?;
            let mut conn = db::open(database)?;
            apply::apply_changeset(&mut conn, &changes, &self.filter)
        })
    }

    /// [`Rift::apply_changeset`] that also keeps `conflicts` in sync with the
    /// result. If the report cannot be written nothing is applied. Returns
    /// the number of conflicts.
    pub fn apply_changeset_with_report(
        &self,
        database: &Path,
        changeset: &Path,
        conflicts: &Path,
    ) -> Result<usize> {
        check_paths(
            &[("database", database), ("changeset", changeset)],
            &[("conflict file", conflicts)],
        )?;
        self.run(|| {
            let changes = codec::read_file(changeset)?;
            let mut conn = db::open(database)?;
            let outcome = apply::apply_changeset_with(&mut conn, &changes, &self.filter, |found| {
                report::sync_conflicts_file(conflicts, found)
            })?;
            Ok(outcome.len())
        })
    }

    /// Rebase the local database onto their version; both derive from `base`.
    ///
    /// Conflicts, if any, are written to `conflicts` as JSON before `local`
    /// is replaced; a report left by an earlier run is removed when there are
    /// none. Returns the number of conflicts.
    pub fn rebase(&self, base: &Path, their: &Path, local: &Path, conflicts: &Path) -> Result<usize> {
        check_paths(
            &[("base", base), ("their", their)],
            &[("local", local), ("conflict file", conflicts)],
        )?;
        check_paths(&[("local", local)], &[("conflict file", conflicts)])?;
        self.run(|| {
            let outcome = rebase::rebase_files(
                base,
                their,
                local,
                &self.filter,
                self.config.conflict_policy,
                |found| report::sync_conflicts_file(conflicts, found),
            )?;
            Ok(outcome.len())
        })
    }

    /// Rebase the changes between `base` and `local` onto `their_changeset`
    /// and write the result to `rebased`. Returns the number of conflicts,
    /// which are written to `conflicts` as JSON.
    pub fn create_rebased_changeset(
        &self,
        base: &Path,
        local: &Path,
        their_changeset: &Path,
        rebased: &Path,
        conflicts: &Path,
    ) -> Result<usize> {
        check_paths(
            &[("base", base), ("local", local), ("their changeset", their_changeset)],
            &[("rebased changeset", rebased), ("conflict file", conflicts)],
        )?;
        check_paths(&[("rebased changeset", rebased)], &[("conflict file", conflicts)])?;
        self.run(|| {
            let their = codec::read_file(their_changeset)?;
            let base_conn = db::open_read_only(base)?;
            let local_conn = db::open_read_only(local)?;
            let (changes, found) = rebase::create_rebased_changeset(
                &base_conn,
                &local_conn,
                &their,
                &self.filter,
                self.config.conflict_policy,
            )?;
            codec::write_file(rebased, &changes)?;
            report::sync_conflicts_file(conflicts, &found)?;
            Ok(found.len())
        })
    }

    /// Write every change of `changeset` as a JSON array to `json`.
    pub fn list_changes(&self, changeset: &Path, json: &Path) -> Result<()> {
        check_paths(&[("changeset", changeset)], &[("json", json)])?;
        self.run(|| report::write_changes(json, &codec::read_file(changeset)?))
    }

    /// Write per-table insert/update/delete counts to `json`.
    pub fn list_changes_summary(&self, changeset: &Path, json: &Path) -> Result<()> {
        check_paths(&[("changeset", changeset)], &[("json", json)])?;
        self.run(|| report::write_summary(json, &codec::read_file(changeset)?))
    }

    pub fn has_changes(&self, changeset: &Path) -> Result<bool> {
        check_paths(&[("changeset", changeset)], &[])?;
        self.run(|| Ok(inspect::has_changes(&codec::read_file(changeset)?)))
    }

    pub fn changes_count(&self, changeset: &Path) -> Result<usize> {
        check_paths(&[("changeset", changeset)], &[])?;
        self.run(|| Ok(inspect::changes_count(&codec::read_file(changeset)?)))
    }

    /// Combine sequential changesets into `output`.
    pub fn concat_changes(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        if inputs.len() < 2 {
            return Err(Error::Usage(
                "at least two changesets are needed to concatenate".to_string(),
            ));
        }
        let named: Vec<Named<'_>> = inputs.iter().map(|p| ("input changeset", p.as_path())).collect();
        check_paths(&named, &[("output changeset", output)])?;
        self.run(|| {
            let changesets = inputs
                .iter()
                .map(|p| codec::read_file(p))
                .collect::<Result<Vec<Changeset>>>()?;
            codec::write_file(output, &concat::concat_changesets(&changesets)?)
        })
    }

    /// Write every row of `database` as inserts to `changeset`.
    pub fn dump_data(&self, database: &Path, changeset: &Path) -> Result<()> {
        check_paths(&[("database", database)], &[("changeset", changeset)])?;
        self.run(|| {
            let conn = db::open_read_only(database)?;
            codec::write_file(changeset, &diff::dump_connection(&conn, &self.filter)?)
        })
    }

    /// Tables of `database` that take part in diffing.
    pub fn tables(&self, database: &Path) -> Result<Vec<TableSchema>> {
        check_paths(&[("database", database)], &[])?;
        self.run(|| {
            let conn = db::open_read_only(database)?;
            Ok(db::list_tables(&conn, &self.filter)?)
        })
    }

    /// Write the tables of `database` and their columns to `json`.
    pub fn schema(&self, database: &Path, json: &Path) -> Result<()> {
        check_paths(&[("database", database)], &[("json", json)])?;
        let tables = self.tables(database)?;
        self.run(|| report::write_json_file(json, &report::schema_json(&tables)))
    }

    /// Consistent copy of `src` to `dst`, overwriting `dst`.
    pub fn make_copy(&self, src: &Path, dst: &Path) -> Result<()> {
        check_paths(&[("source", src)], &[("destination", dst)])?;
        self.run(|| {
            db::make_copy(src, dst)?;
            info!(src = %src.display(), dst = %dst.display(), "database copied");
            Ok(())
        })
    }
}

/// Library version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
