//! Changeset engine: differ, applier, inverter, rebase and concatenation,
//! plus the path-based [`Rift`] surface tying them to files.

pub mod api;
pub mod apply;
pub mod concat;
pub mod diff;
pub mod invert;
pub mod rebase;

pub use api::{version, Rift};
pub use apply::{apply_changeset, apply_changeset_with};
pub use concat::concat_changesets;
pub use diff::{diff_connections, diff_table, dump_connection};
pub use invert::invert_changeset;
pub use rebase::{create_rebased_changeset, rebase_changeset, rebase_files};
