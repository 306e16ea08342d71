//! Serialized forms of a changeset: the binary codec and the JSON views.

pub mod codec;
pub mod inspect;
pub mod report;

pub use codec::{decode, encode, read_file, write_file};
pub use inspect::{
    changes_count, has_changes, list_changes, list_changes_summary, ChangeEntry, TableSummary,
};
pub use report::{
    schema_json, sync_conflicts_file, write_conflicts, write_conflicts_file, write_json,
    write_json_file,
};
