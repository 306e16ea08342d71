use tracing::debug;

use rift_core::Changeset;

/// Changeset undoing `changeset`.
///
/// Inserts and deletes swap, updates exchange old and new values. Table and
/// key order are unchanged.
pub fn invert_changeset(changeset: &Changeset) -> Changeset {
    let inverted = changeset.inverted();
    debug!(operations = inverted.len(), "changeset inverted");
    inverted
}
