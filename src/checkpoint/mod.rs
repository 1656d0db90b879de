//! Reversible checkpoints over a target repository's working tree.

pub mod git;

pub use git::CheckpointManager;

use crate::errors::CheckpointError;

pub const SAVEPOINT_PREFIX: &str = "savepoint/";

pub fn savepoint_name(phase: &str) -> String {
    format!("{}{}", SAVEPOINT_PREFIX, phase)
}

/// Snapshot / restore / discard / head over some version-control backend.
///
/// Rolling back switches the working tree to the snapshot. It does not undo
/// commits made afterwards on whatever branch the caller was on.
pub trait Checkpointer {
    /// Create a snapshot named `savepoint/{phase}` and switch to it.
    fn create_savepoint(&self, phase: &str) -> Result<String, CheckpointError>;

    fn rollback_to_savepoint(&self, name: &str) -> Result<(), CheckpointError>;

    /// Remove a snapshot. Absence is not an error.
    fn delete_savepoint(&self, name: &str) -> Result<(), CheckpointError>;

    /// Current head revision, or `None` outside a repository.
    fn current_revision(&self) -> Option<String>;
}
