use model::pagination::cursor::Cursor;
use thiserror::Error;

/// Errors raised by the checkpoint, source and target stores.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Sled(#[from] sled::Error),

    #[error("Failed to encode or decode a stored value: {0}")]
    Codec(#[from] bincode::Error),

    #[error("Target '{0}' has no schema; run `saltmerge init` or enable create_target_if_missing")]
    MissingSchema(String),

    #[error("Stored row for alt_id '{alt_id}' is unreadable: {reason}")]
    CorruptRow { alt_id: String, reason: String },

    #[error("Checkpoint for '{key}' moved underneath this runner: expected {expected}, found {found}")]
    CheckpointConflict {
        key: String,
        expected: Cursor,
        found: Cursor,
    },

    #[error("Lease '{key}' is held by '{owner}'")]
    LeaseHeld { key: String, owner: String },

    #[error("Store temporarily unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// The alt_id involved in the failure, when the failure is tied to one row.
    pub fn alt_id(&self) -> Option<&str> {
        match self {
            StoreError::CorruptRow { alt_id, .. } => Some(alt_id),
            _ => None,
        }
    }
}

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to read source file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed CSV input: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to append to source log: {0}")]
    Store(#[from] StoreError),
}

#[derive(Error, Debug)]
pub enum ProgressError {
    #[error("Failed to read WAL: {0}")]
    Wal(String),

    #[error("Failed to load checkpoint: {0}")]
    LoadCheckpoint(String),
}
