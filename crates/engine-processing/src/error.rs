use engine_core::error::StoreError;
use model::records::record::MessageId;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SaltError {
    #[error("Record {message_id} at offset {offset} has no natural key")]
    InvalidInput { message_id: MessageId, offset: u64 },
}

#[derive(Error, Debug)]
pub enum TransformError {
    #[error("Salting worker failed: {0}")]
    Worker(String),
}

#[derive(Error, Debug)]
pub enum UpsertError {
    #[error("Merge into '{target}' failed: {source}")]
    Merge {
        target: String,
        #[source]
        source: StoreError,
    },
}

impl UpsertError {
    pub fn store_error(&self) -> &StoreError {
        match self {
            UpsertError::Merge { source, .. } => source,
        }
    }

    pub fn into_store_error(self) -> StoreError {
        match self {
            UpsertError::Merge { source, .. } => source,
        }
    }
}
