use crate::error::UpsertError;
use engine_core::{error::StoreError, retry::RetryDisposition};

pub fn classify_store_error(err: &StoreError) -> RetryDisposition {
    match err {
        StoreError::Sled(sled_err) => classify_sled_error(sled_err),
        StoreError::Unavailable(_) => RetryDisposition::Retry,
        StoreError::Codec(_) => RetryDisposition::Stop,
        StoreError::MissingSchema(_) => RetryDisposition::Stop,
        StoreError::CorruptRow { .. } => RetryDisposition::Stop,
        StoreError::CheckpointConflict { .. } => RetryDisposition::Stop,
        StoreError::LeaseHeld { .. } => RetryDisposition::Stop,
    }
}

pub fn classify_upsert_error(err: &UpsertError) -> RetryDisposition {
    classify_store_error(err.store_error())
}

fn classify_sled_error(err: &sled::Error) -> RetryDisposition {
    match err {
        sled::Error::Io(_) => RetryDisposition::Retry,
        sled::Error::CollectionNotFound(_) => RetryDisposition::Stop,
        sled::Error::Unsupported(_) => RetryDisposition::Stop,
        sled::Error::ReportableBug(_) => RetryDisposition::Stop,
        sled::Error::Corruption { .. } => RetryDisposition::Stop,
    }
}
