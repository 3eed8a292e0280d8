use engine_config::settings::error::SettingsError;
use engine_core::error::{ProgressError, SourceError, StoreError};
use engine_processing::error::TransformError;
use model::pagination::cursor::OffsetRange;
use thiserror::Error;

/// Errors that stop a runner. Chunk-level failures carry the offset range
/// and, when known, the failing `alt_id` so a run can be resumed by hand.
#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("Initialization error: {0}")]
    Initialization(String),

    #[error("Settings error: {0}")]
    Settings(#[from] SettingsError),

    #[error("State store error: {0}")]
    Store(#[from] StoreError),

    #[error("Source ingestion failed: {0}")]
    Source(#[from] SourceError),

    #[error("Progress lookup failed: {0}")]
    Progress(#[from] ProgressError),

    #[error("Chunk transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("Fatal error at {}{}: {source}", fmt_range(.range), fmt_alt_id(.alt_id))]
    Fatal {
        range: Option<OffsetRange>,
        alt_id: Option<String>,
        #[source]
        source: StoreError,
    },

    #[error("Retries exhausted after {attempts} attempts at {}: {last_error}", fmt_range(.range))]
    RetriesExhausted {
        range: Option<OffsetRange>,
        attempts: u32,
        last_error: String,
    },
}

impl RunnerError {
    pub fn range(&self) -> Option<OffsetRange> {
        match self {
            RunnerError::Fatal { range, .. } | RunnerError::RetriesExhausted { range, .. } => {
                *range
            }
            _ => None,
        }
    }
}

fn fmt_range(range: &Option<OffsetRange>) -> String {
    match range {
        Some(r) => format!("offsets {r}"),
        None => "fetch".to_string(),
    }
}

fn fmt_alt_id(alt_id: &Option<String>) -> String {
    match alt_id {
        Some(id) => format!(" (alt_id {id})"),
        None => String::new(),
    }
}
