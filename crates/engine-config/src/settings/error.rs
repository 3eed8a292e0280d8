use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while loading or validating runner settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed settings: {0}")]
    Parse(#[from] serde_json::Error),

    /// A required field was empty or absent.
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Unknown restricted column '{0}'")]
    UnknownColumn(String),
}
