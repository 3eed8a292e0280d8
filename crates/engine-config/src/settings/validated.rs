use crate::settings::{RetrySettings, RunMode};
use model::core::identifiers::RunnerKey;
use std::{collections::BTreeSet, fmt, path::PathBuf, time::Duration};

/// Immutable, validated configuration for one runner.
#[derive(Clone)]
pub struct ValidatedSettings {
    pub runner_id: String,
    pub source: String,
    pub target: String,
    pub state_dir: PathBuf,
    /// Secret salt. Never logged; `Debug` prints a placeholder.
    pub salt: String,
    pub mode: RunMode,
    pub poll_interval: Duration,
    pub chunk_size: usize,
    pub transform_concurrency: usize,
    pub excluded_keys: BTreeSet<i64>,
    pub create_target_if_missing: bool,
    pub lease_ttl: Duration,
    pub retry: RetrySettings,
    pub privileged_group: String,
    pub restricted_columns: Vec<String>,
}

impl ValidatedSettings {
    pub fn runner_key(&self) -> RunnerKey {
        RunnerKey::new(self.runner_id.as_str(), self.target.as_str())
    }

    pub fn is_continuous(&self) -> bool {
        self.mode == RunMode::Continuous
    }
}

impl fmt::Debug for ValidatedSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidatedSettings")
            .field("runner_id", &self.runner_id)
            .field("source", &self.source)
            .field("target", &self.target)
            .field("state_dir", &self.state_dir)
            .field("salt", &"<redacted>")
            .field("mode", &self.mode)
            .field("poll_interval", &self.poll_interval)
            .field("chunk_size", &self.chunk_size)
            .field("transform_concurrency", &self.transform_concurrency)
            .field("excluded_keys", &self.excluded_keys)
            .field("create_target_if_missing", &self.create_target_if_missing)
            .field("lease_ttl", &self.lease_ttl)
            .field("retry", &self.retry)
            .field("privileged_group", &self.privileged_group)
            .field("restricted_columns", &self.restricted_columns)
            .finish()
    }
}
