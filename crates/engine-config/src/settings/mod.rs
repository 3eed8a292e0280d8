use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

pub mod error;
pub mod validated;
pub mod validator;

pub const SALT_ENV: &str = "SALTMERGE_SALT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    /// Stop once a fetch returns no new records.
    #[default]
    Drain,
    /// Keep polling the source until cancelled.
    Continuous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub threshold: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            threshold: 5,
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

impl RetrySettings {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedactionSettings {
    pub privileged_group: String,
    pub restricted_columns: Vec<String>,
}

impl Default for RedactionSettings {
    fn default() -> Self {
        Self {
            privileged_group: "test".to_string(),
            restricted_columns: vec!["rpm".to_string(), "angle".to_string()],
        }
    }
}

/// Settings as written in the JSON file. Every field except the names has a
/// default; [`validator::SettingsValidator`] turns this into [`validated::ValidatedSettings`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerSettings {
    pub runner_id: String,
    pub source: String,
    pub target: String,
    pub state_dir: Option<PathBuf>,
    pub salt: Option<String>,
    pub mode: RunMode,
    pub poll_interval_ms: u64,
    pub chunk_size: usize,
    pub transform_concurrency: usize,
    pub excluded_keys: Vec<i64>,
    pub create_target_if_missing: bool,
    pub lease_ttl_secs: u64,
    pub retry: RetrySettings,
    pub redaction: RedactionSettings,
}

impl Default for RunnerSettings {
    fn default() -> Self {
        Self {
            runner_id: String::new(),
            source: String::new(),
            target: String::new(),
            state_dir: None,
            salt: None,
            mode: RunMode::Drain,
            poll_interval_ms: 5_000,
            chunk_size: 1_000,
            transform_concurrency: 4,
            excluded_keys: vec![0],
            create_target_if_missing: false,
            lease_ttl_secs: 60,
            retry: RetrySettings::default(),
            redaction: RedactionSettings::default(),
        }
    }
}

impl RunnerSettings {
    pub fn from_json(json: &str) -> Result<Self, error::SettingsError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load(path: impl Into<PathBuf>) -> Result<Self, error::SettingsError> {
        let path = path.into();
        let raw = std::fs::read_to_string(&path).map_err(|source| error::SettingsError::Read {
            path: path.clone(),
            source,
        })?;
        Self::from_json(&raw)
    }

    /// Apply overrides from the environment. Only the salt is overridable.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(salt) = lookup(SALT_ENV).filter(|s| !s.is_empty()) {
            self.salt = Some(salt);
        }
    }

    /// Override the run mode. Must happen before validation.
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn to_json_pretty(&self) -> Result<String, error::SettingsError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

pub fn default_state_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".saltmerge")
        .join("state")
}
