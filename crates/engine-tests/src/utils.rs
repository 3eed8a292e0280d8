use chrono::{TimeZone, Utc};
use engine_config::{
    report::summary::RunSummary,
    settings::{
        RetrySettings, RunnerSettings, validated::ValidatedSettings, validator::SettingsValidator,
    },
};
use engine_core::{connectors::target::TargetStore, state::StateStore};
use engine_runtime::{
    error::RunnerError,
    execution::{executor, stores::Stores},
};
use model::{
    pagination::cursor::Cursor,
    records::{
        record::{MessageId, Record},
        row::TargetRow,
    },
};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

/// One sled database in a temporary directory plus the settings pointing at it.
pub struct TestEnv {
    pub dir: TempDir,
    pub settings: ValidatedSettings,
    pub stores: Stores,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_settings(|_| {})
    }

    /// Build an environment after letting `customize` adjust the raw settings.
    pub fn with_settings(customize: impl FnOnce(&mut RunnerSettings)) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut raw = base_settings(&dir);
        customize(&mut raw);

        let settings = SettingsValidator::validate(&raw).expect("valid settings");
        let stores = Stores::open(&settings).expect("open stores");
        Self {
            dir,
            settings,
            stores,
        }
    }

    /// Same database, different salt.
    pub fn resalted(&self, salt: &str) -> ValidatedSettings {
        let mut settings = self.settings.clone();
        settings.salt = salt.to_string();
        settings
    }

    pub async fn append(&self, records: &[Record]) -> Vec<u64> {
        self.stores.source.append(records).await.expect("append")
    }

    pub async fn run(&self) -> Result<RunSummary, RunnerError> {
        self.run_as(&self.settings).await
    }

    pub async fn run_as(&self, settings: &ValidatedSettings) -> Result<RunSummary, RunnerError> {
        executor::run_with(&self.stores, settings, CancellationToken::new()).await
    }

    pub async fn checkpoint(&self) -> Option<Cursor> {
        self.stores
            .state
            .load_checkpoint(&self.settings.runner_key())
            .await
            .expect("load checkpoint")
            .map(|cp| cp.offset)
    }

    pub async fn row(&self, alt_id: &str) -> Option<TargetRow> {
        self.stores.target.get(alt_id).await.expect("get row")
    }

    pub async fn rows(&self) -> Vec<TargetRow> {
        executor::target_rows(&self.stores).await.expect("rows")
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

pub fn base_settings(dir: &TempDir) -> RunnerSettings {
    RunnerSettings {
        runner_id: "turbines".into(),
        source: "bronze".into(),
        target: "silver".into(),
        state_dir: Some(dir.path().join("state")),
        salt: Some("TEST".into()),
        poll_interval_ms: 10,
        chunk_size: 2,
        transform_concurrency: 2,
        create_target_if_missing: true,
        retry: RetrySettings {
            threshold: 3,
            base_delay_ms: 0,
            max_delay_ms: 0,
        },
        ..RunnerSettings::default()
    }
}

/// A turbine reading at `ts` seconds past the epoch.
pub fn reading(device_id: Option<i64>, ts: i64, msg: u64, rpm: f64) -> Record {
    Record {
        device_id,
        message_id: MessageId(msg),
        rpm: Some(rpm),
        angle: Some(0.25),
        timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
    }
}
