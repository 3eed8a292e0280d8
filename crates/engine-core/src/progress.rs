use crate::{
    error::ProgressError,
    state::{StateStore, models::WalEntry},
};
use chrono::{DateTime, Utc};
use model::{core::identifiers::RunnerKey, pagination::cursor::Cursor};
use serde::Serialize;
use std::{fmt, sync::Arc};

#[derive(Clone)]
pub struct ProgressService {
    pub store: Arc<dyn StateStore>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ProgressStage {
    Idle,
    Running,
    Drained,
    Stopped,
    Failed,
}

impl ProgressStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStage::Idle => "Idle",
            ProgressStage::Running => "Running",
            ProgressStage::Drained => "Drained",
            ProgressStage::Stopped => "Stopped",
            ProgressStage::Failed => "Failed",
        }
    }
}

impl fmt::Display for ProgressStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProgressStatus {
    pub runner: String,
    pub stage: ProgressStage,
    pub last_cursor: Cursor,
    pub last_batch: Option<String>,
    pub rows_done: u64,
    pub batches_committed: u64,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub lease_owner: Option<String>,
    pub last_error: Option<String>,
}

impl ProgressService {
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        ProgressService { store }
    }

    /// Status of the most recent run for `key`, folded from the WAL and the
    /// committed checkpoint.
    pub async fn runner_status(&self, key: &RunnerKey) -> Result<ProgressStatus, ProgressError> {
        let wal_entries = self
            .store
            .iter_wal(key)
            .await
            .map_err(|e| ProgressError::Wal(e.to_string()))?;

        let mut stage = ProgressStage::Idle;
        let mut last_heartbeat = None;
        let mut last_error = None;
        let mut batches_committed = 0;

        for entry in &wal_entries {
            match entry {
                WalEntry::RunStart { at, .. } => {
                    stage = ProgressStage::Running;
                    last_heartbeat = Some(*at);
                    last_error = None;
                }
                WalEntry::BatchCommit { .. } => batches_committed += 1,
                WalEntry::Heartbeat { at, .. } => last_heartbeat = Some(*at),
                WalEntry::CircuitBreakerOpen { last_error: e, .. } => {
                    stage = ProgressStage::Failed;
                    last_error = Some(e.clone());
                }
                WalEntry::RunDone { drained, .. } if stage != ProgressStage::Failed => {
                    stage = if *drained {
                        ProgressStage::Drained
                    } else {
                        ProgressStage::Stopped
                    };
                }
                _ => {}
            }
        }

        let checkpoint = self
            .store
            .load_checkpoint(key)
            .await
            .map_err(|err| ProgressError::LoadCheckpoint(err.to_string()))?;

        let lease_owner = self
            .store
            .current_lease(key)
            .await
            .map_err(|err| ProgressError::LoadCheckpoint(err.to_string()))?
            .filter(|lease| !lease.is_expired(Utc::now()))
            .map(|lease| lease.owner);

        let (last_cursor, last_batch, rows_done) = match checkpoint {
            Some(cp) => (cp.offset, Some(cp.batch_id), cp.rows_done),
            None => (Cursor::None, None, 0),
        };

        Ok(ProgressStatus {
            runner: key.to_string(),
            stage,
            last_cursor,
            last_batch,
            rows_done,
            batches_committed,
            last_heartbeat,
            lease_owner,
            last_error,
        })
    }
}
