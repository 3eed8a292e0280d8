use chrono::{DateTime, Utc};
use model::{
    core::identifiers::RunnerKey,
    pagination::cursor::{Cursor, OffsetRange},
};
use serde::{Deserialize, Serialize};

/// Durable progress of one (runner, target) pair.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Checkpoint {
    pub runner_id: String,
    pub target: String,
    pub offset: Cursor,
    pub batch_id: String,
    pub rows_done: u64,
    pub updated_at: DateTime<Utc>,
}

/// Checkpoint advance committed together with a merge.
#[derive(Clone, Debug)]
pub struct CheckpointCommit {
    pub key: RunnerKey,
    /// Cursor the chunk was fetched after. The commit is rejected if the stored
    /// cursor no longer matches.
    pub expected: Cursor,
    pub next: Cursor,
    pub batch_id: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Lease {
    pub owner: String,
    pub acquired_at: DateTime<Utc>,
    pub renewed_at: DateTime<Utc>,
    pub ttl_secs: u64,
}

impl Lease {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let ttl = chrono::Duration::seconds(self.ttl_secs.min(i64::MAX as u64) as i64);
        now.signed_duration_since(self.renewed_at) > ttl
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TargetSchema {
    pub name: String,
    pub created_at: DateTime<Utc>,
    /// blake3 fingerprint of the salt last used to write this target.
    pub salt_fingerprint: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub enum WalEntry {
    RunStart {
        runner: String,
        owner: String,
        at: DateTime<Utc>,
    },
    BatchBegin {
        runner: String,
        batch_id: String,
        range: OffsetRange,
        rows: usize,
        rejected: usize,
        checksum: u64,
    },
    BatchCommit {
        runner: String,
        batch_id: String,
        next: Cursor,
        inserted: u64,
        updated: u64,
        skipped: u64,
    },
    Heartbeat {
        runner: String,
        at: DateTime<Utc>,
    },
    CircuitBreakerOpen {
        runner: String,
        range: Option<OffsetRange>,
        failures: u32,
        last_error: String,
    },
    RunDone {
        runner: String,
        drained: bool,
    },
}

impl WalEntry {
    pub fn runner(&self) -> &str {
        match self {
            WalEntry::RunStart { runner, .. } => runner,
            WalEntry::BatchBegin { runner, .. } => runner,
            WalEntry::BatchCommit { runner, .. } => runner,
            WalEntry::Heartbeat { runner, .. } => runner,
            WalEntry::CircuitBreakerOpen { runner, .. } => runner,
            WalEntry::RunDone { runner, .. } => runner,
        }
    }
}
