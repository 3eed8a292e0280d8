use chrono::{DateTime, Utc};
use engine_core::metrics::MetricsSnapshot;
use model::pagination::cursor::Cursor;
use serde::Serialize;

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// A fetch came back empty in drain mode.
    Drained,
    /// Cancelled between chunks.
    Cancelled,
}

/// End-of-run report printed by the CLI.
#[derive(Serialize, Debug, Clone)]
pub struct RunSummary {
    pub runner: String,
    pub target: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stop_reason: StopReason,
    pub final_cursor: Cursor,
    pub batches: u64,
    pub metrics: MetricsSnapshot,
    /// Set when the target was last written under a different salt.
    pub resalted: bool,
}

impl RunSummary {
    pub fn duration_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
