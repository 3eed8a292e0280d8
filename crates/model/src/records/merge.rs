use serde::{Deserialize, Serialize};

/// Outcome of comparing one incoming record against the stored row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeAction {
    Insert,
    Update,
    Skip,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeSummary {
    pub inserted: u64,
    pub updated: u64,
    pub skipped: u64,
}

impl MergeSummary {
    pub fn record(&mut self, action: MergeAction) {
        match action {
            MergeAction::Insert => self.inserted += 1,
            MergeAction::Update => self.updated += 1,
            MergeAction::Skip => self.skipped += 1,
        }
    }

    /// Rows that changed target state.
    pub fn written(&self) -> u64 {
        self.inserted + self.updated
    }

    pub fn total(&self) -> u64 {
        self.inserted + self.updated + self.skipped
    }
}
