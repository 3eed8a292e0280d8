use crate::error::UpsertError;
use engine_core::{
    connectors::target::TargetStore,
    state::models::CheckpointCommit,
};
use model::{
    core::identifiers::RunnerKey,
    records::{
        batch::Batch,
        merge::{MergeAction, MergeSummary},
        record::PseudonymizedRecord,
        row::TargetRow,
    },
};
use std::sync::Arc;
use tracing::info;

/// Conditional merge of deduplicated records into the target keyed by `alt_id`.
#[derive(Clone)]
pub struct Upserter {
    store: Arc<dyn TargetStore>,
}

impl Upserter {
    pub fn new(store: Arc<dyn TargetStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn TargetStore> {
        &self.store
    }

    /// Insert when absent, replace when the stored message id is strictly
    /// smaller, otherwise leave the stored row alone.
    pub fn decide(existing: Option<&TargetRow>, incoming: &PseudonymizedRecord) -> MergeAction {
        match existing {
            None => MergeAction::Insert,
            Some(row) if row.message_id < incoming.message_id() => MergeAction::Update,
            Some(_) => MergeAction::Skip,
        }
    }

    /// Merge rows without touching any checkpoint.
    pub async fn upsert(&self, rows: &[PseudonymizedRecord]) -> Result<MergeSummary, UpsertError> {
        self.store
            .conditional_upsert(rows, None, &Self::decide)
            .await
            .map_err(|source| UpsertError::Merge {
                target: self.store.name().to_string(),
                source,
            })
    }

    /// Merge a batch and advance the runner's checkpoint in the same commit.
    pub async fn upsert_with_checkpoint(
        &self,
        batch: &Batch,
        key: &RunnerKey,
    ) -> Result<MergeSummary, UpsertError> {
        let commit = CheckpointCommit {
            key: key.clone(),
            expected: batch.cursor,
            next: batch.next,
            batch_id: batch.id.clone(),
        };

        let summary = self
            .store
            .conditional_upsert(&batch.rows, Some(&commit), &Self::decide)
            .await
            .map_err(|source| UpsertError::Merge {
                target: self.store.name().to_string(),
                source,
            })?;

        info!(
            batch_id = %batch.id,
            runner = %key,
            next = %batch.next,
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            "Batch merged"
        );
        Ok(summary)
    }
}
