use crate::{
    error::StoreError,
    state::{
        models::{Checkpoint, CheckpointCommit, TargetSchema},
        sled_store::{CHECKPOINTS_TREE, SCHEMAS_TREE},
    },
};
use async_trait::async_trait;
use chrono::Utc;
use model::{
    pagination::cursor::Cursor,
    records::{
        merge::{MergeAction, MergeSummary},
        record::PseudonymizedRecord,
        row::TargetRow,
    },
};
use sled::{
    Transactional,
    transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError},
};
use tracing::{debug, info};

/// Decides what to do with one incoming record given the currently stored row.
pub type MergeDecision<'a> =
    &'a (dyn Fn(Option<&TargetRow>, &PseudonymizedRecord) -> MergeAction + Send + Sync);

/// Keyed row store supporting conditional insert-or-update.
#[async_trait]
pub trait TargetStore: Send + Sync {
    fn name(&self) -> &str;

    /// Load the schema record, creating it when allowed.
    async fn ensure_schema(&self, create_if_missing: bool) -> Result<TargetSchema, StoreError>;

    /// Store the salt fingerprint used to write this target, returning the previous one.
    async fn swap_salt_fingerprint(&self, fingerprint: &str)
    -> Result<Option<String>, StoreError>;

    /// Apply `decide` to every record and write the result. All writes, and the
    /// checkpoint advance when `commit` is given, land in one transaction.
    async fn conditional_upsert(
        &self,
        rows: &[PseudonymizedRecord],
        commit: Option<&CheckpointCommit>,
        decide: MergeDecision<'_>,
    ) -> Result<MergeSummary, StoreError>;

    async fn get(&self, alt_id: &str) -> Result<Option<TargetRow>, StoreError>;

    async fn rows(&self) -> Result<Vec<TargetRow>, StoreError>;
}

/// Merge target stored in a sled tree keyed by `alt_id`.
#[derive(Clone)]
pub struct SledTarget {
    name: String,
    db: sled::Db,
    rows: sled::Tree,
    checkpoints: sled::Tree,
    schemas: sled::Tree,
}

impl SledTarget {
    pub fn open(db: &sled::Db, name: &str) -> Result<Self, StoreError> {
        Ok(Self {
            name: name.to_string(),
            db: db.clone(),
            rows: db.open_tree(format!("target:{name}"))?,
            checkpoints: db.open_tree(CHECKPOINTS_TREE)?,
            schemas: db.open_tree(SCHEMAS_TREE)?,
        })
    }

    fn load_schema(&self) -> Result<Option<TargetSchema>, StoreError> {
        match self.schemas.get(self.name.as_bytes())? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn decode_row(alt_id: &str, bytes: &[u8]) -> Result<TargetRow, StoreError> {
        bincode::deserialize(bytes).map_err(|e| StoreError::CorruptRow {
            alt_id: alt_id.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl TargetStore for SledTarget {
    fn name(&self) -> &str {
        &self.name
    }

    async fn ensure_schema(&self, create_if_missing: bool) -> Result<TargetSchema, StoreError> {
        if let Some(schema) = self.load_schema()? {
            return Ok(schema);
        }
        if !create_if_missing {
            return Err(StoreError::MissingSchema(self.name.clone()));
        }

        let schema = TargetSchema {
            name: self.name.clone(),
            created_at: Utc::now(),
            salt_fingerprint: None,
        };
        // Lost races keep whichever schema landed first.
        let _ = self.schemas.compare_and_swap(
            self.name.as_bytes(),
            None::<&[u8]>,
            Some(bincode::serialize(&schema)?),
        )?;
        self.schemas.flush_async().await?;
        info!(table = %self.name, "Created target schema");

        self.load_schema()?
            .ok_or_else(|| StoreError::MissingSchema(self.name.clone()))
    }

    async fn swap_salt_fingerprint(
        &self,
        fingerprint: &str,
    ) -> Result<Option<String>, StoreError> {
        let mut schema = self
            .load_schema()?
            .ok_or_else(|| StoreError::MissingSchema(self.name.clone()))?;
        let previous = schema.salt_fingerprint.replace(fingerprint.to_string());

        if previous.as_deref() != Some(fingerprint) {
            self.schemas
                .insert(self.name.as_bytes(), bincode::serialize(&schema)?)?;
            self.schemas.flush_async().await?;
        }
        Ok(previous)
    }

    async fn conditional_upsert(
        &self,
        rows: &[PseudonymizedRecord],
        commit: Option<&CheckpointCommit>,
        decide: MergeDecision<'_>,
    ) -> Result<MergeSummary, StoreError> {
        if self.load_schema()?.is_none() {
            return Err(StoreError::MissingSchema(self.name.clone()));
        }

        let result = (&self.rows, &self.checkpoints).transaction(
            |(target, checkpoints)| -> ConflictableTransactionResult<MergeSummary, StoreError> {
                let mut summary = MergeSummary::default();

                for incoming in rows {
                    let existing = match target.get(incoming.alt_id.as_bytes())? {
                        Some(bytes) => Some(
                            Self::decode_row(&incoming.alt_id, &bytes)
                                .map_err(ConflictableTransactionError::Abort)?,
                        ),
                        None => None,
                    };

                    let action = decide(existing.as_ref(), incoming);
                    if matches!(action, MergeAction::Insert | MergeAction::Update) {
                        let row = bincode::serialize(&TargetRow::from(incoming))
                            .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
                        target.insert(incoming.alt_id.as_bytes(), row)?;
                    }
                    summary.record(action);
                }

                if let Some(commit) = commit {
                    let key = commit.key.storage_key();
                    let stored: Option<Checkpoint> = match checkpoints.get(key.as_bytes())? {
                        Some(bytes) => Some(
                            bincode::deserialize(&bytes)
                                .map_err(|e| ConflictableTransactionError::Abort(e.into()))?,
                        ),
                        None => None,
                    };

                    let found = stored.as_ref().map(|cp| cp.offset).unwrap_or(Cursor::None);
                    if found != commit.expected {
                        return Err(ConflictableTransactionError::Abort(
                            StoreError::CheckpointConflict {
                                key,
                                expected: commit.expected,
                                found,
                            },
                        ));
                    }

                    let rows_done = stored.map(|cp| cp.rows_done).unwrap_or(0) + summary.written();
                    let checkpoint = Checkpoint {
                        runner_id: commit.key.runner_id.as_str().to_string(),
                        target: commit.key.target.as_str().to_string(),
                        offset: commit.next.max(found),
                        batch_id: commit.batch_id.clone(),
                        rows_done,
                        updated_at: Utc::now(),
                    };
                    let encoded = bincode::serialize(&checkpoint)
                        .map_err(|e| ConflictableTransactionError::Abort(e.into()))?;
                    checkpoints.insert(key.as_bytes(), encoded)?;
                }

                Ok(summary)
            },
        );

        let summary = match result {
            Ok(summary) => summary,
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(StoreError::Sled(e)),
        };

        self.db.flush_async().await?;
        debug!(
            table = %self.name,
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            "Merge committed"
        );
        Ok(summary)
    }

    async fn get(&self, alt_id: &str) -> Result<Option<TargetRow>, StoreError> {
        match self.rows.get(alt_id.as_bytes())? {
            Some(bytes) => Ok(Some(Self::decode_row(alt_id, &bytes)?)),
            None => Ok(None),
        }
    }

    async fn rows(&self) -> Result<Vec<TargetRow>, StoreError> {
        let mut out = Vec::with_capacity(self.rows.len());
        for item in self.rows.iter() {
            let (key, value) = item?;
            let alt_id = String::from_utf8_lossy(&key);
            out.push(Self::decode_row(&alt_id, &value)?);
        }
        Ok(out)
    }
}
