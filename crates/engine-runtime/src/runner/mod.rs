use crate::error::RunnerError;
use chrono::Utc;
use engine_config::settings::{RunMode, validated::ValidatedSettings};
use engine_core::{
    connectors::{source::SourceFeed, target::TargetStore},
    error::StoreError,
    metrics::Metrics,
    retry::{RetryDisposition, RetryError, RetryPolicy},
    state::{StateStore, models::WalEntry},
};
use engine_processing::{
    cb::{CircuitBreaker, CircuitBreakerState},
    retry::classify_store_error,
    transform::pipeline::ChunkTransformer,
    upsert::Upserter,
};
use model::{
    core::identifiers::RunnerKey,
    pagination::{
        cursor::{Cursor, OffsetRange},
        page::FetchResult,
    },
    records::{
        batch::{Batch, manifest_for},
        record::SourceEntry,
    },
};
use self::state::RunnerState;
use std::{sync::Arc, time::Duration};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

pub mod state;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub mode: RunMode,
    pub chunk_size: usize,
    pub poll_interval: Duration,
    /// Write a WAL heartbeat every this many committed chunks. `0` disables.
    pub heartbeat_every: u64,
}

impl RunnerConfig {
    pub fn from_settings(settings: &ValidatedSettings) -> Self {
        Self {
            mode: settings.mode,
            chunk_size: settings.chunk_size,
            poll_interval: settings.poll_interval,
            heartbeat_every: 10,
        }
    }
}

pub struct BatchRunnerParams {
    pub key: RunnerKey,
    /// Lease owner this runner commits under.
    pub owner: String,
    pub source: Arc<dyn SourceFeed>,
    pub target: Arc<dyn TargetStore>,
    pub state: Arc<dyn StateStore>,
    pub transformer: ChunkTransformer,
    pub config: RunnerConfig,
    pub breaker: CircuitBreaker,
    pub metrics: Metrics,
    pub cancel: CancellationToken,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub state: RunnerState,
    pub batches: u64,
    pub final_cursor: Cursor,
}

struct Fetched {
    cursor: Cursor,
    next: Cursor,
    range: OffsetRange,
    entries: Vec<SourceEntry>,
}

struct Prepared {
    batch: Batch,
    range: OffsetRange,
}

/// Drives fetch, salt, dedupe and merge for one (runner, target) pair.
///
/// `Idle -> Fetching -> Processing -> Committing -> Idle`, ending in
/// `Drained` (drain mode, empty fetch), `Stopped` (cancelled while idle) or
/// `Failed`. The checkpoint is re-read on every fetch and only advances
/// inside the merge commit, so a discarded chunk is simply fetched again.
pub struct BatchRunner {
    key: RunnerKey,
    owner: String,
    source: Arc<dyn SourceFeed>,
    state: Arc<dyn StateStore>,
    upserter: Upserter,
    transformer: ChunkTransformer,
    config: RunnerConfig,
    breaker: CircuitBreaker,
    io_retry: RetryPolicy,
    metrics: Metrics,
    cancel: CancellationToken,
    state_tx: watch::Sender<RunnerState>,
    current: RunnerState,
    fetched: Option<Fetched>,
    prepared: Option<Prepared>,
    last_cursor: Cursor,
    batches: u64,
}

impl BatchRunner {
    pub fn new(params: BatchRunnerParams) -> Self {
        let (state_tx, _) = watch::channel(RunnerState::Idle);
        Self {
            key: params.key,
            owner: params.owner,
            source: params.source,
            state: params.state,
            upserter: Upserter::new(params.target),
            transformer: params.transformer,
            config: params.config,
            breaker: params.breaker,
            io_retry: RetryPolicy::new(3, Duration::from_millis(50), Duration::from_millis(500)),
            metrics: params.metrics,
            cancel: params.cancel,
            state_tx,
            current: RunnerState::Idle,
            fetched: None,
            prepared: None,
            last_cursor: Cursor::None,
            batches: 0,
        }
    }

    pub fn with_io_retry(mut self, policy: RetryPolicy) -> Self {
        self.io_retry = policy;
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<RunnerState> {
        self.state_tx.subscribe()
    }

    pub fn current_state(&self) -> RunnerState {
        self.current
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn batches(&self) -> u64 {
        self.batches
    }

    /// Run until a terminal state. WAL `RunStart`/`RunDone` bracket the run.
    pub async fn run(&mut self) -> Result<RunOutcome, RunnerError> {
        self.state
            .append_wal(&WalEntry::RunStart {
                runner: self.key.storage_key(),
                owner: self.owner.clone(),
                at: Utc::now(),
            })
            .await?;

        info!(runner = %self.key, mode = ?self.config.mode, "Runner started");

        let terminal = loop {
            match self.step().await {
                Ok(state) if state.is_terminal() => break state,
                Ok(_) => continue,
                Err(err) => {
                    self.record_run_done(false).await;
                    return Err(err);
                }
            }
        };

        self.record_run_done(terminal == RunnerState::Drained).await;
        info!(
            runner = %self.key,
            state = %terminal,
            batches = self.batches,
            cursor = %self.last_cursor,
            "Runner finished"
        );

        Ok(RunOutcome {
            state: terminal,
            batches: self.batches,
            final_cursor: self.last_cursor,
        })
    }

    /// Perform exactly one transition.
    pub async fn step(&mut self) -> Result<RunnerState, RunnerError> {
        let next = match self.current {
            RunnerState::Idle => Ok(self.on_idle()),
            RunnerState::Fetching => self.on_fetching().await,
            RunnerState::Processing => self.on_processing().await,
            RunnerState::Committing => self.on_committing().await,
            terminal => Ok(terminal),
        };

        match next {
            Ok(state) => {
                self.transition(state);
                Ok(state)
            }
            Err(err) => {
                self.fetched = None;
                self.prepared = None;
                self.transition(RunnerState::Failed);
                Err(err)
            }
        }
    }

    fn on_idle(&self) -> RunnerState {
        if self.cancel.is_cancelled() {
            info!(runner = %self.key, "Cancellation requested, stopping between chunks");
            RunnerState::Stopped
        } else {
            RunnerState::Fetching
        }
    }

    async fn on_fetching(&mut self) -> Result<RunnerState, RunnerError> {
        // Fails with LeaseHeld once another owner has taken over.
        self.renew_lease().await?;

        let cursor = match self.load_cursor().await {
            Ok(cursor) => cursor,
            Err(err) => return self.on_failure(err, None).await,
        };
        self.last_cursor = cursor;

        let result = match self.fetch(&cursor).await {
            Ok(result) => result,
            Err(err) => return self.on_failure(err, None).await,
        };

        let (range, next) = match (result.range(), result.next_cursor) {
            (Some(range), Some(next)) => (range, next),
            _ => return self.on_empty_fetch(&cursor).await,
        };

        self.metrics.increment_fetched(result.row_count() as u64);
        debug!(runner = %self.key, range = %range, "Fetched chunk");

        self.fetched = Some(Fetched {
            cursor,
            next,
            range,
            entries: result.entries,
        });
        Ok(RunnerState::Processing)
    }

    async fn on_empty_fetch(&mut self, cursor: &Cursor) -> Result<RunnerState, RunnerError> {
        match self.config.mode {
            RunMode::Drain => {
                info!(runner = %self.key, cursor = %cursor, "Source drained");
                Ok(RunnerState::Drained)
            }
            RunMode::Continuous => {
                debug!(
                    runner = %self.key,
                    poll_ms = self.config.poll_interval.as_millis() as u64,
                    "No new records, waiting"
                );
                self.wait(self.config.poll_interval).await;
                Ok(RunnerState::Idle)
            }
        }
    }

    async fn on_processing(&mut self) -> Result<RunnerState, RunnerError> {
        let Some(fetched) = self.fetched.take() else {
            return Ok(RunnerState::Fetching);
        };

        let outcome = self
            .transformer
            .transform(fetched.entries)
            .instrument(info_span!("chunk", runner = %self.key, range = %fetched.range))
            .await?;
        if !outcome.rejected.is_empty() {
            warn!(
                runner = %self.key,
                range = %fetched.range,
                rejected = outcome.rejected.len(),
                "Records without a natural key were rejected"
            );
        }
        self.metrics.increment_rejected(outcome.rejected.len() as u64);
        self.metrics.increment_filtered(outcome.filtered as u64);

        let manifest = manifest_for(&outcome.rows);
        let batch = Batch {
            id: self.batch_id(&fetched.next),
            rows: outcome.rows,
            cursor: fetched.cursor,
            next: fetched.next,
            manifest,
            ts: Utc::now(),
        };

        let begin = WalEntry::BatchBegin {
            runner: self.key.storage_key(),
            batch_id: batch.id.clone(),
            range: fetched.range,
            rows: batch.rows.len(),
            rejected: outcome.rejected.len(),
            checksum: manifest.checksum_xxh3,
        };
        if let Err(err) = self.state.append_wal(&begin).await {
            return self.on_failure(err, Some(fetched.range)).await;
        }

        self.prepared = Some(Prepared {
            batch,
            range: fetched.range,
        });
        Ok(RunnerState::Committing)
    }

    async fn on_committing(&mut self) -> Result<RunnerState, RunnerError> {
        let Some(prepared) = self.prepared.take() else {
            return Ok(RunnerState::Fetching);
        };

        let summary = match self
            .upserter
            .upsert_with_checkpoint(&prepared.batch, &self.key)
            .await
        {
            Ok(summary) => summary,
            Err(err) => {
                return self
                    .on_failure(err.into_store_error(), Some(prepared.range))
                    .await;
            }
        };

        self.breaker.record_success();
        self.metrics
            .record_merge(summary.inserted, summary.updated, summary.skipped);
        self.last_cursor = prepared.batch.next;
        self.batches += 1;

        // The merge is durable at this point; the WAL entry is informational.
        let commit = WalEntry::BatchCommit {
            runner: self.key.storage_key(),
            batch_id: prepared.batch.id.clone(),
            next: prepared.batch.next,
            inserted: summary.inserted,
            updated: summary.updated,
            skipped: summary.skipped,
        };
        if let Err(err) = self.state.append_wal(&commit).await {
            warn!(runner = %self.key, batch_id = %prepared.batch.id, error = %err, "Failed to record batch commit");
        }

        self.heartbeat().await;

        Ok(RunnerState::Idle)
    }

    /// Decide between retrying the chunk from the checkpoint and failing.
    async fn on_failure(
        &mut self,
        err: StoreError,
        range: Option<OffsetRange>,
    ) -> Result<RunnerState, RunnerError> {
        self.fetched = None;
        self.prepared = None;

        match classify_store_error(&err) {
            RetryDisposition::Stop => {
                self.metrics.increment_failures(1);
                error!(
                    runner = %self.key,
                    range = ?range,
                    alt_id = ?err.alt_id(),
                    error = %err,
                    "Fatal store error"
                );
                Err(RunnerError::Fatal {
                    range,
                    alt_id: err.alt_id().map(str::to_string),
                    source: err,
                })
            }
            RetryDisposition::Retry => match self.breaker.record_failure() {
                CircuitBreakerState::RetryAfter(delay) => {
                    self.metrics.increment_retries(1);
                    warn!(
                        runner = %self.key,
                        range = ?range,
                        attempt = self.breaker.consecutive_failures(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient store failure, chunk will be fetched again"
                    );
                    if self.wait(delay).await {
                        Ok(RunnerState::Idle)
                    } else {
                        Ok(RunnerState::Fetching)
                    }
                }
                CircuitBreakerState::Open => {
                    self.metrics.increment_failures(1);
                    let attempts = self.breaker.consecutive_failures();
                    let entry = WalEntry::CircuitBreakerOpen {
                        runner: self.key.storage_key(),
                        range,
                        failures: attempts,
                        last_error: err.to_string(),
                    };
                    if let Err(wal_err) = self.state.append_wal(&entry).await {
                        warn!(runner = %self.key, error = %wal_err, "Failed to record circuit breaker trip");
                    }
                    error!(
                        runner = %self.key,
                        range = ?range,
                        attempts,
                        error = %err,
                        "Circuit breaker opened"
                    );
                    Err(RunnerError::RetriesExhausted {
                        range,
                        attempts,
                        last_error: err.to_string(),
                    })
                }
            },
        }
    }

    async fn load_cursor(&self) -> Result<Cursor, StoreError> {
        let checkpoint = self
            .io_retry
            .run(
                "load_checkpoint",
                || self.state.load_checkpoint(&self.key),
                classify_store_error,
            )
            .await
            .map_err(RetryError::into_inner)?;
        Ok(checkpoint.map(|cp| cp.offset).unwrap_or_default())
    }

    async fn fetch(&self, cursor: &Cursor) -> Result<FetchResult, StoreError> {
        self.io_retry
            .run(
                "fetch",
                || self.source.fetch(cursor, self.config.chunk_size),
                classify_store_error,
            )
            .await
            .map_err(RetryError::into_inner)
    }

    async fn renew_lease(&self) -> Result<(), RunnerError> {
        self.io_retry
            .run(
                "renew_lease",
                || self.state.renew_lease(&self.key, &self.owner),
                classify_store_error,
            )
            .await
            .map_err(|e| RunnerError::Store(e.into_inner()))
    }

    async fn heartbeat(&self) {
        if self.config.heartbeat_every == 0 || self.batches % self.config.heartbeat_every != 0 {
            return;
        }

        let entry = WalEntry::Heartbeat {
            runner: self.key.storage_key(),
            at: Utc::now(),
        };
        if let Err(err) = self.state.append_wal(&entry).await {
            warn!(runner = %self.key, error = %err, "Failed to record heartbeat");
        }
    }

    async fn record_run_done(&self, drained: bool) {
        let entry = WalEntry::RunDone {
            runner: self.key.storage_key(),
            drained,
        };
        if let Err(err) = self.state.append_wal(&entry).await {
            warn!(runner = %self.key, error = %err, "Failed to record run completion");
        }
    }

    /// Sleep for `delay` unless cancelled first. Returns true when cancelled.
    async fn wait(&self, delay: Duration) -> bool {
        if delay.is_zero() {
            return self.cancel.is_cancelled();
        }
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }

    fn batch_id(&self, next: &Cursor) -> String {
        let mut h = blake3::Hasher::new();
        h.update(self.key.runner_id.as_str().as_bytes());
        h.update(b":");
        h.update(self.key.target.as_str().as_bytes());
        h.update(b":");
        h.update(next.committed_offset().to_be_bytes().as_slice());
        format!("bat-{}", &h.finalize().to_hex()[..16])
    }

    fn transition(&mut self, next: RunnerState) {
        if self.current != next {
            debug!(runner = %self.key, from = %self.current, to = %next, "State transition");
        }
        self.current = next;
        self.state_tx.send_replace(next);
    }
}
