use crate::{
    error::RunnerError,
    execution::stores::Stores,
    runner::{BatchRunner, BatchRunnerParams, RunOutcome, RunnerConfig, state::RunnerState},
};
use chrono::Utc;
use engine_config::{
    report::summary::{RunSummary, StopReason},
    settings::validated::ValidatedSettings,
};
use engine_core::{
    connectors::{
        csv::read_records_from_path,
        source::SourceFeed,
        target::TargetStore,
    },
    metrics::Metrics,
    progress::{ProgressService, ProgressStatus},
    state::{StateStore, models::TargetSchema},
};
use engine_processing::{
    cb::CircuitBreaker,
    redaction::{CallerIdentity, GroupRedactionView, ProjectedRow, RedactionView},
    transform::{filter::ExcludedKeyFilter, pipeline::ChunkTransformer, salt::Salter},
};
use model::{pagination::cursor::Cursor, records::row::TargetRow};
use std::{path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Open the stores under `settings.state_dir` and run to completion.
pub async fn run(
    settings: &ValidatedSettings,
    cancel: CancellationToken,
) -> Result<RunSummary, RunnerError> {
    let stores = Stores::open(settings)?;
    run_with(&stores, settings, cancel).await
}

/// Run against already opened stores: check the target schema, take the
/// runner lease, detect a salt change, drive the runner, release the lease.
pub async fn run_with(
    stores: &Stores,
    settings: &ValidatedSettings,
    cancel: CancellationToken,
) -> Result<RunSummary, RunnerError> {
    let started_at = Utc::now();
    let key = settings.runner_key();

    stores
        .target
        .ensure_schema(settings.create_target_if_missing)
        .await?;

    let owner = lease_owner();
    stores
        .state
        .acquire_lease(&key, &owner, settings.lease_ttl)
        .await?;
    info!(runner = %key, owner = %owner, "Lease acquired");

    let result = drive(stores, settings, &owner, cancel).await;

    if let Err(err) = stores.state.release_lease(&key, &owner).await {
        warn!(runner = %key, error = %err, "Failed to release lease");
    }

    let (outcome, metrics, resalted) = result?;
    let stop_reason = match outcome.state {
        RunnerState::Drained => StopReason::Drained,
        _ => StopReason::Cancelled,
    };

    Ok(RunSummary {
        runner: settings.runner_id.clone(),
        target: settings.target.clone(),
        started_at,
        finished_at: Utc::now(),
        stop_reason,
        final_cursor: outcome.final_cursor,
        batches: outcome.batches,
        metrics: metrics.snapshot(),
        resalted,
    })
}

async fn drive(
    stores: &Stores,
    settings: &ValidatedSettings,
    owner: &str,
    cancel: CancellationToken,
) -> Result<(RunOutcome, Metrics, bool), RunnerError> {
    let salter = Arc::new(Salter::new(settings.salt.clone()));
    let previous = stores
        .target
        .swap_salt_fingerprint(salter.fingerprint())
        .await?;
    let resalted = matches!(previous.as_deref(), Some(fp) if fp != salter.fingerprint());
    if resalted {
        warn!(
            target_table = %settings.target,
            "Salt changed since the last run; new alt_ids will not match existing rows"
        );
    }

    let metrics = Metrics::new();
    let mut runner = BatchRunner::new(BatchRunnerParams {
        key: settings.runner_key(),
        owner: owner.to_string(),
        source: stores.source.clone(),
        target: stores.target.clone(),
        state: stores.state.clone(),
        transformer: ChunkTransformer::new(
            salter,
            ExcludedKeyFilter::new(settings.excluded_keys.iter().copied()),
            settings.transform_concurrency,
        ),
        config: RunnerConfig::from_settings(settings),
        breaker: CircuitBreaker::new(
            settings.retry.threshold,
            settings.retry.base_delay(),
            settings.retry.max_delay(),
        ),
        metrics: metrics.clone(),
        cancel,
    });

    let outcome = runner.run().await?;
    Ok((outcome, metrics, resalted))
}

/// Create the target schema record if it does not exist yet.
pub async fn init_target(stores: &Stores) -> Result<TargetSchema, RunnerError> {
    let schema = stores.target.ensure_schema(true).await?;
    info!(target_table = %schema.name, created_at = %schema.created_at, "Target ready");
    Ok(schema)
}

/// Append the rows of a CSV export to the source log. Returns the assigned offsets.
pub async fn ingest_csv(stores: &Stores, path: &Path) -> Result<Vec<u64>, RunnerError> {
    let records = read_records_from_path(path)?;
    let offsets = stores.source.append(&records).await?;
    info!(
        source = %stores.source.name(),
        appended = offsets.len(),
        first = offsets.first().copied().unwrap_or_default(),
        "Ingested records"
    );
    Ok(offsets)
}

pub async fn progress(
    stores: &Stores,
    settings: &ValidatedSettings,
) -> Result<ProgressStatus, RunnerError> {
    let state: Arc<dyn StateStore> = stores.state.clone();
    Ok(ProgressService::new(state)
        .runner_status(&settings.runner_key())
        .await?)
}

/// Project up to `limit` source records through the redaction view for `caller`.
pub async fn redacted_view(
    stores: &Stores,
    settings: &ValidatedSettings,
    caller: &CallerIdentity,
    limit: usize,
) -> Result<Vec<ProjectedRow>, RunnerError> {
    let view = GroupRedactionView::new(
        settings.privileged_group.as_str(),
        settings.restricted_columns.iter().map(String::as_str),
    );
    let page = stores.source.fetch(&Cursor::None, limit).await?;
    Ok(page
        .entries
        .iter()
        .map(|entry| view.project(&entry.record, caller))
        .collect())
}

pub async fn target_rows(stores: &Stores) -> Result<Vec<TargetRow>, RunnerError> {
    Ok(stores.target.rows().await?)
}

fn lease_owner() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("pid{}-{}", std::process::id(), &id[..8])
}
