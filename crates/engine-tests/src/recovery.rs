#[cfg(test)]
mod tests {
    use crate::{
        ALT_ID_123_TEST,
        utils::{TestEnv, reading},
    };
    use engine_config::{report::summary::StopReason, settings::RunMode};
    use engine_core::{
        connectors::source::SourceFeed, error::StoreError, state::StateStore,
    };
    use engine_processing::{
        transform::{filter::ExcludedKeyFilter, pipeline::ChunkTransformer, salt::Salter},
        upsert::Upserter,
    };
    use engine_runtime::{error::RunnerError, execution::executor};
    use model::{pagination::cursor::Cursor, records::record::MessageId};
    use std::{sync::Arc, time::Duration};
    use tokio_util::sync::CancellationToken;
    use tracing_test::traced_test;

    // Scenario: a previous process merged the chunk but died before its
    // checkpoint was written, so the same chunk is fetched again.
    // Expected Outcome:
    // - No duplicate rows and no regression of rpm back to 5.
    // - The replayed merge is counted as skipped, the checkpoint then advances.
    #[traced_test]
    #[tokio::test]
    async fn crash_before_checkpoint_replays_safely() {
        let env = TestEnv::new();
        env.append(&[
            reading(Some(123), 10, 1, 5.0),
            reading(Some(123), 20, 2, 7.0),
        ])
        .await;

        executor::init_target(&env.stores).await.unwrap();
        let page = env.stores.source.fetch(&Cursor::None, 10).await.unwrap();
        let transformer = ChunkTransformer::new(
            Arc::new(Salter::new("TEST")),
            ExcludedKeyFilter::new([0]),
            1,
        );
        let outcome = transformer.transform(page.entries).await.unwrap();
        Upserter::new(env.stores.target.clone())
            .upsert(&outcome.rows)
            .await
            .unwrap();
        assert_eq!(env.checkpoint().await, None);

        let summary = env.run().await.unwrap();

        assert_eq!(summary.metrics.rows_inserted, 0);
        assert_eq!(summary.metrics.rows_skipped, 1);
        assert_eq!(env.checkpoint().await, Some(Cursor::at(2)));

        let rows = env.rows().await;
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].alt_id, ALT_ID_123_TEST);
        assert_eq!(rows[0].rpm, Some(7.0));
        assert_eq!(rows[0].message_id, MessageId(2));
    }

    // Scenario: another process holds a live lease on the same runner and target.
    // Expected Outcome: the run is refused before anything is merged.
    #[traced_test]
    #[tokio::test]
    async fn second_runner_is_refused_while_lease_is_live() {
        let env = TestEnv::new();
        env.append(&[reading(Some(123), 10, 1, 5.0)]).await;
        env.stores
            .state
            .acquire_lease(&env.settings.runner_key(), "other-host", Duration::from_secs(60))
            .await
            .unwrap();

        let err = env.run().await.unwrap_err();

        assert!(matches!(
            err,
            RunnerError::Store(StoreError::LeaseHeld { ref owner, .. }) if owner == "other-host"
        ));
        assert!(env.rows().await.is_empty());
        assert_eq!(env.checkpoint().await, None);
    }

    // Scenario: the lease is released at the end of a run.
    // Expected Outcome: a second process can take it straight away.
    #[traced_test]
    #[tokio::test]
    async fn lease_is_released_after_run() {
        let env = TestEnv::new();
        env.run().await.unwrap();

        let lease = env
            .stores
            .state
            .acquire_lease(&env.settings.runner_key(), "next-host", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(lease.owner, "next-host");
    }

    // Scenario: the target has never been initialised and creation is disabled.
    // Expected Outcome: the run fails fast with a missing schema error.
    #[traced_test]
    #[tokio::test]
    async fn missing_target_is_fatal_without_create_flag() {
        let env = TestEnv::with_settings(|raw| raw.create_target_if_missing = false);
        env.append(&[reading(Some(123), 10, 1, 5.0)]).await;

        let err = env.run().await.unwrap_err();
        assert!(matches!(err, RunnerError::Store(StoreError::MissingSchema(_))));

        executor::init_target(&env.stores).await.unwrap();
        let summary = env.run().await.unwrap();
        assert_eq!(summary.final_cursor, Cursor::at(1));
    }

    // Scenario: the cancellation token fires before the run starts.
    // Expected Outcome: the run stops cleanly without merging.
    #[traced_test]
    #[tokio::test]
    async fn cancelled_run_stops_between_chunks() {
        let env = TestEnv::new();
        env.append(&[reading(Some(123), 10, 1, 5.0)]).await;

        let cancel = CancellationToken::new();
        cancel.cancel();
        let summary = executor::run_with(&env.stores, &env.settings, cancel)
            .await
            .unwrap();

        assert_eq!(summary.stop_reason, StopReason::Cancelled);
        assert_eq!(summary.batches, 0);
        assert_eq!(env.checkpoint().await, None);
    }

    // Scenario: a continuous run picks up records appended while it is polling.
    // Expected Outcome: both records are merged before cancellation stops it.
    #[traced_test]
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn continuous_run_merges_late_arrivals() {
        let env = TestEnv::with_settings(|raw| {
            raw.mode = RunMode::Continuous;
        });
        env.append(&[reading(Some(1), 10, 1, 1.0)]).await;

        let cancel = CancellationToken::new();
        let source = env.stores.source.clone();
        let stopper = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                source.append(&[reading(Some(2), 11, 2, 2.0)]).await.unwrap();
                tokio::time::sleep(Duration::from_millis(150)).await;
                cancel.cancel();
            })
        };

        let summary = executor::run_with(&env.stores, &env.settings, cancel)
            .await
            .unwrap();
        stopper.await.unwrap();

        assert_eq!(summary.stop_reason, StopReason::Cancelled);
        assert_eq!(summary.final_cursor, Cursor::at(2));
        assert_eq!(env.rows().await.len(), 2);
    }
}
