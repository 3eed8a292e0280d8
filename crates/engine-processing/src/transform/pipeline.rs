use crate::{
    error::{SaltError, TransformError},
    transform::{
        dedup::DedupSet,
        filter::{ExcludedKeyFilter, Filter},
        salt::Salter,
    },
};
use futures::{StreamExt, stream};
use model::records::record::{PseudonymizedRecord, SourceEntry};
use std::sync::Arc;
use tracing::{Span, warn};

/// Result of salting and deduplicating one fetched chunk.
#[derive(Debug, Default)]
pub struct TransformOutcome {
    /// One record per `alt_id`, ordered by `alt_id`.
    pub rows: Vec<PseudonymizedRecord>,
    pub rejected: Vec<SaltError>,
    pub filtered: usize,
}

#[derive(Default)]
struct Partial {
    set: DedupSet,
    rejected: Vec<SaltError>,
    filtered: usize,
}

/// Filter, salt and reduce a chunk. Slices of the chunk are processed on
/// blocking workers with at most `concurrency` in flight; the partial
/// dedup sets are merged afterwards.
#[derive(Clone)]
pub struct ChunkTransformer {
    salter: Arc<Salter>,
    filter: Arc<ExcludedKeyFilter>,
    concurrency: usize,
}

const MIN_SLICE: usize = 256;

impl ChunkTransformer {
    pub fn new(salter: Arc<Salter>, filter: ExcludedKeyFilter, concurrency: usize) -> Self {
        Self {
            salter,
            filter: Arc::new(filter),
            concurrency: concurrency.max(1),
        }
    }

    pub fn salter(&self) -> &Salter {
        &self.salter
    }

    pub async fn transform(
        &self,
        entries: Vec<SourceEntry>,
    ) -> Result<TransformOutcome, TransformError> {
        if entries.is_empty() {
            return Ok(TransformOutcome::default());
        }

        let slice_len = entries.len().div_ceil(self.concurrency).max(MIN_SLICE);
        let slices: Vec<Vec<SourceEntry>> = entries
            .chunks(slice_len)
            .map(|slice| slice.to_vec())
            .collect();

        // Blocking workers do not inherit the caller's span.
        let span = Span::current();
        let mut partials = stream::iter(slices)
            .map(|slice| {
                let salter = self.salter.clone();
                let filter = self.filter.clone();
                let span = span.clone();
                tokio::task::spawn_blocking(move || {
                    let _entered = span.enter();
                    reduce_slice(&salter, filter.as_ref(), slice)
                })
            })
            .buffer_unordered(self.concurrency);

        let mut combined = Partial::default();
        while let Some(joined) = partials.next().await {
            let partial = joined.map_err(|e| TransformError::Worker(e.to_string()))?;
            combined.set.merge(partial.set);
            combined.rejected.extend(partial.rejected);
            combined.filtered += partial.filtered;
        }

        // Workers finish in any order; report rejects by source position.
        combined.rejected.sort_by_key(|e| match e {
            SaltError::InvalidInput { offset, .. } => *offset,
        });

        Ok(TransformOutcome {
            rows: combined.set.into_sorted_vec(),
            rejected: combined.rejected,
            filtered: combined.filtered,
        })
    }
}

fn reduce_slice(salter: &Salter, filter: &dyn Filter, slice: Vec<SourceEntry>) -> Partial {
    let mut partial = Partial::default();
    for entry in &slice {
        if !filter.should_keep(&entry.record) {
            partial.filtered += 1;
            continue;
        }
        match salter.pseudonymize(entry) {
            Ok(record) => partial.set.push(record),
            Err(err) => {
                warn!(error = %err, "Rejecting record");
                partial.rejected.push(err);
            }
        }
    }
    partial
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use model::records::record::{MessageId, Record};
    use tracing::{Instrument, info_span};
    use tracing_test::traced_test;

    fn entry(offset: u64, device_id: Option<i64>, ts: i64, rpm: f64) -> SourceEntry {
        SourceEntry::new(
            offset,
            Record {
                device_id,
                message_id: MessageId(offset),
                rpm: Some(rpm),
                angle: Some(1.0),
                timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
            },
        )
    }

    fn transformer(concurrency: usize) -> ChunkTransformer {
        ChunkTransformer::new(
            Arc::new(Salter::new("TEST")),
            ExcludedKeyFilter::new([0]),
            concurrency,
        )
    }

    #[tokio::test]
    async fn salts_filters_and_dedupes() {
        let out = transformer(2)
            .transform(vec![
                entry(1, Some(123), 10, 5.0),
                entry(2, Some(123), 20, 7.0),
                entry(3, None, 30, 1.0),
                entry(4, Some(0), 40, 1.0),
            ])
            .await
            .unwrap();

        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0].alt_id, Salter::new("TEST").salt(123));
        assert_eq!(out.rows[0].record.rpm, Some(7.0));
        assert_eq!(out.filtered, 1);
        assert_eq!(
            out.rejected,
            vec![SaltError::InvalidInput {
                message_id: MessageId(3),
                offset: 3
            }]
        );
    }

    #[tokio::test]
    async fn parallel_slices_agree_with_single_worker() {
        let entries: Vec<_> = (1..=2000)
            .map(|i| entry(i, Some((i % 37) as i64 + 1), (i % 11) as i64, i as f64))
            .collect();

        let serial = transformer(1).transform(entries.clone()).await.unwrap();
        let parallel = transformer(8).transform(entries).await.unwrap();

        assert_eq!(serial.rows, parallel.rows);
        assert_eq!(serial.rows.len(), 37);
    }

    #[traced_test]
    #[tokio::test]
    async fn rejections_are_logged_in_the_callers_span() {
        let out = transformer(2)
            .transform(vec![entry(1, None, 10, 1.0), entry(2, Some(5), 11, 2.0)])
            .instrument(info_span!("chunk", runner = "turbines/silver"))
            .await
            .unwrap();

        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rejected.len(), 1);
        assert!(logs_contain("Rejecting record"));
        assert!(logs_contain("turbines/silver"));
    }
}
