use crate::error::StoreError;
use async_trait::async_trait;
use model::{
    pagination::{cursor::Cursor, page::FetchResult},
    records::record::{Record, SourceEntry},
};
use sled::{
    Transactional,
    transaction::{ConflictableTransactionError, ConflictableTransactionResult, TransactionError},
};
use tracing::debug;

/// Append-only, offset-addressable feed of source records.
#[async_trait]
pub trait SourceFeed: Send + Sync {
    fn name(&self) -> &str;

    /// Read up to `limit` entries strictly after `after`, in offset order.
    async fn fetch(&self, after: &Cursor, limit: usize) -> Result<FetchResult, StoreError>;
}

const SEQUENCES_TREE: &str = "sequences";

/// Source log stored in a sled tree keyed by big-endian offsets. Offsets start at 1.
#[derive(Clone)]
pub struct SledSourceLog {
    name: String,
    entries: sled::Tree,
    sequences: sled::Tree,
}

impl SledSourceLog {
    pub fn open(db: &sled::Db, name: &str) -> Result<Self, StoreError> {
        Ok(Self {
            name: name.to_string(),
            entries: db.open_tree(format!("source:{name}"))?,
            sequences: db.open_tree(SEQUENCES_TREE)?,
        })
    }

    /// Append records atomically, returning the offsets they were assigned.
    pub async fn append(&self, records: &[Record]) -> Result<Vec<u64>, StoreError> {
        if records.is_empty() {
            return Ok(Vec::new());
        }

        let encoded = records
            .iter()
            .map(bincode::serialize)
            .collect::<Result<Vec<_>, _>>()?;
        let seq_key = self.name.as_bytes();

        // The counter and the entries commit together so readers never observe a gap.
        let result = (&self.entries, &self.sequences).transaction(
            |(entries, sequences)| -> ConflictableTransactionResult<Vec<u64>, StoreError> {
                let last = match sequences.get(seq_key)? {
                    Some(bytes) => decode_offset(&bytes).ok_or_else(|| {
                        ConflictableTransactionError::Abort(StoreError::Unavailable(format!(
                            "sequence for source '{}' is corrupt",
                            self.name
                        )))
                    })?,
                    None => 0,
                };

                let mut offsets = Vec::with_capacity(encoded.len());
                for (i, bytes) in encoded.iter().enumerate() {
                    let offset = last + 1 + i as u64;
                    entries.insert(offset.to_be_bytes().to_vec(), bytes.as_slice())?;
                    offsets.push(offset);
                }
                let new_last = last + encoded.len() as u64;
                sequences.insert(seq_key, new_last.to_be_bytes().to_vec())?;
                Ok(offsets)
            },
        );

        let offsets = match result {
            Ok(offsets) => offsets,
            Err(TransactionError::Abort(e)) => return Err(e),
            Err(TransactionError::Storage(e)) => return Err(StoreError::Sled(e)),
        };

        self.entries.flush_async().await?;
        debug!(source = %self.name, appended = offsets.len(), "Appended records to source log");
        Ok(offsets)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SourceFeed for SledSourceLog {
    fn name(&self) -> &str {
        &self.name
    }

    async fn fetch(&self, after: &Cursor, limit: usize) -> Result<FetchResult, StoreError> {
        if limit == 0 {
            return Ok(FetchResult::empty());
        }

        let start = after.first_unread().to_be_bytes();
        let mut entries = Vec::with_capacity(limit);

        for item in self.entries.range(start..).take(limit) {
            let (key, value) = item?;
            let offset = decode_offset(&key).ok_or_else(|| {
                StoreError::Unavailable(format!("malformed offset key in source '{}'", self.name))
            })?;
            let record: Record = bincode::deserialize(&value)?;
            entries.push(SourceEntry::new(offset, record));
        }

        let next_cursor = entries.last().map(|e| Cursor::at(e.offset));
        let reached_end = entries.len() < limit;

        Ok(FetchResult {
            entries,
            next_cursor,
            reached_end,
        })
    }
}

fn decode_offset(bytes: &[u8]) -> Option<u64> {
    let arr: [u8; 8] = bytes.try_into().ok()?;
    Some(u64::from_be_bytes(arr))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use model::records::record::MessageId;
    use tempfile::tempdir;

    fn record(msg: u64) -> Record {
        Record {
            device_id: Some(7),
            message_id: MessageId(msg),
            rpm: Some(1.0),
            angle: Some(0.5),
            timestamp: Utc.timestamp_opt(msg as i64, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn offsets_are_contiguous_from_one() {
        let dir = tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let log = SledSourceLog::open(&db, "bronze").unwrap();

        assert_eq!(log.append(&[record(1), record(2)]).await.unwrap(), vec![1, 2]);
        assert_eq!(log.append(&[record(3)]).await.unwrap(), vec![3]);
        assert_eq!(log.len(), 3);
    }

    #[tokio::test]
    async fn fetch_reads_strictly_after_cursor() {
        let dir = tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let log = SledSourceLog::open(&db, "bronze").unwrap();
        log.append(&(1..=5).map(record).collect::<Vec<_>>())
            .await
            .unwrap();

        let first = log.fetch(&Cursor::None, 2).await.unwrap();
        assert_eq!(first.entries.len(), 2);
        assert_eq!(first.next_cursor, Some(Cursor::at(2)));
        assert!(!first.reached_end);

        let rest = log.fetch(&Cursor::at(2), 10).await.unwrap();
        let offsets: Vec<u64> = rest.entries.iter().map(|e| e.offset).collect();
        assert_eq!(offsets, vec![3, 4, 5]);
        assert!(rest.reached_end);

        let empty = log.fetch(&Cursor::at(5), 10).await.unwrap();
        assert!(empty.is_empty());
        assert_eq!(empty.next_cursor, None);
    }

    #[tokio::test]
    async fn logs_with_different_names_are_independent() {
        let dir = tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        let a = SledSourceLog::open(&db, "a").unwrap();
        let b = SledSourceLog::open(&db, "b").unwrap();

        a.append(&[record(1), record(2)]).await.unwrap();
        assert_eq!(b.append(&[record(9)]).await.unwrap(), vec![1]);
    }
}
