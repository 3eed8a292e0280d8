use crate::{pagination::cursor::Cursor, records::record::PseudonymizedRecord};
use xxhash_rust::xxh3::xxh3_64_with_seed;

#[derive(Debug, Clone)]
pub struct Batch {
    pub id: String,
    pub rows: Vec<PseudonymizedRecord>, // already salted and deduplicated
    pub cursor: Cursor,                 // checkpoint the chunk was fetched after
    pub next: Cursor,                   // checkpoint to commit with this chunk
    pub manifest: Manifest,
    pub ts: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Manifest {
    pub row_count: usize,
    pub checksum_xxh3: u64, // rolling checksum over canonicalized rows
}

pub fn manifest_for(rows: &[PseudonymizedRecord]) -> Manifest {
    let mut h: u64 = 0;
    for r in rows {
        let bytes = serde_json::to_vec(r).unwrap_or_default();
        h = xxh3_64_with_seed(&bytes, h);
    }
    Manifest {
        row_count: rows.len(),
        checksum_xxh3: h,
    }
}

impl Batch {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::record::{MessageId, Record};
    use chrono::{TimeZone, Utc};

    fn row(alt_id: &str, msg: u64) -> PseudonymizedRecord {
        PseudonymizedRecord {
            alt_id: alt_id.into(),
            offset: msg,
            record: Record {
                device_id: Some(1),
                message_id: MessageId(msg),
                rpm: Some(1.0),
                angle: Some(2.0),
                timestamp: Utc.timestamp_opt(0, 0).unwrap(),
            },
        }
    }

    #[test]
    fn checksum_depends_on_content() {
        let a = manifest_for(&[row("a", 1), row("b", 2)]);
        let b = manifest_for(&[row("a", 1), row("b", 3)]);
        assert_eq!(a.row_count, 2);
        assert_ne!(a.checksum_xxh3, b.checksum_xxh3);
        assert_eq!(manifest_for(&[]).checksum_xxh3, 0);
    }
}
