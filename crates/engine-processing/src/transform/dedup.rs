use model::records::record::PseudonymizedRecord;
use std::{cmp::Ordering, collections::HashMap};

/// Latest record per `alt_id` seen so far. Partial sets built over disjoint
/// slices of a chunk can be merged in any order with the same result.
#[derive(Debug, Clone, Default)]
pub struct DedupSet {
    latest: HashMap<String, PseudonymizedRecord>,
}

impl DedupSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: PseudonymizedRecord) {
        match self.latest.get_mut(&record.alt_id) {
            Some(current) => {
                if record.recency_cmp(current) == Ordering::Greater {
                    *current = record;
                }
            }
            None => {
                self.latest.insert(record.alt_id.clone(), record);
            }
        }
    }

    pub fn merge(&mut self, other: DedupSet) {
        for record in other.latest.into_values() {
            self.push(record);
        }
    }

    pub fn len(&self) -> usize {
        self.latest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.latest.is_empty()
    }

    /// Winners ordered by `alt_id`.
    pub fn into_sorted_vec(self) -> Vec<PseudonymizedRecord> {
        let mut rows: Vec<_> = self.latest.into_values().collect();
        rows.sort_by(|a, b| a.alt_id.cmp(&b.alt_id));
        rows
    }
}

impl FromIterator<PseudonymizedRecord> for DedupSet {
    fn from_iter<I: IntoIterator<Item = PseudonymizedRecord>>(iter: I) -> Self {
        let mut set = DedupSet::new();
        for record in iter {
            set.push(record);
        }
        set
    }
}

/// One record per `alt_id`: the maximum by `(timestamp, message_id)`.
pub fn deduplicate(
    records: impl IntoIterator<Item = PseudonymizedRecord>,
) -> Vec<PseudonymizedRecord> {
    records.into_iter().collect::<DedupSet>().into_sorted_vec()
}
