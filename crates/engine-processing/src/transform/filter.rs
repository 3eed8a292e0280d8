use model::records::record::Record;
use std::collections::HashSet;

pub trait Filter: Send + Sync {
    fn should_keep(&self, record: &Record) -> bool;
}

/// Drops records whose natural key is on the exclusion list (e.g. placeholder
/// device `0`). Records without a key pass through so the salter can reject them.
#[derive(Debug, Clone, Default)]
pub struct ExcludedKeyFilter {
    excluded: HashSet<i64>,
}

impl ExcludedKeyFilter {
    pub fn new(keys: impl IntoIterator<Item = i64>) -> Self {
        Self {
            excluded: keys.into_iter().collect(),
        }
    }
}

impl Filter for ExcludedKeyFilter {
    fn should_keep(&self, record: &Record) -> bool {
        match record.device_id {
            Some(key) => !self.excluded.contains(&key),
            None => true,
        }
    }
}
