use crate::{
    pagination::cursor::{Cursor, OffsetRange},
    records::record::SourceEntry,
};

/// One chunk returned by a source feed.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    pub entries: Vec<SourceEntry>,
    /// Cursor pointing at the last entry of this chunk.
    pub next_cursor: Option<Cursor>,
    /// True when the feed had nothing beyond this chunk at fetch time.
    pub reached_end: bool,
}

impl FetchResult {
    pub fn empty() -> Self {
        Self {
            entries: Vec::new(),
            next_cursor: None,
            reached_end: true,
        }
    }

    pub fn row_count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn range(&self) -> Option<OffsetRange> {
        let first = self.entries.iter().map(|e| e.offset).min()?;
        let last = self.entries.iter().map(|e| e.offset).max()?;
        Some(OffsetRange::new(first, last))
    }
}
