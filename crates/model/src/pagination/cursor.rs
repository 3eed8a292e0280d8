use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};

/// Position in the source log. Fetches always read strictly after the cursor.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Cursor {
    /// Nothing has been committed yet.
    #[default]
    None,

    /// Last committed source offset.
    Offset { offset: u64 },
}

impl Cursor {
    pub fn at(offset: u64) -> Self {
        Cursor::Offset { offset }
    }

    /// Last committed offset, `0` when nothing was committed. Source offsets start at 1.
    pub fn committed_offset(&self) -> u64 {
        match self {
            Cursor::None => 0,
            Cursor::Offset { offset } => *offset,
        }
    }

    /// First offset a fetch from this cursor may return.
    pub fn first_unread(&self) -> u64 {
        self.committed_offset().saturating_add(1)
    }
}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Cursor {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Cursor::None, Cursor::None) => Ordering::Equal,
            (Cursor::None, Cursor::Offset { .. }) => Ordering::Less,
            (Cursor::Offset { .. }, Cursor::None) => Ordering::Greater,
            (Cursor::Offset { offset: a }, Cursor::Offset { offset: b }) => a.cmp(b),
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cursor::None => f.write_str("start"),
            Cursor::Offset { offset } => write!(f, "offset {offset}"),
        }
    }
}

/// Inclusive range of source offsets covered by one chunk.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetRange {
    pub first: u64,
    pub last: u64,
}

impl OffsetRange {
    pub fn new(first: u64, last: u64) -> Self {
        Self { first, last }
    }

    pub fn len(&self) -> u64 {
        self.last.saturating_sub(self.first) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.last < self.first
    }
}

impl fmt::Display for OffsetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}..={}]", self.first, self.last)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_sorts_before_any_offset() {
        assert!(Cursor::None < Cursor::at(0));
        assert!(Cursor::at(3) < Cursor::at(10));
        assert_eq!(Cursor::None.first_unread(), 1);
        assert_eq!(Cursor::at(41).first_unread(), 42);
    }

    #[test]
    fn range_reports_length() {
        let range = OffsetRange::new(5, 9);
        assert_eq!(range.len(), 5);
        assert_eq!(range.to_string(), "[5..=9]");
    }
}
