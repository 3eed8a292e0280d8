use crate::core::value::Value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, fmt};

/// Version marker carried by every source message. Larger means newer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct MessageId(pub u64);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A source measurement as ingested. Never mutated after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub device_id: Option<i64>,
    pub message_id: MessageId,
    pub rpm: Option<f64>,
    pub angle: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Record {
    /// Column names in projection order.
    pub const COLUMNS: [&'static str; 5] = ["message_id", "device_id", "rpm", "angle", "timestamp"];

    pub fn get_value(&self, column: &str) -> Value {
        match column.to_ascii_lowercase().as_str() {
            "message_id" | "messageid" => Value::Uint(self.message_id.0),
            "device_id" | "deviceid" => Value::from(self.device_id),
            "rpm" => Value::from(self.rpm),
            "angle" => Value::from(self.angle),
            "timestamp" => Value::Timestamp(self.timestamp),
            _ => Value::Null,
        }
    }
}

/// A record at its position in the source log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub offset: u64,
    pub record: Record,
}

impl SourceEntry {
    pub fn new(offset: u64, record: Record) -> Self {
        Self { offset, record }
    }
}

/// A record keyed by its salted digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PseudonymizedRecord {
    pub alt_id: String,
    pub offset: u64,
    pub record: Record,
}

impl PseudonymizedRecord {
    pub fn message_id(&self) -> MessageId {
        self.record.message_id
    }

    /// Total recency order: timestamp, then message id. Exact ties fall back to
    /// the payload and the source offset so selection never depends on input order.
    pub fn recency_cmp(&self, other: &Self) -> Ordering {
        self.record
            .timestamp
            .cmp(&other.record.timestamp)
            .then_with(|| self.record.message_id.cmp(&other.record.message_id))
            .then_with(|| cmp_opt_f64(self.record.rpm, other.record.rpm))
            .then_with(|| cmp_opt_f64(self.record.angle, other.record.angle))
            .then_with(|| self.offset.cmp(&other.offset))
    }
}

fn cmp_opt_f64(a: Option<f64>, b: Option<f64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => a.total_cmp(&b),
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn rec(ts: i64, msg: u64, rpm: f64) -> Record {
        Record {
            device_id: Some(123),
            message_id: MessageId(msg),
            rpm: Some(rpm),
            angle: None,
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
        }
    }

    fn pseudo(offset: u64, record: Record) -> PseudonymizedRecord {
        PseudonymizedRecord {
            alt_id: "k".into(),
            offset,
            record,
        }
    }

    #[test]
    fn timestamp_dominates_message_id() {
        let older = pseudo(1, rec(10, 9, 1.0));
        let newer = pseudo(2, rec(20, 1, 1.0));
        assert_eq!(older.recency_cmp(&newer), Ordering::Less);
    }

    #[test]
    fn message_id_breaks_timestamp_ties() {
        let a = pseudo(1, rec(10, 1, 5.0));
        let b = pseudo(2, rec(10, 2, 5.0));
        assert_eq!(b.recency_cmp(&a), Ordering::Greater);
    }

    #[test]
    fn column_lookup_is_case_insensitive() {
        let r = rec(10, 2, 7.0);
        assert_eq!(r.get_value("RPM"), Value::Float(7.0));
        assert_eq!(r.get_value("messageID"), Value::Uint(2));
        assert_eq!(r.get_value("angle"), Value::Null);
    }
}
