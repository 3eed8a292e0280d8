use crate::records::record::{MessageId, PseudonymizedRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted row of the merge target. One per `alt_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRow {
    pub alt_id: String,
    pub message_id: MessageId,
    pub device_id: Option<i64>,
    pub rpm: Option<f64>,
    pub angle: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl From<&PseudonymizedRecord> for TargetRow {
    fn from(r: &PseudonymizedRecord) -> Self {
        TargetRow {
            alt_id: r.alt_id.clone(),
            message_id: r.record.message_id,
            device_id: r.record.device_id,
            rpm: r.record.rpm,
            angle: r.record.angle,
            timestamp: r.record.timestamp,
        }
    }
}
