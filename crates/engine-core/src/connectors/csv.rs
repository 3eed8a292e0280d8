use crate::error::SourceError;
use chrono::{DateTime, Utc};
use model::records::record::{MessageId, Record};
use serde::Deserialize;
use std::{io::Read, path::Path};
use tracing::info;

/// Row layout of a bronze turbine export: `messageID,deviceId,rpm,angle,timestamp`.
#[derive(Debug, Deserialize)]
struct CsvRow {
    #[serde(rename = "messageID", alias = "message_id")]
    message_id: u64,
    #[serde(rename = "deviceId", alias = "device_id")]
    device_id: Option<i64>,
    rpm: Option<f64>,
    angle: Option<f64>,
    timestamp: DateTime<Utc>,
}

impl From<CsvRow> for Record {
    fn from(row: CsvRow) -> Self {
        Record {
            device_id: row.device_id,
            message_id: MessageId(row.message_id),
            rpm: row.rpm,
            angle: row.angle,
            timestamp: row.timestamp,
        }
    }
}

pub fn read_records_from_path(path: impl AsRef<Path>) -> Result<Vec<Record>, SourceError> {
    let path = path.as_ref();
    let file = std::fs::File::open(path)?;
    let records = read_records(file)?;
    info!(path = %path.display(), rows = records.len(), "Read source records from CSV");
    Ok(records)
}

/// Parse CSV with a header row. Empty `deviceId` cells become null natural keys.
pub fn read_records<R: Read>(reader: R) -> Result<Vec<Record>, SourceError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = Vec::new();
    for row in rdr.deserialize::<CsvRow>() {
        records.push(row?.into());
    }
    Ok(records)
}
