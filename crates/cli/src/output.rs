use crate::error::CliError;
use engine_config::report::summary::RunSummary;
use engine_core::progress::ProgressStatus;
use engine_processing::redaction::{ProjectedRow, VIEW_COLUMNS};
use model::records::row::TargetRow;
use std::path::Path;

pub async fn write_summary(summary: &RunSummary, path: &Path) -> Result<(), CliError> {
    let json = summary.to_json_pretty()?;
    tokio::fs::write(path, json).await?;
    Ok(())
}

pub fn print_summary(summary: &RunSummary) -> Result<(), CliError> {
    println!("{}", summary.to_json_pretty()?);
    Ok(())
}

pub fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn print_progress_table(status: &ProgressStatus) {
    println!("Progress for runner '{}':", status.runner);
    println!("-----------------------------");
    println!("{:<16} {}", "Stage", status.stage);
    println!("{:<16} {}", "Rows done", status.rows_done);
    println!("{:<16} {}", "Batches", status.batches_committed);
    println!("{:<16} {}", "Last cursor", status.last_cursor);
    println!(
        "{:<16} {}",
        "Last batch",
        status.last_batch.as_deref().unwrap_or("n/a")
    );
    let heartbeat = status
        .last_heartbeat
        .map(|ts| ts.to_rfc3339())
        .unwrap_or_else(|| "n/a".to_string());
    println!("{:<16} {}", "Last heartbeat", heartbeat);
    println!(
        "{:<16} {}",
        "Lease owner",
        status.lease_owner.as_deref().unwrap_or("none")
    );
    if let Some(err) = &status.last_error {
        println!("{:<16} {}", "Last error", err);
    }
}

pub fn print_view_table(rows: &[ProjectedRow]) {
    let header: Vec<String> = VIEW_COLUMNS.iter().map(|c| format!("{c:<12}")).collect();
    println!("{}", header.join(" "));
    for row in rows {
        let cells: Vec<String> = row
            .columns
            .iter()
            .map(|c| format!("{:<12}", c.value.to_string()))
            .collect();
        println!("{}", cells.join(" "));
    }
}

pub fn print_target_table(rows: &[TargetRow]) {
    println!(
        "{:<66} {:>10} {:>10} {:>10} {:>10} {}",
        "alt_id", "message_id", "device_id", "rpm", "angle", "timestamp"
    );
    for row in rows {
        println!(
            "{:<66} {:>10} {:>10} {:>10} {:>10} {}",
            row.alt_id,
            row.message_id,
            fmt_opt(row.device_id),
            fmt_opt(row.rpm),
            fmt_opt(row.angle),
            row.timestamp.to_rfc3339()
        );
    }
}

fn fmt_opt<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "null".into())
}
