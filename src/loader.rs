use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;
use crate::models::{EventLog, EventRecord, EVENT_TYPE, FINAL_SCORE, TIMESTAMP, USER_ID};

/// Reads a comma-separated LMS export into memory.
///
/// The header decides which columns exist; values of `user_id`, `timestamp`,
/// `event_type` and `final_score` are typed, any other column is only
/// recorded by name. Empty fields load as absent values. CSV and I/O
/// failures are returned as-is.
pub fn load_lms_data(path: &Path) -> Result<EventLog> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)?;

    let columns: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut records = Vec::new();

    for result in reader.deserialize::<EventRecord>() {
        records.push(result?);
    }

    let log = EventLog::new(columns, records);
    info!(
        rows = log.len(),
        columns = log.columns.len(),
        "Loaded {} rows and {} columns from {}",
        log.len(),
        log.columns.len(),
        path.display()
    );
    Ok(log)
}

/// Writes the core event columns of `log` as CSV, creating the parent
/// directory if needed. `final_score` is written only when the log has it.
pub fn write_lms_data(log: &EventLog, path: &Path) -> Result<usize> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let with_score = log.has_column(FINAL_SCORE);
    let mut writer = csv::Writer::from_path(path)?;

    let mut header = vec![USER_ID, TIMESTAMP, EVENT_TYPE];
    if with_score {
        header.push(FINAL_SCORE);
    }
    writer.write_record(&header)?;

    for record in &log.records {
        let mut row = vec![
            record.user_id.map(|id| id.to_string()).unwrap_or_default(),
            record.timestamp.clone().unwrap_or_default(),
            record.event_type.clone().unwrap_or_default(),
        ];
        if with_score {
            row.push(record.final_score.map(|s| s.to_string()).unwrap_or_default());
        }
        writer.write_record(&row)?;
    }

    writer.flush()?;
    debug!("Wrote {} rows to {}", log.len(), path.display());
    Ok(log.len())
}
