use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike};
use tracing::{debug, info};

use crate::error::{AnalysisError, Result};
use crate::models::{EventLog, EventRecord, DAY_OF_WEEK, EVENT_TYPE, HOUR, TIMESTAMP};

/// Event categories kept for analysis. Everything else is dropped.
pub const EVENT_TYPE_WHITELIST: [&str; 4] = [
    "login",
    "assignment_submitted",
    "quiz_attempted",
    "forum_posted",
];

const DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

pub fn is_tracked_event(event_type: &str) -> bool {
    EVENT_TYPE_WHITELIST.contains(&event_type)
}

/// Parses an ISO-8601 style timestamp. Offsets are honoured by keeping the
/// wall-clock time of the given offset.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_local());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Returns a cleaned copy of `log`.
///
/// With a `timestamp` column, every present value is parsed and `hour` and
/// `day_of_week` are derived; one bad value fails the whole call. With an
/// `event_type` column, rows outside [`EVENT_TYPE_WHITELIST`] are dropped.
/// Either step is skipped when its column is absent.
pub fn preprocess_data(log: &EventLog) -> Result<EventLog> {
    let mut columns = log.columns.clone();
    let mut records = log.records.clone();

    if log.has_column(TIMESTAMP) {
        for (row, record) in records.iter_mut().enumerate() {
            derive_calendar_features(row, record)?;
        }
        for derived in [HOUR, DAY_OF_WEEK] {
            if !columns.iter().any(|c| c == derived) {
                columns.push(derived.to_string());
            }
        }
    }

    if log.has_column(EVENT_TYPE) {
        let before = records.len();
        records.retain(|r| r.event_type.as_deref().is_some_and(is_tracked_event));
        debug!("Dropped {} untracked events", before - records.len());
    }

    info!(rows = records.len(), "Preprocessing complete");
    Ok(EventLog::new(columns, records))
}

fn derive_calendar_features(row: usize, record: &mut EventRecord) -> Result<()> {
    let Some(raw) = record.timestamp.as_deref() else {
        return Ok(());
    };
    let occurred_at = parse_timestamp(raw).ok_or_else(|| AnalysisError::TimestampParse {
        row,
        value: raw.to_string(),
    })?;

    record.hour = Some(occurred_at.hour());
    record.day_of_week = Some(occurred_at.format("%A").to_string());
    record.occurred_at = Some(occurred_at);
    Ok(())
}
