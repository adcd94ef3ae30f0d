use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const USER_ID: &str = "user_id";
pub const TIMESTAMP: &str = "timestamp";
pub const EVENT_TYPE: &str = "event_type";
pub const FINAL_SCORE: &str = "final_score";
pub const HOUR: &str = "hour";
pub const DAY_OF_WEEK: &str = "day_of_week";
pub const TOTAL_ACTIVITY: &str = "total_activity";

/// Final score per student, keyed by `user_id`.
pub type ScoreSeries = BTreeMap<i64, f64>;

/// One LMS event. Every field is optional at load time; the aggregator
/// enforces which columns must exist.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EventRecord {
    pub user_id: Option<i64>,
    pub timestamp: Option<String>,
    pub event_type: Option<String>,
    pub final_score: Option<f64>,
    #[serde(skip)]
    pub occurred_at: Option<NaiveDateTime>,
    #[serde(skip)]
    pub hour: Option<u32>,
    #[serde(skip)]
    pub day_of_week: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventLog {
    pub columns: Vec<String>,
    pub records: Vec<EventRecord>,
}

impl EventLog {
    pub fn new(columns: Vec<String>, records: Vec<EventRecord>) -> Self {
        Self { columns, records }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Per-student event counts. `counts` holds every event type of the owning
/// table, zero-filled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentActivity {
    pub user_id: i64,
    pub counts: BTreeMap<String, u64>,
    pub total_activity: u64,
}

impl StudentActivity {
    pub fn count(&self, event_type: &str) -> u64 {
        self.counts.get(event_type).copied().unwrap_or(0)
    }
}

/// One row per distinct student. Column order is the lexicographic order of
/// the event types, with `total_activity` last.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityTable {
    event_types: BTreeSet<String>,
    students: BTreeMap<i64, StudentActivity>,
}

impl ActivityTable {
    /// Builds the table from raw per-student counts, zero-filling every event
    /// type seen in any row and deriving `total_activity`.
    pub fn from_counts<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (i64, BTreeMap<String, u64>)>,
    {
        let rows: Vec<(i64, BTreeMap<String, u64>)> = rows.into_iter().collect();
        let event_types: BTreeSet<String> = rows
            .iter()
            .flat_map(|(_, counts)| counts.keys().cloned())
            .collect();

        let mut students = BTreeMap::new();
        for (user_id, mut counts) in rows {
            for event_type in &event_types {
                counts.entry(event_type.clone()).or_insert(0);
            }
            let total_activity = counts.values().sum();
            students.insert(
                user_id,
                StudentActivity {
                    user_id,
                    counts,
                    total_activity,
                },
            );
        }

        Self {
            event_types,
            students,
        }
    }

    pub fn event_types(&self) -> impl Iterator<Item = &str> {
        self.event_types.iter().map(String::as_str)
    }

    pub fn columns(&self) -> Vec<&str> {
        self.event_types().chain(std::iter::once(TOTAL_ACTIVITY)).collect()
    }

    pub fn students(&self) -> impl Iterator<Item = &StudentActivity> {
        self.students.values()
    }

    pub fn get(&self, user_id: i64) -> Option<&StudentActivity> {
        self.students.get(&user_id)
    }

    pub fn user_ids(&self) -> impl Iterator<Item = i64> + '_ {
        self.students.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.students.len()
    }

    pub fn is_empty(&self) -> bool {
        self.students.is_empty()
    }

    /// The `n` students with the highest `total_activity`; ties keep
    /// ascending `user_id` order.
    pub fn top_by_total(&self, n: usize) -> Vec<&StudentActivity> {
        let mut ranked: Vec<&StudentActivity> = self.students.values().collect();
        ranked.sort_by(|a, b| b.total_activity.cmp(&a.total_activity));
        ranked.truncate(n);
        ranked
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityCorrelation {
    pub event_type: String,
    pub coefficient: f64,
}

/// Event types ranked by their Pearson correlation with the final score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationResult {
    pub ranking: Vec<ActivityCorrelation>,
    pub total_activity: f64,
    pub students: usize,
}

impl CorrelationResult {
    pub fn len(&self) -> usize {
        self.ranking.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranking.is_empty()
    }

    pub fn coefficient(&self, event_type: &str) -> Option<f64> {
        self.ranking
            .iter()
            .find(|c| c.event_type == event_type)
            .map(|c| c.coefficient)
    }

    /// The highest-ranked entry with a defined coefficient.
    pub fn strongest(&self) -> Option<&ActivityCorrelation> {
        self.ranking.iter().find(|c| !c.coefficient.is_nan())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Observed,
    Synthetic,
}

impl std::fmt::Display for ScoreSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreSource::Observed => write!(f, "observed final scores"),
            ScoreSource::Synthetic => write!(f, "synthetic scores"),
        }
    }
}
