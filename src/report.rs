use std::fmt::Write;

use crate::models::{ActivityTable, CorrelationResult, EventLog, ScoreSource, TOTAL_ACTIVITY};

#[derive(Debug, Clone, PartialEq)]
pub struct EventTypeSummary {
    pub event_type: String,
    pub count: usize,
    pub students: usize,
}

pub fn summarize_by_type(log: &EventLog) -> Vec<EventTypeSummary> {
    let mut map: std::collections::HashMap<String, (usize, std::collections::HashSet<i64>)> =
        std::collections::HashMap::new();

    for record in &log.records {
        let Some(event_type) = record.event_type.as_ref() else {
            continue;
        };
        let entry = map.entry(event_type.clone()).or_default();
        entry.0 += 1;
        if let Some(user_id) = record.user_id {
            entry.1.insert(user_id);
        }
    }

    let mut summaries: Vec<EventTypeSummary> = map
        .into_iter()
        .map(|(event_type, (count, students))| EventTypeSummary {
            event_type,
            count,
            students: students.len(),
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.event_type.cmp(&b.event_type))
    });
    summaries
}

pub fn format_coefficient(value: f64) -> String {
    if value.is_nan() {
        "n/a".to_string()
    } else {
        format!("{value:.3}")
    }
}

/// One-sentence advice naming the activity most correlated with scores.
pub fn recommendation(result: &CorrelationResult) -> Option<String> {
    result.strongest().map(|top| {
        if top.coefficient > 0.0 {
            format!(
                "Activity '{}' has the strongest positive correlation with final scores ({}). \
                 Encourage this type of activity among students.",
                top.event_type,
                format_coefficient(top.coefficient)
            )
        } else {
            format!(
                "No activity correlates positively with final scores; the highest is '{}' ({}).",
                top.event_type,
                format_coefficient(top.coefficient)
            )
        }
    })
}

/// Ranked coefficients rounded to three places, followed by the
/// `total_activity` row.
pub fn correlation_table(result: &CorrelationResult) -> String {
    let mut output = String::new();

    if result.is_empty() {
        let _ = writeln!(output, "No students with both activity and a score.");
        return output;
    }

    let width = result
        .ranking
        .iter()
        .map(|c| c.event_type.len())
        .chain(std::iter::once(TOTAL_ACTIVITY.len()))
        .max()
        .unwrap_or(0);
    for entry in result.ranking.iter() {
        let _ = writeln!(
            output,
            "  {:<width$}  {:>7}",
            entry.event_type,
            format_coefficient(entry.coefficient)
        );
    }
    let _ = writeln!(
        output,
        "  {:<width$}  {:>7}",
        TOTAL_ACTIVITY,
        format_coefficient(result.total_activity)
    );
    output
}

pub fn build_report(
    source: &str,
    score_source: ScoreSource,
    log: &EventLog,
    activity: &ActivityTable,
    result: &CorrelationResult,
) -> String {
    let summaries = summarize_by_type(log);

    let mut output = String::new();

    let _ = writeln!(output, "# Learning Path Report");
    let _ = writeln!(
        output,
        "Generated from {} ({} events, {} students, {})",
        source,
        log.len(),
        activity.len(),
        score_source
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Activity Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No tracked events in this log.");
    } else {
        for summary in summaries.iter() {
            let _ = writeln!(
                output,
                "- {}: {} events from {} students",
                summary.event_type, summary.count, summary.students
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Correlation With Final Score");

    if result.is_empty() {
        let _ = writeln!(output, "No students with both activity and a score.");
    } else {
        let _ = writeln!(output, "| Activity | Pearson r |");
        let _ = writeln!(output, "| --- | --- |");
        for entry in result.ranking.iter() {
            let _ = writeln!(
                output,
                "| {} | {} |",
                entry.event_type,
                format_coefficient(entry.coefficient)
            );
        }
        let _ = writeln!(output);
        let _ = writeln!(
            output,
            "Total activity vs score: {} across {} students.",
            format_coefficient(result.total_activity),
            result.students
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Most Active Students");

    if activity.is_empty() {
        let _ = writeln!(output, "No student activity recorded.");
    } else {
        for student in activity.top_by_total(10) {
            let breakdown: Vec<String> = student
                .counts
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(event_type, count)| format!("{event_type} {count}"))
                .collect();
            let _ = writeln!(
                output,
                "- {}: {} events ({})",
                student.user_id,
                student.total_activity,
                breakdown.join(", ")
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommendation");
    match recommendation(result) {
        Some(text) => {
            let _ = writeln!(output, "{text}");
        }
        None => {
            let _ = writeln!(output, "Not enough variation in the data to recommend an activity.");
        }
    }

    output
}
