use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::info;

use crate::error::{AnalysisError, Result};
use crate::models::{
    ActivityCorrelation, ActivityTable, CorrelationResult, EventLog, ScoreSeries, EVENT_TYPE,
    USER_ID,
};

const REQUIRED_COLUMNS: [&str; 2] = [USER_ID, EVENT_TYPE];

/// Derives per-student activity from an event log and relates it to scores.
///
/// The activity table is memoized: the correlator computes it on first use,
/// and [`calculate_student_metrics`](Self::calculate_student_metrics) always
/// recomputes it.
#[derive(Debug, Clone)]
pub struct LearningPathAnalyzer {
    data: EventLog,
    student_activity: Option<ActivityTable>,
}

impl LearningPathAnalyzer {
    pub fn new(data: EventLog) -> Self {
        Self {
            data,
            student_activity: None,
        }
    }

    /// Starts from an already computed activity table.
    pub fn with_student_activity(data: EventLog, activity: ActivityTable) -> Self {
        Self {
            data,
            student_activity: Some(activity),
        }
    }

    pub fn data(&self) -> &EventLog {
        &self.data
    }

    pub fn cached_activity(&self) -> Option<&ActivityTable> {
        self.student_activity.as_ref()
    }

    /// Counts events per student and event type, then caches the table.
    pub fn calculate_student_metrics(&mut self) -> Result<&ActivityTable> {
        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| !self.data.has_column(c))
            .collect();
        if !missing.is_empty() {
            return Err(AnalysisError::MissingColumns {
                required: REQUIRED_COLUMNS.join(", "),
                missing: missing.join(", "),
            });
        }

        let mut per_student: BTreeMap<i64, BTreeMap<String, u64>> = BTreeMap::new();
        for record in &self.data.records {
            let (Some(user_id), Some(event_type)) = (record.user_id, record.event_type.as_ref())
            else {
                continue;
            };
            *per_student
                .entry(user_id)
                .or_default()
                .entry(event_type.clone())
                .or_insert(0) += 1;
        }

        let table = ActivityTable::from_counts(per_student);
        info!(
            students = table.len(),
            "Calculated activity metrics for {} students",
            table.len()
        );
        Ok(&*self.student_activity.insert(table))
    }

    /// The cached activity table, computing it if needed.
    pub fn student_activity(&mut self) -> Result<&ActivityTable> {
        match self.student_activity {
            Some(ref table) => Ok(table),
            None => self.calculate_student_metrics(),
        }
    }

    /// Ranks event types by their Pearson correlation with `scores`.
    ///
    /// Only students present in both the activity table and `scores` take
    /// part. A column without variance yields NaN, which sorts last.
    pub fn correlate_activity_with_score(
        &mut self,
        scores: &ScoreSeries,
    ) -> Result<CorrelationResult> {
        let activity = self.student_activity()?;

        let joined: Vec<_> = activity
            .students()
            .filter_map(|s| scores.get(&s.user_id).map(|score| (s, *score)))
            .collect();
        let score_column: Vec<f64> = joined.iter().map(|(_, score)| *score).collect();

        let mut ranking: Vec<ActivityCorrelation> = activity
            .event_types()
            .map(|event_type| {
                let counts: Vec<f64> = joined
                    .iter()
                    .map(|(s, _)| s.count(event_type) as f64)
                    .collect();
                ActivityCorrelation {
                    event_type: event_type.to_string(),
                    coefficient: pearson(&counts, &score_column),
                }
            })
            .collect();
        ranking.sort_by(|a, b| descending_nan_last(a.coefficient, b.coefficient));

        let totals: Vec<f64> = joined
            .iter()
            .map(|(s, _)| s.total_activity as f64)
            .collect();
        let total_activity = pearson(&totals, &score_column);

        info!(
            students = joined.len(),
            "Correlated activity with scores over {} students",
            joined.len()
        );
        Ok(CorrelationResult {
            ranking,
            total_activity,
            students: joined.len(),
        })
    }
}

/// Pearson product-moment correlation of two equally long columns.
///
/// NaN when fewer than two pairs exist or either column has no variance.
pub fn pearson(xs: &[f64], ys: &[f64]) -> f64 {
    let n = xs.len().min(ys.len());
    if n < 2 {
        return f64::NAN;
    }
    let (xs, ys) = (&xs[..n], &ys[..n]);
    let mean_x = xs.iter().sum::<f64>() / n as f64;
    let mean_y = ys.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    if var_x == 0.0 || var_y == 0.0 {
        return f64::NAN;
    }
    (cov / (var_x.sqrt() * var_y.sqrt())).clamp(-1.0, 1.0)
}

fn descending_nan_last(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventRecord;
    use std::collections::BTreeSet;

    fn event(user_id: i64, event_type: &str) -> EventRecord {
        EventRecord {
            user_id: Some(user_id),
            event_type: Some(event_type.to_string()),
            ..EventRecord::default()
        }
    }

    fn scenario_log() -> EventLog {
        EventLog::new(
            vec!["user_id".into(), "event_type".into()],
            vec![
                event(101, "login"),
                event(101, "quiz_attempted"),
                event(101, "login"),
                event(102, "login"),
                event(102, "assignment_submitted"),
                event(103, "login"),
                event(103, "forum_posted"),
                event(103, "assignment_submitted"),
            ],
        )
    }

    fn scenario_scores() -> ScoreSeries {
        ScoreSeries::from([(101, 85.0), (102, 78.0), (103, 92.0)])
    }

    fn precomputed_activity() -> ActivityTable {
        let row = |login: u64, assignment: u64, quiz: u64, forum: u64| {
            BTreeMap::from([
                ("login".to_string(), login),
                ("assignment_submitted".to_string(), assignment),
                ("quiz_attempted".to_string(), quiz),
                ("forum_posted".to_string(), forum),
            ])
        };
        ActivityTable::from_counts(vec![
            (101, row(5, 2, 3, 1)),
            (102, row(3, 4, 1, 2)),
            (103, row(8, 6, 4, 5)),
        ])
    }

    #[test]
    fn metrics_cover_every_student_once() {
        let log = scenario_log();
        let mut analyzer = LearningPathAnalyzer::new(log.clone());
        let table = analyzer.calculate_student_metrics().unwrap();

        let expected: BTreeSet<i64> = log.records.iter().filter_map(|r| r.user_id).collect();
        let actual: BTreeSet<i64> = table.user_ids().collect();
        assert_eq!(actual, expected);
        assert_eq!(table.len(), 3);
        assert_eq!(table.columns().last(), Some(&"total_activity"));
    }

    #[test]
    fn scenario_counts_match_expected_rows() {
        let mut analyzer = LearningPathAnalyzer::new(scenario_log());
        let table = analyzer.calculate_student_metrics().unwrap();

        let expect = |id: i64, login: u64, quiz: u64, assignment: u64, forum: u64, total: u64| {
            let s = table.get(id).unwrap();
            assert_eq!(s.count("login"), login);
            assert_eq!(s.count("quiz_attempted"), quiz);
            assert_eq!(s.count("assignment_submitted"), assignment);
            assert_eq!(s.count("forum_posted"), forum);
            assert_eq!(s.total_activity, total);
        };
        expect(101, 2, 1, 0, 0, 3);
        expect(102, 1, 0, 1, 0, 2);
        expect(103, 1, 0, 1, 1, 3);
    }

    #[test]
    fn totals_equal_row_sums() {
        let mut analyzer = LearningPathAnalyzer::new(scenario_log());
        let table = analyzer.calculate_student_metrics().unwrap();

        for student in table.students() {
            let sum: u64 = table.event_types().map(|et| student.count(et)).sum();
            assert_eq!(student.total_activity, sum);
        }
    }

    #[test]
    fn counts_any_event_type_present() {
        let log = EventLog::new(
            vec!["user_id".into(), "event_type".into()],
            vec![event(1, "login"), event(1, "video_watched"), event(2, "login")],
        );
        let mut analyzer = LearningPathAnalyzer::new(log);
        let table = analyzer.calculate_student_metrics().unwrap();

        assert_eq!(table.columns(), vec!["login", "video_watched", "total_activity"]);
        assert_eq!(table.get(2).unwrap().count("video_watched"), 0);
    }

    #[test]
    fn missing_required_column_is_a_validation_error() {
        let log = EventLog::new(
            vec!["user_id".into()],
            vec![EventRecord {
                user_id: Some(1),
                ..EventRecord::default()
            }],
        );
        let mut analyzer = LearningPathAnalyzer::new(log);

        match analyzer.calculate_student_metrics().unwrap_err() {
            AnalysisError::MissingColumns { missing, .. } => assert_eq!(missing, "event_type"),
            other => panic!("unexpected error: {other}"),
        }
        assert!(analyzer.cached_activity().is_none());
    }

    #[test]
    fn correlator_computes_activity_lazily() {
        let mut analyzer = LearningPathAnalyzer::new(scenario_log());
        assert!(analyzer.cached_activity().is_none());

        analyzer
            .correlate_activity_with_score(&scenario_scores())
            .unwrap();
        assert_eq!(analyzer.cached_activity().unwrap().len(), 3);
    }

    #[test]
    fn scenario_ranks_four_event_types() {
        let mut analyzer = LearningPathAnalyzer::new(scenario_log());
        let result = analyzer
            .correlate_activity_with_score(&scenario_scores())
            .unwrap();

        assert_eq!(result.len(), 4);
        assert!(result.coefficient("final_score").is_none());
        assert!(result.coefficient("total_activity").is_none());
        for entry in &result.ranking {
            assert!((-1.0..=1.0).contains(&entry.coefficient), "{entry:?}");
        }
        for pair in result.ranking.windows(2) {
            assert!(pair[0].coefficient >= pair[1].coefficient);
        }
        assert_eq!(result.ranking[0].event_type, "forum_posted");
        assert_eq!(result.students, 3);
    }

    #[test]
    fn precomputed_activity_is_reused() {
        let mut analyzer =
            LearningPathAnalyzer::with_student_activity(EventLog::default(), precomputed_activity());
        let scores = ScoreSeries::from([(101, 85.0), (102, 78.0), (103, 92.0)]);

        let result = analyzer.correlate_activity_with_score(&scores).unwrap();
        assert_eq!(result.len(), 4);
        assert!(result
            .ranking
            .iter()
            .all(|c| (-1.0..=1.0).contains(&c.coefficient)));
        assert!((-1.0..=1.0).contains(&result.total_activity));
    }

    #[test]
    fn zero_variance_column_yields_nan_sorted_last() {
        let row = |login: u64, quiz: u64| {
            BTreeMap::from([
                ("login".to_string(), login),
                ("quiz_attempted".to_string(), quiz),
            ])
        };
        let table = ActivityTable::from_counts(vec![
            (1, row(2, 1)),
            (2, row(2, 3)),
            (3, row(2, 5)),
        ]);
        let mut analyzer = LearningPathAnalyzer::with_student_activity(EventLog::default(), table);
        let scores = ScoreSeries::from([(1, 60.0), (2, 70.0), (3, 80.0)]);

        let result = analyzer.correlate_activity_with_score(&scores).unwrap();
        assert_eq!(result.ranking[0].event_type, "quiz_attempted");
        assert!((result.ranking[0].coefficient - 1.0).abs() < 1e-12);
        assert_eq!(result.ranking[1].event_type, "login");
        assert!(result.ranking[1].coefficient.is_nan());
    }

    #[test]
    fn students_without_scores_are_excluded() {
        let mut analyzer =
            LearningPathAnalyzer::with_student_activity(EventLog::default(), precomputed_activity());
        let full = analyzer
            .correlate_activity_with_score(&ScoreSeries::from([
                (101, 85.0),
                (102, 78.0),
                (103, 92.0),
            ]))
            .unwrap();

        let table = ActivityTable::from_counts(
            precomputed_activity()
                .students()
                .map(|s| (s.user_id, s.counts.clone()))
                .chain(std::iter::once((
                    104,
                    BTreeMap::from([("login".to_string(), 40)]),
                ))),
        );
        let mut extended = LearningPathAnalyzer::with_student_activity(EventLog::default(), table);
        let partial = extended
            .correlate_activity_with_score(&ScoreSeries::from([
                (101, 85.0),
                (102, 78.0),
                (103, 92.0),
                (999, 10.0),
            ]))
            .unwrap();

        assert_eq!(partial.students, 3);
        assert_eq!(partial.ranking, full.ranking);

        let mut dropped =
            LearningPathAnalyzer::with_student_activity(EventLog::default(), precomputed_activity());
        let without_102 = dropped
            .correlate_activity_with_score(&ScoreSeries::from([
                (101, 85.0),
                (103, 92.0),
                (104, 50.0),
            ]))
            .unwrap();
        assert_eq!(without_102.students, 2);
        assert_ne!(
            without_102.coefficient("quiz_attempted"),
            full.coefficient("quiz_attempted")
        );
    }

    #[test]
    fn recalculation_replaces_the_cache() {
        let mut analyzer =
            LearningPathAnalyzer::with_student_activity(scenario_log(), precomputed_activity());
        assert_eq!(analyzer.cached_activity().unwrap().get(101).unwrap().total_activity, 11);

        analyzer.calculate_student_metrics().unwrap();
        assert_eq!(analyzer.cached_activity().unwrap().get(101).unwrap().total_activity, 3);
    }

    #[test]
    fn pearson_matches_known_values() {
        assert!((pearson(&[1.0, 2.0, 3.0], &[2.0, 4.0, 6.0]) - 1.0).abs() < 1e-12);
        assert!((pearson(&[1.0, 2.0, 3.0], &[6.0, 4.0, 2.0]) + 1.0).abs() < 1e-12);
        let scores = [85.0, 78.0, 92.0];
        assert!(pearson(&[2.0, 1.0, 1.0], &scores).abs() < 1e-12);
        let forum = pearson(&[0.0, 0.0, 1.0], &scores);
        assert!((forum - 3f64.sqrt() / 2.0).abs() < 1e-12, "{forum}");
        assert!(pearson(&[1.0], &[1.0]).is_nan());
        assert!(pearson(&[3.0, 3.0, 3.0], &[1.0, 2.0, 3.0]).is_nan());
    }
}
