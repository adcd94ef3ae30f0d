use std::collections::BTreeMap;
use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::models::{ActivityTable, EventLog, ScoreSeries, FINAL_SCORE};

pub const DEFAULT_SEED: u64 = 42;

const ACTIVITY_WEIGHT: f64 = 0.5;
const NOISE_STD_DEV: f64 = 10.0;
const SCORE_FLOOR: f64 = 60.0;
const SCORE_CEILING: f64 = 100.0;

/// Mean `final_score` per student, or `None` when the log has no such
/// column. Students without any score value are left out.
pub fn observed_scores(log: &EventLog) -> Option<ScoreSeries> {
    if !log.has_column(FINAL_SCORE) {
        return None;
    }

    let mut sums: BTreeMap<i64, (f64, usize)> = BTreeMap::new();
    for record in &log.records {
        if let (Some(user_id), Some(score)) = (record.user_id, record.final_score) {
            let entry = sums.entry(user_id).or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
        }
    }

    Some(
        sums.into_iter()
            .map(|(user_id, (sum, count))| (user_id, sum / count as f64))
            .collect(),
    )
}

/// Demonstration scores: `total_activity * 0.5 + N(0, 10)`, clipped to
/// [60, 100]. Draws happen in ascending `user_id` order from a generator
/// seeded with `seed`, so equal inputs give bit-identical output.
pub fn synthetic_scores(activity: &ActivityTable, seed: u64) -> ScoreSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let scores: ScoreSeries = activity
        .students()
        .map(|student| {
            let noise = standard_normal(&mut rng) * NOISE_STD_DEV;
            let score = student.total_activity as f64 * ACTIVITY_WEIGHT + noise;
            (student.user_id, score.clamp(SCORE_FLOOR, SCORE_CEILING))
        })
        .collect();
    debug!(seed, students = scores.len(), "Generated synthetic scores");
    scores
}

// Box-Muller transform.
fn standard_normal(rng: &mut impl Rng) -> f64 {
    let u1 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventRecord;

    fn activity(totals: &[(i64, u64)]) -> ActivityTable {
        ActivityTable::from_counts(
            totals
                .iter()
                .map(|(id, n)| (*id, BTreeMap::from([("login".to_string(), *n)]))),
        )
    }

    fn scored(user_id: i64, score: Option<f64>) -> EventRecord {
        EventRecord {
            user_id: Some(user_id),
            event_type: Some("login".to_string()),
            final_score: score,
            ..EventRecord::default()
        }
    }

    #[test]
    fn observed_scores_average_per_student() {
        let log = EventLog::new(
            vec!["user_id".into(), "event_type".into(), "final_score".into()],
            vec![
                scored(1, Some(80.0)),
                scored(1, Some(90.0)),
                scored(2, Some(70.0)),
                scored(2, None),
                scored(3, None),
            ],
        );

        let scores = observed_scores(&log).unwrap();
        assert_eq!(scores.len(), 2);
        assert_eq!(scores[&1], 85.0);
        assert_eq!(scores[&2], 70.0);
        assert!(!scores.contains_key(&3));
    }

    #[test]
    fn observed_scores_need_the_column() {
        let log = EventLog::new(
            vec!["user_id".into(), "event_type".into()],
            vec![scored(1, None)],
        );
        assert!(observed_scores(&log).is_none());
    }

    #[test]
    fn synthetic_scores_are_reproducible() {
        let table = activity(&[(101, 3), (102, 2), (103, 30), (104, 250)]);

        let first = synthetic_scores(&table, DEFAULT_SEED);
        let second = synthetic_scores(&table, DEFAULT_SEED);
        assert_eq!(first.len(), 4);
        for (id, score) in &first {
            assert_eq!(score.to_bits(), second[id].to_bits());
        }
    }

    #[test]
    fn synthetic_scores_stay_in_range() {
        let table = activity(&[(1, 0), (2, 10), (3, 120), (4, 400), (5, 1)]);
        let scores = synthetic_scores(&table, 7);

        assert!(scores.values().all(|s| (60.0..=100.0).contains(s)));
        assert_eq!(scores[&4], 100.0);
    }

    #[test]
    fn different_seeds_give_different_noise() {
        let table = activity(&[(1, 150), (2, 150), (3, 150)]);
        assert_ne!(synthetic_scores(&table, 1), synthetic_scores(&table, 2));
    }

    #[test]
    fn standard_normal_is_roughly_centred() {
        let mut rng = StdRng::seed_from_u64(DEFAULT_SEED);
        let n = 20_000;
        let samples: Vec<f64> = (0..n).map(|_| standard_normal(&mut rng)).collect();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let var = samples.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05, "{mean}");
        assert!((var - 1.0).abs() < 0.05, "{var}");
    }
}
