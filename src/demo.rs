use chrono::{Duration, NaiveDate, NaiveDateTime};
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::info;

use crate::models::{EventLog, EventRecord, EVENT_TYPE, TIMESTAMP, USER_ID};
use crate::preprocess::EVENT_TYPE_WHITELIST;

const DEMO_EVENTS: usize = 200;
const EVENT_WEIGHTS: [f64; 4] = [0.4, 0.3, 0.2, 0.1];
const TERM_START: (i32, u32, u32) = (2023, 9, 1);
const TERM_END: (i32, u32, u32) = (2023, 10, 31);

/// Builds a synthetic event log for trying the pipeline without real data.
///
/// Events are spread evenly between 2023-09-01 and 2023-10-31 (inclusive),
/// user ids are uniform in `100..200` and event types follow
/// [`EVENT_WEIGHTS`] over the whitelist.
pub fn create_demo_data(seed: u64) -> EventLog {
    let mut rng = StdRng::seed_from_u64(seed);
    let weights = WeightedIndex::new(EVENT_WEIGHTS).expect("constant event weights are valid");
    let timestamps = evenly_spaced(date_start(TERM_START), date_start(TERM_END), DEMO_EVENTS);

    let records: Vec<EventRecord> = timestamps
        .into_iter()
        .map(|ts| EventRecord {
            user_id: Some(rng.gen_range(100..200)),
            timestamp: Some(ts.format("%Y-%m-%d %H:%M:%S").to_string()),
            event_type: Some(EVENT_TYPE_WHITELIST[weights.sample(&mut rng)].to_string()),
            ..EventRecord::default()
        })
        .collect();

    let log = EventLog::new(
        vec![USER_ID.into(), TIMESTAMP.into(), EVENT_TYPE.into()],
        records,
    );
    let students: std::collections::BTreeSet<i64> =
        log.records.iter().filter_map(|r| r.user_id).collect();
    info!(
        "Created {} demo events for {} students",
        log.len(),
        students.len()
    );
    log
}

fn date_start((year, month, day): (i32, u32, u32)) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("term dates are valid calendar dates")
}

fn evenly_spaced(start: NaiveDateTime, end: NaiveDateTime, periods: usize) -> Vec<NaiveDateTime> {
    if periods < 2 {
        return vec![start; periods];
    }
    let span_ms = (end - start).num_milliseconds();
    let steps = (periods - 1) as i64;
    (0..periods as i64)
        .map(|i| start + Duration::milliseconds(span_ms * i / steps))
        .collect()
}
