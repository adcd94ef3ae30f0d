use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::analyzer::LearningPathAnalyzer;
use crate::demo::create_demo_data;
use crate::error::{AnalysisError, Result};
use crate::loader::load_lms_data;
use crate::models::{ActivityTable, CorrelationResult, EventLog, ScoreSeries, ScoreSource};
use crate::preprocess::preprocess_data;
use crate::scores::{observed_scores, synthetic_scores};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    File(PathBuf),
    Demo { seed: u64 },
}

impl DataSource {
    /// Picks the input for a run. A missing file is an error unless
    /// `allow_demo` is set, in which case generated demo data is used.
    pub fn resolve(path: &Path, allow_demo: bool, seed: u64) -> Result<Self> {
        if path.exists() {
            return Ok(DataSource::File(path.to_path_buf()));
        }
        if allow_demo {
            warn!("Data file not found: {}; using demo data", path.display());
            return Ok(DataSource::Demo { seed });
        }
        Err(AnalysisError::MissingInput(path.to_path_buf()))
    }

    pub fn label(&self) -> String {
        match self {
            DataSource::File(path) => path.display().to_string(),
            DataSource::Demo { seed } => format!("demo data (seed {seed})"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub events: EventLog,
    pub activity: ActivityTable,
    pub scores: ScoreSeries,
    pub score_source: ScoreSource,
    pub correlation: CorrelationResult,
}

/// Runs load, preprocess, aggregate and correlate in sequence.
///
/// Scores come from the `final_score` column when the log has one and are
/// synthesized from `seed` otherwise.
pub fn run_analysis(source: &DataSource, seed: u64) -> Result<PipelineOutput> {
    let raw = match source {
        DataSource::File(path) => load_lms_data(path)?,
        DataSource::Demo { seed } => create_demo_data(*seed),
    };
    let events = preprocess_data(&raw)?;

    let mut analyzer = LearningPathAnalyzer::new(events);
    let activity = analyzer.calculate_student_metrics()?.clone();

    let (scores, score_source) = match observed_scores(analyzer.data()) {
        Some(scores) => (scores, ScoreSource::Observed),
        None => (synthetic_scores(&activity, seed), ScoreSource::Synthetic),
    };
    info!("Using {}", score_source);

    let correlation = analyzer.correlate_activity_with_score(&scores)?;
    let events = analyzer.data().clone();

    Ok(PipelineOutput {
        events,
        activity,
        scores,
        score_source,
        correlation,
    })
}
