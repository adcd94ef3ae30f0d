use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use tracing::{info, warn};

use crate::models::{ActivityTable, CorrelationResult, StudentActivity};

pub const DEFAULT_TOP_N: usize = 10;

// 10x6 and 12x6 inch figures at 150 DPI.
const CORRELATION_SIZE: (u32, u32) = (1500, 900);
const DISTRIBUTION_SIZE: (u32, u32) = (1800, 900);
const TEXT_BAR_WIDTH: usize = 40;

const BAR_COLOR: RGBColor = RGBColor(135, 206, 235);

/// Where a chart goes: a PNG file, or a text rendering on stdout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChartTarget {
    File(PathBuf),
    Terminal,
}

impl ChartTarget {
    /// Target for the distribution chart: a given path always wins, `show`
    /// alone prints it, and neither skips the chart.
    pub fn for_distribution(show: bool, path: Option<PathBuf>) -> Option<Self> {
        match path {
            Some(path) => Some(ChartTarget::File(path)),
            None if show => Some(ChartTarget::Terminal),
            None => None,
        }
    }
}

/// Bar chart of the correlation ranking, one labelled bar per event type.
pub fn plot_activity_correlation(
    result: &CorrelationResult,
    target: &ChartTarget,
) -> anyhow::Result<()> {
    match target {
        ChartTarget::Terminal => {
            print!("{}", render_correlation_text(result));
            Ok(())
        }
        ChartTarget::File(_) if result.is_empty() => {
            warn!("No correlations to plot");
            Ok(())
        }
        ChartTarget::File(path) => {
            prepare_parent(path)?;
            draw_correlation_png(result, path)
                .with_context(|| format!("failed to render chart to {}", path.display()))?;
            info!("Chart saved to {}", path.display());
            Ok(())
        }
    }
}

/// Stacked per-event-type counts for the `top_n` most active students.
pub fn plot_student_activity_distribution(
    activity: &ActivityTable,
    top_n: usize,
    target: &ChartTarget,
) -> anyhow::Result<()> {
    let students = activity.top_by_total(top_n);
    let event_types: Vec<&str> = activity.event_types().collect();

    match target {
        ChartTarget::Terminal => {
            print!("{}", render_distribution_text(&event_types, &students, top_n));
            Ok(())
        }
        ChartTarget::File(_) if students.is_empty() => {
            warn!("No student activity to plot");
            Ok(())
        }
        ChartTarget::File(path) => {
            prepare_parent(path)?;
            draw_distribution_png(&event_types, &students, top_n, path)
                .with_context(|| format!("failed to render chart to {}", path.display()))?;
            info!("Chart saved to {}", path.display());
            Ok(())
        }
    }
}

fn prepare_parent(path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

fn draw_correlation_png(result: &CorrelationResult, path: &Path) -> anyhow::Result<()> {
    let root = BitMapBackend::new(path, CORRELATION_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let names: Vec<String> = result.ranking.iter().map(|c| c.event_type.clone()).collect();
    let values: Vec<f64> = result.ranking.iter().map(|c| c.coefficient).collect();
    let (y_min, y_max) = value_range(&values);

    let mut chart = ChartBuilder::on(&root)
        .caption(
            "Correlation of activity types with final score",
            ("sans-serif", 30),
        )
        .margin(20)
        .x_label_area_size(80)
        .y_label_area_size(70)
        .build_cartesian_2d((0..names.len() as i32).into_segmented(), y_min..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("LMS activity type")
        .y_desc("Pearson correlation coefficient")
        .x_label_formatter(&|v| segment_label(&names, v))
        .draw()?;

    let bars = values.iter().enumerate().filter(|(_, v)| v.is_finite()).map(|(i, v)| {
        let mut bar = Rectangle::new(
            [
                (SegmentValue::Exact(i as i32), 0.0),
                (SegmentValue::Exact(i as i32 + 1), *v),
            ],
            BAR_COLOR.filled(),
        );
        bar.set_margin(0, 0, 20, 20);
        bar
    });
    chart.draw_series(bars)?;

    let label_style = ("sans-serif", 16)
        .into_font()
        .color(&BLACK)
        .pos(Pos::new(HPos::Center, VPos::Bottom));
    chart.draw_series(values.iter().enumerate().map(|(i, v)| {
        let (text, y) = if v.is_finite() {
            (format!("{v:.2}"), v.max(0.0) + 0.01)
        } else {
            ("n/a".to_string(), 0.01)
        };
        Text::new(text, (SegmentValue::CenterOf(i as i32), y), label_style.clone())
    }))?;

    root.present()?;
    Ok(())
}

fn draw_distribution_png(
    event_types: &[&str],
    students: &[&StudentActivity],
    top_n: usize,
    path: &Path,
) -> anyhow::Result<()> {
    let root = BitMapBackend::new(path, DISTRIBUTION_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let names: Vec<String> = event_types.iter().map(|s| s.to_string()).collect();
    let tallest = event_types
        .iter()
        .map(|et| students.iter().map(|s| s.count(et)).sum::<u64>())
        .max()
        .unwrap_or(0);

    let mut chart = ChartBuilder::on(&root)
        .caption(
            format!("Activity breakdown for the top {top_n} students"),
            ("sans-serif", 30),
        )
        .margin(20)
        .x_label_area_size(60)
        .y_label_area_size(70)
        .right_y_label_area_size(20)
        .build_cartesian_2d(
            (0..names.len() as i32).into_segmented(),
            0.0..(tallest.max(1) as f64 * 1.1),
        )?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc("Activity type")
        .y_desc("Event count")
        .x_label_formatter(&|v| segment_label(&names, v))
        .draw()?;

    let mut base = vec![0.0f64; event_types.len()];
    for (idx, student) in students.iter().enumerate() {
        let color = Palette99::pick(idx).to_rgba();
        let mut bars = Vec::with_capacity(event_types.len());
        for (i, event_type) in event_types.iter().enumerate() {
            let count = student.count(event_type) as f64;
            let mut bar = Rectangle::new(
                [
                    (SegmentValue::Exact(i as i32), base[i]),
                    (SegmentValue::Exact(i as i32 + 1), base[i] + count),
                ],
                color.filled(),
            );
            bar.set_margin(0, 0, 30, 30);
            bars.push(bar);
            base[i] += count;
        }
        chart
            .draw_series(bars)?
            .label(student.user_id.to_string())
            .legend(move |(x, y)| Rectangle::new([(x, y - 6), (x + 14, y + 6)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}

fn segment_label(names: &[String], value: &SegmentValue<i32>) -> String {
    match value {
        SegmentValue::CenterOf(i) => names.get(*i as usize).cloned().unwrap_or_default(),
        _ => String::new(),
    }
}

/// Y-axis bounds that always include zero and leave room for labels.
fn value_range(values: &[f64]) -> (f64, f64) {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (lo, hi) = finite.fold((0.0f64, 0.0f64), |(lo, hi), v| (lo.min(v), hi.max(v)));
    ((lo - 0.1).max(-1.1), (hi + 0.15).min(1.15))
}

/// Text rendering of the correlation ranking, used when no output path is set.
pub fn render_correlation_text(result: &CorrelationResult) -> String {
    let mut output = String::new();
    let width = result
        .ranking
        .iter()
        .map(|c| c.event_type.len())
        .max()
        .unwrap_or(0);

    let _ = writeln!(output, "Correlation of activity types with final score");
    for entry in &result.ranking {
        if entry.coefficient.is_finite() {
            let len = (entry.coefficient.abs() * TEXT_BAR_WIDTH as f64).round() as usize;
            let glyph = if entry.coefficient < 0.0 { '-' } else { '#' };
            let _ = writeln!(
                output,
                "{:<width$} | {:<bar_width$} {:.2}",
                entry.event_type,
                glyph.to_string().repeat(len),
                entry.coefficient,
                bar_width = TEXT_BAR_WIDTH,
            );
        } else {
            let _ = writeln!(
                output,
                "{:<width$} | {:<bar_width$} n/a",
                entry.event_type,
                "",
                bar_width = TEXT_BAR_WIDTH,
            );
        }
    }
    output
}

fn render_distribution_text(
    event_types: &[&str],
    students: &[&StudentActivity],
    top_n: usize,
) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Activity breakdown for the top {top_n} students");

    let mut header = format!("{:>8}", "user_id");
    for event_type in event_types {
        let _ = write!(header, " {:>width$}", event_type, width = event_type.len().max(5));
    }
    let _ = writeln!(output, "{header} {:>14}", "total_activity");

    for student in students {
        let mut line = format!("{:>8}", student.user_id);
        for event_type in event_types {
            let _ = write!(
                line,
                " {:>width$}",
                student.count(event_type),
                width = event_type.len().max(5)
            );
        }
        let _ = writeln!(output, "{line} {:>14}", student.total_activity);
    }
    output
}
