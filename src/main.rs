use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Args, Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use learning_path_analyzer::chart::{self, ChartTarget};
use learning_path_analyzer::pipeline::{self, DataSource, PipelineOutput};
use learning_path_analyzer::{demo, loader, report, scores};

#[derive(Parser)]
#[command(name = "learning-path-analyzer")]
#[command(about = "Correlates LMS activity with final scores", long_about = None)]
struct Cli {
    /// Log filter, e.g. `info` or `learning_path_analyzer=debug`
    #[arg(long, global = true, env = "LMS_LOG_LEVEL", default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// CSV export with at least `user_id` and `event_type` columns
    #[arg(long, env = "LMS_DATA_PATH", default_value = "data/sample_logs.csv")]
    data: PathBuf,
    /// Generate demo events when the data file does not exist
    #[arg(long)]
    demo: bool,
    /// Seed for demo events and synthetic scores
    #[arg(long, default_value_t = scores::DEFAULT_SEED)]
    seed: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank activity types by correlation with final scores
    #[command(group(
        ArgGroup::new("output")
            .args(["chart", "show"])
            .multiple(false)
    ))]
    Analyze {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value = "docs/activity_correlation.png")]
        chart: PathBuf,
        /// Print the chart to the terminal instead of saving it
        #[arg(long)]
        show: bool,
        /// Also save the per-student activity breakdown, even with --show
        #[arg(long)]
        distribution: Option<PathBuf>,
        #[arg(long, default_value_t = chart::DEFAULT_TOP_N)]
        top_n: usize,
        /// Print the result as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value = "docs/learning_path_report.md")]
        out: PathBuf,
    },
    /// Write demo events to a CSV file
    DemoData {
        #[arg(long, default_value = "data/sample_logs.csv")]
        out: PathBuf,
        #[arg(long, default_value_t = scores::DEFAULT_SEED)]
        seed: u64,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    match cli.command {
        Commands::Analyze {
            input,
            chart: chart_path,
            show,
            distribution,
            top_n,
            json,
        } => {
            let (source, output) = run(&input)?;

            if json {
                let summary = serde_json::json!({
                    "source": source.label(),
                    "score_source": output.score_source,
                    "students": output.activity.len(),
                    "correlation": output.correlation,
                });
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_correlation(&output);
            }

            let target = if show {
                ChartTarget::Terminal
            } else {
                ChartTarget::File(chart_path)
            };
            chart::plot_activity_correlation(&output.correlation, &target)?;

            if let Some(target) = ChartTarget::for_distribution(show, distribution) {
                chart::plot_student_activity_distribution(&output.activity, top_n, &target)?;
            }
        }
        Commands::Report { input, out } => {
            let (source, output) = run(&input)?;
            let report = report::build_report(
                &source.label(),
                output.score_source,
                &output.events,
                &output.activity,
                &output.correlation,
            );
            if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::DemoData { out, seed } => {
            let log = demo::create_demo_data(seed);
            let written = loader::write_lms_data(&log, &out)?;
            println!("Wrote {written} demo events to {}.", out.display());
        }
    }

    Ok(())
}

fn run(input: &InputArgs) -> anyhow::Result<(DataSource, PipelineOutput)> {
    let source = DataSource::resolve(&input.data, input.demo, input.seed).with_context(|| {
        format!(
            "no data at {}; pass --demo to analyze generated events",
            input.data.display()
        )
    })?;
    let output = pipeline::run_analysis(&source, input.seed)?;
    Ok((source, output))
}

fn print_correlation(output: &PipelineOutput) {
    println!("Correlation of activity with final scores ({}):", output.score_source);
    print!("{}", report::correlation_table(&output.correlation));

    if let Some(text) = report::recommendation(&output.correlation) {
        println!();
        println!("[RECOMMENDATION] {text}");
    }
}

fn setup_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();
}
