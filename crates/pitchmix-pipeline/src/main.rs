// Pipeline entry point.
//
// Startup sequence:
// 1. Initialize tracing (log to file, the terminal only gets the summary)
// 2. Load config
// 3. Build the event and identity sources
// 4. Run the pipeline
// 5. Report where the artifact landed

use pitchmix_pipeline::config;
use pitchmix_pipeline::identity;
use pitchmix_pipeline::pipeline;
use pitchmix_pipeline::statcast;

use anyhow::Context;
use chrono::NaiveDate;
use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};

/// Cluster pitchers by arsenal and score every batter against each cluster.
#[derive(Debug, Parser)]
#[command(name = "pitchmix", version)]
struct Args {
    /// Date stamped on the snapshot and artifact; also closes the window
    /// when the config leaves `window.end` unset. Defaults to today.
    #[arg(long)]
    run_date: Option<NaiveDate>,

    /// Directory holding `config/` and `defaults/`.
    #[arg(long, default_value = ".")]
    base_dir: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // 1. Initialize tracing
    init_tracing()?;
    let run_date = args
        .run_date
        .unwrap_or_else(|| chrono::Local::now().date_naive());
    info!("pitchmix starting for run date {run_date}");

    // 2. Load config
    let config = config::load_config(&args.base_dir, run_date).context("failed to load configuration")?;
    info!(
        "Config loaded: window {}..={}, {} clusters, seed {}",
        config.date_range.start, config.date_range.end, config.cluster_count, config.random_seed
    );

    // 3. Build sources
    let source = statcast::source_from_config(&config.event_source).context("failed to build event source")?;
    let identity =
        identity::identity_from_config(&config.identity).context("failed to build identity source")?;

    // 4. Run
    let summary = match pipeline::run(&config, run_date, source.as_ref(), identity.as_ref()).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("Pipeline failed: {e}");
            return Err(anyhow::Error::new(e).context("pipeline run failed"));
        }
    };

    // 5. Report
    info!(
        "Run complete: {} events, {} pitchers, {} matchups, {} teams",
        summary.events, summary.pitchers, summary.matchups, summary.teams
    );
    println!("snapshot: {}", summary.snapshot_path.display());
    println!("artifact: {}", summary.artifact_path.display());
    Ok(())
}

/// Initialize tracing to log to a file so stdout carries only the run summary.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("pitchmix.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pitchmix_pipeline=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
