// Matchup lookup entry point.
//
// 1. Initialize tracing (log to file)
// 2. Find the newest artifact in the output directory
// 3. Load the pitcher and matchup sheets
// 4. Answer the query and print the result

use pitchmix_lookup::artifact;
use pitchmix_lookup::query::{LookupResult, MatchupView};

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

/// Show how a team's batters fare against a pitcher's cluster.
#[derive(Debug, Parser)]
#[command(name = "pitchmix-lookup", version)]
struct Args {
    /// Directory the pipeline publishes workbooks into.
    #[arg(long, default_value = "output")]
    output_dir: PathBuf,

    /// Pitcher full name, e.g. "Gerrit Cole".
    #[arg(long)]
    pitcher: String,

    /// Team abbreviation, e.g. NYY.
    #[arg(long)]
    team: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing()?;

    let path = artifact::find_latest_artifact(&args.output_dir)?;
    let tables = artifact::load_tables(&path).context("could not read the published tables")?;
    info!(
        "Loaded {} pitchers and {} matchups from {}",
        tables.pitchers.len(),
        tables.matchups.len(),
        path.display()
    );

    match tables.query(&args.pitcher, &args.team) {
        LookupResult::NoMatch => {
            println!("No pitcher named \"{}\" in {}", args.pitcher, path.display());
        }
        LookupResult::EmptyTeam { cluster } => {
            println!(
                "{} is in cluster {cluster}, but no {} batter has enough at-bats against it",
                args.pitcher,
                args.team.to_uppercase()
            );
        }
        LookupResult::Matchups { cluster, rows } => {
            println!(
                "{} batters vs {} (cluster {cluster})",
                args.team.to_uppercase(),
                args.pitcher
            );
            print_rows(&rows);
        }
    }
    Ok(())
}

fn print_rows(rows: &[MatchupView]) {
    println!(
        "{:<28} {:>6} {:>6} {:>9} {:>4} {:>5}",
        "Batter", "BA", "SLG", "proxyWAR", "PA", "Hits"
    );
    for row in rows {
        println!(
            "{:<28} {:>6.3} {:>6.3} {:>9.3} {:>4} {:>5}",
            row.batter_full_name.as_deref().unwrap_or("(unknown)"),
            row.batting_average,
            row.slugging,
            row.proxy_war,
            row.plate_appearances,
            row.hits
        );
    }
}

/// Initialize tracing to log to a file so stdout carries only the answer.
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("pitchmix-lookup.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("pitchmix_lookup=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
