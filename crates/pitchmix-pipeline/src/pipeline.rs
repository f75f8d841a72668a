// End-to-end run: ingest, cluster, aggregate, resolve, publish.
//
// Stages run once, in order. Nothing is written to the output directory
// unless every earlier stage succeeded.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use tracing::info;

use crate::aggregate;
use crate::cluster::{self, ClusterAssignment, ClusterError};
use crate::config::RunConfig;
use crate::features;
use crate::identity::{self, IdentityError, IdentitySource, TeamTable};
use crate::metrics::{self, MatchupLine};
use crate::publish::{
    self, BatterClusterRow, BatterRecord, FocusedRow, PitcherClusterRow, PitcherRecord, PublishError,
    PublishedTables,
};
use crate::statcast::{self, EventSource, IngestError, PitchEvent};

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("ingestion failed: {0}")]
    Ingest(#[from] IngestError),

    #[error("clustering failed: {0}")]
    Cluster(#[from] ClusterError),

    #[error("identity lookup failed: {0}")]
    Identity(#[from] IdentityError),

    #[error("publishing failed: {0}")]
    Publish(#[from] PublishError),
}

/// What a completed run produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub snapshot_path: PathBuf,
    pub artifact_path: PathBuf,
    pub events: usize,
    pub pitchers: usize,
    pub matchups: usize,
    pub teams: usize,
}

/// Ingest the configured window, snapshot it, compute every table and
/// publish the workbook for `run_date`.
pub async fn run(
    config: &RunConfig,
    run_date: NaiveDate,
    source: &dyn EventSource,
    identity: &dyn IdentitySource,
) -> Result<RunSummary, PipelineError> {
    let events = statcast::ingest(source, &config.date_range).await?;
    let snapshot_path = statcast::write_snapshot(&events, Path::new(&config.output_location.data_dir), run_date)?;

    let tables = compute_tables(&events, config, identity).await?;
    let artifact_path = publish::publish(&tables, Path::new(&config.output_location.output_dir), run_date)?;

    Ok(RunSummary {
        snapshot_path,
        artifact_path,
        events: events.len(),
        pitchers: tables.pitcher_clusters.len(),
        matchups: tables.batter_vs_cluster.len(),
        teams: tables.teams.len(),
    })
}

/// Everything between the raw events and the published tables.
pub async fn compute_tables(
    events: &[PitchEvent],
    config: &RunConfig,
    identity: &dyn IdentitySource,
) -> Result<PublishedTables, PipelineError> {
    let feature_table = features::build_features(events);
    info!(
        "Built features for {} pitchers ({} columns)",
        feature_table.rows.len(),
        feature_table.columns.len()
    );

    let assignments = cluster::assign_clusters(&feature_table, config)?;
    let lookup = cluster::cluster_lookup(&assignments);

    let totals = aggregate::aggregate(events, &lookup, config.min_at_bats);
    let lines = metrics::derive_lines(totals, config.tuning.slugging);
    info!("Derived {} batter-vs-cluster lines", lines.len());

    let mut ids: BTreeSet<u32> = assignments.iter().map(|a| a.pitcher).collect();
    ids.extend(lines.iter().map(|l| l.totals.batter));
    let names = identity::resolve_names(identity, &ids).await?;

    Ok(assemble(events, &assignments, &lines, &names))
}

/// Statcast's own display name for each pitcher, taken from the first event
/// that carries one.
fn source_pitcher_names(events: &[PitchEvent]) -> HashMap<u32, String> {
    let mut names = HashMap::new();
    for event in events {
        if let Some(name) = event.player_name.as_deref().filter(|n| !n.is_empty()) {
            names.entry(event.pitcher).or_insert_with(|| name.to_string());
        }
    }
    names
}

fn assemble(
    events: &[PitchEvent],
    assignments: &[ClusterAssignment],
    lines: &[MatchupLine],
    names: &BTreeMap<u32, Option<String>>,
) -> PublishedTables {
    let batter_teams = identity::majority_teams(events, |e| e.batter, identity::batter_team);
    let pitcher_teams = identity::majority_teams(events, |e| e.pitcher, identity::pitcher_team);
    let statcast_names = source_pitcher_names(events);
    let name_of = |id: u32| names.get(&id).cloned().flatten();

    let published_batters: BTreeSet<u32> = lines.iter().map(|l| l.totals.batter).collect();
    let teams = TeamTable::build(
        published_batters
            .iter()
            .filter_map(|b| batter_teams.get(b))
            .chain(assignments.iter().filter_map(|a| pitcher_teams.get(&a.pitcher)))
            .cloned(),
    );
    let team_id = |team: Option<&String>| team.and_then(|t| teams.id_of(t));

    let pitcher_clusters: Vec<PitcherClusterRow> = assignments
        .iter()
        .map(|a| {
            let team = pitcher_teams.get(&a.pitcher);
            PitcherClusterRow {
                pitcher: a.pitcher,
                cluster: a.cluster,
                umap_1: publish::round3(a.embedding.0),
                umap_2: publish::round3(a.embedding.1),
                player_name: statcast_names.get(&a.pitcher).cloned(),
                pitcher_full_name: name_of(a.pitcher),
                team: team.cloned(),
                team_id: team_id(team),
            }
        })
        .collect();

    let batter_vs_cluster: Vec<BatterClusterRow> = lines
        .iter()
        .map(|line| {
            let batter = line.totals.batter;
            let team = batter_teams.get(&batter);
            BatterClusterRow::from_line(line, team.cloned(), team_id(team), name_of(batter))
        })
        .collect();

    let batters = published_batters
        .iter()
        .map(|&batter| BatterRecord {
            batter,
            batter_full_name: name_of(batter),
            team_id: team_id(batter_teams.get(&batter)),
        })
        .collect();

    let mut pitchers: Vec<PitcherRecord> = pitcher_clusters
        .iter()
        .map(|row| PitcherRecord {
            pitcher: row.pitcher,
            pitcher_full_name: row.pitcher_full_name.clone(),
            team_id: row.team_id,
        })
        .collect();
    pitchers.sort_by_key(|p| p.pitcher);

    let focused = batter_vs_cluster.iter().map(FocusedRow::from).collect();

    PublishedTables {
        pitcher_clusters,
        batter_vs_cluster,
        teams: teams.records().to_vec(),
        batters,
        pitchers,
        focused,
    }
}
