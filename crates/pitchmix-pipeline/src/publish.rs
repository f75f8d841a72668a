// Published tables and the multi-sheet workbook they are written to.
//
// Every float that reaches a sheet is rounded to three decimals here; that is
// the precision all readers of the artifact see.

use chrono::NaiveDate;
use rust_xlsxwriter::{Workbook, XlsxError};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::identity::TeamRecord;
use crate::metrics::MatchupLine;

pub const ARTIFACT_PREFIX: &str = "relational_cluster_2025_";
pub const ARTIFACT_EXTENSION: &str = ".xlsx";

pub const SHEET_PITCHER_CLUSTERS: &str = "Pitcher Clusters";
pub const SHEET_BATTER_VS_CLUSTER: &str = "Batter vs Cluster";
pub const SHEET_TEAMS: &str = "Teams";
pub const SHEET_BATTERS: &str = "Batters";
pub const SHEET_PITCHERS: &str = "Pitchers";
pub const SHEET_FOCUSED: &str = "Focused batter metrics";
pub const SHEET_DEFINITIONS: &str = "Metric Definitions";

/// Decimal places kept for published rate, value and mean columns.
pub const PUBLISHED_DECIMALS: i32 = 3;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to build workbook: {0}")]
    Xlsx(#[from] XlsxError),

    #[error("failed to write {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
}

pub fn round3(value: f64) -> f64 {
    let factor = 10f64.powi(PUBLISHED_DECIMALS);
    (value * factor).round() / factor
}

/// `relational_cluster_2025_<YYYY-MM-DD>.xlsx`
pub fn artifact_file_name(run_date: NaiveDate) -> String {
    format!(
        "{ARTIFACT_PREFIX}{}{ARTIFACT_EXTENSION}",
        run_date.format("%Y-%m-%d")
    )
}

// ---------------------------------------------------------------------------
// Sheet rows
// ---------------------------------------------------------------------------

/// A single worksheet cell value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Int(i64),
    Float(f64),
    Text(String),
    Blank,
}

impl Cell {
    fn text(value: &Option<String>) -> Self {
        value.clone().map_or(Cell::Blank, Cell::Text)
    }

    fn float(value: Option<f64>) -> Self {
        value.map_or(Cell::Blank, Cell::Float)
    }

    fn int(value: Option<u32>) -> Self {
        value.map_or(Cell::Blank, |v| Cell::Int(v.into()))
    }
}

/// A row type that knows its sheet's header and how to lay itself out.
pub trait SheetRow {
    const HEADERS: &'static [&'static str];

    fn cells(&self) -> Vec<Cell>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct PitcherClusterRow {
    pub pitcher: u32,
    pub cluster: usize,
    pub umap_1: f64,
    pub umap_2: f64,
    pub player_name: Option<String>,
    pub pitcher_full_name: Option<String>,
    pub team: Option<String>,
    pub team_id: Option<u32>,
}

impl SheetRow for PitcherClusterRow {
    const HEADERS: &'static [&'static str] = &[
        "pitcher",
        "cluster",
        "UMAP_1",
        "UMAP_2",
        "player_name",
        "pitcher_full_name",
        "team",
        "team_ID",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(self.pitcher.into()),
            Cell::Int(self.cluster as i64),
            Cell::Float(self.umap_1),
            Cell::Float(self.umap_2),
            Cell::text(&self.player_name),
            Cell::text(&self.pitcher_full_name),
            Cell::text(&self.team),
            Cell::int(self.team_id),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatterClusterRow {
    pub batter: u32,
    pub cluster: usize,
    pub estimated_ba_using_speedangle: Option<f64>,
    pub estimated_woba_using_speedangle: Option<f64>,
    pub woba_value: Option<f64>,
    pub woba_denom: Option<f64>,
    pub babip_value: Option<f64>,
    pub iso_value: Option<f64>,
    pub launch_speed_angle: Option<f64>,
    pub max_launch_speed: Option<f64>,
    pub avg_launch_angle: Option<f64>,
    pub pitches_faced: u32,
    pub at_bats: u32,
    pub hits: u32,
    pub walks: u32,
    pub hit_by_pitch: u32,
    pub sac_flies: u32,
    pub batting_average: f64,
    pub slugging: f64,
    pub woba: f64,
    pub plate_appearances: u32,
    pub wraa: f64,
    pub proxy_war: f64,
    pub cluster_tier: u32,
    pub cluster_rank: u32,
    pub team: Option<String>,
    pub team_id: Option<u32>,
    pub batter_full_name: Option<String>,
}

impl BatterClusterRow {
    /// Publishable row for a matchup line, rounded.
    pub fn from_line(
        line: &MatchupLine,
        team: Option<String>,
        team_id: Option<u32>,
        batter_full_name: Option<String>,
    ) -> Self {
        let t = &line.totals;
        let r = |v: Option<f64>| v.map(round3);
        Self {
            batter: t.batter,
            cluster: t.cluster,
            estimated_ba_using_speedangle: r(t.estimated_ba.mean()),
            estimated_woba_using_speedangle: r(t.estimated_woba.mean()),
            woba_value: r(t.woba_value.mean()),
            woba_denom: r(t.woba_denom.mean()),
            babip_value: r(t.babip_value.mean()),
            iso_value: r(t.iso_value.mean()),
            launch_speed_angle: r(t.launch_speed_angle.mean()),
            max_launch_speed: r(t.max_launch_speed),
            avg_launch_angle: r(t.launch_angle.mean()),
            pitches_faced: t.pitches_faced,
            at_bats: t.at_bats,
            hits: t.hits,
            walks: t.walks,
            hit_by_pitch: t.hit_by_pitch,
            sac_flies: t.sac_flies,
            batting_average: round3(line.batting_average),
            slugging: round3(line.slugging),
            woba: round3(line.woba),
            plate_appearances: line.plate_appearances,
            wraa: round3(line.wraa),
            proxy_war: round3(line.proxy_war),
            cluster_tier: line.cluster_tier,
            cluster_rank: line.cluster_rank,
            team,
            team_id,
            batter_full_name,
        }
    }
}

impl SheetRow for BatterClusterRow {
    const HEADERS: &'static [&'static str] = &[
        "batter",
        "cluster",
        "estimated_ba_using_speedangle",
        "estimated_woba_using_speedangle",
        "woba_value",
        "woba_denom",
        "babip_value",
        "iso_value",
        "launch_speed_angle",
        "max_launch_speed",
        "avg_launch_angle",
        "pitches_faced",
        "AB",
        "Hits",
        "BB",
        "HBP",
        "SF",
        "BA",
        "SLG",
        "wOBA",
        "PA",
        "wRAA",
        "proxy_WAR",
        "cluster_tier",
        "cluster_rank",
        "team",
        "team_ID",
        "batter_full_name",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(self.batter.into()),
            Cell::Int(self.cluster as i64),
            Cell::float(self.estimated_ba_using_speedangle),
            Cell::float(self.estimated_woba_using_speedangle),
            Cell::float(self.woba_value),
            Cell::float(self.woba_denom),
            Cell::float(self.babip_value),
            Cell::float(self.iso_value),
            Cell::float(self.launch_speed_angle),
            Cell::float(self.max_launch_speed),
            Cell::float(self.avg_launch_angle),
            Cell::Int(self.pitches_faced.into()),
            Cell::Int(self.at_bats.into()),
            Cell::Int(self.hits.into()),
            Cell::Int(self.walks.into()),
            Cell::Int(self.hit_by_pitch.into()),
            Cell::Int(self.sac_flies.into()),
            Cell::Float(self.batting_average),
            Cell::Float(self.slugging),
            Cell::Float(self.woba),
            Cell::Int(self.plate_appearances.into()),
            Cell::Float(self.wraa),
            Cell::Float(self.proxy_war),
            Cell::Int(self.cluster_tier.into()),
            Cell::Int(self.cluster_rank.into()),
            Cell::text(&self.team),
            Cell::int(self.team_id),
            Cell::text(&self.batter_full_name),
        ]
    }
}

impl SheetRow for TeamRecord {
    const HEADERS: &'static [&'static str] = &["team_ID", "team"];

    fn cells(&self) -> Vec<Cell> {
        vec![Cell::Int(self.team_id.into()), Cell::Text(self.team.clone())]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatterRecord {
    pub batter: u32,
    pub batter_full_name: Option<String>,
    pub team_id: Option<u32>,
}

impl SheetRow for BatterRecord {
    const HEADERS: &'static [&'static str] = &["batter", "batter_full_name", "team_ID"];

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(self.batter.into()),
            Cell::text(&self.batter_full_name),
            Cell::int(self.team_id),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PitcherRecord {
    pub pitcher: u32,
    pub pitcher_full_name: Option<String>,
    pub team_id: Option<u32>,
}

impl SheetRow for PitcherRecord {
    const HEADERS: &'static [&'static str] = &["pitcher", "pitcher_full_name", "team_ID"];

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Int(self.pitcher.into()),
            Cell::text(&self.pitcher_full_name),
            Cell::int(self.team_id),
        ]
    }
}

/// The compact per-matchup view.
#[derive(Debug, Clone, PartialEq)]
pub struct FocusedRow {
    pub batter_full_name: Option<String>,
    pub team: Option<String>,
    pub cluster: usize,
    pub proxy_war: f64,
    pub plate_appearances: u32,
    pub hits: u32,
    pub batting_average: f64,
    pub slugging: f64,
}

impl From<&BatterClusterRow> for FocusedRow {
    fn from(row: &BatterClusterRow) -> Self {
        Self {
            batter_full_name: row.batter_full_name.clone(),
            team: row.team.clone(),
            cluster: row.cluster,
            proxy_war: row.proxy_war,
            plate_appearances: row.plate_appearances,
            hits: row.hits,
            batting_average: row.batting_average,
            slugging: row.slugging,
        }
    }
}

impl SheetRow for FocusedRow {
    const HEADERS: &'static [&'static str] = &[
        "batter_full_name",
        "team",
        "cluster",
        "proxy_WAR",
        "PA",
        "Hits",
        "BA",
        "SLG",
    ];

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::text(&self.batter_full_name),
            Cell::text(&self.team),
            Cell::Int(self.cluster as i64),
            Cell::Float(self.proxy_war),
            Cell::Int(self.plate_appearances.into()),
            Cell::Int(self.hits.into()),
            Cell::Float(self.batting_average),
            Cell::Float(self.slugging),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricDefinition {
    pub metric: &'static str,
    pub definition: &'static str,
}

impl SheetRow for MetricDefinition {
    const HEADERS: &'static [&'static str] = &["Metric", "Definition"];

    fn cells(&self) -> Vec<Cell> {
        vec![
            Cell::Text(self.metric.to_string()),
            Cell::Text(self.definition.to_string()),
        ]
    }
}

pub const METRIC_DEFINITIONS: &[MetricDefinition] = &[
    MetricDefinition {
        metric: "estimated_ba_using_speedangle",
        definition: "Expected batting average from exit velocity and launch angle.",
    },
    MetricDefinition {
        metric: "estimated_woba_using_speedangle",
        definition: "Expected wOBA from exit velocity and launch angle.",
    },
    MetricDefinition {
        metric: "woba_value",
        definition: "Mean wOBA credit per pitch that ended a plate appearance.",
    },
    MetricDefinition {
        metric: "woba_denom",
        definition: "Mean wOBA denominator (plate appearances that count toward wOBA).",
    },
    MetricDefinition {
        metric: "babip_value",
        definition: "Batting average on balls in play.",
    },
    MetricDefinition {
        metric: "iso_value",
        definition: "Isolated power: extra bases per at-bat.",
    },
    MetricDefinition {
        metric: "launch_speed_angle",
        definition: "Statcast batted-ball quality bucket from launch speed and angle (1 weak to 6 barrel).",
    },
    MetricDefinition {
        metric: "max_launch_speed",
        definition: "Hardest exit velocity (mph) for this batter against the cluster.",
    },
    MetricDefinition {
        metric: "avg_launch_angle",
        definition: "Average launch angle of batted balls, in degrees.",
    },
    MetricDefinition {
        metric: "BA",
        definition: "Batting average: hits / at-bats.",
    },
    MetricDefinition {
        metric: "SLG",
        definition: "Slugging percentage as published: hits / at-bats unless the run weighted by total bases.",
    },
    MetricDefinition {
        metric: "wOBA",
        definition: "Weighted on-base average: summed wOBA credit / summed wOBA denominator.",
    },
    MetricDefinition {
        metric: "PA",
        definition: "Plate appearances: AB + BB + HBP + SF.",
    },
    MetricDefinition {
        metric: "wRAA",
        definition: "Weighted runs above average: ((wOBA - 0.315) / 1.25) * PA.",
    },
    MetricDefinition {
        metric: "proxy_WAR",
        definition: "Wins above replacement proxy: wRAA / 10.",
    },
    MetricDefinition {
        metric: "cluster_tier",
        definition: "Dense rank of the cluster's mean wOBA across all batters; 1 is the cluster hit hardest.",
    },
    MetricDefinition {
        metric: "cluster_rank",
        definition: "Dense rank of this wOBA among the batter's own clusters; 1 is the batter's best matchup.",
    },
];

// ---------------------------------------------------------------------------
// Table set
// ---------------------------------------------------------------------------

/// Every table a run publishes, in sheet order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishedTables {
    pub pitcher_clusters: Vec<PitcherClusterRow>,
    pub batter_vs_cluster: Vec<BatterClusterRow>,
    pub teams: Vec<TeamRecord>,
    pub batters: Vec<BatterRecord>,
    pub pitchers: Vec<PitcherRecord>,
    pub focused: Vec<FocusedRow>,
}

fn write_sheet<R: SheetRow>(workbook: &mut Workbook, name: &str, rows: &[R]) -> Result<(), XlsxError> {
    let sheet = workbook.add_worksheet();
    sheet.set_name(name)?;

    for (col, header) in R::HEADERS.iter().enumerate() {
        sheet.write_string(0, col as u16, *header)?;
    }
    for (idx, row) in rows.iter().enumerate() {
        let excel_row = idx as u32 + 1;
        for (col, cell) in row.cells().into_iter().enumerate() {
            let col = col as u16;
            match cell {
                Cell::Int(v) => {
                    sheet.write_number(excel_row, col, v as f64)?;
                }
                Cell::Float(v) => {
                    sheet.write_number(excel_row, col, v)?;
                }
                Cell::Text(s) => {
                    sheet.write_string(excel_row, col, s)?;
                }
                Cell::Blank => {}
            }
        }
    }
    Ok(())
}

/// Serialize all seven sheets into an in-memory workbook.
pub fn workbook_bytes(tables: &PublishedTables) -> Result<Vec<u8>, PublishError> {
    let mut workbook = Workbook::new();
    write_sheet(&mut workbook, SHEET_PITCHER_CLUSTERS, &tables.pitcher_clusters)?;
    write_sheet(&mut workbook, SHEET_BATTER_VS_CLUSTER, &tables.batter_vs_cluster)?;
    write_sheet(&mut workbook, SHEET_TEAMS, &tables.teams)?;
    write_sheet(&mut workbook, SHEET_BATTERS, &tables.batters)?;
    write_sheet(&mut workbook, SHEET_PITCHERS, &tables.pitchers)?;
    write_sheet(&mut workbook, SHEET_FOCUSED, &tables.focused)?;
    write_sheet(&mut workbook, SHEET_DEFINITIONS, METRIC_DEFINITIONS)?;
    Ok(workbook.save_to_buffer()?)
}

/// Write the artifact for `run_date` into `output_dir`. The file is built in
/// a temporary file beside the target and renamed into place, so readers
/// never see a partial workbook.
pub fn publish(tables: &PublishedTables, output_dir: &Path, run_date: NaiveDate) -> Result<PathBuf, PublishError> {
    let io_err = |path: &Path, source: std::io::Error| PublishError::Io {
        path: path.display().to_string(),
        source,
    };

    let bytes = workbook_bytes(tables)?;

    std::fs::create_dir_all(output_dir).map_err(|e| io_err(output_dir, e))?;
    let target = output_dir.join(artifact_file_name(run_date));

    let mut tmp = tempfile::NamedTempFile::new_in(output_dir).map_err(|e| io_err(output_dir, e))?;
    tmp.write_all(&bytes).map_err(|e| io_err(&target, e))?;
    tmp.as_file().sync_all().map_err(|e| io_err(&target, e))?;
    tmp.persist(&target).map_err(|e| io_err(&target, e.error))?;

    info!(
        "Published {} matchup rows for {} pitchers to {}",
        tables.batter_vs_cluster.len(),
        tables.pitcher_clusters.len(),
        target.display()
    );
    Ok(target)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
