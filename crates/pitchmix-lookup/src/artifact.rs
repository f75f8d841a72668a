// Locating the newest published workbook and loading the two sheets the
// lookup needs.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

use calamine::{open_workbook, Data, Range, Reader, Xlsx, XlsxError};
use tracing::{debug, info};

use pitchmix_pipeline::publish::{
    ARTIFACT_EXTENSION, ARTIFACT_PREFIX, SHEET_BATTER_VS_CLUSTER, SHEET_PITCHER_CLUSTERS,
};

use crate::query::{LookupTables, MatchupEntry, PitcherEntry};

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("no published artifact found in {}; run the pipeline first", .dir.display())]
    MissingArtifact { dir: PathBuf },

    #[error("failed to load {}: {cause}", .path.display())]
    SheetLoadFailure { path: PathBuf, cause: String },
}

/// The artifact with the lexicographically greatest name in `dir`. Names
/// embed an ISO date, so this is also the most recent run.
pub fn find_latest_artifact(dir: &Path) -> Result<PathBuf, LookupError> {
    let missing = || LookupError::MissingArtifact { dir: dir.to_path_buf() };

    let entries = std::fs::read_dir(dir).map_err(|_| missing())?;
    let latest = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.starts_with(ARTIFACT_PREFIX) && name.ends_with(ARTIFACT_EXTENSION))
        .max()
        .ok_or_else(missing)?;

    let path = dir.join(latest);
    info!("Using artifact {}", path.display());
    Ok(path)
}

/// Read the pitcher and matchup sheets from a published workbook.
pub fn load_tables(path: &Path) -> Result<LookupTables, LookupError> {
    let fail = |cause: String| LookupError::SheetLoadFailure {
        path: path.to_path_buf(),
        cause,
    };

    let mut workbook: Xlsx<BufReader<File>> =
        open_workbook(path).map_err(|e: XlsxError| fail(e.to_string()))?;
    let pitchers = workbook
        .worksheet_range(SHEET_PITCHER_CLUSTERS)
        .map_err(|e| fail(format!("sheet `{SHEET_PITCHER_CLUSTERS}`: {e}")))?;
    let matchups = workbook
        .worksheet_range(SHEET_BATTER_VS_CLUSTER)
        .map_err(|e| fail(format!("sheet `{SHEET_BATTER_VS_CLUSTER}`: {e}")))?;

    let tables = LookupTables {
        pitchers: read_pitchers(&pitchers).map_err(fail)?,
        matchups: read_matchups(&matchups).map_err(fail)?,
    };
    debug!(
        pitchers = tables.pitchers.len(),
        matchups = tables.matchups.len(),
        "loaded lookup tables"
    );
    Ok(tables)
}

// ---------------------------------------------------------------------------
// Sheet parsing
// ---------------------------------------------------------------------------

/// Header row of a sheet, resolved to column positions by name.
struct Columns<'a> {
    sheet: &'static str,
    header: Vec<&'a str>,
}

impl<'a> Columns<'a> {
    fn new(sheet: &'static str, range: &'a Range<Data>) -> Result<Self, String> {
        let first = range
            .rows()
            .next()
            .ok_or_else(|| format!("sheet `{sheet}` is empty"))?;
        let header = first
            .iter()
            .map(|cell| match cell {
                Data::String(s) => s.as_str(),
                _ => "",
            })
            .collect();
        Ok(Self { sheet, header })
    }

    fn index(&self, name: &str) -> Result<usize, String> {
        self.header
            .iter()
            .position(|h| *h == name)
            .ok_or_else(|| format!("sheet `{}` has no `{name}` column", self.sheet))
    }
}

fn text(row: &[Data], col: usize) -> Option<String> {
    match row.get(col)? {
        Data::String(s) if !s.is_empty() => Some(s.clone()),
        Data::Float(f) => Some(f.to_string()),
        Data::Int(i) => Some(i.to_string()),
        _ => None,
    }
}

fn number(row: &[Data], col: usize) -> Option<f64> {
    match row.get(col)? {
        Data::Float(f) => Some(*f),
        Data::Int(i) => Some(*i as f64),
        Data::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn required(row: &[Data], col: usize, sheet: &str, line: usize, name: &str) -> Result<f64, String> {
    number(row, col).ok_or_else(|| format!("sheet `{sheet}` row {line}: `{name}` is not a number"))
}

fn read_pitchers(range: &Range<Data>) -> Result<Vec<PitcherEntry>, String> {
    let sheet = SHEET_PITCHER_CLUSTERS;
    let cols = Columns::new(sheet, range)?;
    let full_name = cols.index("pitcher_full_name")?;
    let player_name = cols.index("player_name")?;
    let cluster = cols.index("cluster")?;

    range
        .rows()
        .enumerate()
        .skip(1)
        .map(|(line, row)| {
            Ok(PitcherEntry {
                full_name: text(row, full_name),
                player_name: text(row, player_name),
                cluster: required(row, cluster, sheet, line + 1, "cluster")? as usize,
            })
        })
        .collect()
}

fn read_matchups(range: &Range<Data>) -> Result<Vec<MatchupEntry>, String> {
    let sheet = SHEET_BATTER_VS_CLUSTER;
    let cols = Columns::new(sheet, range)?;
    let cluster = cols.index("cluster")?;
    let team = cols.index("team")?;
    let name = cols.index("batter_full_name")?;
    let ba = cols.index("BA")?;
    let slg = cols.index("SLG")?;
    let war = cols.index("proxy_WAR")?;
    let pa = cols.index("PA")?;
    let hits = cols.index("Hits")?;

    range
        .rows()
        .enumerate()
        .skip(1)
        .map(|(line, row)| {
            let line = line + 1;
            Ok(MatchupEntry {
                cluster: required(row, cluster, sheet, line, "cluster")? as usize,
                team: text(row, team),
                batter_full_name: text(row, name),
                batting_average: required(row, ba, sheet, line, "BA")?,
                slugging: required(row, slg, sheet, line, "SLG")?,
                proxy_war: required(row, war, sheet, line, "proxy_WAR")?,
                plate_appearances: required(row, pa, sheet, line, "PA")? as u32,
                hits: required(row, hits, sheet, line, "Hits")? as u32,
            })
        })
        .collect()
}
