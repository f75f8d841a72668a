// Pitch event ingestion: the Statcast row schema, event sources, and the raw
// snapshot written at the start of every run.
//
// Baseball Savant serves one CSV row per pitch. Its header repeats a couple of
// column names (`pitcher`, `fielder_2`), so headers are de-duplicated before
// serde sees them.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{DateRange, EventSourceConfig};

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// One pitch as reported by Statcast. Only the columns the pipeline reads are
/// kept; everything else in the source CSV is ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PitchEvent {
    #[serde(default)]
    pub game_date: Option<String>,
    pub pitcher: u32,
    pub batter: u32,
    /// Pitcher name as Statcast spells it ("Last, First").
    #[serde(default)]
    pub player_name: Option<String>,
    #[serde(default)]
    pub pitch_type: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub release_speed: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub release_pos_x: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub release_pos_y: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub release_pos_z: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub release_extension: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub pfx_x: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub pfx_z: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub release_spin_rate: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub spin_axis: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub api_break_z_with_gravity: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub api_break_x_batter_in: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub arm_angle: Option<f64>,
    /// Plate-appearance outcome; only set on the pitch that ends the PA.
    #[serde(default)]
    pub events: Option<String>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub estimated_ba_using_speedangle: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub estimated_woba_using_speedangle: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub woba_value: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub woba_denom: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub babip_value: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub iso_value: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub launch_speed_angle: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub launch_speed: Option<f64>,
    #[serde(default, deserialize_with = "csv::invalid_option")]
    pub launch_angle: Option<f64>,
    #[serde(default)]
    pub inning_topbot: Option<String>,
    #[serde(default)]
    pub home_team: Option<String>,
    #[serde(default)]
    pub away_team: Option<String>,
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("event request for {day} failed: {source}")]
    Http {
        day: NaiveDate,
        source: reqwest::Error,
    },

    #[error("event request for {day} returned HTTP {status}")]
    Status {
        day: NaiveDate,
        status: reqwest::StatusCode,
    },

    #[error("CSV error in {origin}: {source}")]
    Csv { origin: String, source: csv::Error },

    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("no pitch events returned for {start}..={end}")]
    Empty { start: NaiveDate, end: NaiveDate },
}

// ---------------------------------------------------------------------------
// Event sources
// ---------------------------------------------------------------------------

/// Anything that can hand back every pitch in a date range.
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn fetch(&self, range: &DateRange) -> Result<Vec<PitchEvent>, IngestError>;
}

/// Build the configured event source.
pub fn source_from_config(config: &EventSourceConfig) -> Result<Box<dyn EventSource>, reqwest::Error> {
    Ok(match config {
        EventSourceConfig::Savant {
            base_url,
            request_timeout_secs,
        } => Box::new(SavantClient::new(
            base_url.clone(),
            Duration::from_secs(*request_timeout_secs),
        )?),
        EventSourceConfig::Snapshot { path } => Box::new(CsvSnapshotSource::new(path)),
    })
}

/// Baseball Savant `statcast_search/csv` client.
///
/// The endpoint truncates large responses, so the range is requested one day
/// at a time and the days are awaited in order.
pub struct SavantClient {
    http: reqwest::Client,
    base_url: String,
}

impl SavantClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http, base_url })
    }

    async fn fetch_day(&self, day: NaiveDate) -> Result<Vec<PitchEvent>, IngestError> {
        let date = day.format("%Y-%m-%d").to_string();
        let params: [(&str, &str); 12] = [
            ("all", "true"),
            ("type", "details"),
            ("player_type", "pitcher"),
            ("hfGT", "R|"),
            ("game_date_gt", &date),
            ("game_date_lt", &date),
            ("min_pitches", "0"),
            ("min_results", "0"),
            ("min_abs", "0"),
            ("group_by", "name"),
            ("sort_col", "pitches"),
            ("sort_order", "desc"),
        ];

        let response = self
            .http
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|source| IngestError::Http { day, source })?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Status { day, status });
        }

        let body = response
            .text()
            .await
            .map_err(|source| IngestError::Http { day, source })?;

        read_events(body.as_bytes()).map_err(|source| IngestError::Csv {
            origin: format!("savant response for {date}"),
            source,
        })
    }
}

#[async_trait]
impl EventSource for SavantClient {
    async fn fetch(&self, range: &DateRange) -> Result<Vec<PitchEvent>, IngestError> {
        let mut events = Vec::new();
        for day in range.days() {
            let day_events = self.fetch_day(day).await?;
            debug!(%day, rows = day_events.len(), "fetched statcast day");
            events.extend(day_events);
        }
        Ok(events)
    }
}

/// Replays a raw snapshot written by an earlier run. The date range is not
/// re-applied: a snapshot is the frozen input of the run that wrote it.
pub struct CsvSnapshotSource {
    path: PathBuf,
}

impl CsvSnapshotSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl EventSource for CsvSnapshotSource {
    async fn fetch(&self, _range: &DateRange) -> Result<Vec<PitchEvent>, IngestError> {
        let file = std::fs::File::open(&self.path).map_err(|source| IngestError::Io {
            path: self.path.display().to_string(),
            source,
        })?;
        read_events(file).map_err(|source| IngestError::Csv {
            origin: self.path.display().to_string(),
            source,
        })
    }
}

/// Pull every event in `range` and refuse an empty result.
pub async fn ingest(source: &dyn EventSource, range: &DateRange) -> Result<Vec<PitchEvent>, IngestError> {
    info!("Pulling pitch events from {} to {}", range.start, range.end);
    let events = source.fetch(range).await?;
    if events.is_empty() {
        return Err(IngestError::Empty {
            start: range.start,
            end: range.end,
        });
    }
    info!("Ingested {} pitch events", events.len());
    Ok(events)
}

// ---------------------------------------------------------------------------
// CSV reading and writing
// ---------------------------------------------------------------------------

/// Rename repeated header names the way pandas does (`pitcher`, `pitcher.1`).
fn dedupe_headers(headers: &csv::StringRecord) -> csv::StringRecord {
    let mut seen: HashMap<&str, usize> = HashMap::new();
    let mut out = csv::StringRecord::new();
    for name in headers.iter() {
        let count = seen.entry(name).or_insert(0);
        if *count == 0 {
            out.push_field(name);
        } else {
            out.push_field(&format!("{name}.{count}"));
        }
        *count += 1;
    }
    out
}

/// Parse Statcast CSV from any reader. Rows that do not deserialize (e.g. a
/// missing pitcher id) are skipped with a warning.
pub fn read_events<R: Read>(rdr: R) -> Result<Vec<PitchEvent>, csv::Error> {
    let mut reader = csv::Reader::from_reader(rdr);
    let headers = dedupe_headers(reader.headers()?);
    reader.set_headers(headers);

    let mut events = Vec::new();
    for result in reader.deserialize::<PitchEvent>() {
        match result {
            Ok(event) => events.push(event),
            Err(e) => warn!("skipping malformed pitch row: {}", e),
        }
    }
    Ok(events)
}

/// Serialize events in the snapshot schema.
pub fn write_events<W: Write>(wtr: W, events: &[PitchEvent]) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_writer(wtr);
    for event in events {
        writer.serialize(event)?;
    }
    writer.flush()?;
    Ok(())
}

/// File name of the raw snapshot for a run.
pub fn snapshot_file_name(run_date: NaiveDate) -> String {
    format!("statcast_2025_through_{}.csv", run_date.format("%Y-%m-%d"))
}

/// Persist the raw events under `data_dir`. The file appears only once it is
/// completely written.
pub fn write_snapshot(events: &[PitchEvent], data_dir: &Path, run_date: NaiveDate) -> Result<PathBuf, IngestError> {
    let io_err = |path: &Path| {
        let path = path.display().to_string();
        move |source: std::io::Error| IngestError::Io { path, source }
    };

    std::fs::create_dir_all(data_dir).map_err(io_err(data_dir))?;
    let target = data_dir.join(snapshot_file_name(run_date));

    let mut tmp = tempfile::NamedTempFile::new_in(data_dir).map_err(io_err(data_dir))?;
    write_events(tmp.as_file_mut(), events).map_err(|source| IngestError::Csv {
        origin: target.display().to_string(),
        source,
    })?;
    tmp.persist(&target)
        .map_err(|e| io_err(&target)(e.error))?;

    info!("Saved raw snapshot to {}", target.display());
    Ok(target)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(Vec<PitchEvent>);

    #[async_trait]
    impl EventSource for FixedSource {
        async fn fetch(&self, _range: &DateRange) -> Result<Vec<PitchEvent>, IngestError> {
            Ok(self.0.clone())
        }
    }

    fn range() -> DateRange {
        DateRange {
            start: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
            end: NaiveDate::from_ymd_opt(2025, 4, 2).unwrap(),
        }
    }

    /// Local HTTP endpoint that answers every request with `status_line`.
    fn serve_status(status_line: &'static str) -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(mut stream) = stream else { break };
                let mut request = Vec::new();
                let mut buf = [0u8; 4096];
                while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                    match stream.read(&mut buf) {
                        Ok(0) | Err(_) => break,
                        Ok(n) => request.extend_from_slice(&buf[..n]),
                    }
                }
                let response = format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\nconnection: close\r\n\r\n");
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}/endpoint")
    }

    /// Address nothing is listening on.
    fn closed_port() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}/endpoint")
    }

    // -- Savant-shaped CSV with duplicate headers and extra columns --

    #[test]
    fn parses_savant_rows_with_duplicate_headers() {
        let csv_data = "\
pitch_type,game_date,release_speed,player_name,batter,pitcher,events,description,pitcher,fielder_2,fielder_2,inning_topbot,home_team,away_team,launch_speed,woba_value,woba_denom
FF,2025-04-01,97.1,\"Cole, Gerrit\",592450,543037,single,hit_into_play,543037,1,2,Top,NYY,BOS,101.2,0.9,1
SL,2025-04-01,88.4,\"Cole, Gerrit\",592450,543037,,ball,543037,1,2,Top,NYY,BOS,,,";

        let events = read_events(csv_data.as_bytes()).unwrap();
        assert_eq!(events.len(), 2);

        assert_eq!(events[0].pitcher, 543037);
        assert_eq!(events[0].batter, 592450);
        assert_eq!(events[0].player_name.as_deref(), Some("Cole, Gerrit"));
        assert_eq!(events[0].pitch_type.as_deref(), Some("FF"));
        assert_eq!(events[0].events.as_deref(), Some("single"));
        assert_eq!(events[0].release_speed, Some(97.1));
        assert_eq!(events[0].launch_speed, Some(101.2));
        assert_eq!(events[0].inning_topbot.as_deref(), Some("Top"));

        assert_eq!(events[1].events, None);
        assert_eq!(events[1].launch_speed, None);
        assert_eq!(events[1].woba_denom, None);
    }

    #[test]
    fn unparseable_numbers_become_absent() {
        let csv_data = "\
pitcher,batter,pitch_type,release_speed,spin_axis
1,2,FF,NA,210";
        let events = read_events(csv_data.as_bytes()).unwrap();
        assert_eq!(events[0].release_speed, None);
        assert_eq!(events[0].spin_axis, Some(210.0));
    }

    #[test]
    fn rows_without_pitcher_id_are_skipped() {
        let csv_data = "\
pitcher,batter,pitch_type
,2,FF
7,2,SL";
        let events = read_events(csv_data.as_bytes()).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].pitcher, 7);
    }

    #[test]
    fn dedupe_headers_numbers_repeats() {
        let headers = csv::StringRecord::from(vec!["a", "pitcher", "pitcher", "pitcher"]);
        let deduped = dedupe_headers(&headers);
        let names: Vec<&str> = deduped.iter().collect();
        assert_eq!(names, vec!["a", "pitcher", "pitcher.1", "pitcher.2"]);
    }

    #[test]
    fn snapshot_roundtrip_preserves_events() {
        let events = vec![PitchEvent {
            pitcher: 10,
            batter: 20,
            pitch_type: Some("CH".into()),
            release_speed: Some(85.5),
            events: Some("strikeout".into()),
            ..Default::default()
        }];
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 5, 4).unwrap();
        let path = write_snapshot(&events, dir.path(), date).unwrap();

        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "statcast_2025_through_2025-05-04.csv"
        );
        let file = std::fs::File::open(&path).unwrap();
        assert_eq!(read_events(file).unwrap(), events);
    }

    #[tokio::test]
    async fn snapshot_source_reads_written_file() {
        let events = vec![PitchEvent {
            pitcher: 3,
            batter: 4,
            ..Default::default()
        }];
        let dir = tempfile::tempdir().unwrap();
        let date = NaiveDate::from_ymd_opt(2025, 5, 4).unwrap();
        let path = write_snapshot(&events, dir.path(), date).unwrap();

        let source = CsvSnapshotSource::new(&path);
        let fetched = ingest(&source, &range()).await.unwrap();
        assert_eq!(fetched, events);
    }

    #[tokio::test]
    async fn missing_snapshot_is_io_error() {
        let source = CsvSnapshotSource::new("/nonexistent/pitchmix/snapshot.csv");
        let err = ingest(&source, &range()).await.unwrap_err();
        assert!(matches!(err, IngestError::Io { .. }));
    }

    #[tokio::test]
    async fn empty_pull_is_an_ingestion_failure() {
        let source = FixedSource(Vec::new());
        let err = ingest(&source, &range()).await.unwrap_err();
        assert!(matches!(err, IngestError::Empty { .. }));
    }

    #[tokio::test]
    async fn server_error_is_an_ingestion_failure() {
        let client = SavantClient::new(serve_status("500 Internal Server Error"), Duration::from_secs(5)).unwrap();
        let err = ingest(&client, &range()).await.unwrap_err();
        match err {
            IngestError::Status { day, status } => {
                assert_eq!(day, range().start);
                assert_eq!(status, reqwest::StatusCode::INTERNAL_SERVER_ERROR);
            }
            other => panic!("expected a status failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unreachable_host_is_an_ingestion_failure() {
        let client = SavantClient::new(closed_port(), Duration::from_secs(5)).unwrap();
        let err = ingest(&client, &range()).await.unwrap_err();
        assert!(matches!(err, IngestError::Http { .. }));
    }
}
