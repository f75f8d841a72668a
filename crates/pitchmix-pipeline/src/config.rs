// Run configuration loading and parsing (config/pipeline.toml).

use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Smallest at-bat sample a batter-vs-cluster row may be published with.
pub const MIN_AT_BATS_FLOOR: u32 = 10;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Top-level assembled RunConfig
// ---------------------------------------------------------------------------

/// Everything a single pipeline run needs, passed explicitly to each stage.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub event_source: EventSourceConfig,
    pub date_range: DateRange,
    pub output_location: OutputLocation,
    pub cluster_count: usize,
    pub random_seed: u64,
    pub min_at_bats: u32,
    pub tuning: Tuning,
    pub identity: IdentityConfig,
}

/// Inclusive range of game dates to pull.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// Every date in the range, in order.
    pub fn days(&self) -> Vec<NaiveDate> {
        self.start
            .iter_days()
            .take_while(|d| *d <= self.end)
            .collect()
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventSourceConfig {
    Savant {
        base_url: String,
        #[serde(default = "default_request_timeout")]
        request_timeout_secs: u64,
    },
    Snapshot {
        path: String,
    },
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IdentityConfig {
    StatsApi {
        base_url: String,
        #[serde(default = "default_batch_size")]
        batch_size: usize,
        #[serde(default = "default_request_timeout")]
        request_timeout_secs: u64,
    },
    Offline,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct OutputLocation {
    pub data_dir: String,
    pub output_dir: String,
}

/// How SLG is computed from an aggregate row.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SluggingMode {
    /// Hits over at-bats, identical to BA. Kept as the default so published
    /// tables match earlier runs.
    #[default]
    Hits,
    /// Total bases over at-bats.
    TotalBases,
}

/// Knobs for the cluster assigner and derived metrics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tuning {
    pub impute_neighbors: usize,
    pub embed_neighbors: usize,
    pub embed_epochs: usize,
    pub slugging: SluggingMode,
}

impl Default for Tuning {
    fn default() -> Self {
        Self {
            impute_neighbors: 5,
            embed_neighbors: 15,
            embed_epochs: 200,
            slugging: SluggingMode::Hits,
        }
    }
}

// ---------------------------------------------------------------------------
// pipeline.toml structs
// ---------------------------------------------------------------------------

/// Raw deserialization target for the entire pipeline.toml file.
#[derive(Debug, Clone, Deserialize)]
struct PipelineFile {
    source: EventSourceConfig,
    window: WindowSection,
    output: OutputLocation,
    clustering: ClusteringSection,
    aggregation: AggregationSection,
    #[serde(default = "default_identity")]
    identity: IdentityConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct WindowSection {
    start: NaiveDate,
    #[serde(default)]
    end: Option<NaiveDate>,
}

#[derive(Debug, Clone, Deserialize)]
struct ClusteringSection {
    cluster_count: usize,
    random_seed: u64,
    #[serde(default = "default_impute_neighbors")]
    impute_neighbors: usize,
    #[serde(default = "default_embed_neighbors")]
    embed_neighbors: usize,
    #[serde(default = "default_embed_epochs")]
    embed_epochs: usize,
}

#[derive(Debug, Clone, Deserialize)]
struct AggregationSection {
    min_at_bats: u32,
    #[serde(default)]
    slugging: SluggingMode,
}

fn default_request_timeout() -> u64 {
    60
}

fn default_batch_size() -> usize {
    100
}

fn default_identity() -> IdentityConfig {
    IdentityConfig::Offline
}

fn default_impute_neighbors() -> usize {
    Tuning::default().impute_neighbors
}

fn default_embed_neighbors() -> usize {
    Tuning::default().embed_neighbors
}

fn default_embed_epochs() -> usize {
    Tuning::default().embed_epochs
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/pipeline.toml` relative to `base_dir`.
///
/// `run_date` closes the date window when the file leaves `window.end` unset.
/// This does not copy defaults; prefer `load_config()`.
pub fn load_config_from(base_dir: &Path, run_date: NaiveDate) -> Result<RunConfig, ConfigError> {
    let path = base_dir.join("config").join("pipeline.toml");
    let text = read_file(&path)?;
    parse_config(&text, &path, run_date)
}

fn parse_config(text: &str, path: &Path, run_date: NaiveDate) -> Result<RunConfig, ConfigError> {
    let file: PipelineFile = toml::from_str(text).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        source: e,
    })?;

    let config = RunConfig {
        event_source: file.source,
        date_range: DateRange {
            start: file.window.start,
            end: file.window.end.unwrap_or(run_date),
        },
        output_location: file.output,
        cluster_count: file.clustering.cluster_count,
        random_seed: file.clustering.random_seed,
        min_at_bats: file.aggregation.min_at_bats,
        tuning: Tuning {
            impute_neighbors: file.clustering.impute_neighbors,
            embed_neighbors: file.clustering.embed_neighbors,
            embed_epochs: file.clustering.embed_epochs,
            slugging: file.aggregation.slugging,
        },
        identity: file.identity,
    };

    validate(&config)?;
    Ok(config)
}

/// Ensure `config/pipeline.toml` exists by copying it from `defaults/`.
/// Returns the list of files that were copied.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let defaults_dir = base_dir.join("defaults");
    let config_dir = base_dir.join("config");

    if !defaults_dir.exists() {
        if !config_dir.exists() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "neither defaults/ nor config/ directory found in {}; \
                     run from the crate root or ensure defaults/ is present",
                    base_dir.display()
                ),
            });
        }
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let source = defaults_dir.join("pipeline.toml");
    let target = config_dir.join("pipeline.toml");
    if target.exists() || !source.is_file() {
        return Ok(vec![]);
    }

    std::fs::copy(&source, &target).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to copy {} to {}: {e}", source.display(), target.display()),
    })?;
    Ok(vec![target])
}

/// Convenience wrapper: loads config relative to `base_dir`, copying defaults
/// first.
pub fn load_config(base_dir: &Path, run_date: NaiveDate) -> Result<RunConfig, ConfigError> {
    ensure_config_files(base_dir)?;
    load_config_from(base_dir, run_date)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &RunConfig) -> Result<(), ConfigError> {
    if config.date_range.end < config.date_range.start {
        return Err(invalid(
            "window.end",
            format!(
                "must not precede window.start ({} < {})",
                config.date_range.end, config.date_range.start
            ),
        ));
    }

    if config.cluster_count < 2 {
        return Err(invalid(
            "clustering.cluster_count",
            format!("must be at least 2, got {}", config.cluster_count),
        ));
    }

    if config.min_at_bats < MIN_AT_BATS_FLOOR {
        return Err(invalid(
            "aggregation.min_at_bats",
            format!(
                "must be at least {MIN_AT_BATS_FLOOR}, got {}",
                config.min_at_bats
            ),
        ));
    }

    let sizes: &[(&str, usize)] = &[
        ("clustering.impute_neighbors", config.tuning.impute_neighbors),
        ("clustering.embed_neighbors", config.tuning.embed_neighbors),
        ("clustering.embed_epochs", config.tuning.embed_epochs),
    ];
    for (name, val) in sizes {
        if *val == 0 {
            return Err(invalid(name, "must be greater than 0"));
        }
    }

    if config.output_location.output_dir.trim().is_empty() {
        return Err(invalid("output.output_dir", "must not be empty"));
    }
    if config.output_location.data_dir.trim().is_empty() {
        return Err(invalid("output.data_dir", "must not be empty"));
    }

    match &config.event_source {
        EventSourceConfig::Savant { base_url, .. } if base_url.trim().is_empty() => {
            return Err(invalid("source.base_url", "must not be empty"));
        }
        EventSourceConfig::Snapshot { path } if path.trim().is_empty() => {
            return Err(invalid("source.path", "must not be empty"));
        }
        _ => {}
    }

    if let IdentityConfig::StatsApi { batch_size, .. } = &config.identity {
        if *batch_size == 0 {
            return Err(invalid("identity.batch_size", "must be greater than 0"));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
