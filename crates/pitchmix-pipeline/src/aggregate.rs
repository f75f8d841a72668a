// Batter-vs-cluster outcome aggregation.
//
// Every pitch is tagged with its pitcher's cluster, then grouped by
// (batter, cluster). Pitchers without a cluster drop out of the join.

use std::collections::{BTreeMap, HashMap};

use tracing::debug;

use crate::config::MIN_AT_BATS_FLOOR;
use crate::statcast::PitchEvent;

/// Event categories that count as an official at-bat.
pub const AT_BAT_EVENTS: &[&str] = &[
    "single",
    "double",
    "triple",
    "home_run",
    "strikeout",
    "field_out",
    "grounded_into_double_play",
    "force_out",
    "strikeout_double_play",
    "other_out",
];

/// Event categories that count as a hit.
pub const HIT_EVENTS: &[&str] = &["single", "double", "triple", "home_run"];

// ---------------------------------------------------------------------------
// Outcome flags
// ---------------------------------------------------------------------------

/// Binary plate-appearance outcomes derived from the event category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeFlags {
    pub walk: bool,
    pub hit_by_pitch: bool,
    pub sac_fly: bool,
}

impl OutcomeFlags {
    pub fn from_event(event: Option<&str>) -> Self {
        Self {
            walk: event == Some("walk"),
            hit_by_pitch: event == Some("hit_by_pitch"),
            sac_fly: event == Some("sac_fly"),
        }
    }
}

pub fn is_at_bat(event: &str) -> bool {
    AT_BAT_EVENTS.contains(&event)
}

pub fn is_hit(event: &str) -> bool {
    HIT_EVENTS.contains(&event)
}

/// Bases credited to a hit; zero for anything else.
pub fn total_bases(event: &str) -> u32 {
    match event {
        "single" => 1,
        "double" => 2,
        "triple" => 3,
        "home_run" => 4,
        _ => 0,
    }
}

// ---------------------------------------------------------------------------
// Accumulators
// ---------------------------------------------------------------------------

/// Running mean over the values that are present.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MeanAccumulator {
    sum: f64,
    count: u32,
}

impl MeanAccumulator {
    pub fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value.filter(|v| v.is_finite()) {
            self.sum += v;
            self.count += 1;
        }
    }

    pub fn sum(&self) -> f64 {
        self.sum
    }

    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

// ---------------------------------------------------------------------------
// Aggregate rows
// ---------------------------------------------------------------------------

/// Raw totals for one (batter, cluster) pair, before derived metrics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatterClusterTotals {
    pub batter: u32,
    pub cluster: usize,
    pub estimated_ba: MeanAccumulator,
    pub estimated_woba: MeanAccumulator,
    pub woba_value: MeanAccumulator,
    pub woba_denom: MeanAccumulator,
    pub babip_value: MeanAccumulator,
    pub iso_value: MeanAccumulator,
    pub launch_speed_angle: MeanAccumulator,
    pub launch_angle: MeanAccumulator,
    pub max_launch_speed: Option<f64>,
    /// Every pitch in the group. Pitches missing outcome columns still count;
    /// see DESIGN.md for why they are not dropped.
    pub pitches_faced: u32,
    pub at_bats: u32,
    pub hits: u32,
    pub total_bases: u32,
    pub walks: u32,
    pub hit_by_pitch: u32,
    pub sac_flies: u32,
}

impl BatterClusterTotals {
    fn add(&mut self, event: &PitchEvent) {
        self.pitches_faced += 1;
        self.estimated_ba.push(event.estimated_ba_using_speedangle);
        self.estimated_woba.push(event.estimated_woba_using_speedangle);
        self.woba_value.push(event.woba_value);
        self.woba_denom.push(event.woba_denom);
        self.babip_value.push(event.babip_value);
        self.iso_value.push(event.iso_value);
        self.launch_speed_angle.push(event.launch_speed_angle);
        self.launch_angle.push(event.launch_angle);
        if let Some(speed) = event.launch_speed.filter(|v| v.is_finite()) {
            self.max_launch_speed = Some(self.max_launch_speed.map_or(speed, |m| m.max(speed)));
        }

        let outcome = event.events.as_deref();
        if let Some(category) = outcome {
            if is_at_bat(category) {
                self.at_bats += 1;
            }
            if is_hit(category) {
                self.hits += 1;
                self.total_bases += total_bases(category);
            }
        }
        let flags = OutcomeFlags::from_event(outcome);
        self.walks += u32::from(flags.walk);
        self.hit_by_pitch += u32::from(flags.hit_by_pitch);
        self.sac_flies += u32::from(flags.sac_fly);
    }
}

/// Group pitches by (batter, cluster) and keep groups with at least
/// `min_at_bats` at-bats, never fewer than `MIN_AT_BATS_FLOOR`. Output is
/// ordered by batter, then cluster.
pub fn aggregate(
    events: &[PitchEvent],
    clusters: &HashMap<u32, usize>,
    min_at_bats: u32,
) -> Vec<BatterClusterTotals> {
    let mut groups: BTreeMap<(u32, usize), BatterClusterTotals> = BTreeMap::new();
    for event in events {
        let Some(&cluster) = clusters.get(&event.pitcher) else {
            continue;
        };
        groups
            .entry((event.batter, cluster))
            .or_insert_with(|| BatterClusterTotals {
                batter: event.batter,
                cluster,
                ..Default::default()
            })
            .add(event);
    }

    let min_at_bats = min_at_bats.max(MIN_AT_BATS_FLOOR);
    let total = groups.len();
    let kept: Vec<BatterClusterTotals> = groups
        .into_values()
        .filter(|g| g.at_bats >= min_at_bats)
        .collect();
    debug!(groups = total, kept = kept.len(), min_at_bats, "aggregated batter-vs-cluster");
    kept
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
