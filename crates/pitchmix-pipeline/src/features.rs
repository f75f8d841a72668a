// Per-pitcher feature vectors: mean release and movement physics for every
// pitch type a pitcher throws.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::statcast::PitchEvent;

// ---------------------------------------------------------------------------
// Measurements
// ---------------------------------------------------------------------------

/// Physical measurements averaged per (pitcher, pitch type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Measurement {
    ReleaseSpeed,
    ReleasePosX,
    ReleasePosY,
    ReleasePosZ,
    ReleaseExtension,
    PfxX,
    PfxZ,
    ReleaseSpinRate,
    SpinAxis,
    BreakZWithGravity,
    BreakXBatterIn,
    ArmAngle,
}

impl Measurement {
    pub const ALL: [Measurement; 12] = [
        Measurement::ReleaseSpeed,
        Measurement::ReleasePosX,
        Measurement::ReleasePosY,
        Measurement::ReleasePosZ,
        Measurement::ReleaseExtension,
        Measurement::PfxX,
        Measurement::PfxZ,
        Measurement::ReleaseSpinRate,
        Measurement::SpinAxis,
        Measurement::BreakZWithGravity,
        Measurement::BreakXBatterIn,
        Measurement::ArmAngle,
    ];

    /// Statcast column name.
    pub fn column(&self) -> &'static str {
        match self {
            Measurement::ReleaseSpeed => "release_speed",
            Measurement::ReleasePosX => "release_pos_x",
            Measurement::ReleasePosY => "release_pos_y",
            Measurement::ReleasePosZ => "release_pos_z",
            Measurement::ReleaseExtension => "release_extension",
            Measurement::PfxX => "pfx_x",
            Measurement::PfxZ => "pfx_z",
            Measurement::ReleaseSpinRate => "release_spin_rate",
            Measurement::SpinAxis => "spin_axis",
            Measurement::BreakZWithGravity => "api_break_z_with_gravity",
            Measurement::BreakXBatterIn => "api_break_x_batter_in",
            Measurement::ArmAngle => "arm_angle",
        }
    }

    pub fn read(&self, event: &PitchEvent) -> Option<f64> {
        let value = match self {
            Measurement::ReleaseSpeed => event.release_speed,
            Measurement::ReleasePosX => event.release_pos_x,
            Measurement::ReleasePosY => event.release_pos_y,
            Measurement::ReleasePosZ => event.release_pos_z,
            Measurement::ReleaseExtension => event.release_extension,
            Measurement::PfxX => event.pfx_x,
            Measurement::PfxZ => event.pfx_z,
            Measurement::ReleaseSpinRate => event.release_spin_rate,
            Measurement::SpinAxis => event.spin_axis,
            Measurement::BreakZWithGravity => event.api_break_z_with_gravity,
            Measurement::BreakXBatterIn => event.api_break_x_batter_in,
            Measurement::ArmAngle => event.arm_angle,
        };
        value.filter(|v| v.is_finite())
    }
}

/// A single feature column: one measurement for one pitch type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureKey {
    pub measurement: Measurement,
    pub pitch_type: String,
}

impl fmt::Display for FeatureKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.measurement.column(), self.pitch_type)
    }
}

// ---------------------------------------------------------------------------
// Feature table
// ---------------------------------------------------------------------------

/// One pitcher's averaged physics. Combinations the pitcher never threw are
/// absent from `values`.
#[derive(Debug, Clone, PartialEq)]
pub struct PitcherFeatureVector {
    pub pitcher: u32,
    pub values: BTreeMap<FeatureKey, f64>,
}

/// Pitchers in ascending id order plus the sorted union of their feature keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    pub columns: Vec<FeatureKey>,
    pub rows: Vec<PitcherFeatureVector>,
}

impl FeatureTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Dense row-major view aligned to `columns`, with `None` for gaps.
    pub fn matrix(&self) -> Vec<Vec<Option<f64>>> {
        self.rows
            .iter()
            .map(|row| {
                self.columns
                    .iter()
                    .map(|key| row.values.get(key).copied())
                    .collect()
            })
            .collect()
    }
}

#[derive(Default)]
struct MeasurementSums {
    sums: [f64; 12],
    count: usize,
}

/// Average physics per (pitcher, pitch type) and pivot to one row per pitcher.
///
/// Pitches without a pitch type, or missing any measurement, are dropped
/// before averaging.
pub fn build_features(events: &[PitchEvent]) -> FeatureTable {
    let mut groups: BTreeMap<(u32, &str), MeasurementSums> = BTreeMap::new();

    for event in events {
        let Some(pitch_type) = event.pitch_type.as_deref().filter(|p| !p.is_empty()) else {
            continue;
        };
        let mut values = [0.0; 12];
        let mut complete = true;
        for (slot, measurement) in values.iter_mut().zip(Measurement::ALL.iter()) {
            match measurement.read(event) {
                Some(v) => *slot = v,
                None => {
                    complete = false;
                    break;
                }
            }
        }
        if !complete {
            continue;
        }

        let entry = groups.entry((event.pitcher, pitch_type)).or_default();
        for (sum, v) in entry.sums.iter_mut().zip(values) {
            *sum += v;
        }
        entry.count += 1;
    }

    let mut rows: BTreeMap<u32, BTreeMap<FeatureKey, f64>> = BTreeMap::new();
    let mut columns: BTreeSet<FeatureKey> = BTreeSet::new();

    for ((pitcher, pitch_type), sums) in groups {
        let row = rows.entry(pitcher).or_default();
        for (measurement, sum) in Measurement::ALL.iter().zip(sums.sums) {
            let key = FeatureKey {
                measurement: *measurement,
                pitch_type: pitch_type.to_string(),
            };
            row.insert(key.clone(), sum / sums.count as f64);
            columns.insert(key);
        }
    }

    FeatureTable {
        columns: columns.into_iter().collect(),
        rows: rows
            .into_iter()
            .map(|(pitcher, values)| PitcherFeatureVector { pitcher, values })
            .collect(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn pitch(pitcher: u32, pitch_type: Option<&str>, speed: f64) -> PitchEvent {
        PitchEvent {
            pitcher,
            batter: 1,
            pitch_type: pitch_type.map(String::from),
            release_speed: Some(speed),
            release_pos_x: Some(-1.5),
            release_pos_y: Some(54.0),
            release_pos_z: Some(6.0),
            release_extension: Some(6.5),
            pfx_x: Some(-0.5),
            pfx_z: Some(1.2),
            release_spin_rate: Some(2300.0),
            spin_axis: Some(210.0),
            api_break_z_with_gravity: Some(1.1),
            api_break_x_batter_in: Some(0.3),
            arm_angle: Some(45.0),
            ..Default::default()
        }
    }

    fn key(m: Measurement, pt: &str) -> FeatureKey {
        FeatureKey {
            measurement: m,
            pitch_type: pt.into(),
        }
    }

    #[test]
    fn averages_per_pitcher_and_pitch_type() {
        let events = vec![
            pitch(1, Some("FF"), 96.0),
            pitch(1, Some("FF"), 98.0),
            pitch(1, Some("SL"), 86.0),
        ];
        let table = build_features(&events);
        assert_eq!(table.rows.len(), 1);
        let row = &table.rows[0];
        assert_eq!(row.values[&key(Measurement::ReleaseSpeed, "FF")], 97.0);
        assert_eq!(row.values[&key(Measurement::ReleaseSpeed, "SL")], 86.0);
        assert_eq!(row.values.len(), 24);
    }

    #[test]
    fn unknown_pitch_type_rows_are_dropped() {
        let events = vec![pitch(1, None, 96.0), pitch(1, Some(""), 96.0), pitch(2, Some("CU"), 78.0)];
        let table = build_features(&events);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0].pitcher, 2);
    }

    #[test]
    fn incomplete_measurement_rows_are_dropped() {
        let mut partial = pitch(1, Some("FF"), 50.0);
        partial.arm_angle = None;
        let events = vec![partial, pitch(1, Some("FF"), 96.0)];
        let table = build_features(&events);
        assert_eq!(table.rows[0].values[&key(Measurement::ReleaseSpeed, "FF")], 96.0);
    }

    #[test]
    fn unseen_combinations_are_absent_not_zero() {
        let events = vec![pitch(1, Some("FF"), 96.0), pitch(2, Some("SL"), 85.0)];
        let table = build_features(&events);
        assert_eq!(table.columns.len(), 24);

        let matrix = table.matrix();
        let ff_speed = table
            .columns
            .iter()
            .position(|k| *k == key(Measurement::ReleaseSpeed, "FF"))
            .unwrap();
        assert_eq!(matrix[0][ff_speed], Some(96.0));
        assert_eq!(matrix[1][ff_speed], None);
    }

    #[test]
    fn pitcher_appears_once_in_id_order() {
        let events = vec![
            pitch(9, Some("FF"), 95.0),
            pitch(3, Some("FF"), 93.0),
            pitch(9, Some("CH"), 86.0),
        ];
        let table = build_features(&events);
        let ids: Vec<u32> = table.rows.iter().map(|r| r.pitcher).collect();
        assert_eq!(ids, vec![3, 9]);
    }

    #[test]
    fn columns_order_by_measurement_then_pitch_type() {
        let events = vec![pitch(1, Some("SL"), 85.0), pitch(1, Some("FF"), 95.0)];
        let table = build_features(&events);
        assert_eq!(table.columns[0], key(Measurement::ReleaseSpeed, "FF"));
        assert_eq!(table.columns[1], key(Measurement::ReleaseSpeed, "SL"));
        assert_eq!(table.columns[2], key(Measurement::ReleasePosX, "FF"));
        assert_eq!(table.columns[0].to_string(), "release_speed_FF");
    }
}
