// Derived rate and value statistics, plus cluster strength rankings.

use std::collections::BTreeMap;

use tracing::warn;

use crate::aggregate::BatterClusterTotals;
use crate::config::SluggingMode;

/// League-average wOBA used as the replacement baseline for wRAA.
pub const LEAGUE_WOBA: f64 = 0.315;

/// wOBA scale factor converting wOBA points to runs per PA.
pub const WOBA_SCALE: f64 = 1.25;

/// Runs per win for the proxy WAR conversion.
pub const RUNS_PER_WIN: f64 = 10.0;

// ---------------------------------------------------------------------------
// Formulas
// ---------------------------------------------------------------------------

pub fn batting_average(hits: u32, at_bats: u32) -> f64 {
    if at_bats == 0 {
        return 0.0;
    }
    hits as f64 / at_bats as f64
}

/// SLG for an aggregate row. `SluggingMode::Hits` divides hits (not total
/// bases) by at-bats, so it always equals BA.
pub fn slugging(totals: &BatterClusterTotals, mode: SluggingMode) -> f64 {
    match mode {
        SluggingMode::Hits => batting_average(totals.hits, totals.at_bats),
        SluggingMode::TotalBases => batting_average(totals.total_bases, totals.at_bats),
    }
}

/// `None` when no plate appearance carried a wOBA denominator.
pub fn woba(value_sum: f64, denom_sum: f64) -> Option<f64> {
    (denom_sum > 0.0).then(|| value_sum / denom_sum)
}

pub fn plate_appearances(at_bats: u32, walks: u32, hit_by_pitch: u32, sac_flies: u32) -> u32 {
    at_bats + walks + hit_by_pitch + sac_flies
}

pub fn wraa(woba: f64, plate_appearances: u32) -> f64 {
    ((woba - LEAGUE_WOBA) / WOBA_SCALE) * plate_appearances as f64
}

pub fn proxy_war(wraa: f64) -> f64 {
    wraa / RUNS_PER_WIN
}

/// Dense rank, highest value first: ties share a rank and the next distinct
/// value takes the next integer.
pub fn dense_rank_desc(values: &[f64]) -> Vec<u32> {
    let mut distinct: Vec<f64> = values.to_vec();
    distinct.sort_by(|a, b| b.total_cmp(a));
    distinct.dedup();
    values
        .iter()
        .map(|v| {
            let idx = distinct
                .iter()
                .position(|d| d.total_cmp(v).is_eq())
                .unwrap_or(distinct.len());
            idx as u32 + 1
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Matchup lines
// ---------------------------------------------------------------------------

/// Aggregate totals with every derived statistic attached.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchupLine {
    pub totals: BatterClusterTotals,
    pub plate_appearances: u32,
    pub batting_average: f64,
    pub slugging: f64,
    pub woba: f64,
    pub wraa: f64,
    pub proxy_war: f64,
    /// Dense rank of this cluster's mean wOBA across all clusters; 1 is the
    /// cluster batters hit best.
    pub cluster_tier: u32,
    /// Dense rank of this row's wOBA among the batter's own clusters.
    pub cluster_rank: u32,
}

/// Compute derived statistics for every aggregate row. Rows whose wOBA is
/// undefined are dropped.
pub fn derive_lines(totals: Vec<BatterClusterTotals>, mode: SluggingMode) -> Vec<MatchupLine> {
    let mut lines: Vec<MatchupLine> = Vec::with_capacity(totals.len());
    for t in totals {
        let Some(woba) = woba(t.woba_value.sum(), t.woba_denom.sum()) else {
            warn!(
                batter = t.batter,
                cluster = t.cluster,
                "dropping matchup row with zero wOBA denominator"
            );
            continue;
        };
        let pa = plate_appearances(t.at_bats, t.walks, t.hit_by_pitch, t.sac_flies);
        let wraa = wraa(woba, pa);
        lines.push(MatchupLine {
            plate_appearances: pa,
            batting_average: batting_average(t.hits, t.at_bats),
            slugging: slugging(&t, mode),
            woba,
            wraa,
            proxy_war: proxy_war(wraa),
            cluster_tier: 0,
            cluster_rank: 0,
            totals: t,
        });
    }

    assign_cluster_tiers(&mut lines);
    assign_batter_ranks(&mut lines);
    lines
}

/// Mean wOBA per cluster across all batters who faced it.
pub fn cluster_mean_woba(lines: &[MatchupLine]) -> BTreeMap<usize, f64> {
    let mut sums: BTreeMap<usize, (f64, u32)> = BTreeMap::new();
    for line in lines {
        let entry = sums.entry(line.totals.cluster).or_insert((0.0, 0));
        entry.0 += line.woba;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(cluster, (sum, n))| (cluster, sum / n as f64))
        .collect()
}

fn assign_cluster_tiers(lines: &mut [MatchupLine]) {
    let means = cluster_mean_woba(lines);
    let clusters: Vec<usize> = means.keys().copied().collect();
    let values: Vec<f64> = means.values().copied().collect();
    let tiers: BTreeMap<usize, u32> = clusters.into_iter().zip(dense_rank_desc(&values)).collect();
    for line in lines.iter_mut() {
        line.cluster_tier = tiers[&line.totals.cluster];
    }
}

fn assign_batter_ranks(lines: &mut [MatchupLine]) {
    let mut by_batter: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
    for (idx, line) in lines.iter().enumerate() {
        by_batter.entry(line.totals.batter).or_default().push(idx);
    }
    for indices in by_batter.values() {
        let values: Vec<f64> = indices.iter().map(|&i| lines[i].woba).collect();
        for (&i, rank) in indices.iter().zip(dense_rank_desc(&values)) {
            lines[i].cluster_rank = rank;
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::MeanAccumulator;

    fn approx_eq(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    fn accumulate(total: f64, n: u32) -> MeanAccumulator {
        let mut acc = MeanAccumulator::default();
        for _ in 0..n {
            acc.push(Some(total / n as f64));
        }
        acc
    }

    fn totals(batter: u32, cluster: usize, hits: u32, woba_value: f64, woba_denom: f64) -> BatterClusterTotals {
        BatterClusterTotals {
            batter,
            cluster,
            at_bats: 20,
            hits,
            total_bases: hits * 2,
            walks: 2,
            hit_by_pitch: 1,
            sac_flies: 1,
            woba_value: accumulate(woba_value, 4),
            woba_denom: if woba_denom > 0.0 {
                accumulate(woba_denom, 4)
            } else {
                MeanAccumulator::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn formulas_match_definitions() {
        assert!(approx_eq(batting_average(6, 20), 0.3));
        assert_eq!(batting_average(3, 0), 0.0);
        assert_eq!(woba(8.0, 0.0), None);
        assert!(approx_eq(woba(8.0, 24.0).unwrap(), 1.0 / 3.0));
        assert_eq!(plate_appearances(20, 2, 1, 1), 24);
        assert!(approx_eq(wraa(0.440, 100), 10.0));
        assert!(approx_eq(proxy_war(10.0), 1.0));
    }

    #[test]
    fn slugging_modes() {
        let t = totals(1, 0, 5, 4.0, 10.0);
        assert!(approx_eq(slugging(&t, SluggingMode::Hits), 0.25));
        assert!(approx_eq(slugging(&t, SluggingMode::TotalBases), 0.5));
    }

    #[test]
    fn dense_rank_has_no_gaps() {
        let ranks = dense_rank_desc(&[0.300, 0.410, 0.300, 0.250, 0.410]);
        assert_eq!(ranks, vec![2, 1, 2, 3, 1]);
    }

    #[test]
    fn dense_rank_empty() {
        assert!(dense_rank_desc(&[]).is_empty());
    }

    #[test]
    fn derive_lines_computes_pa_and_value() {
        let lines = derive_lines(vec![totals(1, 0, 6, 10.0, 24.0)], SluggingMode::Hits);
        let line = &lines[0];
        assert_eq!(line.plate_appearances, 24);
        assert_eq!(
            line.plate_appearances,
            line.totals.at_bats + line.totals.walks + line.totals.hit_by_pitch + line.totals.sac_flies
        );
        assert!(approx_eq(line.batting_average, 0.3));
        assert!(approx_eq(line.slugging, line.batting_average));
        assert!(approx_eq(line.woba, 10.0 / 24.0));
        let expected_wraa = ((10.0 / 24.0 - 0.315) / 1.25) * 24.0;
        assert!(approx_eq(line.wraa, expected_wraa));
        assert!(approx_eq(line.proxy_war, expected_wraa / 10.0));
    }

    #[test]
    fn zero_denominator_rows_are_excluded() {
        let lines = derive_lines(
            vec![totals(1, 0, 6, 0.0, 0.0), totals(2, 0, 6, 8.0, 24.0)],
            SluggingMode::Hits,
        );
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].totals.batter, 2);
    }

    #[test]
    fn cluster_tier_ranks_highest_mean_woba_first() {
        let lines = derive_lines(
            vec![
                totals(1, 0, 5, 6.0, 24.0),  // 0.25
                totals(1, 1, 5, 12.0, 24.0), // 0.50
                totals(2, 0, 5, 6.0, 24.0),  // 0.25
                totals(2, 2, 5, 9.0, 24.0),  // 0.375
                totals(3, 3, 5, 12.0, 24.0), // 0.50
            ],
            SluggingMode::Hits,
        );
        let tier = |cluster: usize| {
            lines
                .iter()
                .find(|l| l.totals.cluster == cluster)
                .map(|l| l.cluster_tier)
                .unwrap()
        };
        assert_eq!(tier(1), 1);
        assert_eq!(tier(3), 1);
        assert_eq!(tier(2), 2);
        assert_eq!(tier(0), 3);

        let mut tiers: Vec<u32> = lines.iter().map(|l| l.cluster_tier).collect();
        tiers.sort();
        tiers.dedup();
        assert_eq!(tiers, vec![1, 2, 3]);
    }

    #[test]
    fn batter_rank_is_within_own_rows() {
        let lines = derive_lines(
            vec![
                totals(1, 0, 5, 6.0, 24.0),
                totals(1, 1, 5, 12.0, 24.0),
                totals(1, 2, 5, 6.0, 24.0),
                totals(2, 0, 5, 3.0, 24.0),
            ],
            SluggingMode::Hits,
        );
        let ranks: Vec<(u32, usize, u32)> = lines
            .iter()
            .map(|l| (l.totals.batter, l.totals.cluster, l.cluster_rank))
            .collect();
        assert_eq!(ranks, vec![(1, 0, 2), (1, 1, 1), (1, 2, 2), (2, 0, 1)]);
    }
}
