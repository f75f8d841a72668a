// Two-dimensional layout of pitchers for plotting (UMAP-style).
//
// Builds a fuzzy k-nearest-neighbor graph over the standardized features and
// lays it out with seeded stochastic gradient descent: edges pull their ends
// together, random negative samples push apart. The layout is never fed back
// into clustering.

use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::squared_distance;

/// Low-dimensional curve parameters for `min_dist = 0.1`, `spread = 1.0`.
const CURVE_A: f64 = 1.577;
const CURVE_B: f64 = 0.8951;

const NEGATIVE_SAMPLES: usize = 5;
const GRADIENT_CLIP: f64 = 4.0;
const INITIAL_LEARNING_RATE: f64 = 1.0;
const INIT_RANGE: f64 = 10.0;
const SIGMA_SEARCH_STEPS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmbedParams {
    pub neighbors: usize,
    pub epochs: usize,
}

/// Project `data` to 2D. Deterministic for a given seed.
pub fn embed(data: &[Vec<f64>], params: EmbedParams, seed: u64) -> Vec<(f64, f64)> {
    let n = data.len();
    if n < 2 {
        return vec![(0.0, 0.0); n];
    }

    let graph = fuzzy_graph(data, params.neighbors.min(n - 1));
    let mut rng = StdRng::seed_from_u64(seed);
    let mut layout: Vec<[f64; 2]> = (0..n)
        .map(|_| {
            [
                rng.random_range(-INIT_RANGE..INIT_RANGE),
                rng.random_range(-INIT_RANGE..INIT_RANGE),
            ]
        })
        .collect();

    optimize(&mut layout, &graph, params.epochs, &mut rng);
    layout.into_iter().map(|[x, y]| (x, y)).collect()
}

/// Symmetric edge list `(i, j, weight)` with `i < j`.
fn fuzzy_graph(data: &[Vec<f64>], k: usize) -> Vec<(usize, usize, f64)> {
    let target = (k as f64).log2().max(f64::MIN_POSITIVE);
    let mut directed: BTreeMap<(usize, usize), f64> = BTreeMap::new();

    for (i, point) in data.iter().enumerate() {
        let mut neighbors: Vec<(f64, usize)> = data
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(j, other)| (squared_distance(point, other).sqrt(), j))
            .collect();
        neighbors.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
        neighbors.truncate(k);

        let rho = neighbors
            .iter()
            .map(|(d, _)| *d)
            .find(|d| *d > 0.0)
            .unwrap_or(0.0);
        let sigma = find_sigma(&neighbors, rho, target);

        for (d, j) in neighbors {
            let w = (-(d - rho).max(0.0) / sigma).exp();
            directed.insert((i, j), w);
        }
    }

    // Fuzzy union: w = a + b - a*b.
    let mut edges: BTreeMap<(usize, usize), f64> = BTreeMap::new();
    for (&(i, j), &w) in &directed {
        let key = (i.min(j), i.max(j));
        if edges.contains_key(&key) {
            continue;
        }
        let reverse = directed.get(&(j, i)).copied().unwrap_or(0.0);
        edges.insert(key, w + reverse - w * reverse);
    }
    edges
        .into_iter()
        .filter(|(_, w)| *w > 0.0)
        .map(|((i, j), w)| (i, j, w))
        .collect()
}

/// Binary search for the bandwidth whose membership sum hits `target`.
fn find_sigma(neighbors: &[(f64, usize)], rho: f64, target: f64) -> f64 {
    let mut lo = 0.0;
    let mut hi = f64::INFINITY;
    let mut mid = 1.0;
    for _ in 0..SIGMA_SEARCH_STEPS {
        let total: f64 = neighbors
            .iter()
            .map(|(d, _)| (-(d - rho).max(0.0) / mid).exp())
            .sum();
        if (total - target).abs() < 1e-5 {
            break;
        }
        if total > target {
            hi = mid;
            mid = (lo + hi) / 2.0;
        } else {
            lo = mid;
            mid = if hi.is_infinite() { mid * 2.0 } else { (lo + hi) / 2.0 };
        }
    }
    mid.max(1e-3)
}

fn optimize(layout: &mut [[f64; 2]], edges: &[(usize, usize, f64)], epochs: usize, rng: &mut StdRng) {
    let n = layout.len();
    let max_weight = edges.iter().map(|e| e.2).fold(0.0, f64::max);
    if max_weight <= 0.0 {
        return;
    }

    for epoch in 0..epochs {
        let alpha = INITIAL_LEARNING_RATE * (1.0 - epoch as f64 / epochs as f64);
        for &(i, j, w) in edges {
            // Strong edges are sampled every epoch, weak ones proportionally less.
            if rng.random::<f64>() > w / max_weight {
                continue;
            }

            let d2 = dist2(&layout[i], &layout[j]);
            if d2 > 0.0 {
                let coeff = -2.0 * CURVE_A * CURVE_B * d2.powf(CURVE_B - 1.0)
                    / (CURVE_A * d2.powf(CURVE_B) + 1.0);
                for axis in 0..2 {
                    let g = clip(coeff * (layout[i][axis] - layout[j][axis]));
                    layout[i][axis] += g * alpha;
                    layout[j][axis] -= g * alpha;
                }
            }

            for _ in 0..NEGATIVE_SAMPLES {
                let other = rng.random_range(0..n);
                if other == i {
                    continue;
                }
                let d2 = dist2(&layout[i], &layout[other]);
                let coeff = if d2 > 0.0 {
                    2.0 * CURVE_B / ((0.001 + d2) * (CURVE_A * d2.powf(CURVE_B) + 1.0))
                } else {
                    0.0
                };
                for axis in 0..2 {
                    let g = if coeff > 0.0 {
                        clip(coeff * (layout[i][axis] - layout[other][axis]))
                    } else {
                        GRADIENT_CLIP
                    };
                    layout[i][axis] += g * alpha;
                }
            }
        }
    }
}

fn dist2(a: &[f64; 2], b: &[f64; 2]) -> f64 {
    (a[0] - b[0]).powi(2) + (a[1] - b[1]).powi(2)
}

fn clip(v: f64) -> f64 {
    v.clamp(-GRADIENT_CLIP, GRADIENT_CLIP)
}
