// Seeded k-means: k-means++ seeding followed by Lloyd iterations.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{squared_distance, ClusterError};

/// Lloyd iterations stop after this many rounds even if centroids still move.
const MAX_ITERATIONS: usize = 300;

/// Convergence threshold on total squared centroid shift, relative to the
/// mean per-feature variance of the data.
const RELATIVE_TOLERANCE: f64 = 1e-4;

/// Result of a k-means fit.
#[derive(Debug, Clone, PartialEq)]
pub struct KMeansFit {
    pub labels: Vec<usize>,
    pub centroids: Vec<Vec<f64>>,
    pub inertia: f64,
    pub iterations: usize,
}

/// Partition `data` into `k` clusters. Identical inputs and seed always give
/// identical labels.
pub fn fit(data: &[Vec<f64>], k: usize, seed: u64) -> Result<KMeansFit, ClusterError> {
    if data.is_empty() {
        return Err(ClusterError::EmptyFeatures);
    }
    if k == 0 {
        return Err(ClusterError::NoClusters);
    }
    if data.len() < k {
        return Err(ClusterError::TooFewPitchers {
            pitchers: data.len(),
            clusters: k,
        });
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut centroids = seed_centroids(data, k, &mut rng);
    let tolerance = RELATIVE_TOLERANCE * mean_variance(data);

    let mut labels = vec![0usize; data.len()];
    let mut iterations = 0;

    for _ in 0..MAX_ITERATIONS {
        iterations += 1;
        for (label, point) in labels.iter_mut().zip(data) {
            *label = nearest(point, &centroids, *label).0;
        }

        let mut updated = recompute_centroids(data, &labels, k);
        relocate_empty_clusters(data, &mut labels, &mut updated);

        let shift: f64 = centroids
            .iter()
            .zip(&updated)
            .map(|(old, new)| squared_distance(old, new))
            .sum();
        centroids = updated;
        if shift <= tolerance {
            break;
        }
    }

    // Final assignment against the settled centroids.
    let mut inertia = 0.0;
    for (label, point) in labels.iter_mut().zip(data) {
        let (best, dist) = nearest(point, &centroids, *label);
        *label = best;
        inertia += dist;
    }

    Ok(KMeansFit {
        labels,
        centroids,
        inertia,
        iterations,
    })
}

/// k-means++: first centroid uniformly at random, then each next one sampled
/// with probability proportional to its squared distance from the closest
/// centroid chosen so far.
fn seed_centroids(data: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(data[rng.random_range(0..data.len())].clone());

    let mut closest: Vec<f64> = data
        .iter()
        .map(|p| squared_distance(p, &centroids[0]))
        .collect();

    while centroids.len() < k {
        let total: f64 = closest.iter().sum();
        let chosen = if total <= 0.0 {
            // All remaining points coincide with a centroid; take the first
            // point not already used.
            (0..data.len())
                .find(|i| !centroids.iter().any(|c| c == &data[*i]))
                .unwrap_or(0)
        } else {
            let mut target = rng.random::<f64>() * total;
            let mut pick = data.len() - 1;
            for (i, d) in closest.iter().enumerate() {
                if target < *d {
                    pick = i;
                    break;
                }
                target -= d;
            }
            pick
        };

        let centroid = data[chosen].clone();
        for (c, p) in closest.iter_mut().zip(data) {
            *c = c.min(squared_distance(p, &centroid));
        }
        centroids.push(centroid);
    }
    centroids
}

/// Index of and squared distance to the closest centroid. A tie keeps the
/// point in `current`, otherwise goes to the lower index.
fn nearest(point: &[f64], centroids: &[Vec<f64>], current: usize) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (i, c) in centroids.iter().enumerate() {
        let d = squared_distance(point, c);
        if d < best.1 {
            best = (i, d);
        }
    }
    if let Some(c) = centroids.get(current) {
        if squared_distance(point, c) <= best.1 {
            return (current, best.1);
        }
    }
    best
}

fn recompute_centroids(data: &[Vec<f64>], labels: &[usize], k: usize) -> Vec<Vec<f64>> {
    let dims = data[0].len();
    let mut sums = vec![vec![0.0; dims]; k];
    let mut counts = vec![0usize; k];
    for (point, &label) in data.iter().zip(labels) {
        counts[label] += 1;
        for (s, v) in sums[label].iter_mut().zip(point) {
            *s += v;
        }
    }
    for (sum, count) in sums.iter_mut().zip(&counts) {
        if *count > 0 {
            for s in sum.iter_mut() {
                *s /= *count as f64;
            }
        } else {
            // Marked empty; filled by relocate_empty_clusters.
            sum.iter_mut().for_each(|s| *s = f64::NAN);
        }
    }
    sums
}

/// Give each empty cluster the point farthest from its current centroid.
fn relocate_empty_clusters(data: &[Vec<f64>], labels: &mut [usize], centroids: &mut [Vec<f64>]) {
    for empty in 0..centroids.len() {
        if !centroids[empty].iter().any(|v| v.is_nan()) {
            continue;
        }
        let farthest = data
            .iter()
            .zip(labels.iter())
            .enumerate()
            .filter(|(_, (_, label))| !centroids[**label].iter().any(|v| v.is_nan()))
            .map(|(i, (p, &label))| (i, squared_distance(p, &centroids[label])))
            .max_by(|a, b| a.1.total_cmp(&b.1).then(b.0.cmp(&a.0)));
        let Some((idx, _)) = farthest else {
            continue;
        };
        centroids[empty] = data[idx].clone();
        labels[idx] = empty;
    }
}

fn mean_variance(data: &[Vec<f64>]) -> f64 {
    let dims = data[0].len();
    if dims == 0 {
        return 0.0;
    }
    let n = data.len() as f64;
    let total: f64 = (0..dims)
        .map(|j| {
            let mean = data.iter().map(|r| r[j]).sum::<f64>() / n;
            data.iter().map(|r| (r[j] - mean).powi(2)).sum::<f64>() / n
        })
        .sum();
    total / dims as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blobs() -> Vec<Vec<f64>> {
        let mut data = Vec::new();
        for (cx, cy) in [(0.0, 0.0), (10.0, 10.0), (-10.0, 10.0)] {
            for i in 0..5 {
                let offset = i as f64 * 0.1;
                data.push(vec![cx + offset, cy - offset]);
            }
        }
        data
    }

    #[test]
    fn separates_well_spaced_blobs() {
        let data = blobs();
        let fit = fit(&data, 3, 42).unwrap();
        for blob in 0..3 {
            let label = fit.labels[blob * 5];
            assert!(fit.labels[blob * 5..blob * 5 + 5].iter().all(|l| *l == label));
        }
        let mut distinct = fit.labels.clone();
        distinct.sort();
        distinct.dedup();
        assert_eq!(distinct.len(), 3);
    }

    #[test]
    fn same_seed_same_labels() {
        let data = blobs();
        assert_eq!(fit(&data, 3, 7).unwrap(), fit(&data, 3, 7).unwrap());
    }

    #[test]
    fn every_cluster_is_used() {
        // Duplicate points would starve naive seeding.
        let data = vec![vec![1.0], vec![1.0], vec![1.0], vec![5.0]];
        let fit = fit(&data, 3, 1).unwrap();
        for c in 0..3 {
            assert!(fit.labels.contains(&c), "cluster {c} unused: {:?}", fit.labels);
        }
    }

    #[test]
    fn fewer_points_than_clusters_is_an_error() {
        let err = fit(&[vec![1.0], vec![2.0]], 3, 42).unwrap_err();
        assert!(matches!(
            err,
            ClusterError::TooFewPitchers {
                pitchers: 2,
                clusters: 3
            }
        ));
    }

    #[test]
    fn zero_clusters_is_an_error() {
        let err = fit(&[vec![1.0], vec![2.0]], 0, 42).unwrap_err();
        assert!(matches!(err, ClusterError::NoClusters));
    }

    #[test]
    fn empty_data_is_an_error() {
        assert!(matches!(fit(&[], 2, 42), Err(ClusterError::EmptyFeatures)));
    }

    #[test]
    fn inertia_is_zero_when_each_point_is_a_centroid() {
        let data = vec![vec![0.0], vec![3.0], vec![9.0]];
        let fit = fit(&data, 3, 42).unwrap();
        assert_eq!(fit.inertia, 0.0);
    }
}
