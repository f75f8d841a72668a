// K-nearest-neighbor imputation over incomplete feature rows.
//
// Distances use only the coordinates both rows have, scaled up by the share
// of coordinates that were usable, so sparse overlaps are not unfairly close.

/// Distance between two partially observed rows, or `None` when they share
/// no observed coordinate.
pub fn nan_euclidean(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let mut sum = 0.0;
    let mut present = 0usize;
    for (x, y) in a.iter().zip(b) {
        if let (Some(x), Some(y)) = (x, y) {
            sum += (x - y).powi(2);
            present += 1;
        }
    }
    if present == 0 {
        return None;
    }
    let weight = a.len() as f64 / present as f64;
    Some((weight * sum).sqrt())
}

/// Fill every gap with the mean of that column over the `k` nearest rows that
/// observed it. A gap with no reachable donor takes the column mean.
///
/// Columns with no observed value at all are filled with 0.0.
pub fn knn_impute(data: &[Vec<Option<f64>>], k: usize) -> Vec<Vec<f64>> {
    let n_cols = data.first().map_or(0, Vec::len);
    let column_means: Vec<f64> = (0..n_cols)
        .map(|j| {
            let observed: Vec<f64> = data.iter().filter_map(|row| row[j]).collect();
            if observed.is_empty() {
                0.0
            } else {
                observed.iter().sum::<f64>() / observed.len() as f64
            }
        })
        .collect();

    data.iter()
        .enumerate()
        .map(|(i, row)| {
            if row.iter().all(Option::is_some) {
                return row.iter().map(|v| v.unwrap_or_default()).collect();
            }

            // Distances to every other row, computed once per incomplete row.
            let distances: Vec<Option<f64>> = data
                .iter()
                .enumerate()
                .map(|(other, candidate)| {
                    if other == i {
                        None
                    } else {
                        nan_euclidean(row, candidate)
                    }
                })
                .collect();

            row.iter()
                .enumerate()
                .map(|(j, value)| match value {
                    Some(v) => *v,
                    None => impute_cell(data, &distances, j, k).unwrap_or(column_means[j]),
                })
                .collect()
        })
        .collect()
}

fn impute_cell(data: &[Vec<Option<f64>>], distances: &[Option<f64>], column: usize, k: usize) -> Option<f64> {
    let mut donors: Vec<(f64, usize, f64)> = data
        .iter()
        .enumerate()
        .filter_map(|(idx, row)| {
            let value = row[column]?;
            let distance = distances[idx]?;
            Some((distance, idx, value))
        })
        .collect();
    if donors.is_empty() {
        return None;
    }
    donors.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    donors.truncate(k);
    Some(donors.iter().map(|d| d.2).sum::<f64>() / donors.len() as f64)
}
