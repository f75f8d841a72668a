// Column standardization (zero mean, unit variance).

/// Mean and population standard deviation of one feature column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnStats {
    pub mean: f64,
    pub stdev: f64,
}

/// Threshold below which standard deviation is treated as zero.
const STDEV_EPSILON: f64 = 1e-12;

/// Compute mean and population standard deviation for a slice of values.
///
/// Returns `ColumnStats { mean: 0.0, stdev: 0.0 }` for an empty slice.
pub fn column_stats(values: &[f64]) -> ColumnStats {
    if values.is_empty() {
        return ColumnStats {
            mean: 0.0,
            stdev: 0.0,
        };
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    ColumnStats {
        mean,
        stdev: variance.sqrt(),
    }
}

/// Standardize a value. Constant columns map to 0.0.
pub fn zscore(value: f64, stats: &ColumnStats) -> f64 {
    if stats.stdev < STDEV_EPSILON {
        return 0.0;
    }
    (value - stats.mean) / stats.stdev
}

/// Standardize every column of a complete row-major matrix.
pub fn standardize(data: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let Some(first) = data.first() else {
        return Vec::new();
    };
    let stats: Vec<ColumnStats> = (0..first.len())
        .map(|j| {
            let column: Vec<f64> = data.iter().map(|row| row[j]).collect();
            column_stats(&column)
        })
        .collect();

    data.iter()
        .map(|row| {
            row.iter()
                .zip(&stats)
                .map(|(v, s)| zscore(*v, s))
                .collect()
        })
        .collect()
}
