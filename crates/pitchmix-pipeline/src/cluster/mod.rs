// Cluster assigner: impute, standardize, embed, partition.

pub mod embed;
pub mod impute;
pub mod kmeans;
pub mod scale;

use std::collections::HashMap;

use tracing::info;

use crate::config::RunConfig;
use crate::features::FeatureTable;

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("no pitcher feature rows to cluster")]
    EmptyFeatures,

    #[error("cluster count must be at least 1")]
    NoClusters,

    #[error("{pitchers} pitchers cannot be split into {clusters} clusters")]
    TooFewPitchers { pitchers: usize, clusters: usize },
}

/// Cluster label and plot coordinates for one pitcher. Labels are only
/// meaningful within the run that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    pub pitcher: u32,
    pub cluster: usize,
    pub embedding: (f64, f64),
}

pub(crate) fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

/// Run the four clustering steps over the feature table, in order:
/// KNN imputation, standardization, 2D embedding, k-means on the
/// standardized (not embedded) features.
pub fn assign_clusters(table: &FeatureTable, config: &RunConfig) -> Result<Vec<ClusterAssignment>, ClusterError> {
    if table.is_empty() {
        return Err(ClusterError::EmptyFeatures);
    }

    let imputed = impute::knn_impute(&table.matrix(), config.tuning.impute_neighbors);
    let scaled = scale::standardize(&imputed);

    let layout = embed::embed(
        &scaled,
        embed::EmbedParams {
            neighbors: config.tuning.embed_neighbors,
            epochs: config.tuning.embed_epochs,
        },
        config.random_seed,
    );
    let fit = kmeans::fit(&scaled, config.cluster_count, config.random_seed)?;

    info!(
        "Clustered {} pitchers over {} features into {} clusters ({} iterations, inertia {:.2})",
        table.rows.len(),
        table.columns.len(),
        config.cluster_count,
        fit.iterations,
        fit.inertia
    );

    Ok(table
        .rows
        .iter()
        .zip(fit.labels)
        .zip(layout)
        .map(|((row, cluster), embedding)| ClusterAssignment {
            pitcher: row.pitcher,
            cluster,
            embedding,
        })
        .collect())
}

/// Pitcher id to cluster label.
pub fn cluster_lookup(assignments: &[ClusterAssignment]) -> HashMap<u32, usize> {
    assignments.iter().map(|a| (a.pitcher, a.cluster)).collect()
}
