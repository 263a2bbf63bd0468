//! Density clustering over the UMAP-reduced embedding, via the
//! `petal-clustering` crate. Its noise label is `-1`, which is the
//! convention used everywhere downstream for "not assigned to any
//! cluster".

use ndarray::Array2;
use petal_clustering::{Fit, HDbscan};
use petal_neighbors::distance::Euclidean;

/// Which distance the points are already conditioned for. `Cosine` is not a
/// metric `petal_neighbors` exposes directly, so the cosine case L2-normalizes
/// rows first and then runs plain Euclidean: for unit vectors
/// `||a-b||^2 = 2 - 2*cos(a,b)`, so Euclidean distance over normalized rows
/// is monotonic with cosine distance and produces identical clusters/ranking.
pub enum HdbscanMetric {
    Euclidean,
    Cosine,
}

pub struct HdbscanOptions {
    pub min_cluster_size: usize,
    pub min_points: usize,
    pub metric: HdbscanMetric,
}

pub struct HdbscanResult {
    /// Cluster id per row; `cluster_id <= 0` means noise (unassigned).
    pub labels: Vec<i64>,
    /// Per-point outlier score in `[0,1]`. Noise points score `1.0`; a
    /// clustered point's score is its distance to the cluster's centroid,
    /// normalized by the cluster's largest member distance (the crate does
    /// not expose GLOSH scores, so this is a distance-based stand-in with
    /// the same `[0,1]`, "higher is more outlying" contract).
    pub outlier_scores: Vec<f64>,
}

/// Runs HDBSCAN and returns one cluster id plus one outlier score per row of
/// `points`.
pub fn cluster(points: &Array2<f32>, options: &HdbscanOptions) -> HdbscanResult {
    let n = points.nrows();
    if n == 0 {
        return HdbscanResult { labels: Vec::new(), outlier_scores: Vec::new() };
    }

    let data: Array2<f64> = match options.metric {
        HdbscanMetric::Euclidean => points.mapv(|v| v as f64),
        HdbscanMetric::Cosine => {
            let mut normalized = points.mapv(|v| v as f64);
            for mut row in normalized.rows_mut() {
                let norm = row.iter().map(|x| x * x).sum::<f64>().sqrt();
                if norm > 0.0 {
                    row.mapv_inplace(|x| x / norm);
                }
            }
            normalized
        }
    };

    let mut model = HDbscan {
        min_samples: options.min_points.max(1),
        min_cluster_size: options.min_cluster_size.max(2),
        metric: Euclidean::default(),
        ..HDbscan::default()
    };

    let (clusters, outliers) = model.fit(&data);
    let dims = data.ncols();

    let mut labels = vec![-1i64; n];
    let mut outlier_scores = vec![1.0f64; n];

    for (cluster_id, members) in &clusters {
        for &idx in members {
            labels[idx] = *cluster_id as i64 + 1; // shift so the smallest real cluster id is 1, not 0
        }

        let mut centroid = vec![0.0f64; dims];
        for &idx in members {
            for d in 0..dims {
                centroid[d] += data[[idx, d]];
            }
        }
        let count = members.len().max(1) as f64;
        for c in centroid.iter_mut() {
            *c /= count;
        }

        let dists: Vec<f64> = members
            .iter()
            .map(|&idx| (0..dims).map(|d| (data[[idx, d]] - centroid[d]).powi(2)).sum::<f64>().sqrt())
            .collect();
        let max_dist = dists.iter().cloned().fold(0.0f64, f64::max);
        for (&idx, &dist) in members.iter().zip(dists.iter()) {
            outlier_scores[idx] = if max_dist > 0.0 { (dist / max_dist).clamp(0.0, 1.0) } else { 0.0 };
        }
    }
    for &idx in &outliers {
        labels[idx] = -1;
        outlier_scores[idx] = 1.0;
    }

    HdbscanResult { labels, outlier_scores }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn separates_two_dense_blobs() {
        let points = arr2(&[
            [0.0, 0.0], [0.1, 0.1], [0.2, 0.0], [0.0, 0.2],
            [10.0, 10.0], [10.1, 10.1], [10.2, 10.0], [10.0, 10.2],
        ]);
        let result = cluster(
            &points,
            &HdbscanOptions { min_cluster_size: 2, min_points: 2, metric: HdbscanMetric::Euclidean },
        );
        let labels = result.labels;
        assert_eq!(labels.len(), 8);
        assert_eq!(result.outlier_scores.len(), 8);
        let first_group: std::collections::HashSet<_> = labels[0..4].iter().collect();
        let second_group: std::collections::HashSet<_> = labels[4..8].iter().collect();
        assert_eq!(first_group.len(), 1);
        assert_eq!(second_group.len(), 1);
        assert_ne!(labels[0], labels[4]);
        assert!(result.outlier_scores.iter().all(|&s| (0.0..=1.0).contains(&s)));
    }
}
