//! Fixed-k fallback clusterer, used when HDBSCAN collapses every point
//! into noise. Hand-rolled Lloyd's algorithm over `ndarray`; the
//! outlier-pruning-by-distance-threshold output contract is bespoke
//! enough that no library exposes it directly.

use crate::rng::SeededStream;
use ndarray::{Array1, Array2, Axis};
use std::collections::HashMap;

pub struct KMeansOptions {
    pub k: usize,
    pub max_iterations: usize,
    pub outlier_threshold: f64,
    pub seed: u64,
}

pub struct KMeansResult {
    /// Cluster id per point; `-1` marks points pruned as outliers
    /// (distance to their assigned centroid exceeded `outlier_threshold`,
    /// when that threshold is greater than zero).
    pub labels: Vec<i64>,
    pub centroids: Array2<f32>,
    /// Distance from each point to its nearest centroid, computed before
    /// outlier pruning, in the same order as `labels`.
    pub distances: Vec<f32>,
    /// Number of points pruned as outliers per centroid index (0-based,
    /// before the `+1` label shift), keyed by the centroid they were
    /// nearest to.
    pub outlier_counts: HashMap<usize, usize>,
}

pub fn cluster(points: &Array2<f32>, options: &KMeansOptions) -> KMeansResult {
    let n = points.nrows();
    let k = options.k.min(n).max(1);

    if n == 0 {
        return KMeansResult {
            labels: Vec::new(),
            centroids: Array2::zeros((0, 0)),
            distances: Vec::new(),
            outlier_counts: HashMap::new(),
        };
    }

    let mut rng = SeededStream::new(options.seed);
    let mut indices: Vec<usize> = (0..n).collect();
    rng.shuffle(&mut indices);
    let mut centroids: Array2<f32> = Array2::zeros((k, points.ncols()));
    for (c, &idx) in indices.iter().take(k).enumerate() {
        centroids.row_mut(c).assign(&points.row(idx));
    }

    let mut labels = vec![0usize; n];

    for _ in 0..options.max_iterations.max(1) {
        let mut changed = false;
        for i in 0..n {
            let (best, _) = nearest_centroid(&points.row(i).to_owned(), &centroids);
            if labels[i] != best {
                labels[i] = best;
                changed = true;
            }
        }

        for c in 0..k {
            let members: Vec<usize> = (0..n).filter(|&i| labels[i] == c).collect();
            if members.is_empty() {
                continue;
            }
            let mut sum = Array1::<f32>::zeros(points.ncols());
            for &i in &members {
                sum += &points.row(i);
            }
            centroids.row_mut(c).assign(&(sum / members.len() as f32));
        }

        if !changed {
            break;
        }
    }

    let mut final_labels: Vec<i64> = Vec::with_capacity(n);
    let mut distances: Vec<f32> = Vec::with_capacity(n);
    let mut outlier_counts: HashMap<usize, usize> = HashMap::new();
    for i in 0..n {
        let (best, dist_sq) = nearest_centroid(&points.row(i).to_owned(), &centroids);
        let dist = dist_sq.sqrt();
        distances.push(dist);
        if options.outlier_threshold > 0.0 && (dist as f64) > options.outlier_threshold {
            final_labels.push(-1);
            *outlier_counts.entry(best).or_insert(0) += 1;
        } else {
            final_labels.push(best as i64 + 1);
        }
    }

    KMeansResult { labels: final_labels, centroids, distances, outlier_counts }
}

fn nearest_centroid(point: &Array1<f32>, centroids: &Array2<f32>) -> (usize, f32) {
    centroids
        .axis_iter(Axis(0))
        .enumerate()
        .map(|(idx, row)| {
            let dist = point.iter().zip(row.iter()).map(|(a, b)| (a - b).powi(2)).sum::<f32>();
            (idx, dist)
        })
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal))
        .unwrap_or((0, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn converges_to_two_obvious_clusters() {
        let points = arr2(&[
            [0.0, 0.0], [0.1, 0.0], [0.0, 0.1],
            [9.0, 9.0], [9.1, 9.0], [9.0, 9.1],
        ]);
        let options = KMeansOptions { k: 2, max_iterations: 50, outlier_threshold: 0.0, seed: 3 };
        let result = cluster(&points, &options);
        assert_eq!(result.labels[0], result.labels[1]);
        assert_eq!(result.labels[1], result.labels[2]);
        assert_ne!(result.labels[0], result.labels[3]);
    }

    #[test]
    fn prunes_far_outliers_when_threshold_set() {
        let points = arr2(&[
            [0.0, 0.0], [0.1, 0.0], [0.0, 0.1], [100.0, 100.0],
        ]);
        let options = KMeansOptions { k: 1, max_iterations: 50, outlier_threshold: 5.0, seed: 1 };
        let result = cluster(&points, &options);
        assert_eq!(result.labels[3], -1);
        assert_eq!(result.distances.len(), 4);
        assert_eq!(result.outlier_counts.values().sum::<usize>(), 1);
    }

    #[test]
    fn two_tight_clusters_with_two_far_outliers_prune_both() {
        let points = arr2(&[
            [0.0, 0.0], [0.1, 0.0], [0.0, 0.1], [0.1, 0.1], [0.05, 0.05],
            [9.0, 9.0], [9.1, 9.0], [9.0, 9.1], [9.1, 9.1], [9.05, 9.05],
            [50.0, -50.0], [-50.0, 50.0],
        ]);
        let options = KMeansOptions { k: 2, max_iterations: 100, outlier_threshold: 3.0, seed: 2 };
        let result = cluster(&points, &options);
        assert_eq!(result.labels[10], -1);
        assert_eq!(result.labels[11], -1);
        assert_eq!(result.outlier_counts.values().sum::<usize>(), 2);
        for &label in &result.labels[0..10] {
            assert!(label > 0);
        }
    }
}
