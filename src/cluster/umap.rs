//! Dimensionality reduction ahead of density clustering. No crate in the
//! wider Rust ecosystem implements UMAP, so this hand-rolls the
//! force-directed layout: build a k-nearest-neighbor graph
//! in the source space, then iteratively attract neighbors and repel a
//! random negative sample per point, the same attractive/repulsive update
//! rule UMAP's reference implementation uses, minus its fuzzy-simplicial-
//! set machinery.

use crate::rng::SeededStream;
use ndarray::{Array2, ArrayView1, Axis};
use tokio_util::sync::CancellationToken;

pub struct UmapOptions {
    pub target_dimensions: usize,
    pub neighbors: usize,
    pub epochs: usize,
    pub seed: u64,
}

/// Reduces `points` (rows = samples, columns = source dimensions) to
/// `options.target_dimensions` columns. Progress is reported over the
/// first 80% of epochs via `on_progress(epoch, total_epochs)` — the last
/// 20% only refines local structure.
pub fn reduce(
    points: &Array2<f32>,
    options: &UmapOptions,
    cancel: &CancellationToken,
    mut on_progress: impl FnMut(usize, usize),
) -> Array2<f32> {
    let n = points.nrows();
    let mut rng = SeededStream::new(options.seed);

    if n == 0 {
        return Array2::zeros((0, options.target_dimensions));
    }

    let neighbor_lists = k_nearest_neighbors(points, options.neighbors.min(n.saturating_sub(1)));

    let mut embedding = Array2::<f32>::zeros((n, options.target_dimensions));
    for i in 0..n {
        for d in 0..options.target_dimensions {
            embedding[[i, d]] = (rng.next_float() as f32 - 0.5) * 10.0;
        }
    }

    let total_epochs = options.epochs.max(1);
    let progress_cutoff = ((total_epochs as f64) * 0.8).ceil() as usize;

    for epoch in 0..total_epochs {
        if cancel.is_cancelled() {
            break;
        }

        for i in 0..n {
            for &j in &neighbor_lists[i] {
                attract(&mut embedding, i, j);
            }

            let negative = rng.next_index(n);
            if negative != i {
                repel(&mut embedding, i, negative);
            }
        }

        if epoch < progress_cutoff {
            on_progress(epoch, total_epochs);
        }
    }

    embedding
}

fn attract(embedding: &mut Array2<f32>, i: usize, j: usize) {
    let lr = 0.05;
    for d in 0..embedding.ncols() {
        let delta = embedding[[j, d]] - embedding[[i, d]];
        embedding[[i, d]] += lr * delta;
    }
}

fn repel(embedding: &mut Array2<f32>, i: usize, j: usize) {
    let lr = 0.01;
    let dist_sq: f32 = (0..embedding.ncols())
        .map(|d| (embedding[[i, d]] - embedding[[j, d]]).powi(2))
        .sum::<f32>()
        .max(1e-4);
    for d in 0..embedding.ncols() {
        let delta = embedding[[i, d]] - embedding[[j, d]];
        embedding[[i, d]] += lr * delta / dist_sq;
    }
}

/// Cosine distance, used for the source-space neighbor graph per the UMAP
/// phase's mandated metric. `1.0` (maximally distant) when either row is a
/// zero vector.
fn cosine_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        1.0
    } else {
        1.0 - dot / (norm_a * norm_b)
    }
}

fn k_nearest_neighbors(points: &Array2<f32>, k: usize) -> Vec<Vec<usize>> {
    let n = points.nrows();
    let mut out = vec![Vec::new(); n];
    if k == 0 {
        return out;
    }

    for i in 0..n {
        let row_i = points.row(i);
        let mut dists: Vec<(usize, f32)> = (0..n)
            .filter(|&j| j != i)
            .map(|j| (j, cosine_distance(row_i, points.row(j))))
            .collect();
        dists.sort_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(std::cmp::Ordering::Equal));
        out[i] = dists.into_iter().take(k).map(|(j, _)| j).collect();
    }

    out
}

/// Row-wise mean, used by callers that want a centroid of the reduced
/// embedding (e.g. for drift's project-level summary).
pub fn mean_row(points: &Array2<f32>) -> Vec<f32> {
    if points.nrows() == 0 {
        return Vec::new();
    }
    points.mean_axis(Axis(0)).unwrap_or_else(|| Array2::zeros((1, points.ncols())).row(0).to_owned()).to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn reduce_is_deterministic_given_same_seed() {
        let points = arr2(&[[0.0, 0.0, 0.0], [1.0, 1.0, 1.0], [5.0, 5.0, 5.0], [6.0, 6.0, 6.0]]);
        let opts = UmapOptions { target_dimensions: 2, neighbors: 2, epochs: 10, seed: 7 };
        let cancel = CancellationToken::new();
        let a = reduce(&points, &opts, &cancel, |_, _| {});
        let b = reduce(&points, &opts, &cancel, |_, _| {});
        assert_eq!(a, b);
    }

    #[test]
    fn reduce_respects_cancellation() {
        let points = arr2(&[[0.0, 0.0], [1.0, 1.0]]);
        let opts = UmapOptions { target_dimensions: 2, neighbors: 1, epochs: 1000, seed: 1 };
        let cancel = CancellationToken::new();
        cancel.cancel();
        let out = reduce(&points, &opts, &cancel, |_, _| {});
        assert_eq!(out.nrows(), 2);
    }
}
