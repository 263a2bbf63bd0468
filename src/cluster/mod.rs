//! The uniform clustering entry point: UMAP reduce, HDBSCAN density
//! cluster, KMeans fallback when HDBSCAN finds nothing but noise.

pub mod hdbscan;
pub mod kmeans;
pub mod umap;

use crate::config::{ClusteringConfig, KMeansConfig};
use crate::embedding;
use crate::errors::ChatLakeResult;
use crate::ledger;
use crate::models::{RunSummary, RunType};
use crate::suggestions;
use ndarray::Array2;
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct ClusterSegment {
    pub segment_id: i64,
    pub conversation_id: i64,
    pub content_text: String,
    pub content_hash: Vec<u8>,
}

/// Runs UMAP + HDBSCAN (falling back to KMeans if HDBSCAN assigns every
/// point to noise) over every unclustered segment, then hands the
/// resulting groups to [`crate::suggestions`].
pub async fn execute(
    pool: &SqlitePool,
    clustering: &ClusteringConfig,
    kmeans_config: &KMeansConfig,
    cancel: &CancellationToken,
) -> ChatLakeResult<RunSummary> {
    let start = Instant::now();

    let feature_config = json!({
        "umap_dimensions": clustering.umap_dimensions,
        "umap_neighbors": clustering.umap_neighbors,
        "min_cluster_size": clustering.min_cluster_size,
        "min_points": clustering.min_points,
        "random_seed": clustering.random_seed,
        "kmeans_max_iterations": kmeans_config.max_iterations,
        "kmeans_outlier_threshold": kmeans_config.outlier_threshold,
    });

    let run_id = ledger::start(
        pool,
        RunType::Clustering,
        "chatlake-cluster",
        env!("CARGO_PKG_VERSION"),
        &feature_config,
        "all_conversations",
        None,
    )
    .await?;

    let segments: Vec<ClusterSegment> = sqlx::query_as::<_, (i64, i64, String, Vec<u8>)>(
        "SELECT id, conversation_id, content_text, content_hash FROM conversation_segments",
    )
    .fetch_all(pool)
    .await?
    .into_iter()
    .map(|(segment_id, conversation_id, content_text, content_hash)| ClusterSegment {
        segment_id,
        conversation_id,
        content_text,
        content_hash,
    })
    .collect();

    if segments.is_empty() {
        ledger::complete(pool, run_id, &json!({"segments": 0})).await?;
        return Ok(RunSummary {
            run_id,
            status: crate::models::RunStatus::Completed,
            items_processed: 0,
            items_written: 0,
            errors: vec![],
            elapsed_ms: start.elapsed().as_millis() as u64,
            umap_dimensions: 0,
        });
    }

    let mut vectors = Vec::with_capacity(segments.len());
    for seg in &segments {
        if cancel.is_cancelled() {
            break;
        }
        let v = embedding::get_or_compute(pool, seg.segment_id, embedding::DEFAULT_MODEL, &seg.content_text).await?;
        vectors.push(v);
    }

    let dims = vectors.first().map(|v| v.len()).unwrap_or(0);
    let mut matrix = Array2::<f32>::zeros((vectors.len(), dims));
    for (i, v) in vectors.iter().enumerate() {
        for (d, val) in v.iter().enumerate() {
            matrix[[i, d]] = *val;
        }
    }

    // When there are fewer points than umap_neighbors, UMAP's own neighbor
    // graph can't be built meaningfully; skip straight to HDBSCAN on the
    // original vectors with cosine distance, and report umap_dimensions=0.
    let skip_umap = segments.len() < clustering.umap_neighbors;

    let (clustered_points, used_umap_dimensions): (Array2<f32>, usize) = if skip_umap {
        info!(
            "segment count {} below umap_neighbors {}; skipping UMAP and clustering original vectors",
            segments.len(),
            clustering.umap_neighbors
        );
        (matrix, 0)
    } else {
        let umap_options = umap::UmapOptions {
            target_dimensions: clustering.umap_dimensions.min(dims.max(1)),
            neighbors: clustering.umap_neighbors,
            epochs: 200,
            seed: clustering.random_seed,
        };
        let reduced = umap::reduce(&matrix, &umap_options, cancel, |epoch, total| {
            if epoch % 20 == 0 {
                info!("umap epoch {epoch}/{total}");
            }
        });
        let reduced_dims = reduced.ncols();
        (reduced, reduced_dims)
    };

    let hdbscan_options = hdbscan::HdbscanOptions {
        min_cluster_size: clustering.min_cluster_size,
        min_points: clustering.min_points,
        metric: if skip_umap { hdbscan::HdbscanMetric::Cosine } else { hdbscan::HdbscanMetric::Euclidean },
    };
    let hdbscan_result = hdbscan::cluster(&clustered_points, &hdbscan_options);
    let mut labels = hdbscan_result.labels;

    let assigned = labels.iter().filter(|&&l| l > 0).count();
    let used_fallback = assigned == 0;
    let mut confidences: HashMap<i64, f64> = HashMap::new();

    if used_fallback {
        info!("HDBSCAN produced only noise; falling back to KMeans");
        let k = (segments.len() / clustering.min_cluster_size.max(1)).max(1);
        let kmeans_result = kmeans::cluster(
            &clustered_points,
            &kmeans::KMeansOptions {
                k,
                max_iterations: kmeans_config.max_iterations,
                outlier_threshold: kmeans_config.outlier_threshold,
                seed: kmeans_config.seed.unwrap_or(clustering.random_seed),
            },
        );
        labels = kmeans_result.labels.clone();

        let mut sums: HashMap<i64, f64> = HashMap::new();
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for (idx, &label) in kmeans_result.labels.iter().enumerate() {
            if label > 0 {
                *sums.entry(label).or_insert(0.0) += kmeans_result.distances[idx] as f64;
                *counts.entry(label).or_insert(0) += 1;
            }
        }
        for (label, sum) in &sums {
            let avg_min_distance = sum / counts[label] as f64;
            confidences.insert(*label, (1.0 - avg_min_distance / 10.0).max(0.0));
        }

        let total_outliers: usize = kmeans_result.outlier_counts.values().sum();
        if total_outliers > 0 {
            info!(
                "kmeans pruned {total_outliers} outlier points across {} centroids",
                kmeans_result.outlier_counts.len()
            );
        }
    } else {
        let mut sums: HashMap<i64, f64> = HashMap::new();
        let mut counts: HashMap<i64, usize> = HashMap::new();
        for (idx, &label) in labels.iter().enumerate() {
            if label > 0 {
                *sums.entry(label).or_insert(0.0) += hdbscan_result.outlier_scores[idx];
                *counts.entry(label).or_insert(0) += 1;
            }
        }
        for (label, sum) in &sums {
            let avg_outlier_score = sum / counts[label] as f64;
            confidences.insert(*label, (1.0 - avg_outlier_score).max(0.0));
        }
    }

    let mut groups: HashMap<i64, Vec<usize>> = HashMap::new();
    for (idx, &label) in labels.iter().enumerate() {
        if label > 0 {
            groups.entry(label).or_default().push(idx);
        }
    }

    for seg in &segments {
        sqlx::query("UPDATE conversation_segments SET inference_run_id = ? WHERE id = ?")
            .bind(run_id)
            .bind(seg.segment_id)
            .execute(pool)
            .await?;
    }

    let mut written = 0usize;
    for (label, member_indices) in &groups {
        let member_segments: Vec<&ClusterSegment> = member_indices.iter().map(|&i| &segments[i]).collect();
        let confidence = confidences.get(label).copied().unwrap_or(0.0);
        written += suggestions::write_from_cluster(pool, run_id, &member_segments, confidence).await?;
    }

    let metrics = json!({
        "segments": segments.len(),
        "clusters": groups.len(),
        "used_kmeans_fallback": used_fallback,
        "used_umap": !skip_umap,
    });
    ledger::complete(pool, run_id, &metrics).await?;

    Ok(RunSummary {
        run_id,
        status: crate::models::RunStatus::Completed,
        items_processed: segments.len(),
        items_written: written,
        errors: vec![],
        elapsed_ms: start.elapsed().as_millis() as u64,
        umap_dimensions: used_umap_dimensions,
    })
}
