//! Topic drift between consecutive time windows for a project. Pure
//! math: cosine distance between L2-normalized, time-windowed topic
//! distributions.

use crate::config::DriftConfig;
use crate::decimal::Amount;
use crate::errors::ChatLakeResult;
use crate::ledger;
use crate::models::{RunSummary, RunStatus, RunType};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// L2-normalizes `v` in place; a zero vector is left as all zeros.
pub fn l2_normalize(v: &mut [f64]) {
    let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

/// Cosine distance = 1 - cosine similarity. Symmetric and bounded in
/// `[0, 2]`; `0` for identical directions, `2` for exactly opposite ones.
/// When exactly one vector is all-zero (no topic mass in that window) the
/// distance is `1`; when both are all-zero it's `0`.
pub fn cosine_distance(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    match (norm_a == 0.0, norm_b == 0.0) {
        (true, true) => 0.0,
        (true, false) | (false, true) => 1.0,
        (false, false) => 1.0 - dot / (norm_a * norm_b),
    }
}

/// Buckets `(timestamp, topic_vector)` observations into `window_days`
/// windows anchored at the earliest timestamp, then averages and
/// L2-normalizes each bucket.
pub fn windowed_distributions(
    observations: &[(DateTime<Utc>, Vec<f64>)],
    window_days: i64,
) -> Vec<(DateTime<Utc>, DateTime<Utc>, Vec<f64>)> {
    if observations.is_empty() {
        return Vec::new();
    }

    let earliest = observations.iter().map(|(t, _)| *t).min().unwrap();
    let window = chrono::Duration::days(window_days.max(1));

    let mut buckets: HashMap<i64, Vec<&Vec<f64>>> = HashMap::new();
    for (ts, vec) in observations {
        let index = (*ts - earliest).num_seconds() / window.num_seconds().max(1);
        buckets.entry(index).or_default().push(vec);
    }

    let dims = observations[0].1.len();
    let mut indices: Vec<i64> = buckets.keys().copied().collect();
    indices.sort_unstable();

    indices
        .into_iter()
        .map(|idx| {
            let members = &buckets[&idx];
            let mut avg = vec![0f64; dims];
            for v in members {
                for (d, x) in v.iter().enumerate() {
                    avg[d] += x;
                }
            }
            for x in avg.iter_mut() {
                *x /= members.len() as f64;
            }
            l2_normalize(&mut avg);

            let start = earliest + window * idx as i32;
            let end = start + window;
            (start, end, avg)
        })
        .collect()
}

/// Computes drift scores between each pair of consecutive windows, clamped
/// to `[0,1]`. Returns one fewer score than there are windows.
pub fn drift_series(windows: &[(DateTime<Utc>, DateTime<Utc>, Vec<f64>)]) -> Vec<f64> {
    windows
        .windows(2)
        .map(|pair| cosine_distance(&pair[0].2, &pair[1].2).clamp(0.0, 1.0))
        .collect()
}

/// Computes and persists drift metrics for every project that has at
/// least two topic-bearing time windows.
pub async fn execute(
    pool: &SqlitePool,
    config: &DriftConfig,
    cancel: &CancellationToken,
) -> ChatLakeResult<RunSummary> {
    let start = Instant::now();

    let feature_config = json!({ "window_days": config.window_days });
    let run_id = ledger::start(
        pool,
        RunType::Drift,
        "chatlake-drift",
        env!("CARGO_PKG_VERSION"),
        &feature_config,
        "all_projects",
        None,
    )
    .await?;

    let project_ids: Vec<i64> = sqlx::query_scalar("SELECT id FROM projects").fetch_all(pool).await?;

    let topic_space = load_topic_space(pool).await?;
    let topic_index: HashMap<i64, usize> =
        topic_space.iter().enumerate().map(|(i, (id, _))| (*id, i)).collect();
    let topic_labels: Vec<String> = topic_space.into_iter().map(|(_, label)| label).collect();

    let mut written = 0usize;
    for project_id in &project_ids {
        if cancel.is_cancelled() {
            break;
        }

        let observations =
            load_project_topic_observations(pool, *project_id, &topic_index, topic_labels.len()).await?;
        let windows = windowed_distributions(&observations, config.window_days);
        let scores = drift_series(&windows);

        for (i, score) in scores.iter().enumerate() {
            let (window_start, _, prev_vec) = &windows[i];
            let (_, window_end, curr_vec) = &windows[i + 1];
            let decimal_score = Amount::from(
                Decimal::from_f64_retain((score * 1_000_000.0).round() / 1_000_000.0).unwrap_or(Decimal::ZERO),
            );

            let shifts = topic_shifts(&topic_labels, prev_vec, curr_vec);

            sqlx::query(
                r#"
                INSERT INTO project_drift_metrics
                    (inference_run_id, project_id, window_start, window_end, drift_score, details_json)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(run_id)
            .bind(project_id)
            .bind(window_start)
            .bind(window_end)
            .bind(decimal_score)
            .bind(json!(shifts).to_string())
            .execute(pool)
            .await?;
            written += 1;
        }
    }

    ledger::complete(pool, run_id, &json!({"projects": project_ids.len(), "metrics": written})).await?;
    info!("drift run {run_id} wrote {written} metrics across {} projects", project_ids.len());

    Ok(RunSummary {
        run_id,
        status: RunStatus::Completed,
        items_processed: project_ids.len(),
        items_written: written,
        errors: vec![],
        elapsed_ms: start.elapsed().as_millis() as u64,
        umap_dimensions: 0,
    })
}

/// The full, stable topic-id space for the most recently completed topics
/// run: `(topic_id, label)` ordered by `topic_index`. Every observation
/// vector is built against this same space so index `d` means the same
/// topic across every conversation and window.
async fn load_topic_space(pool: &SqlitePool) -> ChatLakeResult<Vec<(i64, String)>> {
    let rows: Vec<(i64, String)> = sqlx::query_as(
        r#"
        SELECT id, label FROM topics
        WHERE inference_run_id = (SELECT MAX(id) FROM inference_runs WHERE run_type = 'topics' AND status = 'completed')
        ORDER BY topic_index
        "#,
    )
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

async fn load_project_topic_observations(
    pool: &SqlitePool,
    project_id: i64,
    topic_index: &HashMap<i64, usize>,
    dims: usize,
) -> ChatLakeResult<Vec<(DateTime<Utc>, Vec<f64>)>> {
    let conversation_ids: Vec<i64> = sqlx::query_scalar(
        "SELECT conversation_ids_json FROM project_suggestions WHERE resolved_project_id = ?",
    )
    .bind(project_id)
    .fetch_all(pool)
    .await?
    .into_iter()
    .flat_map(|json_text: String| serde_json::from_str::<Vec<i64>>(&json_text).unwrap_or_default())
    .collect();

    let mut observations = Vec::new();
    for conversation_id in conversation_ids {
        let ts: Option<DateTime<Utc>> = sqlx::query_scalar(
            "SELECT last_message_at FROM conversations WHERE id = ?",
        )
        .bind(conversation_id)
        .fetch_optional(pool)
        .await?
        .flatten();

        let Some(ts) = ts else { continue };

        let scores: Vec<(i64, Amount)> = sqlx::query_as(
            r#"
            SELECT topic_id, score FROM conversation_topics
            WHERE conversation_id = ?
            AND inference_run_id = (SELECT MAX(id) FROM inference_runs WHERE run_type = 'topics' AND status = 'completed')
            "#,
        )
        .bind(conversation_id)
        .fetch_all(pool)
        .await?;

        if scores.is_empty() {
            continue;
        }

        let mut vector = vec![0.0f64; dims];
        for (topic_id, score) in scores {
            if let Some(&idx) = topic_index.get(&topic_id) {
                vector[idx] = score.to_string().parse().unwrap_or(0.0);
            }
        }

        observations.push((ts, vector));
    }

    Ok(observations)
}

/// Per-topic shifts between two aligned, L2-normalized distributions,
/// sorted by `|change|` descending.
fn topic_shifts(labels: &[String], prev: &[f64], curr: &[f64]) -> Vec<Value> {
    let mut shifts: Vec<Value> = labels
        .iter()
        .enumerate()
        .map(|(d, label)| {
            let prev_score = prev.get(d).copied().unwrap_or(0.0);
            let curr_score = curr.get(d).copied().unwrap_or(0.0);
            json!({
                "label": label,
                "prev": prev_score,
                "curr": curr_score,
                "change": curr_score - prev_score,
            })
        })
        .collect();

    shifts.sort_by(|a, b| {
        let change_a = a["change"].as_f64().unwrap_or(0.0).abs();
        let change_b = b["change"].as_f64().unwrap_or(0.0).abs();
        change_b.partial_cmp(&change_a).unwrap_or(std::cmp::Ordering::Equal)
    });

    shifts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_distance_is_symmetric() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert_eq!(cosine_distance(&a, &b), cosine_distance(&b, &a));
    }

    #[test]
    fn cosine_distance_is_zero_for_identical_vectors() {
        let a = vec![0.5, 0.5, 0.0];
        assert!(cosine_distance(&a, &a).abs() < 1e-9);
    }

    #[test]
    fn cosine_distance_is_bounded_by_two() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        let d = cosine_distance(&a, &b);
        assert!(d <= 2.0 + 1e-9 && d >= 0.0);
    }

    #[test]
    fn cosine_distance_is_one_for_a_single_empty_window() {
        let empty = vec![0.0, 0.0, 0.0];
        let full = vec![0.3, 0.3, 0.4];
        assert_eq!(cosine_distance(&empty, &full), 1.0);
        assert_eq!(cosine_distance(&full, &empty), 1.0);
    }

    #[test]
    fn cosine_distance_is_zero_for_two_empty_windows() {
        let empty = vec![0.0, 0.0];
        assert_eq!(cosine_distance(&empty, &empty), 0.0);
    }

    #[test]
    fn topic_shifts_are_sorted_by_absolute_change_descending() {
        let labels = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let prev = vec![0.5, 0.3, 0.2];
        let curr = vec![0.45, 0.1, 0.45];
        let shifts = topic_shifts(&labels, &prev, &curr);
        let changes: Vec<f64> = shifts.iter().map(|s| s["change"].as_f64().unwrap().abs()).collect();
        assert!(changes.windows(2).all(|w| w[0] >= w[1]));
        assert_eq!(shifts[0]["label"], "c");
    }
}
