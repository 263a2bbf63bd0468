//! Provenance ledger shared by every analytical pipeline. Generalizes a
//! start/complete/fail event-log pair from "one log for imports" into
//! "one run ledger for every pipeline kind", keyed by a
//! `feature_config_hash` so two runs with byte-identical configuration
//! (after key-order canonicalization) are provably comparable.

use crate::errors::ChatLakeResult;
use crate::hashing::feature_config_hash;
use crate::models::{InferenceRun, RunType};
use serde_json::Value;
use sqlx::SqlitePool;
use tracing::{info, warn};

pub async fn start(
    pool: &SqlitePool,
    run_type: RunType,
    model_name: &str,
    model_version: &str,
    feature_config: &Value,
    input_scope: &str,
    input_description: Option<&str>,
) -> ChatLakeResult<i64> {
    let hash = feature_config_hash(feature_config);

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO inference_runs
            (run_type, model_name, model_version, feature_config_hash, input_scope, input_description, status)
        VALUES (?, ?, ?, ?, ?, ?, 'running')
        RETURNING id
        "#,
    )
    .bind(run_type.as_str())
    .bind(model_name)
    .bind(model_version)
    .bind(hash.to_vec())
    .bind(input_scope)
    .bind(input_description)
    .fetch_one(pool)
    .await?;

    info!("started {} run {id} over scope {input_scope}", run_type.as_str());
    Ok(id)
}

pub async fn complete(pool: &SqlitePool, run_id: i64, metrics: &Value) -> ChatLakeResult<()> {
    sqlx::query(
        r#"
        UPDATE inference_runs
        SET status = 'completed', metrics_json = ?, completed_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(metrics.to_string())
    .bind(run_id)
    .execute(pool)
    .await?;

    info!("completed run {run_id}");
    Ok(())
}

pub async fn fail(pool: &SqlitePool, run_id: i64, reason: &str) -> ChatLakeResult<()> {
    sqlx::query(
        r#"
        UPDATE inference_runs
        SET status = 'failed', metrics_json = ?, completed_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(serde_json::json!({ "error": reason }).to_string())
    .bind(run_id)
    .execute(pool)
    .await?;

    warn!("run {run_id} failed: {reason}");
    Ok(())
}

pub async fn get(pool: &SqlitePool, run_id: i64) -> ChatLakeResult<Option<InferenceRun>> {
    let run = sqlx::query_as("SELECT * FROM inference_runs WHERE id = ?")
        .bind(run_id)
        .fetch_optional(pool)
        .await?;
    Ok(run)
}

pub async fn list_recent(
    pool: &SqlitePool,
    run_type: Option<RunType>,
    limit: i64,
) -> ChatLakeResult<Vec<InferenceRun>> {
    let runs = match run_type {
        Some(rt) => {
            sqlx::query_as(
                "SELECT * FROM inference_runs WHERE run_type = ? ORDER BY started_at DESC LIMIT ?",
            )
            .bind(rt.as_str())
            .bind(limit)
            .fetch_all(pool)
            .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM inference_runs ORDER BY started_at DESC LIMIT ?")
                .bind(limit)
                .fetch_all(pool)
                .await?
        }
    };
    Ok(runs)
}
