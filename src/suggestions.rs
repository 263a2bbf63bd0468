//! Turns one cluster of segments into a human-reviewable
//! `ProjectSuggestion`. Suppression of previously-rejected groupings is
//! driven by `user_overrides`, an append-only log in the same shape as
//! this crate's other audit tables.

use crate::cluster::ClusterSegment;
use crate::decimal::Amount;
use crate::errors::ChatLakeResult;
use crate::hashing::sha256;
use crate::text::tokenize;
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};

/// Builds and persists one `ProjectSuggestion` from a cluster's member
/// segments, unless an earlier rejection already covers this exact
/// grouping. `confidence` is the cluster confidence computed by the
/// clusterer (HDBSCAN: `1 - avg(outlier_score)`; KMeans:
/// `1 - avg(min_distance)/10`), clamped to `[0,1]` and rounded to 4 decimals
/// here to match the `(5,4)` column precision. Returns 1 if a suggestion was
/// written, 0 if suppressed.
pub async fn write_from_cluster(
    pool: &SqlitePool,
    inference_run_id: i64,
    members: &[&ClusterSegment],
    confidence: f64,
) -> ChatLakeResult<usize> {
    if members.is_empty() {
        return Ok(0);
    }

    let mut segment_ids: Vec<i64> = members.iter().map(|s| s.segment_id).collect();
    segment_ids.sort_unstable();

    let conversation_ids: HashSet<i64> = members.iter().map(|s| s.conversation_id).collect();
    let mut conversation_ids: Vec<i64> = conversation_ids.into_iter().collect();
    conversation_ids.sort_unstable();

    let fingerprint = fingerprint_of(&segment_ids);

    if is_suppressed(pool, &fingerprint).await? {
        return Ok(0);
    }

    let name = suggest_name(members);
    let key = suggest_key(&name, &fingerprint);
    let confidence = rounded_confidence(confidence);

    sqlx::query(
        r#"
        INSERT INTO project_suggestions
            (inference_run_id, suggested_project_key, suggested_name, summary, confidence,
             status, segment_ids_json, conversation_ids_json, unique_conversation_count)
        VALUES (?, ?, ?, ?, ?, 'pending', ?, ?, ?)
        "#,
    )
    .bind(inference_run_id)
    .bind(&key)
    .bind(&name)
    .bind(Option::<String>::None)
    .bind(confidence)
    .bind(serde_json::to_string(&segment_ids).unwrap_or_default())
    .bind(serde_json::to_string(&conversation_ids).unwrap_or_default())
    .bind(conversation_ids.len() as i64)
    .execute(pool)
    .await?;

    Ok(1)
}

/// Records a user decision on a suggestion as an append-only event. A
/// `reject` event's `segment_fingerprint` suppresses future suggestions
/// that cluster the exact same segment set back together.
pub async fn record_override(
    pool: &SqlitePool,
    event_type: &str,
    project_suggestion_id: Option<i64>,
    project_id: Option<i64>,
    segment_fingerprint: Option<&[u8]>,
) -> ChatLakeResult<()> {
    sqlx::query(
        r#"
        INSERT INTO user_overrides (event_type, project_suggestion_id, project_id, segment_fingerprint)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(event_type)
    .bind(project_suggestion_id)
    .bind(project_id)
    .bind(segment_fingerprint.map(|f| f.to_vec()))
    .execute(pool)
    .await?;
    Ok(())
}

async fn is_suppressed(pool: &SqlitePool, fingerprint: &[u8]) -> ChatLakeResult<bool> {
    let row: Option<i64> = sqlx::query_scalar(
        "SELECT 1 FROM user_overrides WHERE event_type = 'reject' AND segment_fingerprint = ? LIMIT 1",
    )
    .bind(fingerprint)
    .fetch_optional(pool)
    .await?;
    Ok(row.is_some())
}

fn fingerprint_of(sorted_segment_ids: &[i64]) -> Vec<u8> {
    let joined = sorted_segment_ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    sha256(joined.as_bytes()).to_vec()
}

/// Names a cluster after its most frequent non-stop-word tokens.
fn suggest_name(members: &[&ClusterSegment]) -> String {
    let mut freq: HashMap<String, usize> = HashMap::new();
    for seg in members {
        for token in tokenize(&seg.content_text) {
            *freq.entry(token).or_insert(0) += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    let top: Vec<String> = ranked.into_iter().take(3).map(|(w, _)| w).collect();
    if top.is_empty() {
        "Untitled project".to_string()
    } else {
        top.iter()
            .map(|w| {
                let mut chars = w.chars();
                match chars.next() {
                    Some(c) => c.to_uppercase().collect::<String>() + chars.as_str(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

fn suggest_key(name: &str, fingerprint: &[u8]) -> String {
    let base = slug::slugify(name);
    let suffix = hex::encode(&fingerprint[0..4]);
    format!("{base}-{suffix}")
}

/// Clamps to `[0,1]` and rounds to 4 decimal places, matching the `(5,4)`
/// fixed-precision convention the confidence column uses.
fn rounded_confidence(raw: f64) -> Amount {
    let scaled = (raw.clamp(0.0, 1.0) * 10_000.0).round() / 10_000.0;
    Amount::from(Decimal::from_f64_retain(scaled).unwrap_or(Decimal::ZERO))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggest_name_picks_frequent_tokens() {
        let segments = [
            ClusterSegment { segment_id: 1, conversation_id: 1, content_text: "rust rust async tokio".into(), content_hash: vec![] },
            ClusterSegment { segment_id: 2, conversation_id: 2, content_text: "rust tokio runtime".into(), content_hash: vec![] },
        ];
        let refs: Vec<&ClusterSegment> = segments.iter().collect();
        let name = suggest_name(&refs);
        assert!(name.to_lowercase().contains("rust"));
    }

    #[test]
    fn rounded_confidence_clamps_and_rounds() {
        assert_eq!(rounded_confidence(-0.5).into_inner(), Decimal::from_f64_retain(0.0).unwrap());
        assert_eq!(rounded_confidence(1.5).into_inner(), Decimal::from_f64_retain(1.0).unwrap());
        assert_eq!(rounded_confidence(0.123_456).into_inner(), Decimal::from_f64_retain(0.1235).unwrap());
    }

    #[test]
    fn fingerprint_is_order_independent_after_sorting() {
        let a = fingerprint_of(&[3, 1, 2]);
        let b = fingerprint_of(&[1, 2, 3]);
        assert_eq!(a, b);
    }
}
