//! Import batch lifecycle: reads one export file, dedups conversations by
//! `ConversationKey`, and records everything that didn't parse.
//!
//! One transaction per batch, with a start/complete/fail event pair
//! bracketing it, adapted from `(provider, external_id)` identity to
//! structural `ConversationKey` identity, and extended with the
//! artifact-map/parsing-failure bookkeeping the dedup model requires.

use crate::errors::{ChatLakeError, ChatLakeResult};
use crate::hashing::{self, conversation_key, content_hash};
use crate::ingest::parser;
use crate::models::{ImportStats, ParsedConversation};
use sqlx::SqlitePool;
use std::path::Path;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub async fn import_file(
    pool: &SqlitePool,
    path: &Path,
    cancel: &CancellationToken,
) -> ChatLakeResult<ImportStats> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ChatLakeError::InputMalformed(format!("cannot read {}: {e}", path.display())))?;

    let file_hash = hashing::sha256(&bytes);
    let batch_id = start_import_batch(pool, "chatgpt").await?;
    let artifact_id = insert_raw_artifact(pool, batch_id, path, &file_hash).await?;

    let mut stats = ImportStats::default();

    let conversations = match parser::read_export(bytes.as_slice()) {
        Ok(iter) => iter,
        Err(e) => {
            record_parsing_failure(pool, batch_id, None, None, &e.to_string()).await?;
            fail_import_batch(pool, batch_id, &stats).await?;
            return Err(e);
        }
    };

    for item in conversations {
        if cancel.is_cancelled() {
            warn!("import cancelled after {} conversations", stats.conversations_new + stats.conversations_remapped);
            break;
        }

        match item {
            Ok(conv) => match import_one_conversation(pool, artifact_id, conv).await {
                Ok(true) => stats.conversations_new += 1,
                Ok(false) => stats.conversations_remapped += 1,
                Err(e) => {
                    record_parsing_failure(pool, batch_id, Some(artifact_id), None, &e.to_string())
                        .await?;
                    stats.parsing_failures += 1;
                }
            },
            Err((external_id, reason)) => {
                record_parsing_failure(pool, batch_id, Some(artifact_id), external_id.as_deref(), &reason)
                    .await?;
                stats.parsing_failures += 1;
            }
        }
    }

    complete_import_batch(pool, batch_id, &stats).await?;
    info!(
        "import batch {} complete: {} new, {} remapped, {} failures",
        batch_id, stats.conversations_new, stats.conversations_remapped, stats.parsing_failures
    );

    Ok(stats)
}

/// Inserts (or links) one conversation and its messages in a single
/// transaction. Returns `true` if this was a genuinely new conversation,
/// `false` if the key already existed and we only linked a new artifact.
async fn import_one_conversation(
    pool: &SqlitePool,
    artifact_id: i64,
    conv: ParsedConversation,
) -> ChatLakeResult<bool> {
    let hashed: Vec<(&str, [u8; 32])> = conv
        .messages
        .iter()
        .map(|m| (m.role.as_str(), content_hash(&m.content)))
        .collect();
    let key = conversation_key(hashed.iter().map(|(r, h)| (*r, *h)));

    let mut tx = pool.begin().await?;

    let existing: Option<i64> = sqlx::query_scalar(
        "SELECT id FROM conversations WHERE conversation_key = ?",
    )
    .bind(key.to_vec())
    .fetch_optional(&mut *tx)
    .await?;

    let (conversation_id, is_new) = if let Some(id) = existing {
        (id, false)
    } else {
        let first_ts = conv.messages.iter().find_map(|m| m.timestamp);
        let last_ts = conv.messages.iter().rev().find_map(|m| m.timestamp);

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO conversations
                (conversation_key, source_system, external_id, title, first_message_at, last_message_at)
            VALUES (?, ?, ?, ?, ?, ?)
            RETURNING id
            "#,
        )
        .bind(key.to_vec())
        .bind(&conv.source_system)
        .bind(&conv.external_id)
        .bind(Option::<String>::None)
        .bind(first_ts)
        .bind(last_ts)
        .fetch_one(&mut *tx)
        .await?;

        for (idx, msg) in conv.messages.iter().enumerate() {
            let hash = content_hash(&msg.content);
            sqlx::query(
                r#"
                INSERT INTO messages
                    (conversation_id, role, sequence_index, content, content_hash, timestamp, source_artifact_id)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(id)
            .bind(&msg.role)
            .bind(idx as i64)
            .bind(&msg.content)
            .bind(hash.to_vec())
            .bind(msg.timestamp)
            .bind(artifact_id)
            .execute(&mut *tx)
            .await?;
        }

        (id, true)
    };

    sqlx::query(
        r#"
        INSERT INTO conversation_artifact_map (conversation_id, raw_artifact_id)
        VALUES (?, ?)
        ON CONFLICT(conversation_id, raw_artifact_id) DO NOTHING
        "#,
    )
    .bind(conversation_id)
    .bind(artifact_id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(is_new)
}

async fn start_import_batch(pool: &SqlitePool, source_system: &str) -> ChatLakeResult<i64> {
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO import_batches (source_system, status) VALUES (?, 'running') RETURNING id",
    )
    .bind(source_system)
    .fetch_one(pool)
    .await?;
    Ok(id)
}

async fn complete_import_batch(pool: &SqlitePool, batch_id: i64, stats: &ImportStats) -> ChatLakeResult<()> {
    sqlx::query(
        r#"
        UPDATE import_batches
        SET status = 'completed',
            conversations_imported = ?,
            conversations_failed = ?,
            completed_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind((stats.conversations_new + stats.conversations_remapped) as i64)
    .bind(stats.parsing_failures as i64)
    .bind(batch_id)
    .execute(pool)
    .await?;
    Ok(())
}

async fn fail_import_batch(pool: &SqlitePool, batch_id: i64, stats: &ImportStats) -> ChatLakeResult<()> {
    sqlx::query(
        r#"
        UPDATE import_batches
        SET status = 'failed', conversations_failed = ?, completed_at = CURRENT_TIMESTAMP
        WHERE id = ?
        "#,
    )
    .bind(stats.parsing_failures as i64)
    .bind(batch_id)
    .execute(pool)
    .await?;
    Ok(())
}

async fn insert_raw_artifact(
    pool: &SqlitePool,
    batch_id: i64,
    path: &Path,
    sha256: &[u8; 32],
) -> ChatLakeResult<i64> {
    let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO raw_artifacts (import_batch_id, artifact_type, name, content_type, sha256)
        VALUES (?, 'export_file', ?, 'application/json', ?)
        RETURNING id
        "#,
    )
    .bind(batch_id)
    .bind(name)
    .bind(sha256.to_vec())
    .fetch_one(pool)
    .await?;
    Ok(id)
}

async fn record_parsing_failure(
    pool: &SqlitePool,
    batch_id: i64,
    artifact_id: Option<i64>,
    external_id: Option<&str>,
    reason: &str,
) -> ChatLakeResult<()> {
    sqlx::query(
        r#"
        INSERT INTO parsing_failures (import_batch_id, raw_artifact_id, external_id, reason)
        VALUES (?, ?, ?, ?)
        "#,
    )
    .bind(batch_id)
    .bind(artifact_id)
    .bind(external_id)
    .bind(reason)
    .execute(pool)
    .await?;
    Ok(())
}
