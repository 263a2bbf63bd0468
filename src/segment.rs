//! Splits each conversation into bounded segments for downstream
//! embedding, similarity and topic modeling.
//!
//! Conversation chunking has no direct precedent elsewhere in this crate's
//! lineage; this reuses the existing `Message` shape and the content
//! hashing from [`crate::hashing`].

use crate::config::SegmentConfig;
use crate::errors::ChatLakeResult;
use crate::hashing::content_hash;
use crate::models::{Message, RunSummary, RunStatus};
use chrono::Duration as ChronoDuration;
use sqlx::SqlitePool;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// One boundary-respecting chunk of a conversation, not yet persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentDraft {
    pub segment_index: usize,
    pub start_message_index: usize,
    pub end_message_index: usize,
    pub content_text: String,
}

/// Splits `messages` (already ordered by `sequence_index`) into segments
/// no longer than `max_messages_per_segment` messages or
/// `max_chars_per_segment` characters, and starts a new segment whenever
/// the gap between two consecutive timestamped messages exceeds
/// `gap_seconds`.
pub fn segment_messages(messages: &[Message], config: &SegmentConfig) -> Vec<SegmentDraft> {
    let mut drafts = Vec::new();
    if messages.is_empty() {
        return drafts;
    }

    let gap = ChronoDuration::seconds(config.gap_seconds);
    let mut current_start = 0usize;
    let mut current_text = String::new();
    let mut current_count = 0usize;

    let flush = |drafts: &mut Vec<SegmentDraft>, start: usize, end: usize, text: String| {
        if end >= start {
            drafts.push(SegmentDraft {
                segment_index: drafts.len(),
                start_message_index: start,
                end_message_index: end,
                content_text: text,
            });
        }
    };

    for (i, msg) in messages.iter().enumerate() {
        let would_exceed_count = current_count >= config.max_messages_per_segment;
        let would_exceed_chars = !current_text.is_empty()
            && current_text.len() + msg.content.len() + 1 > config.max_chars_per_segment;
        let gap_exceeded = i > 0
            && messages[i - 1].timestamp.is_some()
            && msg.timestamp.is_some()
            && (msg.timestamp.unwrap() - messages[i - 1].timestamp.unwrap()) > gap;

        if i > current_start && (would_exceed_count || would_exceed_chars || gap_exceeded) {
            flush(&mut drafts, current_start, i - 1, std::mem::take(&mut current_text));
            current_start = i;
            current_count = 0;
        }

        if !current_text.is_empty() {
            current_text.push('\n');
        }
        current_text.push_str(&format!("{}: {}", msg.role, msg.content));
        current_count += 1;
    }

    flush(&mut drafts, current_start, messages.len() - 1, current_text);
    drafts
}

/// Segments every conversation that has no segments yet.
pub async fn execute(
    pool: &SqlitePool,
    config: &SegmentConfig,
    cancel: &CancellationToken,
) -> ChatLakeResult<RunSummary> {
    let start = Instant::now();
    let conversation_ids: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT c.id FROM conversations c
        WHERE NOT EXISTS (SELECT 1 FROM conversation_segments s WHERE s.conversation_id = c.id)
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut written = 0usize;
    let mut errors = Vec::new();

    for conversation_id in &conversation_ids {
        if cancel.is_cancelled() {
            break;
        }

        let messages: Vec<Message> = sqlx::query_as(
            "SELECT * FROM messages WHERE conversation_id = ? ORDER BY sequence_index ASC",
        )
        .bind(conversation_id)
        .fetch_all(pool)
        .await?;

        let drafts = segment_messages(&messages, config);
        for draft in &drafts {
            let hash = content_hash(&draft.content_text);
            let result = sqlx::query(
                r#"
                INSERT INTO conversation_segments
                    (conversation_id, segment_index, start_message_index, end_message_index, message_count, content_text, content_hash)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(conversation_id)
            .bind(draft.segment_index as i64)
            .bind(draft.start_message_index as i64)
            .bind(draft.end_message_index as i64)
            .bind((draft.end_message_index - draft.start_message_index + 1) as i64)
            .bind(&draft.content_text)
            .bind(hash.to_vec())
            .execute(pool)
            .await;

            match result {
                Ok(_) => written += 1,
                Err(e) => errors.push(format!("conversation {conversation_id}: {e}")),
            }
        }
    }

    info!("segmented {} conversations into {} segments", conversation_ids.len(), written);

    Ok(RunSummary {
        run_id: 0,
        status: RunStatus::Completed,
        items_processed: conversation_ids.len(),
        items_written: written,
        errors,
        elapsed_ms: start.elapsed().as_millis() as u64,
        umap_dimensions: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn msg(role: &str, content: &str, ts: Option<i64>) -> Message {
        Message {
            id: 0,
            conversation_id: 0,
            role: role.to_string(),
            sequence_index: 0,
            content: content.to_string(),
            content_hash: vec![],
            timestamp: ts.map(|t| Utc.timestamp_opt(t, 0).unwrap()),
            source_artifact_id: None,
        }
    }

    #[test]
    fn splits_on_message_count_cap() {
        let config = SegmentConfig {
            max_messages_per_segment: 2,
            max_chars_per_segment: 100_000,
            gap_seconds: 3600,
        };
        let messages = vec![
            msg("user", "a", None),
            msg("assistant", "b", None),
            msg("user", "c", None),
        ];
        let segments = segment_messages(&messages, &config);
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].end_message_index, 1);
        assert_eq!(segments[1].start_message_index, 2);
    }

    #[test]
    fn splits_on_timestamp_gap() {
        let config = SegmentConfig {
            max_messages_per_segment: 100,
            max_chars_per_segment: 100_000,
            gap_seconds: 60,
        };
        let messages = vec![
            msg("user", "a", Some(0)),
            msg("assistant", "b", Some(30)),
            msg("user", "c", Some(10_000)),
        ];
        let segments = segment_messages(&messages, &config);
        assert_eq!(segments.len(), 2);
    }

    #[test]
    fn every_message_belongs_to_exactly_one_segment() {
        let config = SegmentConfig {
            max_messages_per_segment: 2,
            max_chars_per_segment: 20,
            gap_seconds: 3600,
        };
        let messages = vec![
            msg("user", "hello there", None),
            msg("assistant", "hi", None),
            msg("user", "how are you doing today", None),
            msg("assistant", "good", None),
        ];
        let segments = segment_messages(&messages, &config);
        let covered: usize = segments.iter().map(|s| s.end_message_index - s.start_message_index + 1).sum();
        assert_eq!(covered, messages.len());
    }
}
