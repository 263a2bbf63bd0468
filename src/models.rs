//! Core domain models. These mirror the SQLite schema in `db::schema`
//! column for column.

use crate::decimal::Amount;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Lifecycle status shared by `ImportBatch` and `InferenceRun`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "completed" => RunStatus::Completed,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Running,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ImportBatch {
    pub id: i64,
    pub source_system: String,
    pub source_version: Option<String>,
    pub status: String,
    pub conversations_imported: i64,
    pub conversations_failed: i64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct RawArtifact {
    pub id: i64,
    pub import_batch_id: i64,
    pub artifact_type: String,
    pub name: String,
    pub content_type: Option<String>,
    pub sha256: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// A single role in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
            Role::Tool => "tool",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            "system" => Some(Role::System),
            "tool" => Some(Role::Tool),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Conversation {
    pub id: i64,
    /// SHA-256 over (role, content-hash) pairs — the structural dedup key.
    pub conversation_key: Vec<u8>,
    pub source_system: String,
    pub external_id: Option<String>,
    pub title: Option<String>,
    pub first_message_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Message {
    pub id: i64,
    pub conversation_id: i64,
    pub role: String,
    pub sequence_index: i64,
    pub content: String,
    pub content_hash: Vec<u8>,
    pub timestamp: Option<DateTime<Utc>>,
    pub source_artifact_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConversationArtifactMap {
    pub id: i64,
    pub conversation_id: i64,
    pub raw_artifact_id: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ParsingFailure {
    pub id: i64,
    pub import_batch_id: i64,
    pub raw_artifact_id: Option<i64>,
    pub external_id: Option<String>,
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConversationSegment {
    pub id: i64,
    pub conversation_id: i64,
    pub segment_index: i64,
    pub start_message_index: i64,
    pub end_message_index: i64,
    pub message_count: i64,
    pub content_text: String,
    pub content_hash: Vec<u8>,
    pub inference_run_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SegmentEmbedding {
    pub id: i64,
    pub segment_id: i64,
    pub model: String,
    pub dimensions: i64,
    pub vector: Vec<u8>,
    pub source_content_hash: Vec<u8>,
    pub created_at: DateTime<Utc>,
}

/// What kind of analytical pass an `InferenceRun` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunType {
    Clustering,
    Topics,
    Embeddings,
    Similarity,
    Drift,
    BlogTopics,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Clustering => "clustering",
            RunType::Topics => "topics",
            RunType::Embeddings => "embeddings",
            RunType::Similarity => "similarity",
            RunType::Drift => "drift",
            RunType::BlogTopics => "blog_topics",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "clustering" => RunType::Clustering,
            "topics" => RunType::Topics,
            "embeddings" => RunType::Embeddings,
            "similarity" => RunType::Similarity,
            "drift" => RunType::Drift,
            "blog_topics" => RunType::BlogTopics,
            _ => return None,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct InferenceRun {
    pub id: i64,
    pub run_type: String,
    pub model_name: String,
    pub model_version: String,
    pub feature_config_hash: Vec<u8>,
    pub input_scope: String,
    pub input_description: Option<String>,
    pub status: String,
    pub metrics_json: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionStatus {
    Pending,
    Accepted,
    Rejected,
    Merged,
}

impl SuggestionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionStatus::Pending => "pending",
            SuggestionStatus::Accepted => "accepted",
            SuggestionStatus::Rejected => "rejected",
            SuggestionStatus::Merged => "merged",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProjectSuggestion {
    pub id: i64,
    pub inference_run_id: i64,
    pub suggested_project_key: String,
    pub suggested_name: String,
    pub summary: Option<String>,
    pub confidence: Amount,
    pub status: String,
    pub segment_ids_json: String,
    pub conversation_ids_json: String,
    pub unique_conversation_count: i64,
    pub resolved_project_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Project {
    pub id: i64,
    pub project_key: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Topic {
    pub id: i64,
    pub inference_run_id: i64,
    pub topic_index: i64,
    pub label: String,
    pub keywords_json: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConversationTopic {
    pub id: i64,
    pub inference_run_id: i64,
    pub conversation_id: i64,
    pub topic_id: i64,
    pub score: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConversationSimilarity {
    pub id: i64,
    pub inference_run_id: i64,
    pub conversation_id_a: i64,
    pub conversation_id_b: i64,
    pub score: Amount,
    pub method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ProjectDriftMetric {
    pub id: i64,
    pub inference_run_id: i64,
    pub project_id: i64,
    pub window_start: DateTime<Utc>,
    pub window_end: DateTime<Utc>,
    pub drift_score: Amount,
    pub details_json: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserOverride {
    pub id: i64,
    pub event_type: String,
    pub project_suggestion_id: Option<i64>,
    pub project_id: Option<i64>,
    pub segment_fingerprint: Option<Vec<u8>>,
    pub details_json: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate counters produced while walking one ChatGPT export, extended
/// with the artifact-map/parsing-failure bookkeeping the dedup model
/// needs.
#[derive(Debug, Default, Clone, Serialize)]
pub struct ImportStats {
    pub conversations_new: usize,
    pub conversations_remapped: usize,
    pub messages: usize,
    pub parsing_failures: usize,
}

/// A parsed, not-yet-persisted conversation.
#[derive(Debug, Clone)]
pub struct ParsedConversation {
    pub source_system: String,
    pub external_id: String,
    pub messages: Vec<ParsedMessage>,
}

#[derive(Debug, Clone)]
pub struct ParsedMessage {
    pub role: String,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Common summary returned by every pipeline's `execute()` entry point.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: i64,
    pub status: RunStatus,
    pub items_processed: usize,
    pub items_written: usize,
    pub errors: Vec<String>,
    pub elapsed_ms: u64,
    /// Dimensionality the clustering pipeline actually reduced to; `0` for
    /// every non-clustering pipeline and for a clustering run that skipped
    /// UMAP because the segment count was below `umap_neighbors`.
    pub umap_dimensions: usize,
}
