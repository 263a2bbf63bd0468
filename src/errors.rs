use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// Per-item failures (a malformed conversation, a conflicting upsert) are
/// aggregated by callers into a pipeline's `errors` list rather than
/// propagated through this type; `ChatLakeError` is for conditions that
/// abort the run or the operation that raised them.
#[derive(Debug, Error)]
pub enum ChatLakeError {
    /// The outer artifact could not be parsed at all.
    #[error("input malformed: {0}")]
    InputMalformed(String),

    /// An individual conversation violated structural expectations.
    #[error("conversation skipped: {0}")]
    ConversationSkipped(String),

    /// A unique-index violation on an idempotent upsert; callers generally
    /// treat this as success rather than letting it surface.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Out of memory during matrix ops, or too few points for a reduction
    /// that has no documented fallback left to try.
    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Cooperative cancellation observed at a checked suspension point.
    #[error("cancelled")]
    Cancelled,

    /// Anything else unexpected.
    #[error("internal error: {0}")]
    Internal(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl From<anyhow::Error> for ChatLakeError {
    fn from(err: anyhow::Error) -> Self {
        ChatLakeError::Internal(err.to_string())
    }
}

/// Result type alias using `ChatLakeError`.
pub type ChatLakeResult<T> = Result<T, ChatLakeError>;
