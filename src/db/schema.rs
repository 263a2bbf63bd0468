//! SQLite schema for the full data model, laid out as two constants
//! (tables, indexes) — no FTS5 virtual table, since there is no
//! free-text search surface here.

pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS import_batches (
    id INTEGER PRIMARY KEY,
    source_system TEXT NOT NULL,
    source_version TEXT,
    status TEXT NOT NULL DEFAULT 'running',
    conversations_imported INTEGER NOT NULL DEFAULT 0,
    conversations_failed INTEGER NOT NULL DEFAULT 0,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    completed_at TIMESTAMP
);

CREATE TABLE IF NOT EXISTS raw_artifacts (
    id INTEGER PRIMARY KEY,
    import_batch_id INTEGER NOT NULL,
    artifact_type TEXT NOT NULL,
    name TEXT NOT NULL,
    content_type TEXT,
    sha256 BLOB NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY(import_batch_id) REFERENCES import_batches(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS conversations (
    id INTEGER PRIMARY KEY,
    conversation_key BLOB NOT NULL UNIQUE,
    source_system TEXT NOT NULL,
    external_id TEXT,
    title TEXT,
    first_message_at TIMESTAMP,
    last_message_at TIMESTAMP,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY,
    conversation_id INTEGER NOT NULL,
    role TEXT NOT NULL,
    sequence_index INTEGER NOT NULL,
    content TEXT NOT NULL,
    content_hash BLOB NOT NULL,
    timestamp TIMESTAMP,
    source_artifact_id INTEGER,
    FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY(source_artifact_id) REFERENCES raw_artifacts(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS conversation_artifact_map (
    id INTEGER PRIMARY KEY,
    conversation_id INTEGER NOT NULL,
    raw_artifact_id INTEGER NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY(raw_artifact_id) REFERENCES raw_artifacts(id) ON DELETE CASCADE,
    UNIQUE(conversation_id, raw_artifact_id)
);

CREATE TABLE IF NOT EXISTS parsing_failures (
    id INTEGER PRIMARY KEY,
    import_batch_id INTEGER NOT NULL,
    raw_artifact_id INTEGER,
    external_id TEXT,
    reason TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY(import_batch_id) REFERENCES import_batches(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS conversation_segments (
    id INTEGER PRIMARY KEY,
    conversation_id INTEGER NOT NULL,
    segment_index INTEGER NOT NULL,
    start_message_index INTEGER NOT NULL,
    end_message_index INTEGER NOT NULL,
    message_count INTEGER NOT NULL,
    content_text TEXT NOT NULL,
    content_hash BLOB NOT NULL,
    inference_run_id INTEGER,
    FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    UNIQUE(conversation_id, segment_index)
);

CREATE TABLE IF NOT EXISTS segment_embeddings (
    id INTEGER PRIMARY KEY,
    segment_id INTEGER NOT NULL,
    model TEXT NOT NULL,
    dimensions INTEGER NOT NULL,
    vector BLOB NOT NULL,
    source_content_hash BLOB NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY(segment_id) REFERENCES conversation_segments(id) ON DELETE CASCADE,
    UNIQUE(segment_id, model)
);

CREATE TABLE IF NOT EXISTS inference_runs (
    id INTEGER PRIMARY KEY,
    run_type TEXT NOT NULL,
    model_name TEXT NOT NULL,
    model_version TEXT NOT NULL,
    feature_config_hash BLOB NOT NULL,
    input_scope TEXT NOT NULL,
    input_description TEXT,
    status TEXT NOT NULL DEFAULT 'running',
    metrics_json TEXT,
    started_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    completed_at TIMESTAMP
);

CREATE TABLE IF NOT EXISTS projects (
    id INTEGER PRIMARY KEY,
    project_key TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS project_suggestions (
    id INTEGER PRIMARY KEY,
    inference_run_id INTEGER NOT NULL,
    suggested_project_key TEXT NOT NULL,
    suggested_name TEXT NOT NULL,
    summary TEXT,
    confidence NUMERIC NOT NULL,
    status TEXT NOT NULL DEFAULT 'pending',
    segment_ids_json TEXT NOT NULL,
    conversation_ids_json TEXT NOT NULL,
    unique_conversation_count INTEGER NOT NULL,
    resolved_project_id INTEGER,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY(inference_run_id) REFERENCES inference_runs(id) ON DELETE CASCADE,
    FOREIGN KEY(resolved_project_id) REFERENCES projects(id) ON DELETE SET NULL
);

CREATE TABLE IF NOT EXISTS topics (
    id INTEGER PRIMARY KEY,
    inference_run_id INTEGER NOT NULL,
    topic_index INTEGER NOT NULL,
    label TEXT NOT NULL,
    keywords_json TEXT NOT NULL,
    FOREIGN KEY(inference_run_id) REFERENCES inference_runs(id) ON DELETE CASCADE,
    UNIQUE(inference_run_id, topic_index)
);

CREATE TABLE IF NOT EXISTS conversation_topics (
    id INTEGER PRIMARY KEY,
    inference_run_id INTEGER NOT NULL,
    conversation_id INTEGER NOT NULL,
    topic_id INTEGER NOT NULL,
    score NUMERIC NOT NULL,
    FOREIGN KEY(inference_run_id) REFERENCES inference_runs(id) ON DELETE CASCADE,
    FOREIGN KEY(conversation_id) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY(topic_id) REFERENCES topics(id) ON DELETE CASCADE,
    UNIQUE(inference_run_id, conversation_id, topic_id)
);

CREATE TABLE IF NOT EXISTS conversation_similarities (
    id INTEGER PRIMARY KEY,
    inference_run_id INTEGER NOT NULL,
    conversation_id_a INTEGER NOT NULL,
    conversation_id_b INTEGER NOT NULL,
    score NUMERIC NOT NULL,
    method TEXT NOT NULL,
    FOREIGN KEY(inference_run_id) REFERENCES inference_runs(id) ON DELETE CASCADE,
    FOREIGN KEY(conversation_id_a) REFERENCES conversations(id) ON DELETE CASCADE,
    FOREIGN KEY(conversation_id_b) REFERENCES conversations(id) ON DELETE CASCADE,
    UNIQUE(inference_run_id, conversation_id_a, conversation_id_b),
    CHECK(conversation_id_a < conversation_id_b)
);

CREATE TABLE IF NOT EXISTS project_drift_metrics (
    id INTEGER PRIMARY KEY,
    inference_run_id INTEGER NOT NULL,
    project_id INTEGER NOT NULL,
    window_start TIMESTAMP NOT NULL,
    window_end TIMESTAMP NOT NULL,
    drift_score NUMERIC NOT NULL,
    details_json TEXT NOT NULL,
    FOREIGN KEY(inference_run_id) REFERENCES inference_runs(id) ON DELETE CASCADE,
    FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE CASCADE
);

CREATE TABLE IF NOT EXISTS user_overrides (
    id INTEGER PRIMARY KEY,
    event_type TEXT NOT NULL,
    project_suggestion_id INTEGER,
    project_id INTEGER,
    segment_fingerprint BLOB,
    details_json TEXT,
    created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY(project_suggestion_id) REFERENCES project_suggestions(id) ON DELETE SET NULL,
    FOREIGN KEY(project_id) REFERENCES projects(id) ON DELETE SET NULL
);
"#;

/// Indexes supporting the access patterns each pipeline actually runs:
/// dedup lookups by key, per-run fan-out queries, and ledger listing.
pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_conversations_source_system
ON conversations(source_system);

CREATE INDEX IF NOT EXISTS idx_conversations_last_message_at
ON conversations(last_message_at);

CREATE INDEX IF NOT EXISTS idx_messages_conversation_id
ON messages(conversation_id);

CREATE INDEX IF NOT EXISTS idx_messages_content_hash
ON messages(content_hash);

CREATE INDEX IF NOT EXISTS idx_conversation_segments_conversation_id
ON conversation_segments(conversation_id);

CREATE INDEX IF NOT EXISTS idx_segment_embeddings_segment_id
ON segment_embeddings(segment_id);

CREATE INDEX IF NOT EXISTS idx_inference_runs_run_type
ON inference_runs(run_type, started_at DESC);

CREATE INDEX IF NOT EXISTS idx_project_suggestions_run
ON project_suggestions(inference_run_id);

CREATE INDEX IF NOT EXISTS idx_project_suggestions_status
ON project_suggestions(status);

CREATE INDEX IF NOT EXISTS idx_conversation_topics_run
ON conversation_topics(inference_run_id, conversation_id);

CREATE INDEX IF NOT EXISTS idx_conversation_similarities_run
ON conversation_similarities(inference_run_id, conversation_id_a);

CREATE INDEX IF NOT EXISTS idx_project_drift_metrics_project
ON project_drift_metrics(project_id, window_start);

CREATE INDEX IF NOT EXISTS idx_user_overrides_suggestion
ON user_overrides(project_suggestion_id);
"#;
