//! Segment embedding cache.
//!
//! A keyed store with a content-hash invalidation rule rather than TTL
//! expiry: a cached vector is valid exactly as long as
//! `source_content_hash` matches the segment's current `content_hash`.
//! Embedding itself is a deterministic, local hashing-trick projection
//! rather than a network call — on-demand LLM embedding is an external
//! concern this crate doesn't take on.

use crate::errors::ChatLakeResult;
use crate::hashing::content_hash;
use crate::models::SegmentEmbedding;
use sqlx::SqlitePool;

pub const DEFAULT_MODEL: &str = "hashing-trick-v1";
pub const DEFAULT_DIMENSIONS: usize = 256;

/// A pluggable embedding backend. `get_or_compute` is written against this
/// trait rather than a concrete function so a caller can swap in a network
/// or on-demand LLM-backed model (an external collaborator, §1) without
/// touching the cache logic; `HashingTrickModel` is the only implementation
/// this crate ships.
pub trait EmbeddingModel {
    fn name(&self) -> &str;
    fn dimensions(&self) -> usize;
    fn embed(&self, content: &str) -> Vec<f32>;
}

pub struct HashingTrickModel {
    dimensions: usize,
}

impl Default for HashingTrickModel {
    fn default() -> Self {
        HashingTrickModel { dimensions: DEFAULT_DIMENSIONS }
    }
}

impl EmbeddingModel for HashingTrickModel {
    fn name(&self) -> &str {
        DEFAULT_MODEL
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, content: &str) -> Vec<f32> {
        compute_embedding(content, self.dimensions)
    }
}

/// Returns the cached embedding for `segment_id` under `model` if its
/// `source_content_hash` still matches `content`, recomputing and
/// overwriting it otherwise.
pub async fn get_or_compute(
    pool: &SqlitePool,
    segment_id: i64,
    model: &str,
    content: &str,
) -> ChatLakeResult<Vec<f32>> {
    let hash = content_hash(content);

    let cached: Option<SegmentEmbedding> = sqlx::query_as(
        "SELECT * FROM segment_embeddings WHERE segment_id = ? AND model = ?",
    )
    .bind(segment_id)
    .bind(model)
    .fetch_optional(pool)
    .await?;

    if let Some(existing) = cached {
        if existing.source_content_hash == hash.to_vec() {
            return Ok(decode_vector(&existing.vector));
        }
    }

    let vector = compute_embedding(content, DEFAULT_DIMENSIONS);
    let encoded = encode_vector(&vector);

    sqlx::query(
        r#"
        INSERT INTO segment_embeddings (segment_id, model, dimensions, vector, source_content_hash)
        VALUES (?, ?, ?, ?, ?)
        ON CONFLICT(segment_id, model) DO UPDATE SET
            dimensions = excluded.dimensions,
            vector = excluded.vector,
            source_content_hash = excluded.source_content_hash
        "#,
    )
    .bind(segment_id)
    .bind(model)
    .bind(vector.len() as i64)
    .bind(&encoded)
    .bind(hash.to_vec())
    .execute(pool)
    .await?;

    Ok(vector)
}

/// Deterministic hashing-trick projection: tokens are hashed into
/// `dims` buckets and accumulated, then L2-normalized. Stable across runs
/// for identical content, which is all the cache invalidation rule and
/// the downstream similarity/clustering math require.
pub fn compute_embedding(content: &str, dims: usize) -> Vec<f32> {
    let mut vector = vec![0f32; dims];
    for token in crate::text::tokenize(content) {
        let hash = content_hash(&token);
        let bucket = (u32::from_le_bytes([hash[0], hash[1], hash[2], hash[3]]) as usize) % dims;
        let sign = if hash[4] & 1 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}

pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(vector.len() * 4);
    for v in vector {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

pub fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_is_deterministic() {
        let a = compute_embedding("hello world", 64);
        let b = compute_embedding("hello world", 64);
        assert_eq!(a, b);
    }

    #[test]
    fn embedding_is_unit_norm_when_nonempty() {
        let v = compute_embedding("hello world, this is a test", 64);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn encode_decode_roundtrip() {
        let v = vec![1.0f32, -2.5, 0.0, 3.75];
        assert_eq!(decode_vector(&encode_vector(&v)), v);
    }
}
