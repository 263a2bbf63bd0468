//! Content-addressing primitives shared across the ingestion, segmentation
//! and ledger modules.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A 32-byte SHA-256 digest.
pub type Hash32 = [u8; 32];

/// SHA-256 of raw bytes.
pub fn sha256(bytes: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

/// Content hash of a message body, used as the `content_hash` column and as
/// an input to `conversation_key`.
pub fn content_hash(content: &str) -> Hash32 {
    sha256(content.as_bytes())
}

/// `ConversationKey` = SHA-256 over the ordered sequence of
/// `role || 0x1F || content_hash`.
///
/// Intentionally ignores timestamps — two transcripts with identical roles
/// and content collide by design, independent of when they were sent or
/// re-imported.
pub fn conversation_key<'a, I>(messages: I) -> Hash32
where
    I: IntoIterator<Item = (&'a str, Hash32)>,
{
    let mut hasher = Sha256::new();
    for (role, hash) in messages {
        hasher.update(role.as_bytes());
        hasher.update([0x1Fu8]);
        hasher.update(hash);
    }
    hasher.finalize().into()
}

/// Canonicalizes a JSON value by sorting object keys recursively, then
/// hashes the resulting serialization. Two `serde_json::Value`s that are
/// structurally equal but were built with keys in different orders hash
/// identically: two logically identical configurations must produce
/// byte-identical hashes.
pub fn feature_config_hash(value: &Value) -> Hash32 {
    let canonical = canonicalize(value);
    sha256(canonical.to_string().as_bytes())
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), canonicalize(v)))
                .collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Hex-encodes a hash for logging/debugging (never for storage — storage
/// columns keep the raw 32 bytes).
pub fn to_hex(hash: &Hash32) -> String {
    hex::encode(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn conversation_key_is_deterministic_over_role_and_content_hash() {
        let a = [("user", content_hash("hi")), ("assistant", content_hash("hello"))];
        let b = [("user", content_hash("hi")), ("assistant", content_hash("hello"))];
        assert_eq!(conversation_key(a), conversation_key(b));
    }

    #[test]
    fn conversation_key_ignores_order_sensitivity_correctly() {
        // Swapping role/content pairs changes the key: order matters.
        let a = conversation_key([("user", content_hash("x")), ("assistant", content_hash("y"))]);
        let b = conversation_key([("assistant", content_hash("y")), ("user", content_hash("x"))]);
        assert_ne!(a, b);
    }

    #[test]
    fn feature_config_hash_ignores_key_order() {
        let a = json!({"seed": 42, "k": 5});
        let b = json!({"k": 5, "seed": 42});
        assert_eq!(feature_config_hash(&a), feature_config_hash(&b));
    }

    #[test]
    fn feature_config_hash_is_sensitive_to_values() {
        let a = json!({"seed": 42});
        let b = json!({"seed": 43});
        assert_ne!(feature_config_hash(&a), feature_config_hash(&b));
    }
}
