//! Streaming ChatGPT export reader and node-mapping walk.
//!
//! The export is a JSON array of conversation objects; each conversation
//! carries a `mapping` of node id to `{parent, message, children}}` plus a
//! `current_node` pointer to the active leaf. We never materialize the
//! whole array in memory — `serde_json::Deserializer::from_reader` yields
//! one conversation `Value` at a time — and we never recurse over the
//! tree: the walk starts at `current_node` and follows `parent` pointers
//! up to the root, which is the only traversal order exports guarantee is
//! acyclic from the leaf side.

use crate::errors::{ChatLakeError, ChatLakeResult};
use crate::models::{ParsedConversation, ParsedMessage};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::io::Read;

#[derive(Debug, Deserialize)]
struct ChatGptConversation {
    id: Option<String>,
    conversation_id: Option<String>,
    title: Option<String>,
    current_node: Option<String>,
    mapping: HashMap<String, ChatGptNode>,
}

#[derive(Debug, Deserialize)]
struct ChatGptNode {
    parent: Option<String>,
    message: Option<ChatGptMessage>,
}

#[derive(Debug, Deserialize)]
struct ChatGptMessage {
    author: ChatGptAuthor,
    content: ChatGptContent,
    create_time: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ChatGptAuthor {
    role: String,
}

#[derive(Debug, Deserialize)]
struct ChatGptContent {
    content_type: String,
    #[serde(default)]
    parts: Option<Vec<Value>>,
    #[serde(default)]
    text: Option<String>,
}

/// Reads a ChatGPT export from `reader`, yielding one `ParsedConversation`
/// (or a skip reason) per top-level array element, without buffering the
/// whole file.
pub fn read_export<R: Read>(
    reader: R,
) -> ChatLakeResult<impl Iterator<Item = Result<ParsedConversation, (Option<String>, String)>>> {
    let stream = serde_json::Deserializer::from_reader(reader).into_iter::<Value>();
    let mut items = stream.peekable();

    // The export is a single JSON array; `serde_json`'s streaming
    // deserializer surfaces array elements as a sequence of `Value`s only
    // when we ask it to, so detect and unwrap the wrapper here.
    let first = match items.peek() {
        Some(Ok(v)) => v.clone(),
        Some(Err(e)) => return Err(ChatLakeError::InputMalformed(e.to_string())),
        None => return Err(ChatLakeError::InputMalformed("empty input".into())),
    };

    if !first.is_array() && !first.is_object() {
        return Err(ChatLakeError::InputMalformed(
            "expected a JSON array of conversations".into(),
        ));
    }

    let elements: Vec<Value> = if first.is_array() {
        items.next(); // consume the sole array value
        match first {
            Value::Array(v) => v,
            _ => unreachable!(),
        }
    } else {
        items.filter_map(|r| r.ok()).collect()
    };

    Ok(elements.into_iter().map(|value| {
        let external_id = value
            .get("conversation_id")
            .and_then(|v| v.as_str())
            .or_else(|| value.get("id").and_then(|v| v.as_str()))
            .map(|s| s.to_string());

        parse_conversation(value).map_err(|reason| (external_id, reason))
    }))
}

fn parse_conversation(value: Value) -> Result<ParsedConversation, String> {
    let conv: ChatGptConversation =
        serde_json::from_value(value).map_err(|e| format!("malformed conversation: {e}"))?;

    let external_id = conv
        .conversation_id
        .clone()
        .or(conv.id.clone())
        .ok_or_else(|| "conversation missing id".to_string())?;

    let messages = walk_from_current_node(&conv)?;
    if messages.is_empty() {
        return Err("conversation has no usable messages".to_string());
    }

    Ok(ParsedConversation {
        source_system: "chatgpt".to_string(),
        external_id,
        messages,
    })
}

/// Iteratively follows `parent` pointers from `current_node` (or the
/// newest leaf if absent) up to the root, guarding against cycles with a
/// visited set, then reverses the collected messages into chronological
/// order.
fn walk_from_current_node(conv: &ChatGptConversation) -> Result<Vec<ParsedMessage>, String> {
    let start = match &conv.current_node {
        Some(id) if conv.mapping.contains_key(id) => id.clone(),
        _ => latest_leaf(&conv.mapping).ok_or_else(|| "mapping has no nodes".to_string())?,
    };

    let mut visited = HashSet::new();
    let mut reversed = Vec::new();
    let mut cursor = Some(start);

    while let Some(node_id) = cursor {
        if !visited.insert(node_id.clone()) {
            return Err(format!("cycle detected at node {node_id}"));
        }

        let node = match conv.mapping.get(&node_id) {
            Some(n) => n,
            None => break,
        };

        if let Some(msg) = &node.message {
            if let Some(parsed) = parse_message(msg) {
                reversed.push(parsed);
            }
        }

        cursor = node.parent.clone();
    }

    reversed.reverse();
    Ok(reversed)
}

/// Picks a leaf (a node with no children pointing at it isn't tracked, so
/// we fall back to the node with the latest `create_time`) when the
/// export omits `current_node`.
fn latest_leaf(mapping: &HashMap<String, ChatGptNode>) -> Option<String> {
    mapping
        .iter()
        .filter(|(_, n)| n.message.is_some())
        .max_by(|(_, a), (_, b)| {
            let ta = a.message.as_ref().and_then(|m| m.create_time).unwrap_or(0.0);
            let tb = b.message.as_ref().and_then(|m| m.create_time).unwrap_or(0.0);
            ta.partial_cmp(&tb).unwrap_or(std::cmp::Ordering::Equal)
        })
        .map(|(id, _)| id.clone())
}

fn parse_message(msg: &ChatGptMessage) -> Option<ParsedMessage> {
    let role = match msg.author.role.as_str() {
        "user" | "assistant" | "system" | "tool" => msg.author.role.clone(),
        _ => return None,
    };

    let content = match msg.content.content_type.as_str() {
        "text" | "code" => msg.content.text.clone().or_else(|| {
            msg.content.parts.as_ref().map(|parts| {
                parts
                    .iter()
                    .filter_map(|p| p.as_str())
                    .collect::<Vec<_>>()
                    .join("\n")
            })
        }),
        _ => None,
    }?;

    if content.trim().is_empty() {
        return None;
    }

    let timestamp: Option<DateTime<Utc>> = msg
        .create_time
        .and_then(|ts| DateTime::from_timestamp(ts as i64, 0));

    Some(ParsedMessage {
        role,
        content,
        timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        serde_json::json!([{
            "id": "conv-1",
            "title": "Test",
            "current_node": "n2",
            "mapping": {
                "n0": {"parent": null, "message": null},
                "n1": {"parent": "n0", "message": {
                    "author": {"role": "user"},
                    "content": {"content_type": "text", "text": "hi"},
                    "create_time": 1.0
                }},
                "n2": {"parent": "n1", "message": {
                    "author": {"role": "assistant"},
                    "content": {"content_type": "text", "text": "hello"},
                    "create_time": 2.0
                }}
            }
        }])
    }

    #[test]
    fn walks_parent_pointers_into_chronological_order() {
        let bytes = serde_json::to_vec(&sample()).unwrap();
        let mut results: Vec<_> = read_export(bytes.as_slice()).unwrap().collect();
        assert_eq!(results.len(), 1);
        let conv = results.remove(0).unwrap();
        assert_eq!(conv.messages.len(), 2);
        assert_eq!(conv.messages[0].role, "user");
        assert_eq!(conv.messages[1].role, "assistant");
    }

    #[test]
    fn detects_cycles_instead_of_looping_forever() {
        let cyclic = serde_json::json!([{
            "id": "conv-cycle",
            "current_node": "a",
            "mapping": {
                "a": {"parent": "b", "message": null},
                "b": {"parent": "a", "message": null}
            }
        }]);
        let bytes = serde_json::to_vec(&cyclic).unwrap();
        let results: Vec<_> = read_export(bytes.as_slice()).unwrap().collect();
        assert!(results[0].is_err());
    }

    #[test]
    fn skips_conversations_with_no_usable_messages() {
        let empty = serde_json::json!([{
            "id": "conv-empty",
            "current_node": "a",
            "mapping": { "a": {"parent": null, "message": null} }
        }]);
        let bytes = serde_json::to_vec(&empty).unwrap();
        let results: Vec<_> = read_export(bytes.as_slice()).unwrap().collect();
        assert!(results[0].is_err());
    }
}
