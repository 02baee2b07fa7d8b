//! Conversation Loader: discovers conversation documents, deduplicates them,
//! and normalizes survivors into the canonical `Conversation` shape.

pub mod mapping;

use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::domain::Conversation;
use crate::error::AppError;

struct RawConversation {
    id: String,
    title: String,
    create_time: f64,
    update_time: f64,
    mapping: Value,
    current_node: Option<String>,
}

/// Walks `root` for JSON documents matching the OpenAI export shape (a
/// top-level array of conversation objects, or a single conversation object),
/// parses every candidate, and returns the deduplicated, normalized set.
pub fn load_conversations(root: &Path) -> Vec<Conversation> {
    let mut raw = Vec::new();

    for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }
        if entry.path().extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match std::fs::read_to_string(entry.path()) {
            Ok(contents) => match serde_json::from_str::<Value>(&contents) {
                Ok(value) => collect_candidates(entry.path(), value, &mut raw),
                Err(e) => debug!(path = %entry.path().display(), error = %e, "not a JSON document, skipping"),
            },
            Err(e) => warn!(path = %entry.path().display(), error = %e, "could not read candidate document"),
        }
    }

    let deduped = dedupe_by_conversation_id(raw);
    deduped
        .into_iter()
        .filter(|c| message_count(&c.mapping) > 0)
        .filter(|c| !is_epoch_sentinel(c.create_time))
        .map(normalize)
        .collect()
}

fn collect_candidates(path: &Path, value: Value, out: &mut Vec<RawConversation>) {
    match value {
        Value::Array(items) => {
            for item in items {
                if let Some(raw) = try_parse_conversation(&item) {
                    out.push(raw);
                } else {
                    debug!(path = %path.display(), "array entry is not a conversation document");
                }
            }
        }
        obj @ Value::Object(_) => {
            if let Some(raw) = try_parse_conversation(&obj) {
                out.push(raw);
            }
        }
        _ => {}
    }
}

fn try_parse_conversation(value: &Value) -> Option<RawConversation> {
    let mapping = value.get("mapping")?.clone();
    if !mapping.is_object() {
        return None;
    }
    let id = value
        .get("conversation_id")
        .or_else(|| value.get("id"))
        .and_then(|v| v.as_str())?
        .to_string();
    let title = value.get("title").and_then(|v| v.as_str()).unwrap_or("Untitled").to_string();
    let create_time = value.get("create_time").and_then(|v| v.as_f64()).unwrap_or(0.0);
    let update_time = value.get("update_time").and_then(|v| v.as_f64()).unwrap_or(create_time);
    let current_node = value.get("current_node").and_then(|v| v.as_str()).map(str::to_string);

    Some(RawConversation { id, title, create_time, update_time, mapping, current_node })
}

fn message_count(mapping: &Value) -> usize {
    let Value::Object(nodes) = mapping else { return 0 };
    nodes.values().filter(|n| n.get("message").map(|m| !m.is_null()).unwrap_or(false)).count()
}

/// `create_time == 0` (or absent, defaulted to `0.0` above) is the export's
/// null/epoch sentinel.
fn is_epoch_sentinel(create_time: f64) -> bool {
    create_time == 0.0
}

/// Keeps, per conversation-id, the record with the largest message count.
fn dedupe_by_conversation_id(raw: Vec<RawConversation>) -> Vec<RawConversation> {
    use std::collections::HashMap;
    let mut best: HashMap<String, RawConversation> = HashMap::new();

    for candidate in raw {
        match best.get(&candidate.id) {
            Some(existing) if message_count(&existing.mapping) >= message_count(&candidate.mapping) => {}
            _ => {
                best.insert(candidate.id.clone(), candidate);
            }
        }
    }

    best.into_values().collect()
}

fn normalize(raw: RawConversation) -> Conversation {
    let messages = mapping::linearize(&raw.mapping, raw.current_node.as_deref());
    Conversation {
        conversation_id: raw.id,
        title: raw.title,
        create_time: raw.create_time,
        update_time: raw.update_time,
        messages,
        mapping: raw.mapping,
        resolved_media: Vec::new(),
        unresolved_citations: Vec::new(),
        assets: Vec::new(),
    }
}

/// Surfaced for callers that want to treat an unparsable but clearly-intended
/// conversation document as a loud error rather than a silent skip (not used
/// by the default discovery path, which always skips quietly).
pub fn parse_conversation_document(path: &Path, contents: &str) -> Result<Vec<Conversation>, AppError> {
    let value: Value = serde_json::from_str(contents).map_err(|e| AppError::ConversationParseError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut raw = Vec::new();
    collect_candidates(path, value, &mut raw);
    Ok(raw.into_iter().map(normalize).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn discovers_and_normalizes_a_conversations_array() {
        let dir = tempdir().unwrap();
        let doc = serde_json::json!([{
            "conversation_id": "11111111-2222-3333-4444-555555555555",
            "title": "Test",
            "create_time": 100.0,
            "update_time": 200.0,
            "current_node": "a",
            "mapping": {
                "root": { "parent": null, "children": ["a"], "message": null },
                "a": { "parent": "root", "children": [], "message": { "author": {"role": "user"}, "create_time": 100.0, "content": {"parts": ["hi"]} } }
            }
        }]);
        fs::write(dir.path().join("conversations.json"), serde_json::to_string(&doc).unwrap()).unwrap();

        let conversations = load_conversations(dir.path());
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].messages.len(), 1);
    }

    #[test]
    fn drops_zero_message_and_epoch_records() {
        let dir = tempdir().unwrap();
        let doc = serde_json::json!([
            {
                "conversation_id": "11111111-2222-3333-4444-555555555555",
                "title": "Empty",
                "create_time": 100.0,
                "mapping": { "root": { "parent": null, "children": [], "message": null } }
            },
            {
                "conversation_id": "22222222-3333-4444-5555-666666666666",
                "title": "Epoch",
                "create_time": 0.0,
                "mapping": {
                    "root": { "parent": null, "children": ["a"], "message": null },
                    "a": { "parent": "root", "children": [], "message": { "author": {"role": "user"}, "create_time": 0.0, "content": {"parts": ["hi"]} } }
                }
            }
        ]);
        fs::write(dir.path().join("conversations.json"), serde_json::to_string(&doc).unwrap()).unwrap();

        let conversations = load_conversations(dir.path());
        assert!(conversations.is_empty());
    }

    #[test]
    fn deduplicates_identical_records_keeping_largest() {
        let dir = tempdir().unwrap();
        let small = serde_json::json!({
            "conversation_id": "11111111-2222-3333-4444-555555555555",
            "title": "Dup",
            "create_time": 100.0,
            "mapping": {
                "root": { "parent": null, "children": ["a"], "message": null },
                "a": { "parent": "root", "children": [], "message": { "author": {"role": "user"}, "create_time": 100.0, "content": {"parts": ["hi"]} } }
            }
        });
        let large = serde_json::json!({
            "conversation_id": "11111111-2222-3333-4444-555555555555",
            "title": "Dup",
            "create_time": 100.0,
            "mapping": {
                "root": { "parent": null, "children": ["a"], "message": null },
                "a": { "parent": "root", "children": ["b"], "message": { "author": {"role": "user"}, "create_time": 100.0, "content": {"parts": ["hi"]} } },
                "b": { "parent": "a", "children": [], "message": { "author": {"role": "assistant"}, "create_time": 101.0, "content": {"parts": ["hello"]} } }
            }
        });
        fs::write(dir.path().join("a.json"), serde_json::to_string(&small).unwrap()).unwrap();
        fs::write(dir.path().join("b.json"), serde_json::to_string(&large).unwrap()).unwrap();

        let conversations = load_conversations(dir.path());
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].messages.len(), 2);
    }
}
