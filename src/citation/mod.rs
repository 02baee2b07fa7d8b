//! Reference Extractor: walks one conversation's branching map and collects
//! every media citation from structured fields and free text.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::domain::{Citation, CitationKind};
use crate::index::patterns;

/// Collects every citation in `mapping`, tagging each with `conversation_id`
/// and the owning message/node id. Node iteration order doesn't matter here;
/// the Resolver only groups citations by conversation, never relies on
/// extraction order.
pub fn extract_citations(conversation_id: &str, mapping: &Value) -> Vec<Citation> {
    let mut citations = Vec::new();

    let Value::Object(nodes) = mapping else {
        return citations;
    };

    for (node_id, node) in nodes {
        let Some(message) = node.get("message").filter(|m| !m.is_null()) else {
            continue;
        };
        extract_from_message(conversation_id, node_id, message, &mut citations);
    }

    citations
}

fn extract_from_message(
    conversation_id: &str,
    node_id: &str,
    message: &Value,
    out: &mut Vec<Citation>,
) {
    extract_attachments(conversation_id, node_id, message, out);
    extract_parts(conversation_id, node_id, message, out);
}

fn extract_attachments(conversation_id: &str, node_id: &str, message: &Value, out: &mut Vec<Citation>) {
    let Some(attachments) = message.pointer("/metadata/attachments").and_then(|v| v.as_array())
    else {
        return;
    };

    for attachment in attachments {
        let Some(id) = attachment.get("id").and_then(|v| v.as_str()) else {
            continue;
        };
        // Attachment ids carry the `file-` prefix (`"id": "file-ABC"`); strip
        // it so the payload matches `by_file_id`, which is keyed on the id
        // with that prefix already removed.
        let payload = id.strip_prefix("file-").unwrap_or(id).to_string();
        out.push(Citation {
            conversation_id: conversation_id.to_string(),
            message_id: node_id.to_string(),
            kind: CitationKind::FileIdAttachment,
            payload,
            expected_size: attachment.get("size").and_then(|v| v.as_u64()),
            gen_id: None,
            original_name: attachment.get("name").and_then(|v| v.as_str()).map(str::to_string),
        });
    }
}

fn extract_parts(conversation_id: &str, node_id: &str, message: &Value, out: &mut Vec<Citation>) {
    let Some(parts) = message.pointer("/content/parts").and_then(|v| v.as_array()) else {
        return;
    };

    for part in parts {
        if let Some(text) = part.as_str() {
            extract_free_text(conversation_id, node_id, text, out);
            continue;
        }

        if let Some(pointer) = part.get("asset_pointer").and_then(|v| v.as_str()) {
            extract_asset_pointer(conversation_id, node_id, part, pointer, out);
            continue;
        }

        if part.get("content_type").and_then(|v| v.as_str()) == Some("image")
            && part.get("image_url").and_then(|v| v.as_str()).is_some()
        {
            let url = part.get("image_url").and_then(|v| v.as_str()).unwrap();
            out.push(Citation {
                conversation_id: conversation_id.to_string(),
                message_id: node_id.to_string(),
                kind: CitationKind::InlineName,
                payload: url.to_string(),
                expected_size: None,
                gen_id: None,
                original_name: None,
            });
            continue;
        }

        if let Some(text) = part.get("text").and_then(|v| v.as_str()) {
            extract_free_text(conversation_id, node_id, text, out);
        }
    }
}

const SEDIMENT_PREFIX: &str = "sediment://file_";
const FILE_SERVICE_PREFIX: &str = "file-service://file-";

fn extract_asset_pointer(
    conversation_id: &str,
    node_id: &str,
    part: &Value,
    pointer: &str,
    out: &mut Vec<Citation>,
) {
    let gen_id = part
        .pointer("/metadata/dalle/gen_id")
        .and_then(|v| v.as_str())
        .map(str::to_string);
    let size_bytes = part.get("size_bytes").and_then(|v| v.as_u64());

    if let Some(hash) = pointer.strip_prefix(SEDIMENT_PREFIX) {
        out.push(Citation {
            conversation_id: conversation_id.to_string(),
            message_id: node_id.to_string(),
            kind: CitationKind::SedimentPointer,
            payload: hash.to_string(),
            expected_size: size_bytes,
            gen_id,
            original_name: None,
        });
        return;
    }

    if let Some(id) = pointer.strip_prefix(FILE_SERVICE_PREFIX) {
        out.push(Citation {
            conversation_id: conversation_id.to_string(),
            message_id: node_id.to_string(),
            kind: CitationKind::FileServicePointer,
            payload: id.to_string(),
            expected_size: size_bytes,
            gen_id,
            original_name: None,
        });
        return;
    }

    // A DALL-E-tagged part with neither prefix has no directly resolvable
    // id/hash payload; it only ever participates in strategies 4 and 6.
    if part.pointer("/metadata/dalle").is_some() {
        out.push(Citation {
            conversation_id: conversation_id.to_string(),
            message_id: node_id.to_string(),
            kind: CitationKind::DalleAsset,
            payload: pointer.to_string(),
            expected_size: size_bytes,
            gen_id,
            original_name: None,
        });
    }
}

static FILENAME_RE: Lazy<Regex> = Lazy::new(|| {
    let exts = crate::domain::media_extensions().iter().cloned().collect::<Vec<_>>().join("|");
    Regex::new(&format!(r"[A-Za-z0-9._-]+\.({exts})")).unwrap()
});

fn extract_free_text(conversation_id: &str, node_id: &str, text: &str, out: &mut Vec<Citation>) {
    for m in patterns::FILE_ID_TOKEN_RE.find_iter(text) {
        let payload = m.as_str().trim_start_matches("file-").to_string();
        out.push(Citation {
            conversation_id: conversation_id.to_string(),
            message_id: node_id.to_string(),
            kind: CitationKind::InlineFileId,
            payload,
            expected_size: None,
            gen_id: None,
            original_name: None,
        });
    }

    for word in text.split(|c: char| c.is_whitespace()) {
        let trimmed = word.trim_matches(|c: char| !c.is_alphanumeric() && c != '-');
        if patterns::is_uuid(trimmed) {
            out.push(Citation {
                conversation_id: conversation_id.to_string(),
                message_id: node_id.to_string(),
                kind: CitationKind::InlineUuid,
                payload: trimmed.to_string(),
                expected_size: None,
                gen_id: None,
                original_name: None,
            });
        }
    }

    for m in FILENAME_RE.find_iter(text) {
        out.push(Citation {
            conversation_id: conversation_id.to_string(),
            message_id: node_id.to_string(),
            kind: CitationKind::InlineName,
            payload: m.as_str().to_string(),
            expected_size: None,
            gen_id: None,
            original_name: Some(m.as_str().to_string()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_file_id_attachment() {
        let mapping = json!({
            "n1": {
                "message": {
                    "metadata": { "attachments": [{ "id": "file-ABC", "name": "doc.pdf", "size": 1024 }] },
                    "content": { "parts": [] }
                }
            }
        });
        let citations = extract_citations("conv1", &mapping);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].kind, CitationKind::FileIdAttachment);
        assert_eq!(citations[0].payload, "ABC");
        assert_eq!(citations[0].expected_size, Some(1024));
    }

    #[test]
    fn attachment_id_without_file_prefix_is_kept_verbatim() {
        let mapping = json!({
            "n1": {
                "message": {
                    "metadata": { "attachments": [{ "id": "ABC123" }] },
                    "content": { "parts": [] }
                }
            }
        });
        let citations = extract_citations("conv1", &mapping);
        assert_eq!(citations[0].payload, "ABC123");
    }

    #[test]
    fn extracts_sediment_and_file_service_pointers() {
        let mapping = json!({
            "n1": {
                "message": {
                    "content": { "parts": [
                        { "asset_pointer": "sediment://file_deadbeef" },
                        { "asset_pointer": "file-service://file-XYZ", "size_bytes": 2048,
                          "metadata": { "dalle": { "gen_id": "g1" } } }
                    ] }
                }
            }
        });
        let citations = extract_citations("conv1", &mapping);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].kind, CitationKind::SedimentPointer);
        assert_eq!(citations[0].payload, "deadbeef");
        assert_eq!(citations[1].kind, CitationKind::FileServicePointer);
        assert_eq!(citations[1].payload, "XYZ");
        assert_eq!(citations[1].gen_id.as_deref(), Some("g1"));
    }

    #[test]
    fn dalle_part_without_resolvable_prefix_becomes_dalle_asset() {
        let mapping = json!({
            "n1": {
                "message": {
                    "content": { "parts": [
                        { "asset_pointer": "unknown://opaque", "size_bytes": 468408,
                          "metadata": { "dalle": { "gen_id": "g2" } } }
                    ] }
                }
            }
        });
        let citations = extract_citations("conv1", &mapping);
        assert_eq!(citations.len(), 1);
        assert_eq!(citations[0].kind, CitationKind::DalleAsset);
        assert_eq!(citations[0].gen_id.as_deref(), Some("g2"));
    }

    #[test]
    fn free_text_scan_finds_file_id_uuid_and_filename_tokens() {
        let mapping = json!({
            "n1": {
                "message": {
                    "content": { "parts": [
                        "see file-QRS and 11111111-2222-3333-4444-555555555555 plus photo.png"
                    ] }
                }
            }
        });
        let citations = extract_citations("conv1", &mapping);
        let kinds: Vec<_> = citations.iter().map(|c| c.kind).collect();
        assert!(kinds.contains(&CitationKind::InlineFileId));
        assert!(kinds.contains(&CitationKind::InlineUuid));
        assert!(kinds.contains(&CitationKind::InlineName));
    }

    #[test]
    fn null_message_nodes_are_skipped() {
        let mapping = json!({ "n1": { "message": null } });
        assert!(extract_citations("conv1", &mapping).is_empty());
    }
}
