//! Asset Extractor: pulls canvas documents and fenced code blocks out of
//! message content, independent of media resolution.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use crate::domain::{Asset, AssetKind};

static FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```(\w+)?\n([\s\S]*?)```").unwrap());

/// Walks every message node in `mapping` and returns its assets in node
/// iteration order with ordinals numbered from zero within each node.
pub fn extract_assets(mapping: &Value) -> Vec<Asset> {
    let mut assets = Vec::new();
    let Value::Object(nodes) = mapping else { return assets };

    for (node_id, node) in nodes {
        let Some(message) = node.get("message").filter(|m| !m.is_null()) else { continue };
        let mut ordinal = 0usize;
        extract_canvas(node_id, message, &mut ordinal, &mut assets);
        extract_code_blocks(node_id, message, &mut ordinal, &mut assets);
    }

    assets
}

fn extract_canvas(node_id: &str, message: &Value, ordinal: &mut usize, out: &mut Vec<Asset>) {
    if message.pointer("/content/content_type").and_then(|v| v.as_str()) != Some("code") {
        return;
    }
    let language = message
        .pointer("/metadata/language")
        .and_then(|v| v.as_str())
        .unwrap_or("txt")
        .to_string();
    let payload = message.pointer("/content/text").and_then(|v| v.as_str()).unwrap_or("").to_string();

    out.push(Asset {
        node_id: node_id.to_string(),
        ordinal: *ordinal,
        file_name: format!("canvas_{node_id}_{ordinal}.{language}", ordinal = *ordinal),
        language,
        kind: AssetKind::Canvas,
        payload,
    });
    *ordinal += 1;
}

fn extract_code_blocks(node_id: &str, message: &Value, ordinal: &mut usize, out: &mut Vec<Asset>) {
    let Some(parts) = message.pointer("/content/parts").and_then(|v| v.as_array()) else { return };

    for part in parts {
        let text = match part {
            Value::String(s) => s.as_str(),
            Value::Object(_) => match part.get("text").and_then(|v| v.as_str()) {
                Some(t) => t,
                None => continue,
            },
            _ => continue,
        };

        for caps in FENCE_RE.captures_iter(text) {
            let language = caps.get(1).map(|m| m.as_str()).filter(|s| !s.is_empty()).unwrap_or("txt");
            let payload = caps.get(2).map(|m| m.as_str()).unwrap_or("").to_string();

            out.push(Asset {
                node_id: node_id.to_string(),
                ordinal: *ordinal,
                file_name: format!("code_block_{node_id}_{o}.{language}", o = *ordinal),
                language: language.to_string(),
                kind: AssetKind::CodeBlock,
                payload,
            });
            *ordinal += 1;
        }
    }
}
