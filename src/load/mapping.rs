//! Linearizes one conversation's branching `mapping` into an ordered message
//! view, preferring the `current_node` chain when present.

use std::collections::{HashMap, HashSet};

use serde_json::Value;

use crate::domain::NormalizedMessage;

struct Node<'a> {
    id: String,
    parent: Option<String>,
    children: Vec<String>,
    message: Option<&'a Value>,
}

pub fn linearize(mapping: &Value, current_node: Option<&str>) -> Vec<NormalizedMessage> {
    let Value::Object(raw_nodes) = mapping else {
        return Vec::new();
    };

    let mut nodes: HashMap<String, Node> = HashMap::new();
    for (id, node) in raw_nodes {
        let parent = node.get("parent").and_then(|v| v.as_str()).map(str::to_string);
        let children = node
            .get("children")
            .and_then(|v| v.as_array())
            .map(|arr| arr.iter().filter_map(|c| c.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        nodes.insert(
            id.clone(),
            Node { id: id.clone(), parent, children, message: node.get("message").filter(|m| !m.is_null()) },
        );
    }

    let order = if let Some(leaf) = current_node.filter(|id| nodes.contains_key(*id)) {
        chain_from_current_node(&nodes, leaf)
    } else {
        order_by_earliest_child(&nodes)
    };

    order
        .into_iter()
        .filter_map(|id| nodes.get(&id))
        .filter_map(|node| node.message.map(|m| to_normalized(&node.id, m)))
        .collect()
}

/// Walks parent links from `leaf` back to the root, then reverses, with a
/// visited-set to defend against cyclic or self-referential mappings.
fn chain_from_current_node(nodes: &HashMap<String, Node>, leaf: &str) -> Vec<String> {
    let mut visited = HashSet::new();
    let mut chain = Vec::new();
    let mut cursor = Some(leaf.to_string());

    while let Some(id) = cursor {
        if !visited.insert(id.clone()) {
            break;
        }
        let Some(node) = nodes.get(&id) else { break };
        chain.push(id.clone());
        cursor = node.parent.clone();
    }

    chain.reverse();
    chain
}

/// Root-first traversal used when no `current_node` is recorded: find the
/// node with no parent, then at every branch descend into the child with the
/// earliest `create_time`.
fn order_by_earliest_child(nodes: &HashMap<String, Node>) -> Vec<String> {
    let Some(root) = nodes.values().find(|n| n.parent.is_none()) else {
        return Vec::new();
    };

    let mut visited = HashSet::new();
    let mut order = Vec::new();
    let mut cursor = Some(root.id.clone());

    while let Some(id) = cursor {
        if !visited.insert(id.clone()) {
            break;
        }
        let Some(node) = nodes.get(&id) else { break };
        order.push(id.clone());

        cursor = node
            .children
            .iter()
            .filter_map(|child_id| nodes.get(child_id).map(|c| (child_id, c)))
            .min_by(|(_, a), (_, b)| {
                create_time_of(a.message).partial_cmp(&create_time_of(b.message)).unwrap_or(std::cmp::Ordering::Equal)
            })
            .map(|(id, _)| id.clone());
    }

    order
}

fn create_time_of(message: Option<&Value>) -> f64 {
    message.and_then(|m| m.get("create_time")).and_then(|v| v.as_f64()).unwrap_or(f64::MAX)
}

fn to_normalized(node_id: &str, message: &Value) -> NormalizedMessage {
    let role = message.pointer("/author/role").and_then(|v| v.as_str()).unwrap_or("unknown").to_string();
    let create_time = message.get("create_time").and_then(|v| v.as_f64());
    let content_type = message.pointer("/content/content_type").and_then(|v| v.as_str()).map(str::to_string);
    let text = message
        .pointer("/content/parts")
        .and_then(|v| v.as_array())
        .map(|parts| {
            parts
                .iter()
                .filter_map(|p| p.as_str())
                .collect::<Vec<_>>()
                .join("\n")
        })
        .unwrap_or_default();

    NormalizedMessage { node_id: node_id.to_string(), role, create_time, content_type, text }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn prefers_current_node_chain() {
        let mapping = json!({
            "root": { "parent": null, "children": ["a"], "message": null },
            "a": { "parent": "root", "children": ["b", "c"], "message": { "author": {"role": "user"}, "create_time": 1.0, "content": {"parts": ["hi"]} } },
            "b": { "parent": "a", "children": [], "message": { "author": {"role": "assistant"}, "create_time": 2.0, "content": {"parts": ["branch b"]} } },
            "c": { "parent": "a", "children": [], "message": { "author": {"role": "assistant"}, "create_time": 3.0, "content": {"parts": ["branch c"]} } }
        });
        let messages = linearize(&mapping, Some("c"));
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[1].text, "branch c");
    }

    #[test]
    fn falls_back_to_earliest_child_without_current_node() {
        let mapping = json!({
            "root": { "parent": null, "children": ["a"], "message": null },
            "a": { "parent": "root", "children": ["b", "c"], "message": { "author": {"role": "user"}, "create_time": 1.0, "content": {"parts": ["hi"]} } },
            "b": { "parent": "a", "children": [], "message": { "author": {"role": "assistant"}, "create_time": 2.0, "content": {"parts": ["earlier"]} } },
            "c": { "parent": "a", "children": [], "message": { "author": {"role": "assistant"}, "create_time": 3.0, "content": {"parts": ["later"]} } }
        });
        let messages = linearize(&mapping, None);
        assert_eq!(messages.last().unwrap().text, "earlier");
    }

    #[test]
    fn cyclic_mapping_terminates() {
        let mapping = json!({
            "a": { "parent": "b", "children": ["b"], "message": { "author": {"role": "user"}, "create_time": 1.0, "content": {"parts": ["a"]} } },
            "b": { "parent": "a", "children": ["a"], "message": { "author": {"role": "user"}, "create_time": 2.0, "content": {"parts": ["b"]} } }
        });
        let messages = linearize(&mapping, Some("a"));
        assert!(messages.len() <= 2);
    }
}
