//! Utility functions for DOM processing

use crate::arena::DomArena;
use crate::types::NodeId;

/// Cap text length to avoid output explosion. Cuts on a char boundary.
pub fn cap_text_length(text: &str, max_len: usize) -> String {
    if text.len() <= max_len {
        return text.to_string();
    }
    let mut end = max_len;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

/// Concatenated data of every text node below `node_id`, in document order.
/// Not trimmed.
pub fn collect_text(arena: &DomArena, node_id: NodeId) -> String {
    arena
        .descendants(node_id)
        .filter(|node| node.is_text())
        .map(|node| node.node_value.as_str())
        .collect()
}

/// ASCII-whitespace trim and collapse, as used for `<title>`
pub fn strip_and_collapse_whitespace(text: &str) -> String {
    text.split_ascii_whitespace().collect::<Vec<_>>().join(" ")
}
