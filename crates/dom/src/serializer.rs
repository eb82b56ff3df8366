//! Markup formatters - turn nodes back into text
//!
//! - `HtmlFormatter`: HTML5 fragment serialization (what `inner_html` returns)
//! - `OutlineFormatter`: compact indented outline, attribute allow-list
//! - `JsonFormatter`: structured tree for tooling

use crate::arena::DomArena;
use crate::error::{DomError, Result};
use crate::types::*;
use crate::utils;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Serializes a sequence of sibling nodes (and their subtrees)
pub trait MarkupFormatter {
    fn format(&self, arena: &DomArena, nodes: &[NodeId]) -> Result<String>;
}

/// Elements that never have children or an end tag
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text children are written without escaping
const RAW_TEXT_ELEMENTS: &[&str] = &[
    "style", "script", "xmp", "iframe", "noembed", "noframes", "plaintext", "noscript",
];

/// Work item of the serializer tree walks: open a node at a depth, or write
/// the end of an element whose children are done. The walks keep their own
/// stack so nesting depth is bounded by memory, not by the call stack.
enum Step {
    Open(NodeId, usize),
    Close(NodeId, usize),
}

fn push_children(stack: &mut Vec<Step>, node: &DomNode, depth: usize) {
    stack.extend(
        node.children_ids()
            .iter()
            .rev()
            .map(|&child| Step::Open(child, depth)),
    );
}

/// HTML5 serializer
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlFormatter;

impl HtmlFormatter {
    fn write_tree(&self, arena: &DomArena, root: NodeId, output: &mut String) -> Result<()> {
        let mut stack = vec![Step::Open(root, 0)];

        while let Some(step) = stack.pop() {
            let node_id = match step {
                Step::Open(node_id, _) => node_id,
                Step::Close(node_id, _) => {
                    output.push_str("</");
                    output.push_str(&arena.get(node_id)?.node_name);
                    output.push('>');
                    continue;
                }
            };
            let node = arena.get(node_id)?;

            match node.node_type() {
                NodeType::Element => {
                    output.push('<');
                    output.push_str(&node.node_name);
                    for attr in node.attributes() {
                        output.push(' ');
                        output.push_str(&attr.name);
                        output.push_str("=\"");
                        escape_into(&attr.value, true, output);
                        output.push('"');
                    }
                    output.push('>');

                    if node.is_html_element() && VOID_ELEMENTS.contains(&node.node_name.as_str()) {
                        continue;
                    }
                    stack.push(Step::Close(node_id, 0));
                    push_children(&mut stack, node, 0);
                }
                NodeType::Text => {
                    let raw_parent = arena.parent(node_id)?.is_some_and(|parent| {
                        parent.is_html_element()
                            && RAW_TEXT_ELEMENTS.contains(&parent.node_name.as_str())
                    });
                    if raw_parent {
                        output.push_str(&node.node_value);
                    } else {
                        escape_into(&node.node_value, false, output);
                    }
                }
                NodeType::Comment => {
                    output.push_str("<!--");
                    output.push_str(&node.node_value);
                    output.push_str("-->");
                }
                NodeType::ProcessingInstruction => {
                    output.push_str("<?");
                    output.push_str(&node.node_name);
                    output.push(' ');
                    output.push_str(&node.node_value);
                    output.push('>');
                }
                NodeType::DocumentType => {
                    output.push_str("<!DOCTYPE ");
                    output.push_str(&node.node_name);
                    output.push('>');
                }
                NodeType::Document | NodeType::DocumentFragment => {
                    push_children(&mut stack, node, 0);
                }
            }
        }

        Ok(())
    }
}

impl MarkupFormatter for HtmlFormatter {
    fn format(&self, arena: &DomArena, nodes: &[NodeId]) -> Result<String> {
        let mut output = String::with_capacity(256);
        for &node in nodes {
            self.write_tree(arena, node, &mut output)?;
        }
        Ok(output)
    }
}

fn escape_into(text: &str, attribute_mode: bool, output: &mut String) {
    for c in text.chars() {
        match c {
            '&' => output.push_str("&amp;"),
            '\u{a0}' => output.push_str("&nbsp;"),
            '"' if attribute_mode => output.push_str("&quot;"),
            '<' if !attribute_mode => output.push_str("&lt;"),
            '>' if !attribute_mode => output.push_str("&gt;"),
            _ => output.push(c),
        }
    }
}

/// Outline formatter configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializerConfig {
    pub include_attributes: Vec<String>,
    pub max_text_length: usize,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            include_attributes: DEFAULT_INCLUDE_ATTRIBUTES
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_text_length: 200,
        }
    }
}

/// Indented outline: one element or text run per line, selected attributes only
pub struct OutlineFormatter {
    config: SerializerConfig,
}

impl OutlineFormatter {
    pub fn new() -> Self {
        Self::with_config(SerializerConfig::default())
    }

    pub fn with_config(config: SerializerConfig) -> Self {
        Self { config }
    }

    fn write_tree(&self, arena: &DomArena, root: NodeId, output: &mut String) -> Result<()> {
        let mut stack = vec![Step::Open(root, 0)];

        while let Some(step) = stack.pop() {
            let (node_id, depth) = match step {
                Step::Open(node_id, depth) => (node_id, depth),
                Step::Close(node_id, depth) => {
                    push_indent(output, depth);
                    output.push_str("</");
                    output.push_str(&arena.get(node_id)?.node_name);
                    output.push_str(">\n");
                    continue;
                }
            };
            let node = arena.get(node_id)?;

            match node.node_type() {
                NodeType::Element => {
                    // Format: <tag id="123" class="foo">
                    push_indent(output, depth);
                    output.push('<');
                    output.push_str(&node.node_name);

                    for attr_name in &self.config.include_attributes {
                        if let Some(attr_value) = node.attr(attr_name) {
                            let value =
                                utils::cap_text_length(attr_value, self.config.max_text_length);
                            output.push_str(&format!(" {}=\"{}\"", attr_name, value));
                        }
                    }

                    if node.children_ids().is_empty() {
                        output.push_str(" />\n");
                        continue;
                    }
                    output.push_str(">\n");
                    stack.push(Step::Close(node_id, depth));
                    push_children(&mut stack, node, depth + 1);
                }
                NodeType::Text => {
                    let text = node.node_value.trim();
                    if !text.is_empty() {
                        push_indent(output, depth);
                        output.push_str(&utils::cap_text_length(text, self.config.max_text_length));
                        output.push('\n');
                    }
                }
                NodeType::Document | NodeType::DocumentFragment => {
                    push_children(&mut stack, node, depth);
                }
                // Comments, doctypes and processing instructions carry no content
                _ => {}
            }
        }

        Ok(())
    }
}

fn push_indent(output: &mut String, depth: usize) {
    for _ in 0..depth {
        output.push_str("  ");
    }
}

impl Default for OutlineFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkupFormatter for OutlineFormatter {
    fn format(&self, arena: &DomArena, nodes: &[NodeId]) -> Result<String> {
        let mut output = String::with_capacity(4096);
        for &node in nodes {
            self.write_tree(arena, node, &mut output)?;
        }
        Ok(output)
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum JsonNode<'a> {
    Element {
        name: &'a str,
        #[serde(skip_serializing_if = "Option::is_none")]
        namespace: Option<&'a str>,
        attributes: BTreeMap<&'a str, &'a str>,
        children: Vec<JsonNode<'a>>,
    },
    Text {
        data: &'a str,
    },
    Comment {
        data: &'a str,
    },
    ProcessingInstruction {
        target: &'a str,
        data: &'a str,
    },
    Doctype {
        name: &'a str,
    },
    Fragment {
        children: Vec<JsonNode<'a>>,
    },
}

/// JSON array of node trees
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    /// serde serializes nested values recursively, so depth is capped
    const MAX_DEPTH: usize = 512;

    fn build<'a>(&self, arena: &'a DomArena, node_id: NodeId, depth: usize) -> Result<JsonNode<'a>> {
        if depth > Self::MAX_DEPTH {
            return Err(DomError::Serialization(format!(
                "tree deeper than {} levels",
                Self::MAX_DEPTH
            )));
        }
        let node = arena.get(node_id)?;
        let children = || -> Result<Vec<JsonNode<'a>>> {
            node.children_ids()
                .iter()
                .map(|&child| self.build(arena, child, depth + 1))
                .collect()
        };

        Ok(match node.node_type() {
            NodeType::Element => JsonNode::Element {
                name: &node.node_name,
                namespace: node.namespace.as_deref(),
                attributes: node
                    .attributes()
                    .iter()
                    .map(|a| (a.name.as_str(), a.value.as_str()))
                    .collect(),
                children: children()?,
            },
            NodeType::Text => JsonNode::Text {
                data: &node.node_value,
            },
            NodeType::Comment => JsonNode::Comment {
                data: &node.node_value,
            },
            NodeType::ProcessingInstruction => JsonNode::ProcessingInstruction {
                target: &node.node_name,
                data: &node.node_value,
            },
            NodeType::DocumentType => JsonNode::Doctype {
                name: &node.node_name,
            },
            NodeType::Document | NodeType::DocumentFragment => JsonNode::Fragment {
                children: children()?,
            },
        })
    }
}

impl MarkupFormatter for JsonFormatter {
    fn format(&self, arena: &DomArena, nodes: &[NodeId]) -> Result<String> {
        let trees = nodes
            .iter()
            .map(|&node| self.build(arena, node, 0))
            .collect::<Result<Vec<_>>>()?;

        let json = if self.pretty {
            serde_json::to_string_pretty(&trees)?
        } else {
            serde_json::to_string(&trees)?
        };
        Ok(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Html5everParser, MarkupParser};

    fn fragment(markup: &str) -> (DomArena, Vec<NodeId>) {
        let mut arena = DomArena::new(DocumentId::new());
        let fragment = Html5everParser
            .parse_fragment(markup, "div", &mut arena)
            .unwrap();
        let children = arena.get(fragment).unwrap().children_ids().to_vec();
        (arena, children)
    }

    #[test]
    fn test_html_round_trip_preserves_markup() {
        let markup = r#"<p class="a">Hi <b>there</b></p><br><!--note-->"#;
        let (arena, nodes) = fragment(markup);
        assert_eq!(HtmlFormatter.format(&arena, &nodes).unwrap(), markup);
    }

    #[test]
    fn test_html_escaping() {
        let mut arena = DomArena::new(DocumentId::new());
        let p = arena.create_element("p");
        arena.get_mut(p).unwrap().set_attr("title", "\"a\" & <b>");
        let text = arena.create_text("1 < 2 & 3 > 2");
        arena.append_children(p, &[text]).unwrap();

        assert_eq!(
            HtmlFormatter.format(&arena, &[p]).unwrap(),
            r#"<p title="&quot;a&quot; &amp; <b>">1 &lt; 2 &amp; 3 &gt; 2</p>"#
        );
    }

    #[test]
    fn test_raw_text_is_not_escaped() {
        let (arena, nodes) = fragment("<style>a > b { color: red }</style>");
        assert_eq!(
            HtmlFormatter.format(&arena, &nodes).unwrap(),
            "<style>a > b { color: red }</style>"
        );
    }

    #[test]
    fn test_outline_filters_attributes() {
        let (arena, nodes) = fragment(r#"<div id="x" style="color: red"><a href="/y">Go</a></div>"#);
        let output = OutlineFormatter::new().format(&arena, &nodes).unwrap();
        assert_eq!(
            output,
            "<div id=\"x\">\n  <a href=\"/y\">\n    Go\n  </a>\n</div>\n"
        );
    }

    fn nested(depth: usize) -> (DomArena, NodeId) {
        let mut arena = DomArena::new(DocumentId::new());
        let root = arena.create_element("div");
        let mut parent = root;
        for _ in 0..depth {
            let child = arena.create_element("div");
            arena.attach_child(parent, child);
            parent = child;
        }
        let text = arena.create_text("leaf");
        arena.attach_child(parent, text);
        (arena, root)
    }

    #[test]
    fn test_deep_trees_serialize_without_recursion() {
        let depth = 50_000;
        let (arena, root) = nested(depth);

        let html = HtmlFormatter.format(&arena, &[root]).unwrap();
        assert_eq!(html.matches("<div>").count(), depth + 1);
        assert!(html.contains("<div>leaf</div>"));
        assert!(html.ends_with("</div></div>"));

        // Outline indentation grows with depth, so a shallower tree suffices
        let (shallow_arena, shallow_root) = nested(4_000);
        let outline = OutlineFormatter::new()
            .format(&shallow_arena, &[shallow_root])
            .unwrap();
        assert_eq!(outline.matches("</div>").count(), 4_001);
        assert!(outline.starts_with("<div>\n  <div>\n"));

        assert!(matches!(
            JsonFormatter::default().format(&arena, &[root]),
            Err(DomError::Serialization(_))
        ));
    }

    #[test]
    fn test_template_contents_serialize() {
        let markup = "<template><p>x</p></template>";
        let (arena, nodes) = fragment(markup);
        assert_eq!(HtmlFormatter.format(&arena, &nodes).unwrap(), markup);
    }

    #[test]
    fn test_json_formatter() {
        let (arena, nodes) = fragment("<p lang=en>Hi</p>");
        let json = JsonFormatter::default().format(&arena, &nodes).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();

        assert_eq!(value[0]["type"], "element");
        assert_eq!(value[0]["name"], "p");
        assert_eq!(value[0]["attributes"]["lang"], "en");
        assert_eq!(value[0]["children"][0]["type"], "text");
        assert_eq!(value[0]["children"][0]["data"], "Hi");
    }
}
