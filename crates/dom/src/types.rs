//! Core type definitions for the document tree
//!
//! Key design principles:
//! 1. Use u32 for indices (4 bytes vs 8 bytes pointer)
//! 2. Use SmallVec for small arrays (most nodes have few children)
//! 3. Tree links are private to the crate: only the arena mutates them

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use uuid::Uuid;

/// Node identifier (index into arena)
/// u32 allows 4 billion nodes, enough for any webpage
pub type NodeId = u32;

/// HTML namespace, assigned to every element the HTML parser creates
pub const HTML_NAMESPACE: &str = "http://www.w3.org/1999/xhtml";

/// SVG namespace
pub const SVG_NAMESPACE: &str = "http://www.w3.org/2000/svg";

/// MathML namespace
pub const MATHML_NAMESPACE: &str = "http://www.w3.org/1998/Math/MathML";

/// Identity of a document. Every node records the document that created it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Node type matching DOM specification numbering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeType {
    Element = 1,
    Text = 3,
    ProcessingInstruction = 7,
    Comment = 8,
    Document = 9,
    DocumentType = 10,
    DocumentFragment = 11,
}

impl NodeType {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(NodeType::Element),
            3 => Some(NodeType::Text),
            7 => Some(NodeType::ProcessingInstruction),
            8 => Some(NodeType::Comment),
            9 => Some(NodeType::Document),
            10 => Some(NodeType::DocumentType),
            11 => Some(NodeType::DocumentFragment),
            _ => None,
        }
    }

    /// Node name reported for nodes that have no tag
    pub fn default_name(self) -> &'static str {
        match self {
            NodeType::Text => "#text",
            NodeType::Comment => "#comment",
            NodeType::Document => "#document",
            NodeType::DocumentFragment => "#document-fragment",
            NodeType::Element | NodeType::ProcessingInstruction | NodeType::DocumentType => "",
        }
    }

    /// Whether nodes of this type may have children
    pub fn is_container(self) -> bool {
        matches!(
            self,
            NodeType::Element | NodeType::Document | NodeType::DocumentFragment
        )
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NodeType::Element => "Element",
            NodeType::Text => "Text",
            NodeType::ProcessingInstruction => "ProcessingInstruction",
            NodeType::Comment => "Comment",
            NodeType::Document => "Document",
            NodeType::DocumentType => "DocumentType",
            NodeType::DocumentFragment => "DocumentFragment",
        };
        f.write_str(name)
    }
}

/// Shadow root visibility mode. Opaque to the tree core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShadowRootMode {
    Open,
    Closed,
}

/// Element attribute (local name, value). Attribute order is preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// The main DOM tree node structure
///
/// Design philosophy:
/// - Small fixed-size fields first (better packing)
/// - Use indices instead of pointers
/// - Identity and tree links are read-only outside the arena
#[derive(Debug, Clone)]
pub struct DomNode {
    // IDs
    pub(crate) node_id: NodeId,
    pub(crate) owner: DocumentId,
    pub(crate) node_type: NodeType,

    // Navigation indices
    pub(crate) parent_id: Option<NodeId>,
    pub(crate) children_ids: SmallVec<[NodeId; 4]>,

    pub node_name: String,
    pub node_value: String,
    pub namespace: Option<String>,
    pub(crate) attributes: SmallVec<[Attribute; 4]>,

    // Shadow DOM links: set once by the arena when a shadow root is attached
    pub(crate) shadow_root_id: Option<NodeId>,
    pub(crate) host_id: Option<NodeId>,
    pub(crate) shadow_root_mode: Option<ShadowRootMode>,
}

impl DomNode {
    pub(crate) fn new(
        node_id: NodeId,
        owner: DocumentId,
        node_type: NodeType,
        node_name: String,
    ) -> Self {
        Self {
            node_id,
            owner,
            node_type,
            parent_id: None,
            children_ids: SmallVec::new(),
            node_name,
            node_value: String::new(),
            namespace: None,
            attributes: SmallVec::new(),
            shadow_root_id: None,
            host_id: None,
            shadow_root_mode: None,
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Document that created this node; fixed for the node's lifetime
    pub fn owner_document(&self) -> DocumentId {
        self.owner
    }

    pub fn parent_id(&self) -> Option<NodeId> {
        self.parent_id
    }

    pub fn children_ids(&self) -> &[NodeId] {
        &self.children_ids
    }

    /// Get tag name for element nodes
    pub fn tag_name(&self) -> Option<&str> {
        if self.node_type == NodeType::Element {
            Some(&self.node_name)
        } else {
            None
        }
    }

    /// Check if node is an element
    pub fn is_element(&self) -> bool {
        self.node_type == NodeType::Element
    }

    /// Check if node is text
    pub fn is_text(&self) -> bool {
        self.node_type == NodeType::Text
    }

    /// Element in the HTML namespace
    pub fn is_html_element(&self) -> bool {
        self.is_element() && self.namespace.as_deref() == Some(HTML_NAMESPACE)
    }

    /// HTML element with the given (lowercase) local name
    pub fn is_html(&self, local_name: &str) -> bool {
        self.is_html_element() && self.node_name == local_name
    }

    /// Get attribute value
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Set or overwrite an attribute, keeping its original position
    pub fn set_attr(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.attributes.iter_mut().find(|a| a.name == name) {
            Some(existing) => existing.value = value,
            None => self.attributes.push(Attribute { name, value }),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self.attributes.iter().position(|a| a.name == name)?;
        Some(self.attributes.remove(index).value)
    }

    /// Whitespace-separated tokens of the `class` attribute
    pub fn class_list(&self) -> impl Iterator<Item = &str> {
        self.attr("class")
            .unwrap_or("")
            .split_ascii_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.class_list().any(|c| c == class)
    }

    /// Shadow root attached to this element, if any
    pub fn shadow_root_id(&self) -> Option<NodeId> {
        self.shadow_root_id
    }

    /// Host element when this node is a shadow root
    pub fn host_id(&self) -> Option<NodeId> {
        self.host_id
    }

    pub fn shadow_root_mode(&self) -> Option<ShadowRootMode> {
        self.shadow_root_mode
    }

    pub fn is_shadow_root(&self) -> bool {
        self.host_id.is_some()
    }
}

/// Default attributes to include in outline serialization
pub const DEFAULT_INCLUDE_ATTRIBUTES: &[&str] = &[
    "title",
    "type",
    "checked",
    "id",
    "name",
    "role",
    "value",
    "placeholder",
    "alt",
    "aria-label",
    "aria-expanded",
    "href",
    "src",
    "srcdoc",
    "rel",
    "selected",
    "disabled",
    "required",
];

#[cfg(test)]
mod tests {
    use super::*;

    fn element(name: &str) -> DomNode {
        let mut node = DomNode::new(0, DocumentId::new(), NodeType::Element, name.to_string());
        node.namespace = Some(HTML_NAMESPACE.to_string());
        node
    }

    #[test]
    fn test_node_type_roundtrip_numbering() {
        assert_eq!(NodeType::from_u8(11), Some(NodeType::DocumentFragment));
        assert_eq!(NodeType::from_u8(2), None);
        assert_eq!(NodeType::Document as u8, 9);
    }

    #[test]
    fn test_attributes_keep_order_and_overwrite() {
        let mut node = element("div");
        node.set_attr("id", "a");
        node.set_attr("class", "x y");
        node.set_attr("id", "b");

        let names: Vec<_> = node.attributes().iter().map(|a| a.name.as_str()).collect();
        assert_eq!(names, vec!["id", "class"]);
        assert_eq!(node.attr("id"), Some("b"));
        assert_eq!(node.remove_attr("id"), Some("b".to_string()));
        assert_eq!(node.attr("id"), None);
    }

    #[test]
    fn test_class_list() {
        let mut node = element("div");
        node.set_attr("class", "  one\ttwo\n three ");
        assert_eq!(node.class_list().collect::<Vec<_>>(), vec!["one", "two", "three"]);
        assert!(node.has_class("two"));
        assert!(!node.has_class("tw"));
    }
}
