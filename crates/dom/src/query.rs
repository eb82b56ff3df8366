//! Selector and attribute lookups below a root node
//!
//! Every lookup walks the descendants of the root in document order; the root
//! itself is never a candidate. Selector parsing and matching belong to the
//! [`SelectorEngine`]; its errors are returned as-is.

use crate::arena::DomArena;
use crate::selector::{CssSelectorEngine, SelectorEngine};
use crate::types::{DomNode, NodeId};

/// Lookup facade over one subtree
pub struct Query<'a, E: SelectorEngine = CssSelectorEngine> {
    arena: &'a DomArena,
    root: NodeId,
    engine: E,
}

impl<'a> Query<'a> {
    pub fn new(arena: &'a DomArena, root: NodeId) -> Self {
        Self::with_engine(arena, root, CssSelectorEngine)
    }
}

impl<'a, E: SelectorEngine> Query<'a, E> {
    pub fn with_engine(arena: &'a DomArena, root: NodeId, engine: E) -> Self {
        Self {
            arena,
            root,
            engine,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    fn elements(&self) -> impl Iterator<Item = &'a DomNode> + 'a {
        self.arena
            .descendants(self.root)
            .filter(|node| node.is_element())
    }

    /// First matching element in document order
    pub fn query_selector(&self, selector: &str) -> Result<Option<NodeId>, E::Error> {
        let parsed = self.engine.parse(selector)?;
        Ok(self
            .elements()
            .find(|node| self.engine.matches(self.arena, node.node_id(), &parsed))
            .map(|node| node.node_id()))
    }

    /// All matching elements in document order
    pub fn query_selector_all(&self, selector: &str) -> Result<Vec<NodeId>, E::Error> {
        let parsed = self.engine.parse(selector)?;
        Ok(self
            .elements()
            .filter(|node| self.engine.matches(self.arena, node.node_id(), &parsed))
            .map(|node| node.node_id())
            .collect())
    }

    /// Elements carrying every class in the whitespace-separated `class_names`
    pub fn get_elements_by_class_name(&self, class_names: &str) -> Vec<NodeId> {
        let wanted: Vec<&str> = class_names.split_ascii_whitespace().collect();
        if wanted.is_empty() {
            return Vec::new();
        }
        self.elements()
            .filter(|node| wanted.iter().all(|class| node.has_class(class)))
            .map(|node| node.node_id())
            .collect()
    }

    /// Elements by qualified name; `"*"` matches everything.
    /// HTML elements compare ASCII case-insensitively.
    pub fn get_elements_by_tag_name(&self, name: &str) -> Vec<NodeId> {
        self.elements()
            .filter(|node| {
                name == "*"
                    || if node.is_html_element() {
                        node.node_name.eq_ignore_ascii_case(name)
                    } else {
                        node.node_name == name
                    }
            })
            .map(|node| node.node_id())
            .collect()
    }

    /// Elements by namespace and local name. `Some("*")` and `"*"` are
    /// wildcards; `None` matches elements without a namespace.
    pub fn get_elements_by_tag_name_ns(&self, namespace: Option<&str>, local_name: &str) -> Vec<NodeId> {
        let namespace = namespace.filter(|ns| !ns.is_empty());
        self.elements()
            .filter(|node| {
                let namespace_matches = match namespace {
                    Some("*") => true,
                    expected => node.namespace.as_deref() == expected,
                };
                namespace_matches && (local_name == "*" || node.node_name == local_name)
            })
            .map(|node| node.node_id())
            .collect()
    }

    /// First element whose `id` equals `id`
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        if id.is_empty() {
            return None;
        }
        self.elements()
            .find(|node| node.attr("id") == Some(id))
            .map(|node| node.node_id())
    }
}
