//! `selectors::Element` over arena nodes

use super::{CssString, NonTSPseudoClass, PseudoElement, SelectorImpl};
use crate::arena::DomArena;
use crate::types::{DomNode, NodeId, NodeType};
use selectors::attr::{AttrSelectorOperation, CaseSensitivity, NamespaceConstraint};
use selectors::matching::{ElementSelectorFlags, MatchingContext};
use selectors::OpaqueElement;

/// Element node borrowed from a [`DomArena`]
#[derive(Clone, Copy)]
pub struct ArenaElement<'a> {
    arena: &'a DomArena,
    node: &'a DomNode,
}

impl std::fmt::Debug for ArenaElement<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArenaElement")
            .field("node", &self.node.node_id())
            .field("name", &self.node.node_name)
            .finish_non_exhaustive()
    }
}

impl<'a> ArenaElement<'a> {
    /// `None` unless `id` is an element of `arena`
    pub fn new(arena: &'a DomArena, id: NodeId) -> Option<Self> {
        let node = arena.get(id).ok().filter(|node| node.is_element())?;
        Some(Self { arena, node })
    }

    pub fn node_id(&self) -> NodeId {
        self.node.node_id()
    }

    fn parent(&self) -> Option<&'a DomNode> {
        self.arena.get(self.node.parent_id()?).ok()
    }

    fn sibling_element(&self, forward: bool) -> Option<Self> {
        let siblings = self.parent()?.children_ids();
        let index = siblings.iter().position(|&id| id == self.node.node_id())?;
        let element = |&id: &NodeId| Self::new(self.arena, id);
        if forward {
            siblings[index + 1..].iter().find_map(element)
        } else {
            siblings[..index].iter().rev().find_map(element)
        }
    }
}

impl selectors::Element for ArenaElement<'_> {
    type Impl = SelectorImpl;

    fn opaque(&self) -> OpaqueElement {
        OpaqueElement::new(self.node)
    }

    fn parent_element(&self) -> Option<Self> {
        Self::new(self.arena, self.node.parent_id()?)
    }

    fn parent_node_is_shadow_root(&self) -> bool {
        self.parent().map_or(false, DomNode::is_shadow_root)
    }

    fn containing_shadow_host(&self) -> Option<Self> {
        let mut top = self.node;
        while let Some(parent) = top.parent_id() {
            top = self.arena.get(parent).ok()?;
        }
        Self::new(self.arena, top.host_id()?)
    }

    fn is_pseudo_element(&self) -> bool {
        false
    }

    fn prev_sibling_element(&self) -> Option<Self> {
        self.sibling_element(false)
    }

    fn next_sibling_element(&self) -> Option<Self> {
        self.sibling_element(true)
    }

    fn first_element_child(&self) -> Option<Self> {
        self.node
            .children_ids()
            .iter()
            .find_map(|&id| Self::new(self.arena, id))
    }

    // Type selectors are matched against the lowercased name for these
    fn is_html_element_in_html_document(&self) -> bool {
        self.node.is_html_element()
    }

    fn has_local_name(&self, local_name: &str) -> bool {
        self.node.node_name == local_name
    }

    fn has_namespace(&self, _ns: &()) -> bool {
        true
    }

    fn is_same_type(&self, other: &Self) -> bool {
        self.node.node_name == other.node.node_name && self.node.namespace == other.node.namespace
    }

    // Attributes carry no namespace, so every constraint is satisfied by name
    fn attr_matches(
        &self,
        _ns: &NamespaceConstraint<&()>,
        local_name: &CssString,
        operation: &AttrSelectorOperation<&CssString>,
    ) -> bool {
        self.node
            .attr(local_name.as_ref())
            .map_or(false, |value| operation.eval_str(value))
    }

    fn match_non_ts_pseudo_class(
        &self,
        pc: &NonTSPseudoClass,
        _context: &mut MatchingContext<SelectorImpl>,
    ) -> bool {
        match *pc {}
    }

    fn match_pseudo_element(
        &self,
        pe: &PseudoElement,
        _context: &mut MatchingContext<SelectorImpl>,
    ) -> bool {
        match *pe {}
    }

    fn apply_selector_flags(&self, _flags: ElementSelectorFlags) {}

    fn is_link(&self) -> bool {
        (self.node.is_html("a") || self.node.is_html("area")) && self.node.attr("href").is_some()
    }

    fn is_html_slot_element(&self) -> bool {
        self.node.is_html("slot")
    }

    fn has_id(&self, id: &CssString, case_sensitivity: CaseSensitivity) -> bool {
        self.node
            .attr("id")
            .map_or(false, |own| case_sensitivity.eq(own.as_bytes(), id.0.as_bytes()))
    }

    fn has_class(&self, name: &CssString, case_sensitivity: CaseSensitivity) -> bool {
        self.node
            .class_list()
            .any(|class| case_sensitivity.eq(class.as_bytes(), name.0.as_bytes()))
    }

    fn imported_part(&self, _name: &CssString) -> Option<CssString> {
        None
    }

    fn is_part(&self, _name: &CssString) -> bool {
        false
    }

    /// No element children and no non-empty text
    fn is_empty(&self) -> bool {
        self.node.children_ids().iter().all(|&id| match self.arena.get(id) {
            Ok(child) => match child.node_type() {
                NodeType::Element => false,
                NodeType::Text => child.node_value.is_empty(),
                _ => true,
            },
            Err(_) => true,
        })
    }

    fn is_root(&self) -> bool {
        self.parent()
            .map_or(false, |parent| parent.node_type() == NodeType::Document)
    }
}
