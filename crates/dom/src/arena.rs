//! Arena-based DOM tree storage
//!
//! All nodes of one document live in a single `Vec<DomNode>` and refer to
//! each other by `NodeId`. Detached nodes stay in the arena; they are
//! unreachable from the root but keep their identity.
//!
//! ## Memory Layout
//!
//! ```text
//! Arena: Vec<DomNode>
//!        [Node0][Node1][Node2]...
//!         ↑ 4-byte index, not 8-byte pointer
//! ```
//!
//! Every structural mutation bumps `generation`. Cached views compare the
//! generation they were built at with the current one.

use crate::error::{DomError, Result};
use crate::types::{DocumentId, DomNode, NodeId, NodeType, ShadowRootMode, HTML_NAMESPACE};
use smallvec::SmallVec;

/// Arena allocator for the nodes of one document
#[derive(Debug)]
pub struct DomArena {
    /// All nodes stored sequentially (cache-friendly)
    nodes: Vec<DomNode>,

    /// Owner of every node allocated here
    owner: DocumentId,

    /// Root node ID (if set)
    root_id: Option<NodeId>,

    /// Structural mutation counter
    generation: u64,
}

impl DomArena {
    /// Create a new empty arena
    pub fn new(owner: DocumentId) -> Self {
        Self::with_capacity(owner, 256)
    }

    /// Create arena with specific capacity
    pub fn with_capacity(owner: DocumentId, capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            owner,
            root_id: None,
            generation: 0,
        }
    }

    pub fn owner(&self) -> DocumentId {
        self.owner
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn bump(&mut self) {
        self.generation = self.generation.wrapping_add(1);
    }

    fn alloc(&mut self, node_type: NodeType, node_name: String) -> NodeId {
        let node_id = self.nodes.len() as NodeId;
        self.nodes
            .push(DomNode::new(node_id, self.owner, node_type, node_name));
        node_id
    }

    pub fn create_document_node(&mut self) -> NodeId {
        self.alloc(NodeType::Document, NodeType::Document.default_name().to_string())
    }

    /// Create an element in the HTML namespace
    pub fn create_element(&mut self, local_name: &str) -> NodeId {
        self.create_element_ns(Some(HTML_NAMESPACE), &local_name.to_ascii_lowercase())
    }

    pub fn create_element_ns(&mut self, namespace: Option<&str>, local_name: &str) -> NodeId {
        let id = self.alloc(NodeType::Element, local_name.to_string());
        self.nodes[id as usize].namespace = namespace.filter(|ns| !ns.is_empty()).map(String::from);
        id
    }

    pub fn create_text(&mut self, data: impl Into<String>) -> NodeId {
        let id = self.alloc(NodeType::Text, NodeType::Text.default_name().to_string());
        self.nodes[id as usize].node_value = data.into();
        id
    }

    pub fn create_comment(&mut self, data: impl Into<String>) -> NodeId {
        let id = self.alloc(NodeType::Comment, NodeType::Comment.default_name().to_string());
        self.nodes[id as usize].node_value = data.into();
        id
    }

    pub fn create_doctype(&mut self, name: impl Into<String>) -> NodeId {
        self.alloc(NodeType::DocumentType, name.into())
    }

    pub fn create_processing_instruction(
        &mut self,
        target: impl Into<String>,
        data: impl Into<String>,
    ) -> NodeId {
        let id = self.alloc(NodeType::ProcessingInstruction, target.into());
        self.nodes[id as usize].node_value = data.into();
        id
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.alloc(
            NodeType::DocumentFragment,
            NodeType::DocumentFragment.default_name().to_string(),
        )
    }

    /// Get node by ID (immutable)
    pub fn get(&self, node_id: NodeId) -> Result<&DomNode> {
        self.nodes
            .get(node_id as usize)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Get node by ID (mutable)
    ///
    /// Tree links are not reachable through the returned node, so edits made
    /// here never change the structure.
    pub fn get_mut(&mut self, node_id: NodeId) -> Result<&mut DomNode> {
        self.nodes
            .get_mut(node_id as usize)
            .ok_or(DomError::NodeNotFound(node_id))
    }

    /// Set root node
    pub fn set_root(&mut self, node_id: NodeId) -> Result<()> {
        // Verify node exists
        self.get(node_id)?;
        self.root_id = Some(node_id);
        Ok(())
    }

    /// Get root node ID
    pub fn root_id(&self) -> Option<NodeId> {
        self.root_id
    }

    /// Get root node
    pub fn root(&self) -> Result<&DomNode> {
        let root_id = self
            .root_id
            .ok_or_else(|| DomError::InvalidState("No root node set".to_string()))?;
        self.get(root_id)
    }

    /// Total number of nodes, attached or not
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Check if arena is empty
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Get children of a node
    pub fn children(&self, node_id: NodeId) -> Result<Vec<&DomNode>> {
        let node = self.get(node_id)?;
        node.children_ids
            .iter()
            .map(|&child_id| self.get(child_id))
            .collect()
    }

    /// Get parent of a node
    pub fn parent(&self, node_id: NodeId) -> Result<Option<&DomNode>> {
        let node = self.get(node_id)?;
        match node.parent_id {
            Some(parent_id) => Ok(Some(self.get(parent_id)?)),
            None => Ok(None),
        }
    }

    /// Descendants of `root` in document order, `root` excluded.
    /// Unknown ids yield an empty sequence.
    pub fn descendants(&self, root: NodeId) -> Descendants<'_> {
        let stack = match self.get(root) {
            Ok(node) => node.children_ids.iter().rev().copied().collect(),
            Err(_) => Vec::new(),
        };
        Descendants { arena: self, stack }
    }

    /// Traverse tree depth-first (iterative, no recursion)
    pub fn traverse_df<F>(&self, start_id: NodeId, mut visit: F) -> Result<()>
    where
        F: FnMut(&DomNode) -> Result<()>,
    {
        let mut stack = vec![start_id];

        while let Some(node_id) = stack.pop() {
            let node = self.get(node_id)?;
            visit(node)?;

            // Push children in reverse order (so they're visited left-to-right)
            for &child_id in node.children_ids.iter().rev() {
                stack.push(child_id);
            }
        }

        Ok(())
    }

    /// True when `ancestor` is `node` or one of its ancestors
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.nodes.get(id as usize).and_then(|n| n.parent_id);
        }
        false
    }

    /// Append `nodes` after the existing children of `parent`
    pub fn append_children(&mut self, parent: NodeId, nodes: &[NodeId]) -> Result<()> {
        let insertion = self.prepare_insertion(parent, nodes)?;
        for node in insertion {
            self.detach_unchecked(node);
            self.nodes[node as usize].parent_id = Some(parent);
            self.nodes[parent as usize].children_ids.push(node);
        }
        self.bump();
        Ok(())
    }

    /// Insert `nodes`, in order, before the first child of `parent`
    pub fn prepend_children(&mut self, parent: NodeId, nodes: &[NodeId]) -> Result<()> {
        let insertion = self.prepare_insertion(parent, nodes)?;
        for (offset, node) in insertion.into_iter().enumerate() {
            self.detach_unchecked(node);
            self.nodes[node as usize].parent_id = Some(parent);
            let children = &mut self.nodes[parent as usize].children_ids;
            let index = offset.min(children.len());
            children.insert(index, node);
        }
        self.bump();
        Ok(())
    }

    /// Remove every child of `parent`, then insert `node` (if any).
    ///
    /// `suppress_events` skips the mutation trace event.
    pub fn replace_all(
        &mut self,
        parent: NodeId,
        node: Option<NodeId>,
        suppress_events: bool,
    ) -> Result<()> {
        let insertion = match node {
            Some(node) => self.prepare_insertion(parent, &[node])?,
            None => {
                self.get(parent)?;
                SmallVec::new()
            }
        };

        let removed = std::mem::take(&mut self.nodes[parent as usize].children_ids);
        for &child in &removed {
            self.nodes[child as usize].parent_id = None;
        }
        for node in insertion.iter().copied() {
            self.detach_unchecked(node);
            self.nodes[node as usize].parent_id = Some(parent);
            self.nodes[parent as usize].children_ids.push(node);
        }
        self.bump();

        if !suppress_events {
            tracing::trace!(
                parent,
                removed = removed.len(),
                added = insertion.len(),
                "replace all children"
            );
        }
        Ok(())
    }

    /// Remove `child` from `parent`
    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        if self.get(child)?.parent_id != Some(parent) {
            return Err(DomError::HierarchyRequest(format!(
                "node {} is not a child of {}",
                child, parent
            )));
        }
        self.detach_unchecked(child);
        self.bump();
        Ok(())
    }

    /// Remove `node` from its parent, if it has one
    pub fn detach(&mut self, node: NodeId) -> Result<()> {
        if self.get(node)?.parent_id.is_some() {
            self.detach_unchecked(node);
            self.bump();
        }
        Ok(())
    }

    /// Copy `node` (and its subtree when `deep`) into fresh nodes.
    ///
    /// The copy has no parent. Shadow roots copy as plain fragments and a
    /// host's shadow root is not copied.
    pub fn clone_node(&mut self, node: NodeId, deep: bool) -> Result<NodeId> {
        self.get(node)?;
        let copy = self.copy_one(node);

        if deep {
            let mut stack: Vec<(NodeId, NodeId)> = self.nodes[node as usize]
                .children_ids
                .iter()
                .rev()
                .map(|&child| (child, copy))
                .collect();

            while let Some((source, parent)) = stack.pop() {
                let child_copy = self.copy_one(source);
                self.nodes[child_copy as usize].parent_id = Some(parent);
                self.nodes[parent as usize].children_ids.push(child_copy);

                for &grandchild in self.nodes[source as usize].children_ids.iter().rev() {
                    stack.push((grandchild, child_copy));
                }
            }
        }

        Ok(copy)
    }

    /// Attach a shadow root to `host`. Fails when `host` is not an element or
    /// already has one.
    pub fn attach_shadow(&mut self, host: NodeId, mode: ShadowRootMode) -> Result<NodeId> {
        let host_node = self.get(host)?;
        if !host_node.is_element() {
            return Err(DomError::InvalidNodeType {
                expected: NodeType::Element.to_string(),
                actual: host_node.node_type.to_string(),
            });
        }
        if host_node.shadow_root_id.is_some() {
            return Err(DomError::InvalidState(format!(
                "element {} already hosts a shadow root",
                host
            )));
        }

        let root = self.create_fragment();
        let root_node = &mut self.nodes[root as usize];
        root_node.host_id = Some(host);
        root_node.shadow_root_mode = Some(mode);
        self.nodes[host as usize].shadow_root_id = Some(root);
        self.bump();
        Ok(root)
    }

    /// Append without validation. Used by tree builders that create both ends.
    pub(crate) fn attach_child(&mut self, parent: NodeId, child: NodeId) {
        self.nodes[child as usize].parent_id = Some(parent);
        self.nodes[parent as usize].children_ids.push(child);
        self.bump();
    }

    fn copy_one(&mut self, source: NodeId) -> NodeId {
        let src = &self.nodes[source as usize];
        let mut copy = DomNode::new(
            self.nodes.len() as NodeId,
            self.owner,
            src.node_type,
            src.node_name.clone(),
        );
        copy.node_value = src.node_value.clone();
        copy.namespace = src.namespace.clone();
        copy.attributes = src.attributes.clone();

        let id = copy.node_id;
        self.nodes.push(copy);
        id
    }

    fn detach_unchecked(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node as usize].parent_id.take() {
            self.nodes[parent as usize]
                .children_ids
                .retain(|child| *child != node);
        }
    }

    /// Validate an insertion into `parent` and expand fragments into their
    /// children. Nothing is mutated.
    fn prepare_insertion(
        &self,
        parent: NodeId,
        nodes: &[NodeId],
    ) -> Result<SmallVec<[NodeId; 4]>> {
        let parent_node = self.get(parent)?;
        if !parent_node.node_type.is_container() {
            return Err(DomError::HierarchyRequest(format!(
                "{} nodes cannot have children",
                parent_node.node_type
            )));
        }

        let mut expanded = SmallVec::new();
        for &id in nodes {
            let node = self.get(id)?;
            // A fragment containing an ancestor of `parent` is itself an ancestor
            if self.is_inclusive_ancestor(id, parent) {
                return Err(DomError::HierarchyRequest(format!(
                    "node {} is an inclusive ancestor of {}",
                    id, parent
                )));
            }
            match node.node_type {
                NodeType::Document => {
                    return Err(DomError::HierarchyRequest(
                        "a document cannot be inserted".to_string(),
                    ));
                }
                NodeType::DocumentFragment if node.is_shadow_root() => {
                    return Err(DomError::HierarchyRequest(
                        "a shadow root cannot be inserted".to_string(),
                    ));
                }
                NodeType::DocumentFragment => expanded.extend(node.children_ids.iter().copied()),
                _ => expanded.push(id),
            }
        }
        Ok(expanded)
    }
}

/// Document-order walk below a root, see [`DomArena::descendants`]
pub struct Descendants<'a> {
    arena: &'a DomArena,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a DomNode;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let id = self.stack.pop()?;
            if let Ok(node) = self.arena.get(id) {
                self.stack.extend(node.children_ids.iter().rev().copied());
                return Some(node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn arena() -> DomArena {
        DomArena::new(DocumentId::new())
    }

    fn names(arena: &DomArena, parent: NodeId) -> Vec<String> {
        arena
            .children(parent)
            .unwrap()
            .iter()
            .map(|n| {
                if n.is_text() {
                    n.node_value.clone()
                } else {
                    n.node_name.clone()
                }
            })
            .collect()
    }

    #[test]
    fn test_arena_basic() {
        let mut arena = arena();
        let id = arena.create_element("DIV");

        let retrieved = arena.get(id).unwrap();
        assert_eq!(retrieved.node_name, "div");
        assert_eq!(retrieved.namespace.as_deref(), Some(HTML_NAMESPACE));
        assert_eq!(retrieved.owner_document(), arena.owner());
        assert!(matches!(arena.get(99), Err(DomError::NodeNotFound(99))));
    }

    #[test]
    fn test_append_and_prepend_preserve_order() {
        let mut arena = arena();
        let root = arena.create_element("div");
        let a = arena.create_element("a");
        let b = arena.create_element("b");
        let c = arena.create_element("i");
        let d = arena.create_element("em");

        arena.append_children(root, &[a, b]).unwrap();
        arena.prepend_children(root, &[c, d]).unwrap();

        assert_eq!(names(&arena, root), vec!["i", "em", "a", "b"]);
        assert_eq!(arena.get(c).unwrap().parent_id(), Some(root));
    }

    #[test]
    fn test_append_moves_node_from_old_parent() {
        let mut arena = arena();
        let first = arena.create_element("div");
        let second = arena.create_element("div");
        let child = arena.create_element("span");

        arena.append_children(first, &[child]).unwrap();
        arena.append_children(second, &[child]).unwrap();

        assert!(arena.get(first).unwrap().children_ids().is_empty());
        assert_eq!(arena.get(second).unwrap().children_ids(), &[child]);
    }

    #[test]
    fn test_fragment_insertion_moves_children() {
        let mut arena = arena();
        let root = arena.create_element("ul");
        let fragment = arena.create_fragment();
        let one = arena.create_element("li");
        let two = arena.create_element("li");
        arena.append_children(fragment, &[one, two]).unwrap();

        arena.append_children(root, &[fragment]).unwrap();

        assert_eq!(arena.get(root).unwrap().children_ids(), &[one, two]);
        assert!(arena.get(fragment).unwrap().children_ids().is_empty());
    }

    #[test]
    fn test_hierarchy_errors() {
        let mut arena = arena();
        let outer = arena.create_element("div");
        let inner = arena.create_element("div");
        let text = arena.create_text("t");
        let doc = arena.create_document_node();
        arena.append_children(outer, &[inner]).unwrap();

        assert!(matches!(
            arena.append_children(inner, &[outer]),
            Err(DomError::HierarchyRequest(_))
        ));
        assert!(matches!(
            arena.append_children(outer, &[outer]),
            Err(DomError::HierarchyRequest(_))
        ));
        assert!(matches!(
            arena.append_children(text, &[inner]),
            Err(DomError::HierarchyRequest(_))
        ));
        assert!(matches!(
            arena.append_children(outer, &[doc]),
            Err(DomError::HierarchyRequest(_))
        ));
        // Failed insertions leave the tree untouched
        assert_eq!(arena.get(outer).unwrap().children_ids(), &[inner]);

        // fragment -> held -> nested: the fragment may not go below `nested`
        let fragment = arena.create_fragment();
        let held = arena.create_element("section");
        let nested = arena.create_element("p");
        arena.append_children(held, &[nested]).unwrap();
        arena.append_children(fragment, &[held]).unwrap();
        assert!(matches!(
            arena.append_children(nested, &[fragment]),
            Err(DomError::HierarchyRequest(_))
        ));
        assert!(matches!(
            arena.prepend_children(nested, &[fragment]),
            Err(DomError::HierarchyRequest(_))
        ));
        assert!(matches!(
            arena.replace_all(nested, Some(fragment), false),
            Err(DomError::HierarchyRequest(_))
        ));
        assert!(matches!(
            arena.append_children(fragment, &[fragment]),
            Err(DomError::HierarchyRequest(_))
        ));
        assert_eq!(arena.get(held).unwrap().parent_id(), Some(fragment));
        assert_eq!(arena.get(nested).unwrap().parent_id(), Some(held));
        assert!(arena.get(nested).unwrap().children_ids().is_empty());
        assert_eq!(arena.descendants(fragment).count(), 2);
    }

    #[test]
    fn test_replace_all() {
        let mut arena = arena();
        let root = arena.create_element("div");
        let a = arena.create_text("a");
        let b = arena.create_text("b");
        arena.append_children(root, &[a, b]).unwrap();

        let c = arena.create_text("c");
        arena.replace_all(root, Some(c), false).unwrap();
        assert_eq!(names(&arena, root), vec!["c"]);
        assert_eq!(arena.get(a).unwrap().parent_id(), None);

        arena.replace_all(root, None, true).unwrap();
        assert!(arena.get(root).unwrap().children_ids().is_empty());
    }

    #[test]
    fn test_generation_bumps_on_mutation_only() {
        let mut arena = arena();
        let root = arena.create_element("div");
        let child = arena.create_element("p");
        let before = arena.generation();

        arena.get_mut(child).unwrap().set_attr("id", "x");
        assert_eq!(arena.generation(), before);

        arena.append_children(root, &[child]).unwrap();
        assert!(arena.generation() > before);
    }

    #[test]
    fn test_clone_shallow_and_deep() {
        let mut arena = arena();
        let root = arena.create_element("div");
        arena.get_mut(root).unwrap().set_attr("class", "box");
        let span = arena.create_element("span");
        let text = arena.create_text("hi");
        arena.append_children(span, &[text]).unwrap();
        arena.append_children(root, &[span]).unwrap();

        let shallow = arena.clone_node(root, false).unwrap();
        assert!(arena.get(shallow).unwrap().children_ids().is_empty());
        assert_eq!(arena.get(shallow).unwrap().attr("class"), Some("box"));

        let deep = arena.clone_node(root, true).unwrap();
        let copied: Vec<NodeId> = arena.descendants(deep).map(|n| n.node_id()).collect();
        let original: Vec<NodeId> = arena.descendants(root).map(|n| n.node_id()).collect();
        assert_eq!(copied.len(), original.len());
        assert!(copied.iter().all(|id| !original.contains(id)));
        assert_eq!(arena.get(copied[1]).unwrap().node_value, "hi");
        assert_eq!(arena.get(deep).unwrap().parent_id(), None);
    }

    #[test]
    fn test_descendants_document_order() {
        let mut arena = arena();
        // root -> [a -> [b], c]
        let root = arena.create_element("div");
        let a = arena.create_element("a");
        let b = arena.create_element("b");
        let c = arena.create_element("c");
        arena.append_children(a, &[b]).unwrap();
        arena.append_children(root, &[a, c]).unwrap();

        let order: Vec<_> = arena.descendants(root).map(|n| n.node_name.clone()).collect();
        assert_eq!(order, vec!["a", "b", "c"]);

        let mut visited = Vec::new();
        arena
            .traverse_df(root, |node| {
                visited.push(node.node_name.clone());
                Ok(())
            })
            .unwrap();
        assert_eq!(visited, vec!["div", "a", "b", "c"]);
    }

    #[test]
    fn test_attach_shadow_rules() {
        let mut arena = arena();
        let host = arena.create_element("div");
        let text = arena.create_text("t");

        let shadow = arena.attach_shadow(host, ShadowRootMode::Open).unwrap();
        let node = arena.get(shadow).unwrap();
        assert_eq!(node.host_id(), Some(host));
        assert_eq!(node.shadow_root_mode(), Some(ShadowRootMode::Open));
        assert_eq!(arena.get(host).unwrap().shadow_root_id(), Some(shadow));

        assert!(matches!(
            arena.attach_shadow(host, ShadowRootMode::Closed),
            Err(DomError::InvalidState(_))
        ));
        assert!(matches!(
            arena.attach_shadow(text, ShadowRootMode::Open),
            Err(DomError::InvalidNodeType { .. })
        ));

        let other = arena.create_element("div");
        assert!(matches!(
            arena.append_children(other, &[shadow]),
            Err(DomError::HierarchyRequest(_))
        ));

        let copy = arena.clone_node(shadow, true).unwrap();
        assert!(!arena.get(copy).unwrap().is_shadow_root());
    }
}
