//! Live element collections
//!
//! A collection is the ordered list of elements under a root: its element
//! children (`deep == false`) or every element descendant (`deep == true`).
//! Collections are built on first access and cached per `(root, deep)` pair
//! in the owning document. A cached collection is reused until the tree
//! changes structurally; the next access after a mutation rebuilds it.

use crate::arena::DomArena;
use crate::types::NodeId;
use ahash::RandomState;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Views stamped with the tree generation they were computed at
pub(crate) trait Materialized {
    fn generation(&self) -> u64;
}

/// One cache cell per key, populated by the first accessor.
///
/// Lives inside the document, so the document is the lock scope: readers
/// share `&Document`, mutation needs `&mut Document`.
#[derive(Debug)]
pub(crate) struct ViewCache<K: Eq + Hash, V> {
    cells: DashMap<K, Arc<V>, RandomState>,
}

impl<K: Eq + Hash, V: Materialized> ViewCache<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            cells: DashMap::with_hasher(RandomState::new()),
        }
    }

    /// Cached view for `key`, rebuilt when it is older than `generation`
    pub(crate) fn get_or_build<F>(&self, key: K, generation: u64, build: F) -> Arc<V>
    where
        F: FnOnce() -> V,
    {
        // The entry guard holds the shard lock: `build` must not touch this cache
        match self.cells.entry(key) {
            Entry::Occupied(mut cell) => {
                if cell.get().generation() != generation {
                    cell.insert(Arc::new(build()));
                }
                Arc::clone(cell.get())
            }
            Entry::Vacant(cell) => {
                let view = Arc::new(build());
                cell.insert(Arc::clone(&view));
                view
            }
        }
    }

    pub(crate) fn clear(&self) {
        self.cells.clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.cells.len()
    }
}

/// Ordered, cached view of the elements under a root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ElementCollection {
    root: NodeId,
    deep: bool,
    generation: u64,
    elements: Vec<NodeId>,
}

impl ElementCollection {
    /// Walk the tree below `root` and collect elements in document order
    pub fn materialize(arena: &DomArena, root: NodeId, deep: bool) -> Self {
        let elements: Vec<NodeId> = if deep {
            arena
                .descendants(root)
                .filter(|node| node.is_element())
                .map(|node| node.node_id())
                .collect()
        } else {
            arena
                .children(root)
                .map(|children| {
                    children
                        .into_iter()
                        .filter(|node| node.is_element())
                        .map(|node| node.node_id())
                        .collect()
                })
                .unwrap_or_default()
        };

        Self {
            root,
            deep,
            generation: arena.generation(),
            elements,
        }
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn is_deep(&self) -> bool {
        self.deep
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<NodeId> {
        self.elements.get(index).copied()
    }

    pub fn first(&self) -> Option<NodeId> {
        self.elements.first().copied()
    }

    pub fn last(&self) -> Option<NodeId> {
        self.elements.last().copied()
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.elements.contains(&node)
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.elements.iter().copied()
    }

    pub fn as_slice(&self) -> &[NodeId] {
        &self.elements
    }

    /// First element whose `id` or `name` attribute equals `name`
    pub fn named_item(&self, arena: &DomArena, name: &str) -> Option<NodeId> {
        if name.is_empty() {
            return None;
        }
        self.iter().find(|&id| {
            arena
                .get(id)
                .map(|node| node.attr("id") == Some(name) || node.attr("name") == Some(name))
                .unwrap_or(false)
        })
    }
}

impl Materialized for ElementCollection {
    fn generation(&self) -> u64 {
        self.generation
    }
}
