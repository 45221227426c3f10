//! Reference-addressed facade over the index tree model.
//!
//! Application code tracks data identity, not transient sibling indices
//! that shift under concurrent edits. This layer maps a caller-supplied
//! key (extracted from the item) to the structural node, and recomputes
//! the path for an item at call time — paths are never cached across
//! mutations.

use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

use crate::list::TreeSink;
use crate::tree::index::{IndexTreeModel, NodeId, NodeRef};
use crate::tree::TreeElement;

/// Item-keyed tree: the same operation surface as [`IndexTreeModel`],
/// addressed by data items instead of paths. `None` denotes the synthetic
/// root for whole-tree operations.
///
/// Unknown items are programmer errors and panic, mirroring the model's
/// invalid-location behavior; probe with [`has_node`] first when in doubt.
///
/// [`has_node`]: ObjectTree::has_node
pub struct ObjectTree<T, K> {
    model: IndexTreeModel<T>,
    key_of: Rc<dyn Fn(&T) -> K>,
    nodes: HashMap<K, NodeId>,
}

impl<T: Clone, K: Eq + Hash + Clone> ObjectTree<T, K> {
    pub fn new(key_of: Rc<dyn Fn(&T) -> K>, sink: Rc<RefCell<dyn TreeSink<T>>>) -> Self {
        Self {
            model: IndexTreeModel::new(sink),
            key_of,
            nodes: HashMap::new(),
        }
    }

    /// Replace the entire child list of `parent` with `elements`, as one
    /// batched structural edit. The key map is updated from the splice
    /// outcome: removed subtrees are unmapped, inserted ones mapped.
    pub fn splice(&mut self, parent: Option<&K>, elements: Vec<TreeElement<T>>) {
        let mut path = self.location(parent);
        let child_count = self.model.get_node(&path).child_count();
        path.push(0);
        let outcome = self.model.splice(&path, child_count, elements);
        // Unmap before mapping: a re-inserted identity must end up pointing
        // at its fresh node.
        for element in &outcome.removed {
            self.nodes.remove(&(self.key_of)(element));
        }
        for &id in &outcome.inserted {
            let key = (self.key_of)(
                self.model
                    .node(id)
                    .element()
                    .expect("inserted nodes always carry an element"),
            );
            self.nodes.insert(key, id);
        }
    }

    /// Total visible node count, root excluded.
    pub fn size(&self) -> usize {
        self.model.size()
    }

    pub fn has_node(&self, item: &K) -> bool {
        self.nodes.contains_key(item)
    }

    /// Node for `item`; panics if the item is not materialized.
    pub fn get_node(&self, item: &K) -> NodeRef<'_, T> {
        self.model.node(self.require(item))
    }

    /// Recompute the structural path of `item` by walking parent links.
    pub fn path_of(&self, item: &K) -> Vec<usize> {
        self.model.location_of(self.require(item))
    }

    /// Flat index of `item` in the visible rendering sequence.
    pub fn list_index(&self, item: &K) -> usize {
        self.model.list_index(&self.path_of(item))
    }

    pub fn is_collapsible(&self, item: &K) -> bool {
        self.model.node(self.require(item)).collapsible()
    }

    pub fn is_collapsed(&self, item: &K) -> bool {
        self.model.node(self.require(item)).collapsed()
    }

    pub fn set_collapsed(&mut self, item: &K, collapsed: bool, recursive: bool) -> bool {
        let path = self.path_of(item);
        self.model.set_collapsed(&path, collapsed, recursive)
    }

    pub fn set_all_collapsed(&mut self, collapsed: bool) {
        self.model.set_all_collapsed(collapsed);
    }

    /// Re-emit the row for `item`, or every row when `item` is `None`.
    pub fn rerender(&mut self, item: Option<&K>) {
        match item {
            Some(item) => {
                let path = self.path_of(item);
                self.model.rerender(&path);
            }
            None => self.model.rerender_all(),
        }
    }

    fn location(&self, item: Option<&K>) -> Vec<usize> {
        match item {
            None => Vec::new(),
            Some(item) => self.path_of(item),
        }
    }

    fn require(&self, item: &K) -> NodeId {
        match self.nodes.get(item) {
            Some(&id) => id,
            None => panic!("item is not materialized in the tree"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::RowBuffer;

    type Shared = Rc<RefCell<RowBuffer<&'static str>>>;

    fn tree() -> (ObjectTree<&'static str, &'static str>, Shared) {
        let buffer: Shared = Rc::new(RefCell::new(RowBuffer::new()));
        let tree = ObjectTree::new(Rc::new(|item: &&'static str| *item), buffer.clone());
        (tree, buffer)
    }

    fn leaves(values: &[&'static str]) -> Vec<TreeElement<&'static str>> {
        values.iter().map(|&v| TreeElement::leaf(v)).collect()
    }

    fn row_elements(buffer: &Shared) -> Vec<&'static str> {
        buffer.borrow().rows().iter().map(|r| r.element).collect()
    }

    #[test]
    fn splice_none_sets_root_children() {
        let (mut tree, buffer) = tree();
        tree.splice(None, leaves(&["a", "b"]));
        assert_eq!(tree.size(), 2);
        assert_eq!(row_elements(&buffer), vec!["a", "b"]);
        assert!(tree.has_node(&"a"));
    }

    #[test]
    fn splice_by_item_replaces_that_subtree() {
        let (mut tree, buffer) = tree();
        tree.splice(None, leaves(&["a", "b"]));
        tree.splice(Some(&"a"), leaves(&["a1", "a2"]));
        assert_eq!(row_elements(&buffer), vec!["a", "a1", "a2", "b"]);
        assert_eq!(tree.get_node(&"a1").depth(), 2);
        assert_eq!(tree.get_node(&"a1").parent().unwrap().element(), Some(&"a"));
    }

    #[test]
    fn removed_items_become_unreachable() {
        let (mut tree, _buffer) = tree();
        tree.splice(None, leaves(&["a", "b"]));
        tree.splice(Some(&"a"), leaves(&["a1"]));
        tree.splice(None, leaves(&["b"]));
        assert!(!tree.has_node(&"a"));
        assert!(!tree.has_node(&"a1"));
        assert!(tree.has_node(&"b"));
    }

    #[test]
    fn reinserted_identity_maps_to_the_fresh_node() {
        let (mut tree, _buffer) = tree();
        tree.splice(None, leaves(&["a", "b"]));
        // Same identities, new order: the map must follow the new nodes.
        tree.splice(None, leaves(&["b", "a"]));
        assert_eq!(tree.path_of(&"b"), vec![0]);
        assert_eq!(tree.path_of(&"a"), vec![1]);
    }

    #[test]
    fn paths_are_recomputed_after_sibling_shifts() {
        let (mut tree, _buffer) = tree();
        tree.splice(None, leaves(&["b"]));
        assert_eq!(tree.path_of(&"b"), vec![0]);
        tree.splice(None, leaves(&["a", "b", "c"]));
        assert_eq!(tree.path_of(&"b"), vec![1]);
        assert_eq!(tree.list_index(&"c"), 2);
    }

    #[test]
    fn collapse_by_item() {
        let (mut tree, buffer) = tree();
        tree.splice(None, leaves(&["a", "b"]));
        tree.splice(Some(&"a"), leaves(&["a1"]));
        assert!(tree.is_collapsible(&"a"));
        assert!(tree.set_collapsed(&"a", true, false));
        assert!(tree.is_collapsed(&"a"));
        assert_eq!(row_elements(&buffer), vec!["a", "b"]);
    }

    #[test]
    fn rerender_whole_tree_replays_all_rows() {
        let (mut tree, buffer) = tree();
        tree.splice(None, leaves(&["a", "b"]));
        let before = row_elements(&buffer);
        tree.rerender(None);
        assert_eq!(row_elements(&buffer), before);
    }

    #[test]
    #[should_panic(expected = "not materialized")]
    fn get_node_panics_on_unknown_item() {
        let (tree, _buffer) = tree();
        tree.get_node(&"ghost");
    }
}
