//! Index-addressed tree model: the structural store and visible-count
//! bookkeeping layer.
//!
//! Nodes live in an arena; a node's parent link is a plain arena index, so
//! the object graph has no reference cycles and detaching a subtree is one
//! edit of the owning child list plus slot frees. Paths (sequences of
//! sibling indices relative to the synthetic root) are ephemeral and are
//! recomputed by callers after every mutation.

use std::cell::RefCell;
use std::rc::Rc;

use log::trace;

use crate::list::{FlatEntry, TreeSink};
use crate::tree::TreeElement;

/// Arena slot index of the synthetic root.
const ROOT: usize = 0;

/// Opaque handle to a live node. Stale handles (nodes spliced out) must not
/// be dereferenced; the facade layer guarantees this by unmapping them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

#[derive(Debug)]
struct Node<T> {
    /// `None` only for the synthetic root.
    element: Option<T>,
    parent: usize,
    children: Vec<usize>,
    depth: usize,
    collapsible: bool,
    collapsed: bool,
    /// True iff every ancestor is expanded; the root is always visible.
    visible: bool,
    /// 0 if `!visible`, else 1 + (collapsed ? 0 : Σ children counts).
    visible_count: usize,
}

/// What a `splice` did, for layers that track nodes by identity.
#[derive(Debug)]
pub struct SpliceOutcome<T> {
    /// Every created node, in pre-order.
    pub inserted: Vec<NodeId>,
    /// Elements of every removed node, in pre-order.
    pub removed: Vec<T>,
}

/// A multiway tree addressed by paths of sibling indices.
///
/// The model owns all nodes and is the only component that emits row-level
/// splice instructions to the external sink. Out-of-range paths are
/// programmer errors and panic; validate untrusted paths with [`has_node`]
/// first.
///
/// [`has_node`]: IndexTreeModel::has_node
pub struct IndexTreeModel<T> {
    slots: Vec<Option<Node<T>>>,
    free: Vec<usize>,
    sink: Rc<RefCell<dyn TreeSink<T>>>,
}

impl<T: Clone> IndexTreeModel<T> {
    /// Create an empty model. The sink must not call back into the model.
    pub fn new(sink: Rc<RefCell<dyn TreeSink<T>>>) -> Self {
        let root = Node {
            element: None,
            parent: ROOT,
            children: Vec::new(),
            depth: 0,
            collapsible: false,
            collapsed: false,
            visible: true,
            visible_count: 1,
        };
        Self {
            slots: vec![Some(root)],
            free: Vec::new(),
            sink,
        }
    }

    /// Total visible node count, root excluded.
    pub fn size(&self) -> usize {
        self.slot(ROOT).visible_count - 1
    }

    /// Whether a node exists at `path`. Total: never panics. The empty
    /// path denotes the root and always exists.
    pub fn has_node(&self, path: &[usize]) -> bool {
        self.node_at(path).is_some()
    }

    /// Node at `path`; panics if the path is out of range.
    pub fn get_node(&self, path: &[usize]) -> NodeRef<'_, T> {
        let id = self.require(path);
        NodeRef { model: self, id }
    }

    pub fn node(&self, id: NodeId) -> NodeRef<'_, T> {
        NodeRef { model: self, id: id.0 }
    }

    /// Reconstruct a node's path by walking parent links. O(depth).
    pub fn location_of(&self, id: NodeId) -> Vec<usize> {
        let mut path = Vec::new();
        let mut cur = id.0;
        while cur != ROOT {
            let parent = self.slot(cur).parent;
            let pos = self
                .slot(parent)
                .children
                .iter()
                .position(|&c| c == cur)
                .expect("child missing from its parent's child list");
            path.push(pos);
            cur = parent;
        }
        path.reverse();
        path
    }

    /// Flat index of the node at `path` in the visible rendering sequence.
    /// O(depth); sums preceding siblings' visible counts at each level.
    /// Panics on the empty path (the root is not a rendered row) or an
    /// out-of-range path. Meaningful only for visible nodes.
    pub fn list_index(&self, path: &[usize]) -> usize {
        assert!(!path.is_empty(), "the root is not a rendered row");
        let id = self.require(path);
        self.row_index_of(id)
    }

    pub fn is_collapsible(&self, path: &[usize]) -> bool {
        self.slot(self.require(path)).collapsible
    }

    pub fn is_collapsed(&self, path: &[usize]) -> bool {
        self.slot(self.require(path)).collapsed
    }

    /// Structural edit: at the parent addressed by `path[..len-1]`, remove
    /// `delete_count` children starting at `path[len-1]` and insert
    /// `elements` there, as whole subtrees.
    ///
    /// Emits at most one row splice. If some ancestor is collapsed the
    /// count bookkeeping is updated internally and no rows are emitted;
    /// the change surfaces when the ancestor is expanded.
    pub fn splice(
        &mut self,
        path: &[usize],
        delete_count: usize,
        elements: Vec<TreeElement<T>>,
    ) -> SpliceOutcome<T> {
        let (&insert_at, parent_path) = path
            .split_last()
            .expect("splice path must not be empty: the root itself cannot be spliced");
        let parent_id = match self.node_at(parent_path) {
            Some(id) => id,
            None => panic!("invalid tree location {parent_path:?}"),
        };
        let (revealed, was_collapsible, child_len) = {
            let parent = self.slot(parent_id);
            (
                parent.visible && !parent.collapsed,
                parent.collapsible,
                parent.children.len(),
            )
        };
        assert!(
            insert_at <= child_len,
            "invalid tree location {path:?}: index {insert_at} out of range 0..={child_len}"
        );
        let delete_count = delete_count.min(child_len - insert_at);

        // Build the inserted subtrees with an explicit work stack; counts
        // are then settled bottom-up over the creation order.
        let mut created: Vec<usize> = Vec::new();
        let mut top: Vec<usize> = Vec::new();
        let mut stack: Vec<(TreeElement<T>, usize)> = elements
            .into_iter()
            .rev()
            .map(|element| (element, parent_id))
            .collect();
        while let Some((element, pid)) = stack.pop() {
            let (p_visible, p_collapsed, p_depth) = {
                let p = self.slot(pid);
                (p.visible, p.collapsed, p.depth)
            };
            let TreeElement {
                element: data,
                collapsible,
                collapsed,
                children,
            } = element;
            // A node with children is always allowed to collapse.
            let collapsible = collapsible || !children.is_empty();
            let collapsed = collapsed && collapsible;
            let visible = p_visible && !p_collapsed;
            let id = self.alloc(Node {
                element: Some(data),
                parent: pid,
                children: Vec::new(),
                depth: p_depth + 1,
                collapsible,
                collapsed,
                visible,
                visible_count: usize::from(visible),
            });
            if pid == parent_id {
                top.push(id);
            } else {
                self.slot_mut(pid).children.push(id);
            }
            created.push(id);
            for child in children.into_iter().rev() {
                stack.push((child, id));
            }
        }
        for &id in created.iter().rev() {
            let (count, pid) = {
                let n = self.slot(id);
                (n.visible_count, n.parent)
            };
            // Hidden subtrees contribute 0, so the addition is safe for
            // collapsed parents too.
            if pid != parent_id {
                self.slot_mut(pid).visible_count += count;
            }
        }
        let inserted_total: usize = top.iter().map(|&id| self.slot(id).visible_count).sum();

        // Detach and free the deleted range.
        let removed_ids: Vec<usize> =
            self.slot(parent_id).children[insert_at..insert_at + delete_count].to_vec();
        let deleted_total: usize = removed_ids
            .iter()
            .map(|&id| self.slot(id).visible_count)
            .sum();
        self.slot_mut(parent_id)
            .children
            .splice(insert_at..insert_at + delete_count, top.iter().copied());
        let removed = self.free_subtrees(&removed_ids);

        if !self.slot(parent_id).children.is_empty() {
            self.slot_mut(parent_id).collapsible = true;
        }
        let collapsible_changed = self.slot(parent_id).collapsible != was_collapsible;

        if revealed {
            let delta = inserted_total as isize - deleted_total as isize;
            if delta != 0 {
                self.propagate(parent_id, delta);
            }
            if inserted_total > 0 || deleted_total > 0 {
                let start = self.flat_offset(parent_id, insert_at);
                let mut rows = Vec::with_capacity(inserted_total);
                for &id in &top {
                    self.visible_rows_into(id, &mut rows);
                }
                trace!(
                    "splice at {:?}: rows {}..+{} -> {} inserted",
                    path,
                    start,
                    deleted_total,
                    rows.len()
                );
                self.sink.borrow_mut().on_splice(start, deleted_total, rows);
            }
        }
        // The parent's own row shows a twistie now (or stopped being
        // collapsible); refresh its snapshot.
        if collapsible_changed && parent_id != ROOT && self.slot(parent_id).visible {
            let row = self.row_index_of(parent_id);
            let snapshot = self.snapshot(parent_id);
            self.sink.borrow_mut().on_splice(row, 1, vec![snapshot]);
        }

        SpliceOutcome {
            inserted: created.into_iter().map(NodeId).collect(),
            removed,
        }
    }

    /// Set the collapse flag of the node at `path` (and, if `recursive`,
    /// of every collapsible descendant). Returns whether anything changed.
    ///
    /// Emits a single splice replacing the node's own row together with
    /// its descendant range, so the renderer's twistie snapshot stays
    /// fresh. No data is created or discarded.
    pub fn set_collapsed(&mut self, path: &[usize], collapsed: bool, recursive: bool) -> bool {
        let id = self.require(path);
        if id == ROOT {
            return false;
        }
        if collapsed && !self.slot(id).collapsible {
            return false;
        }
        let mut changed = self.slot(id).collapsed != collapsed;
        self.slot_mut(id).collapsed = collapsed;
        if recursive {
            changed |= self.set_descendants_collapsed(id, collapsed);
        }
        if !changed {
            return false;
        }
        if !self.slot(id).visible {
            // Banked: the subtree is inside a collapsed ancestor; counts
            // there are already zero and will be recomputed on expand.
            return true;
        }
        let old_count = self.slot(id).visible_count;
        self.refresh_subtree(id);
        let new_count = self.slot(id).visible_count;
        let delta = new_count as isize - old_count as isize;
        if delta != 0 {
            self.propagate(self.slot(id).parent, delta);
        }
        let start = self.row_index_of(id);
        let mut rows = Vec::with_capacity(new_count);
        self.visible_rows_into(id, &mut rows);
        self.sink.borrow_mut().on_splice(start, old_count, rows);
        true
    }

    /// Collapse or expand every collapsible node at once. Emits one splice
    /// replacing the whole visible sequence if anything changed.
    pub fn set_all_collapsed(&mut self, collapsed: bool) {
        let old_size = self.size();
        let mut changed = false;
        let mut stack: Vec<usize> = self.slot(ROOT).children.clone();
        while let Some(id) = stack.pop() {
            let node = self.slot_mut(id);
            if node.collapsible && node.collapsed != collapsed {
                node.collapsed = collapsed;
                changed = true;
            }
            stack.extend(self.slot(id).children.iter().copied());
        }
        if !changed {
            return;
        }
        let children: Vec<usize> = self.slot(ROOT).children.clone();
        let mut total = 1;
        for &child in &children {
            self.refresh_subtree(child);
            total += self.slot(child).visible_count;
        }
        self.slot_mut(ROOT).visible_count = total;
        let mut rows = Vec::with_capacity(total - 1);
        for &child in &children {
            self.visible_rows_into(child, &mut rows);
        }
        self.sink.borrow_mut().on_splice(0, old_size, rows);
    }

    /// Re-emit every visible row. No structural change.
    pub fn rerender_all(&mut self) {
        let old_size = self.size();
        let children: Vec<usize> = self.slot(ROOT).children.clone();
        let mut rows = Vec::with_capacity(old_size);
        for &child in &children {
            self.visible_rows_into(child, &mut rows);
        }
        self.sink.borrow_mut().on_splice(0, old_size, rows);
    }

    /// Re-emit the row for the node at `path` so the renderer picks up
    /// mutated display fields of its element. No structural change.
    pub fn rerender(&mut self, path: &[usize]) {
        let id = self.require(path);
        if id == ROOT || !self.slot(id).visible {
            return;
        }
        let row = self.row_index_of(id);
        let snapshot = self.snapshot(id);
        self.sink.borrow_mut().on_splice(row, 1, vec![snapshot]);
    }

    // ── internals ────────────────────────────────────────────────────────

    fn slot(&self, id: usize) -> &Node<T> {
        self.slots[id].as_ref().expect("stale node id")
    }

    fn slot_mut(&mut self, id: usize) -> &mut Node<T> {
        self.slots[id].as_mut().expect("stale node id")
    }

    fn alloc(&mut self, node: Node<T>) -> usize {
        match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    fn node_at(&self, path: &[usize]) -> Option<usize> {
        let mut cur = ROOT;
        for &step in path {
            cur = *self.slot(cur).children.get(step)?;
        }
        Some(cur)
    }

    fn require(&self, path: &[usize]) -> usize {
        match self.node_at(path) {
            Some(id) => id,
            None => panic!("invalid tree location {path:?}"),
        }
    }

    /// Detach-free the given subtrees, returning their elements pre-order.
    fn free_subtrees(&mut self, roots: &[usize]) -> Vec<T> {
        let mut removed = Vec::new();
        let mut stack: Vec<usize> = roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            let node = self.slots[id].take().expect("stale node id");
            self.free.push(id);
            removed.push(node.element.expect("the root cannot be removed"));
            stack.extend(node.children.iter().rev().copied());
        }
        removed
    }

    /// Add `delta` to the visible count of `from` and every ancestor.
    fn propagate(&mut self, from: usize, delta: isize) {
        let mut cur = from;
        loop {
            let node = self.slot_mut(cur);
            node.visible_count = (node.visible_count as isize + delta) as usize;
            if cur == ROOT {
                break;
            }
            cur = self.slot(cur).parent;
        }
    }

    /// Flat index of a node's own row.
    fn row_index_of(&self, id: usize) -> usize {
        let mut index = 0;
        let mut cur = id;
        while cur != ROOT {
            let parent = self.slot(cur).parent;
            let siblings = &self.slot(parent).children;
            let pos = siblings
                .iter()
                .position(|&c| c == cur)
                .expect("child missing from its parent's child list");
            index += siblings[..pos]
                .iter()
                .map(|&c| self.slot(c).visible_count)
                .sum::<usize>();
            if parent != ROOT {
                index += 1;
            }
            cur = parent;
        }
        index
    }

    /// Flat index where the `child_index`-th child of `parent_id` starts.
    fn flat_offset(&self, parent_id: usize, child_index: usize) -> usize {
        let base = if parent_id == ROOT {
            0
        } else {
            self.row_index_of(parent_id) + 1
        };
        base + self.slot(parent_id).children[..child_index]
            .iter()
            .map(|&c| self.slot(c).visible_count)
            .sum::<usize>()
    }

    /// Set the collapse flag on every collapsible strict descendant.
    fn set_descendants_collapsed(&mut self, id: usize, collapsed: bool) -> bool {
        let mut changed = false;
        let mut stack: Vec<usize> = self.slot(id).children.clone();
        while let Some(cur) = stack.pop() {
            let node = self.slot_mut(cur);
            if node.collapsible && node.collapsed != collapsed {
                node.collapsed = collapsed;
                changed = true;
            }
            stack.extend(self.slot(cur).children.iter().copied());
        }
        changed
    }

    /// Recompute visibility flags (top-down) and visible counts (bottom-up)
    /// for the subtree rooted at `id`, whose own visibility is already set.
    fn refresh_subtree(&mut self, id: usize) {
        let mut order = vec![id];
        let mut i = 0;
        while i < order.len() {
            let cur = order[i];
            i += 1;
            let (visible, collapsed) = {
                let n = self.slot(cur);
                (n.visible, n.collapsed)
            };
            let kids = self.slot(cur).children.clone();
            for &child in &kids {
                self.slot_mut(child).visible = visible && !collapsed;
                order.push(child);
            }
        }
        for &cur in order.iter().rev() {
            let count = {
                let n = self.slot(cur);
                if !n.visible {
                    0
                } else if n.collapsed {
                    1
                } else {
                    1 + n
                        .children
                        .iter()
                        .map(|&c| self.slot(c).visible_count)
                        .sum::<usize>()
                }
            };
            self.slot_mut(cur).visible_count = count;
        }
    }

    fn snapshot(&self, id: usize) -> FlatEntry<T> {
        let node = self.slot(id);
        FlatEntry {
            element: node
                .element
                .clone()
                .expect("the root is never snapshotted"),
            depth: node.depth,
            collapsible: node.collapsible,
            collapsed: node.collapsed,
        }
    }

    /// Append the visible rows of the subtree at `id` in pre-order.
    fn visible_rows_into(&self, id: usize, rows: &mut Vec<FlatEntry<T>>) {
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let node = self.slot(cur);
            if !node.visible {
                continue;
            }
            rows.push(self.snapshot(cur));
            if !node.collapsed {
                stack.extend(node.children.iter().rev().copied());
            }
        }
    }
}

/// Borrowed view of a node and its neighborhood.
pub struct NodeRef<'a, T> {
    model: &'a IndexTreeModel<T>,
    id: usize,
}

impl<'a, T: Clone> NodeRef<'a, T> {
    /// The node's element; `None` for the synthetic root.
    pub fn element(&self) -> Option<&'a T> {
        self.model.slot(self.id).element.as_ref()
    }

    pub fn depth(&self) -> usize {
        self.model.slot(self.id).depth
    }

    pub fn collapsible(&self) -> bool {
        self.model.slot(self.id).collapsible
    }

    pub fn collapsed(&self) -> bool {
        self.model.slot(self.id).collapsed
    }

    pub fn visible(&self) -> bool {
        self.model.slot(self.id).visible
    }

    pub fn visible_count(&self) -> usize {
        self.model.slot(self.id).visible_count
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT
    }

    pub fn id(&self) -> NodeId {
        NodeId(self.id)
    }

    pub fn parent(&self) -> Option<NodeRef<'a, T>> {
        if self.id == ROOT {
            return None;
        }
        Some(NodeRef {
            model: self.model,
            id: self.model.slot(self.id).parent,
        })
    }

    pub fn child_count(&self) -> usize {
        self.model.slot(self.id).children.len()
    }

    pub fn children(&self) -> Vec<NodeRef<'a, T>> {
        self.model
            .slot(self.id)
            .children
            .iter()
            .map(|&id| NodeRef {
                model: self.model,
                id,
            })
            .collect()
    }
}
