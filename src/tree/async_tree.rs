//! Asynchronous incremental tree: lazy population, diffing, single-flight
//! refresh.
//!
//! This layer wraps an [`ObjectTree`] and owns its own bookkeeping arena of
//! async nodes. A node's children are fetched from the [`ChildrenSource`]
//! only the first time they become observable; a `refresh` re-fetches them
//! and reconciles the result against the materialized nodes by identity, so
//! collapse state and already-loaded descendants survive re-synchronization
//! and the renderer sees exactly one coalesced splice per refreshed node.
//!
//! Concurrency is single-threaded and cooperative: the source fetch is the
//! only suspension point, no borrow is held across it, and refreshes
//! targeting the same node are merged into one in-flight operation.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::hash::Hash;
use std::rc::Rc;

use log::{debug, trace};
use tokio::sync::oneshot;

use crate::error::{Result, TreeError};
use crate::list::TreeSink;
use crate::source::ChildrenSource;
use crate::tree::object::ObjectTree;
use crate::tree::TreeElement;

/// Arena slot index of the root async node.
const ROOT: usize = 0;

/// Load state of an async node's own child list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    /// Children never fetched.
    Unloaded,
    /// A fetch is in flight; further refreshes merge into it.
    Loading,
    /// Children fetched at least once (possibly with a failed last attempt).
    Loaded,
}

/// Owned snapshot of one node's neighborhood, for application code.
#[derive(Debug, Clone)]
pub struct NodeInfo<T> {
    pub data: T,
    pub depth: usize,
    pub collapsible: bool,
    pub collapsed: bool,
    pub visible: bool,
    /// Parent's data item; `None` for the root.
    pub parent: Option<T>,
    /// Materialized children's data items, in order.
    pub children: Vec<T>,
}

struct Inflight<T> {
    waiters: Vec<oneshot::Sender<std::result::Result<(), T>>>,
}

impl<T> Default for Inflight<T> {
    fn default() -> Self {
        Self {
            waiters: Vec::new(),
        }
    }
}

struct AsyncNode<T> {
    item: T,
    state: LoadState,
    /// Set when a parent refresh kept this loaded-but-collapsed node; its
    /// next expansion revalidates the children.
    stale: bool,
    parent: Option<usize>,
    children: Vec<usize>,
    inflight: Option<Inflight<TreeError>>,
}

/// Arena slot with a generation counter, so a fetch that completes after
/// its node was spliced out can detect the fact and discard its result.
struct Slot<T> {
    generation: u64,
    node: Option<AsyncNode<T>>,
}

struct State<T, K> {
    tree: ObjectTree<T, K>,
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    index: HashMap<K, usize>,
    key_of: Rc<dyn Fn(&T) -> K>,
}

impl<T: Clone, K: Eq + Hash + Clone> State<T, K> {
    fn node(&self, id: usize) -> &AsyncNode<T> {
        self.slots[id].node.as_ref().expect("stale async node id")
    }

    fn node_mut(&mut self, id: usize) -> &mut AsyncNode<T> {
        self.slots[id].node.as_mut().expect("stale async node id")
    }

    fn alive(&self, id: usize, generation: u64) -> bool {
        self.slots[id].node.is_some() && self.slots[id].generation == generation
    }

    fn alloc(&mut self, node: AsyncNode<T>) -> usize {
        match self.free.pop() {
            Some(id) => {
                self.slots[id].node = Some(node);
                id
            }
            None => {
                self.slots.push(Slot {
                    generation: 0,
                    node: Some(node),
                });
                self.slots.len() - 1
            }
        }
    }

    /// Detach-free an async subtree: unmap keys, bump generations so late
    /// fetch results are discarded, and cancel any merged waiters.
    fn remove_subtree(&mut self, id: usize) {
        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            let slot = &mut self.slots[cur];
            slot.generation += 1;
            let node = slot.node.take().expect("stale async node id");
            self.free.push(cur);
            self.index.remove(&(self.key_of)(&node.item));
            if let Some(inflight) = node.inflight {
                for waiter in inflight.waiters {
                    let _ = waiter.send(Err(TreeError::Cancelled));
                }
            }
            stack.extend(node.children);
        }
    }
}

/// A tree whose children are pulled lazily from a [`ChildrenSource`].
///
/// Items are addressed by the key the injected `key_of` function extracts;
/// `None` denotes the root item wherever an `Option` is taken. Unknown
/// items are programmer errors and panic; probe with [`has_node`] first.
///
/// [`has_node`]: AsyncTree::has_node
pub struct AsyncTree<T, K> {
    state: RefCell<State<T, K>>,
    source: Rc<dyn ChildrenSource<T>>,
    key_of: Rc<dyn Fn(&T) -> K>,
}

impl<T: Clone, K: Eq + Hash + Clone> AsyncTree<T, K> {
    pub fn new(
        root: T,
        source: Rc<dyn ChildrenSource<T>>,
        key_of: Rc<dyn Fn(&T) -> K>,
        sink: Rc<RefCell<dyn TreeSink<T>>>,
    ) -> Self {
        let tree = ObjectTree::new(key_of.clone(), sink);
        let root_key = key_of(&root);
        let root_node = AsyncNode {
            item: root,
            state: LoadState::Unloaded,
            stale: false,
            parent: None,
            children: Vec::new(),
            inflight: None,
        };
        let state = State {
            tree,
            slots: vec![Slot {
                generation: 0,
                node: Some(root_node),
            }],
            free: Vec::new(),
            index: HashMap::from([(root_key, ROOT)]),
            key_of: key_of.clone(),
        };
        Self {
            state: RefCell::new(state),
            source,
            key_of,
        }
    }

    /// Total visible node count, root excluded.
    pub fn size(&self) -> usize {
        self.state.borrow().tree.size()
    }

    pub fn has_node(&self, item: &K) -> bool {
        self.state.borrow().index.contains_key(item)
    }

    /// Snapshot of the node for `item`; panics if the item is not
    /// materialized.
    pub fn get_node(&self, item: &K) -> NodeInfo<T> {
        let id = self.resolve(Some(item));
        let st = self.state.borrow();
        let node = st.node(id);
        let children = node
            .children
            .iter()
            .map(|&c| st.node(c).item.clone())
            .collect();
        if id == ROOT {
            return NodeInfo {
                data: node.item.clone(),
                depth: 0,
                collapsible: true,
                collapsed: false,
                visible: true,
                parent: None,
                children,
            };
        }
        let model_node = st.tree.get_node(item);
        NodeInfo {
            data: node.item.clone(),
            depth: model_node.depth(),
            collapsible: model_node.collapsible(),
            collapsed: model_node.collapsed(),
            visible: model_node.visible(),
            parent: node.parent.map(|p| st.node(p).item.clone()),
            children,
        }
    }

    pub fn is_collapsed(&self, item: &K) -> bool {
        let id = self.resolve(Some(item));
        if id == ROOT {
            return false;
        }
        self.state.borrow().tree.is_collapsed(item)
    }

    pub fn is_collapsible(&self, item: &K) -> bool {
        let id = self.resolve(Some(item));
        if id == ROOT {
            return true;
        }
        self.state.borrow().tree.is_collapsible(item)
    }

    /// Current load state of `item` (root when `None`).
    pub fn load_state(&self, item: Option<&K>) -> LoadState {
        let id = self.resolve(item);
        self.state.borrow().node(id).state
    }

    /// Re-fetch the children of `item` (root when `None`) and reconcile
    /// them against the materialized nodes. Kept items preserve their
    /// node, collapse state and loaded descendants; new items materialize
    /// with the source's default collapse state; vanished items are
    /// dropped with their whole subtree. One splice per refreshed node,
    /// none when nothing changed.
    ///
    /// On fetch failure the previously materialized children are left
    /// untouched, the node stays retry-eligible and the error propagates
    /// to every merged caller.
    pub async fn refresh(&self, item: Option<&K>) -> Result<()> {
        let id = self.resolve(item);
        self.refresh_node(id, false).await
    }

    /// Like [`refresh`], but also re-fetches kept children that were
    /// already loaded, one splice per refreshed node.
    ///
    /// [`refresh`]: AsyncTree::refresh
    pub async fn refresh_recursive(&self, item: Option<&K>) -> Result<()> {
        let id = self.resolve(item);
        self.refresh_node(id, true).await
    }

    /// Expand `item`. A node whose children were never loaded (or were
    /// marked stale by a parent refresh) is implicitly refreshed first —
    /// this is what makes population lazy. Returns whether the collapse
    /// state changed.
    pub async fn expand(&self, item: &K, recursive: bool) -> Result<bool> {
        let id = self.resolve(Some(item));
        if id == ROOT {
            return Ok(false);
        }
        let needs_load = {
            let st = self.state.borrow();
            let node = st.node(id);
            node.state != LoadState::Loaded || node.stale
        };
        if needs_load {
            self.refresh_node(id, false).await?;
        }
        Ok(self.state.borrow_mut().tree.set_collapsed(item, false, recursive))
    }

    /// Collapse `item` (and, if `recursive`, every descendant). Mutates
    /// collapse flags only; no data is fetched or discarded.
    pub fn collapse(&self, item: &K, recursive: bool) -> bool {
        let id = self.resolve(Some(item));
        if id == ROOT {
            return false;
        }
        self.state.borrow_mut().tree.set_collapsed(item, true, recursive)
    }

    pub async fn toggle(&self, item: &K) -> Result<bool> {
        if self.is_collapsed(item) {
            self.expand(item, false).await
        } else {
            Ok(self.collapse(item, false))
        }
    }

    /// Expand every materialized collapsible node. Never fetches.
    pub fn expand_all(&self) {
        self.state.borrow_mut().tree.set_all_collapsed(false);
    }

    /// Collapse every materialized collapsible node. Never fetches.
    pub fn collapse_all(&self) {
        self.state.borrow_mut().tree.set_all_collapsed(true);
    }

    /// Re-emit the row for `item` (all rows when `None`) after mutating
    /// display fields of its data.
    pub fn rerender(&self, item: Option<&K>) {
        self.state.borrow_mut().tree.rerender(item);
    }

    // ── internals ────────────────────────────────────────────────────────

    fn resolve(&self, item: Option<&K>) -> usize {
        match item {
            None => ROOT,
            Some(key) => match self.state.borrow().index.get(key) {
                Some(&id) => id,
                None => panic!("item is not materialized in the tree"),
            },
        }
    }

    async fn refresh_node(&self, id: usize, recursive: bool) -> Result<()> {
        let mut queue = VecDeque::new();
        self.refresh_one(id, recursive, &mut queue).await?;
        // Descendants load from a flat work queue: a deep hierarchy costs
        // one loop iteration per level, never one nested await per level.
        while let Some((child, generation)) = queue.pop_front() {
            // A concurrent operation may have removed the child in the
            // meantime; skip it rather than touch a stale slot.
            if !self.state.borrow().alive(child, generation) {
                continue;
            }
            self.refresh_one(child, recursive, &mut queue).await?;
        }
        Ok(())
    }

    /// Refresh exactly one node, queueing (not awaiting) any children that
    /// need a follow-up refresh.
    async fn refresh_one(
        &self,
        id: usize,
        recursive: bool,
        queue: &mut VecDeque<(usize, u64)>,
    ) -> Result<()> {
        // Single-flight: a node already loading merges this caller into
        // the existing operation instead of starting a duplicate fetch.
        let merged = {
            let mut st = self.state.borrow_mut();
            let node = st.node_mut(id);
            if node.state == LoadState::Loading {
                let (tx, rx) = oneshot::channel();
                node.inflight
                    .as_mut()
                    .expect("a loading node always has an in-flight slot")
                    .waiters
                    .push(tx);
                Some(rx)
            } else {
                node.state = LoadState::Loading;
                node.inflight = Some(Inflight::default());
                None
            }
        };
        if let Some(rx) = merged {
            trace!("refresh merged into in-flight fetch");
            return rx.await.unwrap_or(Err(TreeError::Cancelled));
        }

        let (generation, item) = {
            let st = self.state.borrow();
            (st.slots[id].generation, st.node(id).item.clone())
        };
        // The engine's only suspension point. No borrow is held across it.
        let fetched = if self.source.has_children(&item) {
            self.source.children(&item).await
        } else {
            Ok(Vec::new())
        };

        let mut st = self.state.borrow_mut();
        if !st.alive(id, generation) {
            // The node was torn down while the fetch was in flight; its
            // waiters were already cancelled during removal.
            debug!("discarding late fetch result for a removed node");
            return Err(TreeError::Cancelled);
        }
        match fetched {
            Err(err) => {
                let node = st.node_mut(id);
                node.state = LoadState::Loaded;
                let waiters = node.inflight.take().map(|i| i.waiters).unwrap_or_default();
                for waiter in waiters {
                    let _ = waiter.send(Err(err.clone()));
                }
                debug!("children fetch failed, keeping previous subtree: {err}");
                Err(err)
            }
            Ok(items) => {
                let cascade = self.apply_children(&mut st, id, items, recursive);
                let node = st.node_mut(id);
                node.state = LoadState::Loaded;
                node.stale = false;
                let waiters = node.inflight.take().map(|i| i.waiters).unwrap_or_default();
                for waiter in waiters {
                    let _ = waiter.send(Ok(()));
                }
                queue.extend(cascade);
                Ok(())
            }
        }
    }

    /// Diff the fetched items against the materialized children, splice
    /// the result into the facade as one batched edit, and report which
    /// children need their own refresh next (with their generations).
    fn apply_children(
        &self,
        st: &mut State<T, K>,
        id: usize,
        items: Vec<T>,
        recursive: bool,
    ) -> Vec<(usize, u64)> {
        let old = st.node(id).children.clone();
        let mut old_by_key: HashMap<K, usize> = old
            .iter()
            .map(|&c| ((self.key_of)(&st.node(c).item), c))
            .collect();

        let mut new_ids = Vec::with_capacity(items.len());
        let mut kept: HashSet<usize> = HashSet::new();
        let mut created: HashSet<usize> = HashSet::new();
        for item in items {
            let key = (self.key_of)(&item);
            match old_by_key.remove(&key) {
                Some(existing) => {
                    // Same identity: keep the node, its collapse state and
                    // its loaded descendants; refresh only the payload.
                    st.node_mut(existing).item = item;
                    if st.node(existing).state == LoadState::Loaded
                        && st.tree.has_node(&key)
                        && st.tree.is_collapsed(&key)
                    {
                        st.node_mut(existing).stale = true;
                    }
                    kept.insert(existing);
                    new_ids.push(existing);
                }
                None => {
                    let fresh = st.alloc(AsyncNode {
                        item,
                        state: LoadState::Unloaded,
                        stale: false,
                        parent: Some(id),
                        children: Vec::new(),
                        inflight: None,
                    });
                    let fresh_key = (self.key_of)(&st.node(fresh).item);
                    st.index.insert(fresh_key, fresh);
                    created.insert(fresh);
                    new_ids.push(fresh);
                }
            }
        }
        for &dropped in old.iter().filter(|&&c| !kept.contains(&c)) {
            st.remove_subtree(dropped);
        }

        let changed = new_ids != old;
        st.node_mut(id).children = new_ids.clone();
        if changed {
            let elements: Vec<TreeElement<T>> = new_ids
                .iter()
                .map(|&c| self.as_element(&*st, c))
                .collect();
            let parent_key = if id == ROOT {
                None
            } else {
                Some((self.key_of)(&st.node(id).item))
            };
            trace!(
                "refresh diff: {} kept, {} created, {} dropped",
                kept.len(),
                created.len(),
                old.len() - kept.len()
            );
            st.tree.splice(parent_key.as_ref(), elements);
        } else {
            trace!("refresh diff: child list unchanged, no splice");
        }

        let mut cascade = Vec::new();
        for &child in &new_ids {
            let node = st.node(child);
            let key = (self.key_of)(&node.item);
            let expanded = st.tree.has_node(&key) && !st.tree.is_collapsed(&key);
            let follow = if created.contains(&child) {
                // Newly materialized and immediately observable: load it so
                // its children appear without an explicit expand.
                expanded && self.source.has_children(&node.item)
            } else if recursive && node.state == LoadState::Loaded {
                true
            } else {
                expanded && (node.state == LoadState::Unloaded || node.stale)
            };
            if follow {
                cascade.push((child, st.slots[child].generation));
            }
        }
        cascade
    }

    /// Render an async node (and its materialized descendants) into the
    /// subtree shape the structural splice consumes. Kept nodes carry
    /// their current collapse state; fresh ones the source's default.
    ///
    /// Assembled with an explicit traversal order so the depth of the
    /// kept subtree never translates into call-stack depth.
    fn as_element(&self, st: &State<T, K>, root: usize) -> TreeElement<T> {
        let mut order = vec![root];
        let mut i = 0;
        while i < order.len() {
            order.extend(st.node(order[i]).children.iter().copied());
            i += 1;
        }
        // Every node appears after its parent in `order`, so a reverse
        // sweep has each child built before its parent collects it.
        let mut built: HashMap<usize, TreeElement<T>> = HashMap::with_capacity(order.len());
        for &id in order.iter().rev() {
            let node = st.node(id);
            let children: Vec<TreeElement<T>> = node
                .children
                .iter()
                .map(|c| built.remove(c).expect("children are built before their parent"))
                .collect();
            let key = (self.key_of)(&node.item);
            let collapsible = self.source.has_children(&node.item) || !children.is_empty();
            let collapsed = if st.tree.has_node(&key) {
                st.tree.is_collapsed(&key)
            } else {
                self.source.collapse_by_default(&node.item)
            };
            built.insert(
                id,
                TreeElement {
                    element: node.item.clone(),
                    collapsible,
                    collapsed: collapsed && collapsible,
                    children,
                },
            );
        }
        built
            .remove(&root)
            .expect("the subtree root is always built")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::list::RowBuffer;
    use crate::source::MapSource;

    struct Fixture {
        tree: AsyncTree<u32, u32>,
        source: Rc<MapSource>,
        buffer: Rc<RefCell<RowBuffer<u32>>>,
    }

    fn fixture(entries: &[(u32, &[u32])]) -> Fixture {
        let source = Rc::new(MapSource::new(entries));
        let buffer = Rc::new(RefCell::new(RowBuffer::new()));
        let tree = AsyncTree::new(
            0,
            source.clone(),
            Rc::new(|item: &u32| *item),
            buffer.clone(),
        );
        Fixture {
            tree,
            source,
            buffer,
        }
    }

    fn rows(f: &Fixture) -> Vec<u32> {
        f.buffer.borrow().rows().iter().map(|r| r.element).collect()
    }

    #[tokio::test]
    async fn scenario_construction() {
        let f = fixture(&[(0, &[1, 2, 3]), (1, &[4, 5]), (2, &[6]), (3, &[])]);
        f.tree.refresh(None).await.unwrap();

        assert_eq!(f.tree.size(), 6);
        assert_eq!(f.tree.get_node(&1).children.len(), 2);
        assert_eq!(f.tree.get_node(&4).depth, 2);
        assert_eq!(f.tree.get_node(&4).parent, Some(1));
        assert!(!f.tree.get_node(&3).collapsible);
        assert!(f.tree.get_node(&4).visible);
        assert_eq!(rows(&f), vec![1, 4, 5, 2, 6, 3]);
    }

    #[tokio::test]
    async fn scenario_refresh_growth() {
        let f = fixture(&[(0, &[1, 2, 3]), (1, &[4, 5]), (2, &[6]), (3, &[])]);
        f.tree.refresh(None).await.unwrap();

        f.source.set(3, &[7, 8]);
        f.source.set(8, &[9, 10, 11, 12]);
        f.tree.refresh(Some(&3)).await.unwrap();

        assert_eq!(f.tree.size(), 12);
        assert_eq!(f.tree.get_node(&8).children.len(), 4);
        assert_eq!(f.tree.get_node(&8).parent, Some(3));
        for leaf in [4, 5, 6, 7, 9, 10, 11, 12] {
            assert!(!f.tree.get_node(&leaf).collapsible, "leaf {leaf}");
        }
        assert_eq!(rows(&f), vec![1, 4, 5, 2, 6, 3, 7, 8, 9, 10, 11, 12]);
    }

    #[tokio::test]
    async fn scenario_refresh_shrink_to_empty() {
        let f = fixture(&[(0, &[1, 2, 3]), (1, &[4, 5]), (2, &[6]), (3, &[])]);
        f.tree.refresh(None).await.unwrap();
        assert_eq!(f.tree.size(), 6);

        f.source.clear_all();
        f.tree.refresh(None).await.unwrap();

        assert_eq!(f.tree.size(), 0);
        assert!(rows(&f).is_empty());
        assert!(!f.tree.has_node(&1));
        assert!(!f.tree.has_node(&6));
    }

    #[tokio::test]
    async fn scenario_collapse_expand_toggling() {
        let f = fixture(&[(0, &[1, 2]), (1, &[4]), (2, &[6]), (6, &[9])]);
        f.tree.refresh(None).await.unwrap();

        assert!(f.tree.collapse(&1, false));
        assert!(f.tree.collapse(&2, false));
        let before = f.tree.is_collapsed(&2);
        f.tree.toggle(&2).await.unwrap();
        f.tree.toggle(&2).await.unwrap();
        assert_eq!(f.tree.is_collapsed(&2), before);
        assert!(f.tree.is_collapsed(&1));
        assert!(!f.tree.is_collapsed(&6));

        f.tree.expand_all();
        for item in [1, 2, 6] {
            assert!(!f.tree.is_collapsed(&item));
        }
        f.tree.collapse_all();
        for item in [1, 2, 6] {
            assert!(f.tree.is_collapsed(&item));
        }
        assert_eq!(rows(&f), vec![1, 2]);
    }

    #[tokio::test]
    async fn noop_refresh_emits_zero_splices() {
        let f = fixture(&[(0, &[1, 2, 3]), (1, &[4, 5])]);
        f.tree.refresh(None).await.unwrap();
        let splices = f.buffer.borrow().splice_count();

        f.tree.refresh(None).await.unwrap();

        assert_eq!(f.buffer.borrow().splice_count(), splices);
        assert_eq!(rows(&f), vec![1, 4, 5, 2, 3]);
    }

    #[tokio::test]
    async fn identity_preserved_under_partial_change() {
        let f = fixture(&[(0, &[1, 2, 3]), (2, &[5])]);
        f.tree.refresh(None).await.unwrap();
        f.tree.collapse(&2, false);
        let slot_of_2 = *f.tree.state.borrow().index.get(&2).unwrap();

        f.source.set(0, &[1, 2, 4]);
        f.tree.refresh(None).await.unwrap();

        // Unchanged items keep their node, collapse state and descendants.
        assert_eq!(*f.tree.state.borrow().index.get(&2).unwrap(), slot_of_2);
        assert!(f.tree.is_collapsed(&2));
        assert_eq!(f.tree.get_node(&2).children, vec![5]);
        assert!(!f.tree.has_node(&3));
        assert!(f.tree.has_node(&4));
        assert_eq!(rows(&f), vec![1, 2, 4]);
    }

    #[tokio::test]
    async fn single_flight_merges_concurrent_refreshes() {
        let f = fixture(&[(0, &[1, 2])]);
        let (a, b) = tokio::join!(f.tree.refresh(None), f.tree.refresh(None));
        a.unwrap();
        b.unwrap();
        assert_eq!(f.source.fetch_count(), 1);
        assert_eq!(f.tree.size(), 2);
    }

    #[tokio::test]
    async fn merged_callers_share_a_failure() {
        let f = fixture(&[(0, &[1])]);
        f.source.fail(0, "flaky backend");
        let (a, b) = tokio::join!(f.tree.refresh(None), f.tree.refresh(None));
        assert!(a.is_err());
        assert!(b.is_err());
        assert_eq!(f.source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn failed_refresh_leaves_subtree_intact_and_retries() {
        let f = fixture(&[(0, &[1, 2])]);
        f.tree.refresh(None).await.unwrap();
        let splices = f.buffer.borrow().splice_count();

        f.source.fail(0, "boom");
        f.source.set(0, &[9]);
        let err = f.tree.refresh(None).await.unwrap_err();
        assert!(matches!(err, TreeError::Fetch(_)));
        // Previously rendered subtree is untouched and the flat list stays
        // in sync with the structural tree.
        assert_eq!(rows(&f), vec![1, 2]);
        assert_eq!(f.buffer.borrow().splice_count(), splices);
        assert!(!f.tree.has_node(&9));
        assert_eq!(f.tree.load_state(None), LoadState::Loaded);

        f.source.unfail(0);
        f.tree.refresh(None).await.unwrap();
        assert_eq!(rows(&f), vec![9]);
    }

    #[tokio::test]
    async fn late_fetch_for_removed_node_is_discarded() {
        let f = fixture(&[(0, &[1]), (1, &[5])]);
        f.tree.refresh(None).await.unwrap();

        // Child 1's re-fetch is slow; the root refresh drops the child
        // while that fetch is still in flight.
        f.source.set(0, &[]);
        f.source.set(1, &[6, 7]);
        f.source.delay(1, 4);
        let (child, root) = tokio::join!(f.tree.refresh(Some(&1)), f.tree.refresh(None));
        root.unwrap();
        assert!(matches!(child.unwrap_err(), TreeError::Cancelled));
        assert!(!f.tree.has_node(&1));
        assert!(!f.tree.has_node(&6));
        assert_eq!(f.tree.size(), 0);
    }

    #[tokio::test]
    async fn collapsed_by_default_children_load_lazily() {
        let f = fixture(&[(0, &[1]), (1, &[2]), (2, &[3])]);
        f.source.set_collapse_by_default(true);
        f.tree.refresh(None).await.unwrap();

        // Only the root's own children were fetched.
        assert_eq!(f.source.fetch_count(), 1);
        assert_eq!(f.tree.size(), 1);
        assert_eq!(f.tree.load_state(Some(&1)), LoadState::Unloaded);

        // First expansion makes the children observable, so they load now.
        assert!(f.tree.expand(&1, false).await.unwrap());
        assert_eq!(f.source.fetch_count(), 2);
        assert_eq!(rows(&f), vec![1, 2]);
        assert_eq!(f.tree.load_state(Some(&2)), LoadState::Unloaded);
    }

    #[tokio::test]
    async fn kept_collapsed_nodes_revalidate_on_expand() {
        let f = fixture(&[(0, &[1, 2]), (1, &[5])]);
        f.tree.refresh(None).await.unwrap();
        f.tree.collapse(&1, false);

        // The source changed both levels; refreshing the root keeps node 1
        // without refetching its hidden children.
        f.source.set(0, &[1]);
        f.source.set(1, &[8]);
        f.tree.refresh(None).await.unwrap();
        assert_eq!(f.tree.get_node(&1).children, vec![5]);

        // Expanding the stale node revalidates it.
        f.tree.expand(&1, false).await.unwrap();
        assert_eq!(f.tree.get_node(&1).children, vec![8]);
        assert!(!f.tree.has_node(&5));
        assert_eq!(rows(&f), vec![1, 8]);
    }

    #[tokio::test]
    async fn recursive_refresh_refetches_loaded_descendants() {
        let f = fixture(&[(0, &[1]), (1, &[2])]);
        f.tree.refresh(None).await.unwrap();

        f.source.set(1, &[3]);
        // A plain refresh of the root keeps node 1's children as-is.
        f.tree.refresh(None).await.unwrap();
        assert_eq!(f.tree.get_node(&1).children, vec![2]);

        f.tree.refresh_recursive(None).await.unwrap();
        assert_eq!(f.tree.get_node(&1).children, vec![3]);
        assert_eq!(rows(&f), vec![1, 3]);
    }

    #[tokio::test]
    async fn refresh_order_comes_from_the_fetch() {
        let f = fixture(&[(0, &[1, 2, 3])]);
        f.tree.refresh(None).await.unwrap();
        f.source.set(0, &[3, 1, 2]);
        f.tree.refresh(None).await.unwrap();
        assert_eq!(rows(&f), vec![3, 1, 2]);
        assert_eq!(f.tree.get_node(&0).children, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn size_matches_independent_recount_after_mixed_operations() {
        let f = fixture(&[(0, &[1, 2]), (1, &[3, 4]), (2, &[5]), (4, &[6])]);
        f.tree.refresh(None).await.unwrap();
        f.tree.collapse(&1, false);
        f.source.set(2, &[5, 7]);
        f.tree.refresh(Some(&2)).await.unwrap();
        f.tree.expand(&1, false).await.unwrap();
        f.tree.collapse(&4, true);

        // Independent recount: pre-order over NodeInfo, skipping collapsed
        // subtrees.
        fn count(tree: &AsyncTree<u32, u32>, item: u32) -> usize {
            let info = tree.get_node(&item);
            if info.collapsed {
                return 1;
            }
            1 + info
                .children
                .iter()
                .map(|&c| count(tree, c))
                .sum::<usize>()
        }
        let expected: usize = f
            .tree
            .get_node(&0)
            .children
            .iter()
            .map(|&c| count(&f.tree, c))
            .sum();
        assert_eq!(f.tree.size(), expected);
        assert_eq!(f.buffer.borrow().len(), expected);
    }

    #[tokio::test]
    async fn deep_chain_refresh_does_not_overflow_the_stack() {
        // A pathological single-child chain much deeper than any realistic
        // call stack budget for per-level recursion.
        const DEPTH: u32 = 10_000;
        let f = fixture(&[]);
        for value in 0..DEPTH {
            f.source.set(value, &[value + 1]);
        }

        // Materializing cascades through every level of the chain.
        f.tree.refresh(None).await.unwrap();
        assert_eq!(f.tree.size(), DEPTH as usize);
        assert_eq!(f.tree.get_node(&DEPTH).depth, DEPTH as usize);

        // A changed root listing re-renders the kept chain as one subtree.
        f.source.set(0, &[1, DEPTH + 1]);
        f.tree.refresh(None).await.unwrap();
        assert_eq!(f.tree.size(), DEPTH as usize + 1);
        assert_eq!(f.tree.get_node(&DEPTH).depth, DEPTH as usize);
        assert_eq!(f.tree.get_node(&(DEPTH + 1)).depth, 1);
    }

    #[tokio::test]
    #[should_panic(expected = "not materialized")]
    async fn get_node_panics_on_unknown_item() {
        let f = fixture(&[(0, &[1])]);
        f.tree.refresh(None).await.unwrap();
        f.tree.get_node(&42);
    }
}
