//! The children-source boundary: where the tree's data actually comes from.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::{Result, TreeError};

/// Supplies children for tree items on demand.
///
/// The engine fetches a node's children only the first time they become
/// observable, and re-fetches them on `refresh`. Child order is significant
/// and is taken from `children` as-is — sorting and filtering policy belong
/// to the source, not the engine.
#[async_trait(?Send)]
pub trait ChildrenSource<T> {
    /// Cheap synchronous check used to decide collapsibility without
    /// fetching. May over-approximate; a later fetch returning no children
    /// simply yields an empty child list.
    fn has_children(&self, item: &T) -> bool;

    /// Fetch the ordered child items. This is the engine's only suspension
    /// point; other tree operations may run while a fetch is in flight.
    async fn children(&self, item: &T) -> Result<Vec<T>>;

    /// Initial collapse state for a freshly materialized item.
    fn collapse_by_default(&self, _item: &T) -> bool {
        false
    }
}

/// In-memory adjacency-map source, used by tests and small demos.
///
/// Counts fetches and yields once per fetch so that concurrent refreshes
/// genuinely interleave under a cooperative scheduler.
#[derive(Debug, Default)]
pub struct MapSource {
    map: RefCell<HashMap<u32, Vec<u32>>>,
    failures: RefCell<HashMap<u32, String>>,
    delays: RefCell<HashMap<u32, usize>>,
    fetches: Cell<usize>,
    collapse_by_default: Cell<bool>,
}

impl MapSource {
    pub fn new(entries: &[(u32, &[u32])]) -> Self {
        let map = entries
            .iter()
            .map(|(k, v)| (*k, v.to_vec()))
            .collect::<HashMap<_, _>>();
        Self {
            map: RefCell::new(map),
            failures: RefCell::new(HashMap::new()),
            delays: RefCell::new(HashMap::new()),
            fetches: Cell::new(0),
            collapse_by_default: Cell::new(false),
        }
    }

    /// Replace the child list for `item`.
    pub fn set(&self, item: u32, children: &[u32]) {
        self.map.borrow_mut().insert(item, children.to_vec());
    }

    /// Clear every child list, leaving all items childless.
    pub fn clear_all(&self) {
        for children in self.map.borrow_mut().values_mut() {
            children.clear();
        }
    }

    /// Make the next fetches for `item` fail with `message`.
    pub fn fail(&self, item: u32, message: &str) {
        self.failures.borrow_mut().insert(item, message.to_string());
    }

    /// Stop failing fetches for `item`.
    pub fn unfail(&self, item: u32) {
        self.failures.borrow_mut().remove(&item);
    }

    /// Make fetches for `item` suspend `extra_yields` additional times,
    /// so tests can control completion order of concurrent fetches.
    pub fn delay(&self, item: u32, extra_yields: usize) {
        self.delays.borrow_mut().insert(item, extra_yields);
    }

    pub fn set_collapse_by_default(&self, collapsed: bool) {
        self.collapse_by_default.set(collapsed);
    }

    /// Total number of `children` calls that ran (merged refreshes share one).
    pub fn fetch_count(&self) -> usize {
        self.fetches.get()
    }
}

#[async_trait(?Send)]
impl ChildrenSource<u32> for MapSource {
    fn has_children(&self, item: &u32) -> bool {
        self.map
            .borrow()
            .get(item)
            .is_some_and(|children| !children.is_empty())
    }

    async fn children(&self, item: &u32) -> Result<Vec<u32>> {
        self.fetches.set(self.fetches.get() + 1);
        // Suspend at least once so concurrent operations get a chance to
        // interleave.
        let extra = self.delays.borrow().get(item).copied().unwrap_or(0);
        for _ in 0..=extra {
            tokio::task::yield_now().await;
        }
        if let Some(message) = self.failures.borrow().get(item) {
            return Err(TreeError::fetch(std::io::Error::other(message.clone())));
        }
        Ok(self.map.borrow().get(item).cloned().unwrap_or_default())
    }

    fn collapse_by_default(&self, _item: &u32) -> bool {
        self.collapse_by_default.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn map_source_returns_children_in_order() {
        let source = MapSource::new(&[(0, &[3, 1, 2])]);
        let children = source.children(&0).await.unwrap();
        assert_eq!(children, vec![3, 1, 2]);
        assert_eq!(source.fetch_count(), 1);
    }

    #[tokio::test]
    async fn unknown_item_has_no_children() {
        let source = MapSource::new(&[(0, &[1])]);
        assert!(!source.has_children(&42));
        assert!(source.children(&42).await.unwrap().is_empty());
    }

    #[test]
    fn empty_list_means_no_children() {
        let source = MapSource::new(&[(0, &[1]), (1, &[])]);
        assert!(source.has_children(&0));
        assert!(!source.has_children(&1));
    }

    #[tokio::test]
    async fn injected_failure_surfaces_and_clears() {
        let source = MapSource::new(&[(0, &[1])]);
        source.fail(0, "disk on fire");
        let err = source.children(&0).await.unwrap_err();
        assert!(err.to_string().contains("disk on fire"));
        source.unfail(0);
        assert_eq!(source.children(&0).await.unwrap(), vec![1]);
    }
}
