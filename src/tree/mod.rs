//! The layered tree engine.
//!
//! Three components, each depending only on the one below:
//!
//! 1. [`IndexTreeModel`] — the authoritative structural store, addressed by
//!    paths of sibling indices; the only layer that talks to the flat-row
//!    sink.
//! 2. [`ObjectTree`] — addresses nodes by the caller's own data item via an
//!    injected key function, recomputing structural paths on demand.
//! 3. [`AsyncTree`] — fetches children lazily from a [`ChildrenSource`],
//!    diffs fetched lists against materialized nodes, and batches each
//!    refresh into a single structural splice.
//!
//! [`ChildrenSource`]: crate::source::ChildrenSource

mod async_tree;
mod index;
mod object;

pub use async_tree::{AsyncTree, LoadState, NodeInfo};
pub use index::{IndexTreeModel, NodeId, NodeRef, SpliceOutcome};
pub use object::ObjectTree;

/// A subtree to insert: one data item plus its already-known descendants.
///
/// `collapsible` is a request; the model forces it true for any element
/// that arrives with children.
#[derive(Debug, Clone)]
pub struct TreeElement<T> {
    pub element: T,
    pub collapsible: bool,
    pub collapsed: bool,
    pub children: Vec<TreeElement<T>>,
}

impl<T> TreeElement<T> {
    /// A childless, non-collapsible element.
    pub fn leaf(element: T) -> Self {
        Self {
            element,
            collapsible: false,
            collapsed: false,
            children: Vec::new(),
        }
    }

    pub fn with_children(element: T, children: Vec<TreeElement<T>>) -> Self {
        Self {
            element,
            collapsible: true,
            collapsed: false,
            children,
        }
    }

    pub fn collapsed(mut self, collapsed: bool) -> Self {
        self.collapsed = collapsed;
        self
    }
}
