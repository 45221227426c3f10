//! A virtualized hierarchical tree engine.
//!
//! The engine keeps an authoritative tree structure and mirrors its visible
//! portion into a flat list of rows, the shape a virtualized list renderer
//! consumes. Collapse, expand and structural splices are reported to a
//! [`TreeSink`] as contiguous row splices, so a renderer never re-walks the
//! whole tree.
//!
//! Layers, from the bottom up: [`IndexTreeModel`] (path-addressed structure),
//! [`ObjectTree`] (item-addressed facade), [`AsyncTree`] (lazy loading and
//! incremental refresh against a [`ChildrenSource`]). The [`fs`] module is a
//! ready-made source that mirrors a directory hierarchy.
//!
//! [`TreeSink`]: list::TreeSink
//! [`IndexTreeModel`]: tree::IndexTreeModel
//! [`ObjectTree`]: tree::ObjectTree
//! [`AsyncTree`]: tree::AsyncTree
//! [`ChildrenSource`]: source::ChildrenSource

pub mod error;
pub mod fs;
pub mod list;
pub mod source;
pub mod tree;

pub use error::{Result, TreeError};
pub use list::{FlatEntry, RowBuffer, TreeSink};
pub use source::ChildrenSource;
pub use tree::{AsyncTree, IndexTreeModel, LoadState, NodeInfo, ObjectTree, TreeElement};
