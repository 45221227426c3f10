//! Filesystem-backed children source and change watcher.

mod source;
pub mod watcher;

pub use source::{FsItem, FsKind, FsSource};
pub use watcher::FsWatcher;
