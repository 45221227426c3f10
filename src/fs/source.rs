use std::cell::Cell;
use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::warn;

use crate::error::Result;
use crate::source::ChildrenSource;

/// What kind of filesystem entry an item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsKind {
    Dir,
    File,
    Symlink,
}

/// One filesystem entry as the tree sees it. Identity is the path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsItem {
    pub path: PathBuf,
    pub name: String,
    pub kind: FsKind,
    pub hidden: bool,
}

impl FsItem {
    /// Item for the root of the hierarchy being displayed.
    pub fn root(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            path: path.to_path_buf(),
            name,
            kind: FsKind::Dir,
            hidden: false,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == FsKind::Dir
    }
}

/// Children source that lists directories on demand.
///
/// Directories sort before files, both case-insensitively by name. Hidden
/// entries (dotfiles) are filtered out unless `show_hidden` is set; flipping
/// it takes effect on the next refresh. Directories start collapsed, so the
/// tree only ever lists what the user has opened.
#[derive(Debug, Default)]
pub struct FsSource {
    show_hidden: Cell<bool>,
}

impl FsSource {
    pub fn new(show_hidden: bool) -> Self {
        Self {
            show_hidden: Cell::new(show_hidden),
        }
    }

    pub fn show_hidden(&self) -> bool {
        self.show_hidden.get()
    }

    pub fn set_show_hidden(&self, show: bool) {
        self.show_hidden.set(show);
    }
}

fn compare(a: &FsItem, b: &FsItem) -> Ordering {
    match (a.is_dir(), b.is_dir()) {
        (true, false) => Ordering::Less,
        (false, true) => Ordering::Greater,
        _ => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
    }
}

#[async_trait(?Send)]
impl ChildrenSource<FsItem> for FsSource {
    fn has_children(&self, item: &FsItem) -> bool {
        // Over-approximates: an empty directory fetches to an empty list.
        item.is_dir()
    }

    async fn children(&self, item: &FsItem) -> Result<Vec<FsItem>> {
        let show_hidden = self.show_hidden.get();
        let mut entries = tokio::fs::read_dir(&item.path).await?;
        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let hidden = name.starts_with('.');
            if hidden && !show_hidden {
                continue;
            }
            let kind = match entry.file_type().await {
                Ok(ft) if ft.is_dir() => FsKind::Dir,
                Ok(ft) if ft.is_symlink() => FsKind::Symlink,
                Ok(_) => FsKind::File,
                Err(e) => {
                    warn!("skipping unreadable entry {}: {e}", entry.path().display());
                    continue;
                }
            };
            items.push(FsItem {
                path: entry.path(),
                name,
                kind,
                hidden,
            });
        }
        items.sort_by(compare);
        Ok(items)
    }

    fn collapse_by_default(&self, item: &FsItem) -> bool {
        item.is_dir()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(items: &[FsItem]) -> Vec<&str> {
        items.iter().map(|i| i.name.as_str()).collect()
    }

    #[tokio::test]
    async fn lists_dirs_first_case_insensitive() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("beta.txt"), "").unwrap();
        std::fs::write(dir.path().join("Alpha.txt"), "").unwrap();
        std::fs::create_dir(dir.path().join("zeta")).unwrap();
        std::fs::create_dir(dir.path().join("Core")).unwrap();

        let source = FsSource::new(false);
        let items = source.children(&FsItem::root(dir.path())).await.unwrap();
        assert_eq!(names(&items), vec!["Core", "zeta", "Alpha.txt", "beta.txt"]);
        assert!(items[0].is_dir());
        assert!(!items[3].is_dir());
    }

    #[tokio::test]
    async fn hidden_entries_respect_the_toggle() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(".env"), "").unwrap();
        std::fs::write(dir.path().join("visible.txt"), "").unwrap();

        let source = FsSource::new(false);
        let root = FsItem::root(dir.path());
        assert_eq!(names(&source.children(&root).await.unwrap()), vec!["visible.txt"]);

        source.set_show_hidden(true);
        let items = source.children(&root).await.unwrap();
        assert_eq!(names(&items), vec![".env", "visible.txt"]);
        assert!(items[0].hidden);
    }

    #[tokio::test]
    async fn missing_directory_is_a_recoverable_error() {
        let source = FsSource::new(false);
        let ghost = FsItem::root(Path::new("/nonexistent/treex-test-dir"));
        assert!(source.children(&ghost).await.is_err());
    }

    #[test]
    fn only_directories_report_children() {
        let source = FsSource::new(false);
        let dir = FsItem::root(Path::new("/tmp"));
        let file = FsItem {
            path: PathBuf::from("/tmp/a.txt"),
            name: "a.txt".into(),
            kind: FsKind::File,
            hidden: false,
        };
        assert!(source.has_children(&dir));
        assert!(!source.has_children(&file));
        assert!(source.collapse_by_default(&dir));
        assert!(!source.collapse_by_default(&file));
    }
}
