use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use log::warn;
use ratatui::widgets::ListState;

use treex::error::Result;
use treex::fs::{FsItem, FsSource};
use treex::list::{FlatEntry, RowBuffer};
use treex::tree::{AsyncTree, LoadState};

/// Viewer state: the tree engine, the flat rows it renders into, and the
/// cursor over them.
pub struct App {
    pub tree: AsyncTree<FsItem, PathBuf>,
    pub rows: Rc<RefCell<RowBuffer<FsItem>>>,
    pub source: Rc<FsSource>,
    pub root: PathBuf,
    pub list_state: ListState,
    pub should_quit: bool,
    pub watcher_active: bool,
    pub status: Option<String>,
}

impl App {
    pub fn new(root: &Path, show_hidden: bool) -> Self {
        let source = Rc::new(FsSource::new(show_hidden));
        let rows: Rc<RefCell<RowBuffer<FsItem>>> = Rc::new(RefCell::new(RowBuffer::new()));
        let tree = AsyncTree::new(
            FsItem::root(root),
            source.clone(),
            Rc::new(|item: &FsItem| item.path.clone()),
            rows.clone(),
        );
        Self {
            tree,
            rows,
            source,
            root: root.to_path_buf(),
            list_state: ListState::default(),
            should_quit: false,
            watcher_active: true,
            status: None,
        }
    }

    /// Load the root directory listing.
    pub async fn refresh_root(&mut self) -> Result<()> {
        self.tree.refresh(None).await?;
        self.clamp_selection();
        Ok(())
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some(message.into());
    }

    // ── cursor ───────────────────────────────────────────────────────────

    pub fn row_count(&self) -> usize {
        self.rows.borrow().len()
    }

    pub fn selected(&self) -> usize {
        self.list_state.selected().unwrap_or(0)
    }

    pub fn selected_entry(&self) -> Option<FlatEntry<FsItem>> {
        self.rows.borrow().get(self.selected()).cloned()
    }

    pub fn move_up(&mut self) {
        let current = self.selected();
        self.select(current.saturating_sub(1));
    }

    pub fn move_down(&mut self) {
        self.select(self.selected() + 1);
    }

    pub fn move_top(&mut self) {
        self.select(0);
    }

    pub fn move_bottom(&mut self) {
        self.select(self.row_count().saturating_sub(1));
    }

    /// Move the cursor to the parent row of the selection.
    pub fn move_to_parent(&mut self) {
        let Some(entry) = self.selected_entry() else {
            return;
        };
        let Some(parent) = entry.element.path.parent() else {
            return;
        };
        let position = self
            .rows
            .borrow()
            .rows()
            .iter()
            .position(|row| row.element.path == parent);
        if let Some(index) = position {
            self.select(index);
        }
    }

    fn select(&mut self, index: usize) {
        if self.row_count() == 0 {
            self.list_state.select(None);
        } else {
            self.list_state
                .select(Some(index.min(self.row_count() - 1)));
        }
    }

    fn clamp_selection(&mut self) {
        self.select(self.selected());
    }

    // ── tree operations on the selection ─────────────────────────────────

    pub async fn toggle_selected(&mut self) -> Result<()> {
        if let Some(entry) = self.selected_entry() {
            if entry.collapsible {
                self.tree.toggle(&entry.element.path).await?;
                self.clamp_selection();
            }
        }
        Ok(())
    }

    pub async fn expand_selected(&mut self, recursive: bool) -> Result<()> {
        if let Some(entry) = self.selected_entry() {
            if entry.collapsible {
                self.tree.expand(&entry.element.path, recursive).await?;
            }
        }
        Ok(())
    }

    /// Collapse the selection; on anything not expanded the cursor jumps
    /// to the parent instead.
    pub fn collapse_or_ascend(&mut self) {
        match self.selected_entry() {
            Some(entry) if entry.collapsible && !entry.collapsed => {
                self.tree.collapse(&entry.element.path, false);
                self.clamp_selection();
            }
            _ => self.move_to_parent(),
        }
    }

    pub fn expand_all(&mut self) {
        self.tree.expand_all();
        self.clamp_selection();
    }

    pub fn collapse_all(&mut self) {
        self.tree.collapse_all();
        self.clamp_selection();
    }

    /// Re-list the directory containing the selection (the selected entry
    /// itself when it is an expanded directory).
    pub async fn refresh_selected(&mut self) -> Result<()> {
        let target = match self.selected_entry() {
            Some(entry) if entry.element.is_dir() && !entry.collapsed => {
                Some(entry.element.path.clone())
            }
            Some(entry) => entry.element.path.parent().map(Path::to_path_buf),
            None => None,
        };
        match target {
            Some(path) if path != self.root => self.tree.refresh(Some(&path)).await?,
            _ => self.tree.refresh(None).await?,
        }
        self.clamp_selection();
        Ok(())
    }

    /// Re-list every directory that was already loaded.
    pub async fn refresh_all(&mut self) -> Result<()> {
        self.tree.refresh_recursive(None).await?;
        self.clamp_selection();
        Ok(())
    }

    pub async fn toggle_hidden(&mut self) -> Result<()> {
        self.source.set_show_hidden(!self.source.show_hidden());
        self.refresh_all().await
    }

    // ── watcher integration ──────────────────────────────────────────────

    /// Map changed paths to the loaded directories whose listings they can
    /// affect, then refresh each once. A change at a path invalidates the
    /// parent's listing; never-loaded directories are left alone, their
    /// eventual expansion fetches fresh data anyway.
    pub async fn handle_fs_change(&mut self, paths: Vec<PathBuf>) {
        let mut targets: Vec<PathBuf> = Vec::new();
        for path in paths {
            let start = if path == self.root {
                path
            } else {
                match path.parent() {
                    Some(parent) => parent.to_path_buf(),
                    None => continue,
                }
            };
            let mut current = Some(start.as_path());
            while let Some(dir) = current {
                let key = dir.to_path_buf();
                if self.tree.has_node(&key) {
                    if self.tree.load_state(Some(&key)) == LoadState::Loaded
                        && !targets.contains(&key)
                    {
                        targets.push(key);
                    }
                    break;
                }
                if dir == self.root {
                    break;
                }
                current = dir.parent();
            }
        }

        for target in targets {
            let result = if target == self.root {
                self.tree.refresh(None).await
            } else if self.tree.has_node(&target) {
                self.tree.refresh(Some(&target)).await
            } else {
                // An earlier refresh in this batch already dropped it.
                continue;
            };
            if let Err(e) = result {
                warn!("auto-refresh of {} failed: {e}", target.display());
                self.set_status(format!("refresh failed: {e}"));
            }
        }
        self.clamp_selection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scaffold() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src").join("main.rs"), "").unwrap();
        std::fs::write(dir.path().join("README.md"), "").unwrap();
        dir
    }

    fn visible_names(app: &App) -> Vec<String> {
        app.rows
            .borrow()
            .rows()
            .iter()
            .map(|r| r.element.name.clone())
            .collect()
    }

    #[tokio::test]
    async fn root_listing_starts_folded() {
        let dir = scaffold();
        let mut app = App::new(dir.path(), false);
        app.refresh_root().await.unwrap();
        assert_eq!(visible_names(&app), vec!["src", "README.md"]);
        assert_eq!(app.selected(), 0);
    }

    #[tokio::test]
    async fn expanding_a_directory_lists_it() {
        let dir = scaffold();
        let mut app = App::new(dir.path(), false);
        app.refresh_root().await.unwrap();

        app.expand_selected(false).await.unwrap();
        assert_eq!(visible_names(&app), vec!["src", "main.rs", "README.md"]);

        app.collapse_or_ascend();
        assert_eq!(visible_names(&app), vec!["src", "README.md"]);
    }

    #[tokio::test]
    async fn cursor_stays_in_bounds_when_rows_shrink() {
        let dir = scaffold();
        let mut app = App::new(dir.path(), false);
        app.refresh_root().await.unwrap();
        app.expand_selected(false).await.unwrap();
        app.move_bottom();
        assert_eq!(app.selected(), 2);

        std::fs::remove_file(dir.path().join("README.md")).unwrap();
        std::fs::remove_file(dir.path().join("src").join("main.rs")).unwrap();
        app.refresh_all().await.unwrap();
        assert_eq!(visible_names(&app), vec!["src"]);
        assert_eq!(app.selected(), 0);
    }

    #[tokio::test]
    async fn fs_change_refreshes_only_loaded_directories() {
        let dir = scaffold();
        let mut app = App::new(dir.path(), false);
        app.refresh_root().await.unwrap();
        // "src" is materialized but never loaded; a change inside it must
        // not force a listing.
        std::fs::write(dir.path().join("src").join("lib.rs"), "").unwrap();
        app.handle_fs_change(vec![dir.path().join("src").join("lib.rs")])
            .await;
        assert_eq!(
            app.tree.load_state(Some(&dir.path().join("src"))),
            LoadState::Unloaded
        );

        // A change at the top level refreshes the root listing.
        std::fs::write(dir.path().join("NOTES.md"), "").unwrap();
        app.handle_fs_change(vec![dir.path().join("NOTES.md")]).await;
        assert_eq!(visible_names(&app), vec!["src", "NOTES.md", "README.md"]);
    }

    #[tokio::test]
    async fn hidden_toggle_relists_loaded_directories() {
        let dir = scaffold();
        std::fs::write(dir.path().join(".hidden"), "").unwrap();
        let mut app = App::new(dir.path(), false);
        app.refresh_root().await.unwrap();
        assert_eq!(visible_names(&app), vec!["src", "README.md"]);

        app.toggle_hidden().await.unwrap();
        assert_eq!(visible_names(&app), vec!["src", ".hidden", "README.md"]);
    }

    #[tokio::test]
    async fn parent_jump_from_nested_row() {
        let dir = scaffold();
        let mut app = App::new(dir.path(), false);
        app.refresh_root().await.unwrap();
        app.expand_selected(false).await.unwrap();
        app.move_down();
        assert_eq!(app.selected_entry().unwrap().element.name, "main.rs");

        app.collapse_or_ascend();
        assert_eq!(app.selected_entry().unwrap().element.name, "src");
    }
}
