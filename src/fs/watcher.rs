//! Debounced filesystem change notifications for driving tree refreshes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind};

/// Directory names whose changes are never worth a refresh.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    "venv",
    ".venv",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    "target",
];

/// Default debounce interval in milliseconds.
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;

/// Default flood threshold (events per debounce window).
pub const DEFAULT_FLOOD_THRESHOLD: usize = 100;

/// Watches a root directory and reports batches of changed paths.
pub struct FsWatcher {
    /// Whether changes are currently being forwarded.
    active: Arc<AtomicBool>,
    /// Dropped to stop watching.
    _debouncer: notify_debouncer_mini::Debouncer<notify::RecommendedWatcher>,
}

impl FsWatcher {
    /// Watch `root` recursively and call `on_change` with each debounced
    /// batch of changed paths. Paths matching `ignore_patterns` are dropped.
    /// When a single window carries more than `flood_threshold` events the
    /// batch collapses to the root path alone, signalling a full refresh.
    ///
    /// `on_change` runs on the watcher's own thread; hand the batch off to
    /// the main loop rather than touching tree state from it.
    pub fn new(
        root: &Path,
        debounce_duration: Duration,
        ignore_patterns: Vec<String>,
        flood_threshold: usize,
        on_change: impl Fn(Vec<PathBuf>) + Send + 'static,
    ) -> notify::Result<Self> {
        let active = Arc::new(AtomicBool::new(true));
        let active_clone = active.clone();
        let root_path = root.to_path_buf();

        let mut debouncer = new_debouncer(
            debounce_duration,
            move |result: Result<Vec<notify_debouncer_mini::DebouncedEvent>, notify::Error>| {
                if !active_clone.load(Ordering::Relaxed) {
                    return;
                }

                match result {
                    Ok(events) => {
                        let paths: Vec<PathBuf> = events
                            .iter()
                            .filter(|e| e.kind == DebouncedEventKind::Any)
                            .map(|e| e.path.clone())
                            .filter(|p| !should_ignore(p, &ignore_patterns))
                            .collect();

                        if paths.is_empty() {
                            return;
                        }

                        let batch = if paths.len() > flood_threshold {
                            debug!("change flood ({} paths), collapsing to root", paths.len());
                            vec![root_path.clone()]
                        } else {
                            paths
                        };
                        on_change(batch);
                    }
                    Err(e) => {
                        // Watcher errors are non-fatal.
                        debug!("watcher error: {e}");
                    }
                }
            },
        )?;

        debouncer
            .watcher()
            .watch(root, notify::RecursiveMode::Recursive)?;

        Ok(Self {
            active,
            _debouncer: debouncer,
        })
    }

    /// Pause forwarding (the watcher stays alive to avoid re-creating
    /// inotify watches).
    pub fn pause(&self) {
        self.active.store(false, Ordering::Relaxed);
    }

    /// Resume forwarding.
    pub fn resume(&self) {
        self.active.store(true, Ordering::Relaxed);
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Relaxed)
    }
}

/// A path is ignored if any of its components match a pattern exactly.
pub fn should_ignore(path: &Path, patterns: &[String]) -> bool {
    for component in path.components() {
        if let std::path::Component::Normal(name) = component {
            let name_str = name.to_string_lossy();
            if patterns.iter().any(|p| name_str == *p) {
                return true;
            }
        }
    }
    false
}
