mod app;
mod config;
mod event;
mod handler;
mod tui;
mod ui;

use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use log::{info, LevelFilter};
use simplelog::WriteLogger;

use treex::fs::{watcher, FsWatcher};

use crate::app::App;
use crate::config::{AppConfig, GeneralConfig, WatcherConfig};
use crate::event::{Event, EventHandler};
use crate::tui::{install_panic_hook, Tui};

/// Terminal viewer for a lazily loaded directory tree.
#[derive(Parser, Debug)]
#[command(name = "tx", version, about)]
struct Cli {
    /// Root path to display (falls back to the configured default_path,
    /// then the current directory)
    path: Option<PathBuf>,

    /// Show hidden files
    #[arg(long)]
    show_hidden: bool,

    /// Disable the filesystem watcher (auto-refresh)
    #[arg(long)]
    no_watcher: bool,

    /// Explicit config file path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Append debug logs to this file
    #[arg(long)]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Partial config carrying only the flags that were actually passed.
    fn overrides(&self) -> AppConfig {
        AppConfig {
            general: GeneralConfig {
                show_hidden: self.show_hidden.then_some(true),
                ..Default::default()
            },
            watcher: WatcherConfig {
                enabled: self.no_watcher.then_some(false),
                ..Default::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> treex::error::Result<()> {
    let cli = Cli::parse();

    if let Some(log_path) = &cli.log_file {
        let _ = WriteLogger::init(
            LevelFilter::Debug,
            simplelog::Config::default(),
            File::create(log_path)?,
        );
    }

    let cfg = AppConfig::load(cli.config.as_deref(), Some(&cli.overrides()));
    let path = cli
        .path
        .clone()
        .or_else(|| cfg.default_path())
        .unwrap_or_else(|| PathBuf::from("."));
    let path = path.canonicalize()?;
    info!("starting at {}", path.display());

    let mut app = App::new(&path, cfg.show_hidden());
    app.refresh_root().await?;

    install_panic_hook();
    let mut tui = Tui::new(cfg.mouse_enabled())?;
    let mut events = EventHandler::new(Duration::from_millis(16));

    let _watcher = if cfg.watcher_enabled() {
        let event_tx = events.sender();
        let result = FsWatcher::new(
            &path,
            Duration::from_millis(cfg.debounce_ms()),
            cfg.ignore_patterns(),
            watcher::DEFAULT_FLOOD_THRESHOLD,
            move |batch| {
                let _ = event_tx.send(Event::FsChange(batch));
            },
        );
        match result {
            Ok(w) => Some(w),
            Err(e) => {
                app.watcher_active = false;
                app.set_status(format!("watcher unavailable: {e}"));
                None
            }
        }
    } else {
        app.watcher_active = false;
        None
    };

    loop {
        tui.terminal_mut().draw(|frame| {
            ui::render(&mut app, frame);
        })?;

        match events.next().await {
            Some(Event::Key(key)) => handler::handle_key(&mut app, key).await,
            Some(Event::Mouse(mouse)) => handler::handle_mouse(&mut app, mouse),
            Some(Event::Tick) | Some(Event::Resize(_, _)) => {}
            Some(Event::FsChange(paths)) => {
                if app.watcher_active {
                    app.handle_fs_change(paths).await;
                }
            }
            None => break,
        }

        // Sync watcher pause/resume with the toggle.
        if let Some(watcher) = &_watcher {
            if app.watcher_active && !watcher.is_active() {
                watcher.resume();
            } else if !app.watcher_active && watcher.is_active() {
                watcher.pause();
            }
        }

        if app.should_quit {
            break;
        }
    }

    tui.restore()?;
    Ok(())
}
