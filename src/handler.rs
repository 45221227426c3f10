use crossterm::event::{KeyCode, KeyEvent, KeyEventKind, MouseEvent, MouseEventKind};

use crate::app::App;

/// Dispatch a key press. Tree operations that fetch report failures on the
/// status line instead of tearing the viewer down.
pub async fn handle_key(app: &mut App, key: KeyEvent) {
    if key.kind != KeyEventKind::Press {
        return;
    }
    app.status = None;
    let result = match key.code {
        KeyCode::Char('q') | KeyCode::Esc => {
            app.should_quit = true;
            Ok(())
        }

        KeyCode::Up | KeyCode::Char('k') => {
            app.move_up();
            Ok(())
        }
        KeyCode::Down | KeyCode::Char('j') => {
            app.move_down();
            Ok(())
        }
        KeyCode::Home | KeyCode::Char('g') => {
            app.move_top();
            Ok(())
        }
        KeyCode::End | KeyCode::Char('G') => {
            app.move_bottom();
            Ok(())
        }

        KeyCode::Enter | KeyCode::Char(' ') => app.toggle_selected().await,
        KeyCode::Right | KeyCode::Char('l') => app.expand_selected(false).await,
        KeyCode::Char('L') => app.expand_selected(true).await,
        KeyCode::Left | KeyCode::Char('h') => {
            app.collapse_or_ascend();
            Ok(())
        }
        KeyCode::Char('E') => {
            app.expand_all();
            Ok(())
        }
        KeyCode::Char('C') => {
            app.collapse_all();
            Ok(())
        }

        KeyCode::Char('r') => app.refresh_selected().await,
        KeyCode::Char('R') => app.refresh_all().await,
        KeyCode::Char('.') => app.toggle_hidden().await,
        KeyCode::Char('w') => {
            app.watcher_active = !app.watcher_active;
            Ok(())
        }

        _ => Ok(()),
    };
    if let Err(e) = result {
        app.set_status(format!("error: {e}"));
    }
}

pub fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    match mouse.kind {
        MouseEventKind::ScrollUp => app.move_up(),
        MouseEventKind::ScrollDown => app.move_down(),
        _ => {}
    }
}
