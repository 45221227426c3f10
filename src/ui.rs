use ratatui::{
    layout::{Constraint, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use treex::fs::{FsItem, FsKind};
use treex::list::FlatEntry;

use crate::app::App;

pub fn render(app: &mut App, frame: &mut Frame) {
    let [tree_area, status_area] =
        Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(frame.area());

    let items: Vec<ListItem> = app
        .rows
        .borrow()
        .rows()
        .iter()
        .map(render_row)
        .collect();
    let title = format!(" {} ", app.root.display());
    let list = List::new(items)
        .block(Block::default().borders(Borders::ALL).title(title))
        .highlight_style(
            Style::default()
                .bg(Color::DarkGray)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_stateful_widget(list, tree_area, &mut app.list_state);

    frame.render_widget(status_line(app), status_area);
}

fn render_row(entry: &FlatEntry<FsItem>) -> ListItem<'static> {
    // Depth 1 is a top-level row; it gets no indent.
    let indent = "  ".repeat(entry.depth.saturating_sub(1));
    let twistie = if !entry.collapsible {
        "  "
    } else if entry.collapsed {
        "▸ "
    } else {
        "▾ "
    };
    let style = match entry.element.kind {
        _ if entry.element.hidden => Style::default().add_modifier(Modifier::DIM),
        FsKind::Dir => Style::default()
            .fg(Color::Blue)
            .add_modifier(Modifier::BOLD),
        FsKind::Symlink => Style::default().fg(Color::Cyan),
        FsKind::File => Style::default(),
    };
    ListItem::new(Line::from(vec![
        Span::raw(format!("{indent}{twistie}")),
        Span::styled(entry.element.name.clone(), style),
    ]))
}

fn status_line(app: &App) -> Paragraph<'_> {
    let text = match &app.status {
        Some(message) => message.clone(),
        None => {
            let watcher = if app.watcher_active { "on" } else { "off" };
            format!(
                " {} rows | watch {watcher} | j/k move  l/h open/close  r refresh  . hidden  q quit",
                app.row_count()
            )
        }
    };
    Paragraph::new(text).style(Style::default().fg(Color::Gray))
}
