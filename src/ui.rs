//! Terminal UI rendering.
//!
//! All drawing logic lives here, separated from application state ([`App`])
//! and input handling ([`crate::input`]).
//!
//! The layout is three feed columns side by side with a one-line status bar
//! underneath.  Each column renders its section's [`FeedView`] as-is: a
//! loading note, an error, an empty note, or the movie list.

use ratatui::{
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, FeedView, Section};

/// Draw the complete UI for one frame.
pub fn draw(app: &mut App, frame: &mut Frame) {
    let [main_area, status_area] =
        Layout::vertical([Constraint::Min(1), Constraint::Length(1)]).areas(frame.area());

    let columns = Layout::horizontal([
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
        Constraint::Ratio(1, 3),
    ])
    .split(main_area);

    let active = app.active;
    for (i, (section, area)) in app.sections.iter_mut().zip(columns.iter()).enumerate() {
        draw_section(section, i == active, frame, *area);
    }
    draw_status_bar(app, frame, status_area);
}

fn section_block(section: &Section, focused: bool) -> Block<'static> {
    let mut title = format!(" {} ", section.kind.title());
    if let Some(updated) = section.updated {
        title.push_str(&format!("· {} ", updated.format("%H:%M:%S")));
    }
    let border = if focused { Color::Cyan } else { Color::DarkGray };

    Block::default()
        .title(title)
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border))
}

/// Render one feed column.
fn draw_section(section: &mut Section, focused: bool, frame: &mut Frame, area: Rect) {
    let block = section_block(section, focused);

    let movies = match &section.view {
        FeedView::Loading => {
            let note = Paragraph::new("Loading…")
                .style(Style::default().fg(Color::DarkGray))
                .block(block);
            frame.render_widget(note, area);
            return;
        }
        FeedView::Failed(reason) => {
            let error = Paragraph::new(format!("Error: {reason}"))
                .style(Style::default().fg(Color::Red))
                .wrap(Wrap { trim: true })
                .block(block);
            frame.render_widget(error, area);
            return;
        }
        FeedView::Ready(movies) if movies.is_empty() => {
            let note = Paragraph::new("No movies")
                .style(Style::default().fg(Color::DarkGray))
                .block(block);
            frame.render_widget(note, area);
            return;
        }
        FeedView::Ready(movies) => movies,
    };

    let items: Vec<ListItem> = movies
        .iter()
        .map(|movie| {
            let poster = movie.poster_url().unwrap_or_else(|| "no poster".into());
            ListItem::new(vec![
                Line::from(Span::styled(
                    movie.display_title().to_string(),
                    Style::default().fg(Color::White),
                )),
                Line::from(Span::styled(poster, Style::default().fg(Color::DarkGray))),
            ])
        })
        .collect();

    let list = List::new(items)
        .block(block)
        .highlight_style(
            Style::default()
                .add_modifier(Modifier::BOLD)
                .bg(Color::DarkGray),
        )
        .highlight_symbol("▸ ");

    frame.render_stateful_widget(list, area, &mut section.list_state);
}

/// Render the bottom status bar.
fn draw_status_bar(app: &App, frame: &mut Frame, area: Rect) {
    let status = Paragraph::new(Line::from(vec![
        Span::raw(" "),
        Span::styled(&app.status, Style::default().fg(Color::Yellow)),
        Span::raw("  q: quit  Tab: feed  ↑/↓: scroll  Enter: trailer  r/R: refresh"),
    ]));
    frame.render_widget(status, area);
}
