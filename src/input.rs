//! Keyboard input handling.
//!
//! Maps terminal key events to [`App`] mutations.  Keys that need the data
//! layer (refresh, trailer lookup) come back as an [`Action`] for the main
//! loop to carry out, so this module never touches the network.

use crossterm::event::{KeyCode, KeyEvent, KeyEventKind};

use crate::app::App;
use crate::catalog::FeedKind;
use crate::model::Movie;

/// Side effect requested by a key press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    None,
    Refresh(FeedKind),
    RefreshAll,
    Trailer(Movie),
}

/// Process a single key event, updating app state accordingly.
///
/// Only reacts to key-press events (ignoring release / repeat) so that each
/// physical keypress triggers exactly one action.
pub fn handle_key_event(app: &mut App, key: KeyEvent) -> Action {
    if key.kind != KeyEventKind::Press {
        return Action::None;
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => app.quit = true,
        KeyCode::Down | KeyCode::Char('j') => app.select_next(),
        KeyCode::Up | KeyCode::Char('k') => app.select_previous(),
        KeyCode::Home | KeyCode::Char('g') => app.select_first(),
        KeyCode::End | KeyCode::Char('G') => app.select_last(),
        KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => app.next_section(),
        KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h') => app.previous_section(),
        KeyCode::Char('r') => {
            let kind = app.active_section().kind;
            app.status = format!("Refreshing {}…", kind.title());
            return Action::Refresh(kind);
        }
        KeyCode::Char('R') => {
            app.status = "Refreshing all feeds…".into();
            return Action::RefreshAll;
        }
        KeyCode::Enter => {
            if let Some(movie) = app.selected_movie().cloned() {
                app.status = format!("Looking up trailer for {}…", movie.display_title());
                return Action::Trailer(movie);
            }
        }
        _ => {}
    }
    Action::None
}
