use chrono::{DateTime, Local};
use ratatui::widgets::ListState;

use crate::catalog::FeedKind;
use crate::fetch::Outcome;
use crate::model::{trailer_watch_url, Movie, MovieResponse};
use crate::relay::Update;

/// What a feed column currently shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedView {
    /// No outcome has arrived yet.
    Loading,
    /// The latest outcome was a failure.  Replaces any earlier movies.
    Failed(String),
    Ready(Vec<Movie>),
}

/// One column of the screen, mirroring one feed's replay slot.
pub struct Section {
    pub kind: FeedKind,
    pub view: FeedView,
    pub list_state: ListState,
    /// When the last outcome arrived.
    pub updated: Option<DateTime<Local>>,
}

impl Section {
    fn new(kind: FeedKind) -> Self {
        Self {
            kind,
            view: FeedView::Loading,
            list_state: ListState::default(),
            updated: None,
        }
    }

    pub fn movies(&self) -> &[Movie] {
        match &self.view {
            FeedView::Ready(movies) => movies,
            _ => &[],
        }
    }

    fn apply(&mut self, outcome: &Outcome<MovieResponse>) {
        self.view = match outcome {
            Ok(page) => FeedView::Ready(page.results.clone()),
            Err(e) => FeedView::Failed(e.to_string()),
        };
        self.updated = Some(Local::now());

        // Keep the selection inside the new list.
        let len = self.movies().len();
        match self.list_state.selected() {
            _ if len == 0 => self.list_state.select(None),
            Some(i) if i >= len => self.list_state.select(Some(len - 1)),
            _ => {}
        }
    }
}

pub struct App {
    /// One section per feed, in [`FeedKind::ALL`] order.
    pub sections: Vec<Section>,
    /// Index of the focused section.
    pub active: usize,
    /// Whether the user has requested to quit.
    pub quit: bool,
    /// Last status message.
    pub status: String,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self {
            sections: FeedKind::ALL.into_iter().map(Section::new).collect(),
            active: 0,
            quit: false,
            status: "Loading…".into(),
        }
    }

    /// Fold a relayed update into the screen state.
    pub fn apply(&mut self, update: Update) {
        match update {
            Update::Feed { kind, outcome } => {
                self.status = match &outcome {
                    Ok(page) => format!("{}: {} movies", kind.title(), page.results.len()),
                    Err(e) => format!("{}: {e}", kind.title()),
                };
                if let Some(section) = self.sections.iter_mut().find(|s| s.kind == kind) {
                    section.apply(&outcome);
                }
            }
            Update::Trailer { title, outcome } => {
                self.status = match outcome {
                    Ok(key) => format!("Trailer for {title}: {}", trailer_watch_url(&key)),
                    Err(e) => format!("No trailer for {title}: {e}"),
                };
            }
        }
    }

    pub fn active_section(&self) -> &Section {
        &self.sections[self.active]
    }

    fn active_section_mut(&mut self) -> &mut Section {
        &mut self.sections[self.active]
    }

    pub fn selected_movie(&self) -> Option<&Movie> {
        let section = self.active_section();
        section
            .list_state
            .selected()
            .and_then(|i| section.movies().get(i))
    }

    // -- focus ---------------------------------------------------------------

    pub fn next_section(&mut self) {
        self.active = (self.active + 1) % self.sections.len();
    }

    pub fn previous_section(&mut self) {
        self.active = (self.active + self.sections.len() - 1) % self.sections.len();
    }

    // -- navigation ----------------------------------------------------------

    pub fn select_next(&mut self) {
        let section = self.active_section_mut();
        let len = section.movies().len();
        if len == 0 {
            return;
        }
        let i = match section.list_state.selected() {
            Some(i) => (i + 1).min(len - 1),
            None => 0,
        };
        section.list_state.select(Some(i));
    }

    pub fn select_previous(&mut self) {
        let section = self.active_section_mut();
        if section.movies().is_empty() {
            return;
        }
        let i = match section.list_state.selected() {
            Some(i) => i.saturating_sub(1),
            None => 0,
        };
        section.list_state.select(Some(i));
    }

    pub fn select_first(&mut self) {
        let section = self.active_section_mut();
        if !section.movies().is_empty() {
            section.list_state.select(Some(0));
        }
    }

    pub fn select_last(&mut self) {
        let section = self.active_section_mut();
        let len = section.movies().len();
        if len > 0 {
            section.list_state.select(Some(len - 1));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::FetchError;
    use crate::model::Page;

    fn movie(id: i64, title: &str) -> Movie {
        Movie {
            id: Some(id),
            title: Some(title.to_string()),
            poster: None,
        }
    }

    fn feed_update(kind: FeedKind, movies: Vec<Movie>) -> Update {
        Update::Feed {
            kind,
            outcome: Ok(Page { results: movies }),
        }
    }

    fn loaded_app() -> App {
        let mut app = App::new();
        app.apply(feed_update(
            FeedKind::Popular,
            vec![movie(1, "One"), movie(2, "Two"), movie(3, "Three")],
        ));
        app
    }

    // -- construction --------------------------------------------------------

    #[test]
    fn new_app_is_loading_everywhere() {
        let app = App::new();
        assert_eq!(app.sections.len(), 3);
        assert!(app.sections.iter().all(|s| s.view == FeedView::Loading));
        assert!(!app.quit);
        assert!(app.selected_movie().is_none());
    }

    // -- updates -------------------------------------------------------------

    #[test]
    fn feed_update_fills_matching_section_only() {
        let app = loaded_app();
        assert_eq!(app.sections[0].movies().len(), 3);
        assert!(app.sections[0].updated.is_some());
        assert_eq!(app.sections[1].view, FeedView::Loading);
        assert_eq!(app.status, "Popular Now: 3 movies");
    }

    #[test]
    fn failure_replaces_previous_movies() {
        let mut app = loaded_app();
        app.select_first();
        app.apply(Update::Feed {
            kind: FeedKind::Popular,
            outcome: Err(FetchError::UnexpectedStatus(401)),
        });

        assert!(matches!(app.sections[0].view, FeedView::Failed(_)));
        assert!(app.selected_movie().is_none());
        assert!(app.status.contains("401"));
    }

    #[test]
    fn shorter_list_clamps_selection() {
        let mut app = loaded_app();
        app.select_last();
        app.apply(feed_update(FeedKind::Popular, vec![movie(9, "Nine")]));
        assert_eq!(app.sections[0].list_state.selected(), Some(0));
        assert_eq!(app.selected_movie().unwrap().id, Some(9));
    }

    #[test]
    fn trailer_update_sets_status() {
        let mut app = App::new();
        app.apply(Update::Trailer {
            title: "One".into(),
            outcome: Ok("abc123".into()),
        });
        assert_eq!(
            app.status,
            "Trailer for One: https://www.youtube.com/watch?v=abc123"
        );

        app.apply(Update::Trailer {
            title: "Two".into(),
            outcome: Err(FetchError::DataUnavailable("no YouTube trailer".into())),
        });
        assert!(app.status.starts_with("No trailer for Two"));
    }

    // -- focus ---------------------------------------------------------------

    #[test]
    fn section_focus_wraps() {
        let mut app = App::new();
        app.previous_section();
        assert_eq!(app.active, 2);
        app.next_section();
        assert_eq!(app.active, 0);
        app.next_section();
        assert_eq!(app.active_section().kind, FeedKind::TopRated);
    }

    // -- navigation ----------------------------------------------------------

    #[test]
    fn navigation_on_empty_is_noop() {
        let mut app = App::new();
        app.select_next();
        app.select_previous();
        app.select_first();
        app.select_last();
        assert!(app.sections[0].list_state.selected().is_none());
    }

    #[test]
    fn select_next_starts_at_zero_then_advances_and_clamps() {
        let mut app = loaded_app();

        app.select_next();
        assert_eq!(app.sections[0].list_state.selected(), Some(0));
        app.select_next();
        app.select_next();
        app.select_next();
        assert_eq!(app.sections[0].list_state.selected(), Some(2));
    }

    #[test]
    fn select_previous_clamps_at_zero() {
        let mut app = loaded_app();
        app.select_last();
        app.select_previous();
        assert_eq!(app.sections[0].list_state.selected(), Some(1));
        app.select_previous();
        app.select_previous();
        assert_eq!(app.sections[0].list_state.selected(), Some(0));
    }

    #[test]
    fn navigation_follows_focused_section() {
        let mut app = loaded_app();
        app.next_section();
        app.select_next();
        assert!(app.sections[0].list_state.selected().is_none());
        assert!(app.selected_movie().is_none());
    }

    #[test]
    fn selected_movie_reads_active_section() {
        let mut app = loaded_app();
        app.select_last();
        assert_eq!(app.selected_movie().unwrap().display_title(), "Three");
    }
}
