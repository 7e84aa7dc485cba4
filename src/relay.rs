//! Hand-off from the data layer to the UI thread.
//!
//! Feed callbacks and trailer lookups complete on runtime worker threads.
//! The relay turns each result into an [`Update`] and sends it over an
//! [`mpsc`] channel; the main loop drains that channel on every tick, so all
//! rendering happens on one thread.
//!
//! ```text
//!  Feed (worker) ──subscribe──► Relay ──Update──► main loop ──► ui::draw
//!  trailer lookup (task) ───────┘
//! ```

use std::sync::mpsc;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::catalog::{Catalog, FeedKind};
use crate::feed::Subscription;
use crate::fetch::Outcome;
use crate::model::{Movie, MovieResponse};

/// Messages sent to the UI thread.
#[derive(Debug)]
pub enum Update {
    /// A feed's replay slot changed (or was replayed on attach).
    Feed {
        kind: FeedKind,
        outcome: Outcome<MovieResponse>,
    },
    /// A trailer lookup finished.
    Trailer {
        title: String,
        outcome: Outcome<String>,
    },
}

/// Keeps the UI subscribed to every feed for as long as it lives.
pub struct Relay {
    tx: mpsc::Sender<Update>,
    _subscriptions: Vec<Subscription>,
}

impl Relay {
    /// Subscribe to all of `catalog`'s feeds.
    ///
    /// Feeds that already hold a value replay it into the channel right away.
    pub fn attach(catalog: &Catalog) -> (Self, mpsc::Receiver<Update>) {
        let (tx, rx) = mpsc::channel();

        let subscriptions = FeedKind::ALL
            .into_iter()
            .map(|kind| {
                let tx = tx.clone();
                let feed = catalog.feed(kind);
                debug!(feed = feed.name(), "relay attached");
                feed.subscribe(move |outcome| {
                    debug!(feed = %kind, ok = outcome.is_ok(), "relaying update");
                    // Receiver gone means the UI has exited.
                    let _ = tx.send(Update::Feed {
                        kind,
                        outcome: outcome.clone(),
                    });
                })
            })
            .collect();

        (
            Self {
                tx,
                _subscriptions: subscriptions,
            },
            rx,
        )
    }

    /// Look up `movie`'s trailer in the background and relay the result.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn request_trailer(&self, catalog: &Catalog, movie: Movie) -> JoinHandle<()> {
        let catalog = catalog.clone();
        let tx = self.tx.clone();
        debug!(movie = ?movie.id, "trailer requested");

        tokio::spawn(async move {
            let outcome = catalog.trailer_key(&movie).await;
            let _ = tx.send(Update::Trailer {
                title: movie.display_title().to_string(),
                outcome,
            });
        })
    }
}
