//! cinefeed — browse movie catalog feeds in the terminal.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌──────────┐ Outcome ┌──────────┐ subscribe ┌──────────┐ Update  ┌──────────┐ draw()  ┌──────────┐
//! │ fetch/   │ ──────► │ feed.rs  │ ────────► │ relay.rs │ ──────► │  app.rs  │ ──────► │  ui.rs   │
//! │ (tokio)  │         │ (replay) │           │          │ (mpsc)  │ (state)  │         │ (render) │
//! └──────────┘         └──────────┘           └──────────┘         └──────────┘         └──────────┘
//!                            ▲                                          ▲
//!                            │ owned by                                 │ handle_key_event()
//!                      ┌────────────┐                              ┌──────────┐
//!                      │ catalog.rs │ ◄──── Action (refresh, ───── │ input.rs │
//!                      └────────────┘        trailer)              └──────────┘
//! ```
//!
//! * **`fetch`** — one-shot HTTP fetch + decode behind a `Transport` seam.
//! * **`model`** — leniently decoded catalog records.
//! * **`feed`** — replay-one, multicast state container.
//! * **`catalog`** — the three named feeds and the trailer lookup.
//! * **`relay`** — forwards feed updates to the UI thread over a channel.
//! * **`app`** / **`ui`** / **`input`** — presentation state, rendering, keys.
//! * **`config`** / **`logging`** — CLI parsing and tracing setup.
//!
//! Network I/O runs on the Tokio runtime's workers.  Rendering happens only
//! on the main thread, which drains the relay channel once per tick.

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use cinefeed::app::App;
use cinefeed::catalog::Catalog;
use cinefeed::config::{Cli, Config};
use cinefeed::fetch::FetchExecutor;
use cinefeed::input::{self, Action};
use cinefeed::relay::Relay;
use cinefeed::{logging, ui};

// ---------------------------------------------------------------------------
// RAII terminal guard — cleanup even on panic
// ---------------------------------------------------------------------------

/// Manages terminal raw-mode and alternate-screen lifetime via [`Drop`].
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TerminalGuard {
    fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Restore the terminal before the default panic message is printed.
fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(info);
    }));
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let config = Config::from(Cli::parse());
    logging::init(&config.log_file)?;
    if config.api_key.is_none() {
        tracing::warn!("no API key configured; feeds will report invalid addresses");
    }

    // -- runtime for network I/O; this thread stays the UI thread ------------
    let runtime = tokio::runtime::Runtime::new().context("cannot start async runtime")?;
    let _runtime_guard = runtime.enter();

    // -- data layer ------------------------------------------------------------
    let catalog = Catalog::start(&config, FetchExecutor::http());
    let (relay, rx) = Relay::attach(&catalog);

    install_panic_hook();
    let mut guard = TerminalGuard::new()?;
    let mut app = App::new();

    // -- main event loop -----------------------------------------------------
    // ~10 fps: drain relayed updates, render, then wait up to one tick for a key.
    let tick_rate = Duration::from_millis(100);

    loop {
        while let Ok(update) = rx.try_recv() {
            app.apply(update);
        }

        guard.terminal.draw(|f| ui::draw(&mut app, f))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                match input::handle_key_event(&mut app, key) {
                    Action::None => {}
                    Action::Refresh(kind) => {
                        catalog.feed(kind).spawn_refresh();
                    }
                    Action::RefreshAll => catalog.refresh_all(),
                    Action::Trailer(movie) => {
                        relay.request_trailer(&catalog, movie);
                    }
                }
            }
        }

        if app.quit {
            break;
        }
    }

    tracing::info!("shutting down");
    Ok(())
}
