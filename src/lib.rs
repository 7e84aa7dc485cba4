//! Movie catalog feeds as replayable, observable state.
//!
//! The data layer is [`fetch`] (one-shot HTTP + decode), [`feed`] (replay
//! slot with subscribers) and [`catalog`] (the named feeds and the trailer
//! lookup).  The remaining modules make up the terminal client in
//! `main.rs`.

pub mod app;
pub mod catalog;
pub mod config;
pub mod feed;
pub mod fetch;
pub mod input;
pub mod logging;
pub mod model;
pub mod relay;
pub mod ui;
