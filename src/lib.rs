//! Dewatermark: paint over a watermark, inpaint it away.
//!
//! The binary in `main.rs` routes between the eframe GUI (`app`) and the
//! headless batch mode (`cli`). Everything else is plain library code so it
//! can be driven from tests without a window.

pub mod logger;

pub mod app;
pub mod canvas;
pub mod cli;
pub mod components;
pub mod engine;
pub mod io;
pub mod ops;
pub mod project;
pub mod settings;
