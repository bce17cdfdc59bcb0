#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod buffer;
pub mod cache;
pub mod canvas;
pub mod config;
pub mod context;
pub mod controller;
pub mod data;
pub mod keymap;
pub mod layout;
pub mod lock;
pub mod logging;
pub mod mastodon;
pub mod model;
pub mod painter;
pub mod status;
pub mod tasks;
pub mod ui;
pub mod viewport;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, RunOptions};
