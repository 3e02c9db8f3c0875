//! # banter-server
//!
//! The banter chat backend: a SQLite-backed user/channel/message API plus
//! a WebSocket live-messaging layer built on `banter-core`.

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod store;

pub use config::Config;
pub use handlers::{app, run_server, AppState};
pub use store::SqliteStore;
