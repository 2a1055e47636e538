//! creator-watch library crate.
//!
//! Polls creator profile pages on a fixed schedule, keeps durable per-account
//! state and statistics, and notifies subscribers about uploads, removed
//! videos, live streams and availability changes.

pub mod app;
pub mod config;
pub mod credentials;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod notification;
pub mod state;
pub mod stats;
pub mod utils;

pub use error::{Error, Result};
