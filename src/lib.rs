//! Polls ranked leaderboards and keeps a per-player rank history.
//!
//! Fetch → parse → diff → store, once per region per tick. See [`track::Track`]
//! for the per-mode state machine and [`diff`] for the point/refresh policy.

pub mod config;
pub mod diff;
pub mod error;
pub mod models;
pub mod modes;
pub mod scheduler;
pub mod scraper;
pub mod storage;
pub mod track;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
