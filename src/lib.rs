//! Announces newly aired TV episodes to a Discord channel.
//!
//! Users subscribe to series; a periodic discovery pass polls TMDB for the
//! latest season of every subscribed series and posts one message per batch
//! of new episodes, mentioning the subscribers. Announced episodes are
//! recorded in SQLite so each one is posted at most once.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod discovery;
pub mod logging;
pub mod metadata;
pub mod notify;
pub mod scheduler;
pub mod storage;
pub mod util;
