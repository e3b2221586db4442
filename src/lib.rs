//! Shared shopping list for families, kept in sync over Telegram.
//!
//! Every family member sees the same list; a change made by one member is
//! reflected in the list message of every other member.

pub mod config;
pub mod db;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod router;
pub mod transport;
pub mod ui;

pub use config::{Config, ConfigError};
pub use orchestrator::{Orchestrator, Outcome, SyncError};
