//! focuslog - a focus-session timer and aggregator
//!
//! Tracks one active focus session at a time with pause/resume, totals focus
//! time over calendar windows and per work item, and syncs sessions to a
//! remote store through a durable offline outbox.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod features;
pub mod output;
pub mod storage;

pub use cli::args::{Cli, Commands, OutputFormat};
pub use error::FocusError;
pub use features::focus::{SessionTracker, Transition};
pub use features::sync::PersistOutcome;
