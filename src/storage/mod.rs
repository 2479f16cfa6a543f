//! Storage layer for focuslog.
//!
//! This module provides SQLite-based persistence for:
//! - The local session cache (offline source of truth)
//! - The outbox of writes waiting for the remote store

mod database;
mod migrations;

pub use database::Database;
