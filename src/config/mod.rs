//! Configuration management for focuslog.
//!
//! This module handles loading configuration from `~/.focuslog/`.

mod paths;
mod settings;

pub use paths::Paths;
pub use settings::{
    CalendarConfig, ColorSetting, Config, DisplayConfig, GeneralConfig, RemoteConfig, SyncConfig,
};
