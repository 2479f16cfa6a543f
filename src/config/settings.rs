//! Configuration settings for focuslog.
//!
//! Settings are loaded from `~/.focuslog/config.yaml`. Remote credentials can
//! also come from the environment so they stay out of the file.

use chrono::Weekday;
use serde::{Deserialize, Serialize};

use crate::cli::args::OutputFormat;
use crate::config::Paths;
use crate::error::FocusError;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// General settings.
    pub general: GeneralConfig,
    /// Remote store connection.
    pub remote: RemoteConfig,
    /// Outbox draining.
    pub sync: SyncConfig,
    /// Calendar window boundaries.
    pub calendar: CalendarConfig,
    /// Status display.
    pub display: DisplayConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default output format.
    #[serde(default = "default_output_format")]
    pub default_output: OutputFormat,
    /// Color output setting.
    #[serde(default)]
    pub color: ColorSetting,
}

/// Color output setting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ColorSetting {
    /// Auto-detect based on terminal.
    #[default]
    Auto,
    /// Always use colors.
    Always,
    /// Never use colors.
    Never,
}

impl ColorSetting {
    /// Apply the setting to the global `colored` override.
    pub fn apply(self) {
        match self {
            Self::Auto => colored::control::unset_override(),
            Self::Always => colored::control::set_override(true),
            Self::Never => colored::control::set_override(false),
        }
    }
}

/// Remote store settings.
///
/// Without an `owner_id` the tracker runs local-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the hosted backend, e.g. `https://abc.example.co`.
    pub url: Option<String>,
    /// Public API key sent as `apikey` and bearer token.
    pub api_key: Option<String>,
    /// Owner identity rows are written under.
    pub owner_id: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

/// Outbox settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Seconds between background drain attempts.
    #[serde(default = "default_drain_interval")]
    pub drain_interval_secs: u64,
    /// Attempts before a write is dead-lettered. `None` retries forever.
    #[serde(default)]
    pub max_attempts: Option<u32>,
    /// Maximum writes replayed per drain.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Calendar settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// First day of the week for the week window.
    ///
    /// Anything other than Sunday changes which sessions count toward the
    /// week total compared to earlier releases.
    #[serde(default = "default_week_start", with = "weekday_name")]
    pub week_starts_on: Weekday,
}

/// Status display settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Refresh interval for `status --watch`, in seconds.
    #[serde(default = "default_tick_secs")]
    pub tick_interval_secs: u64,
}

// Default value functions for serde
const fn default_output_format() -> OutputFormat {
    OutputFormat::Pretty
}

const fn default_timeout_secs() -> u64 {
    10
}

const fn default_drain_interval() -> u64 {
    30
}

const fn default_batch_size() -> usize {
    100
}

const fn default_week_start() -> Weekday {
    Weekday::Sun
}

const fn default_tick_secs() -> u64 {
    1
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            default_output: default_output_format(),
            color: ColorSetting::Auto,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            owner_id: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drain_interval_secs: default_drain_interval(),
            max_attempts: None,
            batch_size: default_batch_size(),
        }
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            week_starts_on: default_week_start(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: default_tick_secs(),
        }
    }
}

impl RemoteConfig {
    /// Whether both an endpoint and an owner are known.
    #[must_use]
    pub const fn is_configured(&self) -> bool {
        self.url.is_some() && self.owner_id.is_some()
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("FOCUSLOG_REMOTE_URL") {
            self.url = Some(url);
        }
        if let Ok(key) = std::env::var("FOCUSLOG_API_KEY") {
            self.api_key = Some(key);
        }
        if let Ok(owner) = std::env::var("FOCUSLOG_OWNER_ID") {
            self.owner_id = Some(owner);
        }
    }
}

impl Config {
    /// Load configuration from the default path, then apply env overrides.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self, FocusError> {
        let paths = Paths::new()?;
        let mut config = Self::load_from_path(&paths.config_file)?;
        config.remote.apply_env();
        Ok(config)
    }

    /// Load configuration from a specific path.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load_from_path(path: &std::path::Path) -> Result<Self, FocusError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|e| {
            FocusError::Config(format!(
                "Failed to read config file {}: {e}",
                path.display()
            ))
        })?;

        serde_yaml::from_str(&contents).map_err(|e| {
            FocusError::Config(format!(
                "Failed to parse config file {}: {e}",
                path.display()
            ))
        })
    }

    /// Save configuration to a specific path.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file cannot be written.
    pub fn save_to_path(&self, path: &std::path::Path) -> Result<(), FocusError> {
        let contents = serde_yaml::to_string(self)
            .map_err(|e| FocusError::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, contents).map_err(|e| {
            FocusError::Config(format!(
                "Failed to write config file {}: {e}",
                path.display()
            ))
        })
    }
}

/// Serialize weekdays as lowercase English names ("sunday", "monday", ...).
mod weekday_name {
    use chrono::Weekday;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(day: &Weekday, s: S) -> Result<S::Ok, S::Error> {
        let name = match day {
            Weekday::Mon => "monday",
            Weekday::Tue => "tuesday",
            Weekday::Wed => "wednesday",
            Weekday::Thu => "thursday",
            Weekday::Fri => "friday",
            Weekday::Sat => "saturday",
            Weekday::Sun => "sunday",
        };
        s.serialize_str(name)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Weekday, D::Error> {
        let raw = String::deserialize(d)?;
        raw.parse::<Weekday>()
            .map_err(|_| serde::de::Error::custom(format!("invalid weekday: {raw}")))
    }
}
