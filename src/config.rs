//! Settings: the explicit configuration object handed to every pass
//!
//! Persisted by the host as one JSON blob. Every field has a default so a
//! partial or older settings file still loads.

use crate::harvest::CompletedRecord;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default name of the output document.
pub const DEFAULT_OUTPUT_PATH: &str = "TODO.md";

// A century; longer windows behave like `keep`.
const MAX_RETENTION_HOURS: u64 = 24 * 365 * 100;

/// How long checked items stay in the output document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetentionPolicy {
    /// Checked items disappear on the next rewrite
    #[default]
    Immediate,
    /// Checked items disappear once the retention window has passed
    Delayed,
    /// Checked items are never removed
    Keep,
}

impl std::fmt::Display for RetentionPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Immediate => write!(f, "immediate"),
            Self::Delayed => write!(f, "delayed"),
            Self::Keep => write!(f, "keep"),
        }
    }
}

/// Retention policy together with its window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Retention {
    pub policy: RetentionPolicy,
    pub duration: Duration,
}

impl Retention {
    pub fn new(policy: RetentionPolicy, duration: Duration) -> Self {
        Self { policy, duration }
    }

    pub fn immediate() -> Self {
        Self::new(RetentionPolicy::Immediate, Duration::zero())
    }

    pub fn delayed_hours(hours: i64) -> Self {
        Self::new(RetentionPolicy::Delayed, Duration::hours(hours))
    }

    pub fn keep() -> Self {
        Self::new(RetentionPolicy::Keep, Duration::zero())
    }

    pub fn duration_millis(&self) -> i64 {
        self.duration.num_milliseconds()
    }
}

/// Configuration problems, reported before any document is touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("no output document path configured")]
    MissingOutputPath,

    #[error("no tags configured")]
    NoTags,

    #[error("classification is enabled but no endpoint is configured")]
    MissingEndpoint,

    #[error("classification is enabled but no credential is configured")]
    MissingCredential,
}

/// Errors reading or writing the settings file.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Process-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    /// Directories whose documents are scanned, in scan order
    pub target_directories: Vec<String>,
    /// Recognized tag strings, in match order
    pub tags: Vec<String>,
    pub retention_policy: RetentionPolicy,
    /// Window for [`RetentionPolicy::Delayed`]
    pub retention_hours: u64,
    pub output_path: String,
    pub classification_enabled: bool,
    pub classification_endpoint: String,
    pub credential: String,
    /// Refuse collection passes for a while after a classification
    pub protect_output: bool,
    pub protection_minutes: u64,
    /// Epoch millis of the last successful classification
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_classified_at: Option<i64>,
    /// Completion timestamps of checked output lines
    pub completed: Vec<CompletedRecord>,
    /// Period of the background collection pass in `watch` mode
    pub collect_interval_minutes: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            target_directories: Vec::new(),
            tags: vec!["#TODO".to_string()],
            retention_policy: RetentionPolicy::Immediate,
            retention_hours: 24,
            output_path: DEFAULT_OUTPUT_PATH.to_string(),
            classification_enabled: false,
            classification_endpoint: String::new(),
            credential: String::new(),
            protect_output: false,
            protection_minutes: 10,
            last_classified_at: None,
            completed: Vec::new(),
            collect_interval_minutes: 30,
        }
    }
}

impl Settings {
    /// Load settings from `path`; a missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        match std::fs::read_to_string(path.as_ref()) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    /// Persist settings as pretty JSON, creating parent directories.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SettingsError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Check the configuration a pass needs.
    ///
    /// `classify` asks for the classification fields to be checked too.
    pub fn validate(&self, classify: bool) -> Result<(), ConfigError> {
        if self.output_path.trim().is_empty() {
            return Err(ConfigError::MissingOutputPath);
        }
        if self.tags.iter().all(|t| t.trim().is_empty()) {
            return Err(ConfigError::NoTags);
        }
        if classify {
            if self.classification_endpoint.trim().is_empty() {
                return Err(ConfigError::MissingEndpoint);
            }
            if self.credential.trim().is_empty() {
                return Err(ConfigError::MissingCredential);
            }
        }
        Ok(())
    }

    pub fn retention(&self) -> Retention {
        let hours = self.retention_hours.min(MAX_RETENTION_HOURS) as i64;
        Retention::new(self.retention_policy, Duration::hours(hours))
    }

    /// Milliseconds left in the post-classification protection window.
    ///
    /// `None` when the output is not protected at `now_ms`.
    pub fn protection_remaining(&self, now_ms: i64) -> Option<i64> {
        if !self.protect_output {
            return None;
        }
        let last = self.last_classified_at?;
        let window = i64::try_from(self.protection_minutes)
            .unwrap_or(i64::MAX / 60_000)
            .saturating_mul(60_000);
        let remaining = last.saturating_add(window).saturating_sub(now_ms);
        (remaining > 0).then_some(remaining)
    }
}

/// Default settings path (~/.config/todo-harvest/settings.json)
pub fn default_settings_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| dirs::home_dir().unwrap_or_default().join(".config"));
    config_dir.join("todo-harvest").join("settings.json")
}
