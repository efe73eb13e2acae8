//! TOML-based notification configuration.
//!
//! Stores delivery tuning:
//! - Drain loop interval
//! - Retry count and backoff
//! - Focus/meeting deferral delays
//! - History and analytics batch sizes
//!
//! Configuration is stored at `~/.config/taskpulse/notifications.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::data_dir;
use crate::error::ConfigError;
use crate::notifications::DeferralPolicy;

/// Notification pipeline configuration.
///
/// Serialized to/from TOML at `~/.config/taskpulse/notifications.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyConfig {
    /// Seconds between drain passes.
    #[serde(default = "default_drain_interval_secs")]
    pub drain_interval_secs: u64,
    /// Dispatch attempts before a queue item is dropped.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Linear backoff step between attempts.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,
    #[serde(default = "default_focus_defer_secs")]
    pub focus_defer_secs: u64,
    #[serde(default = "default_meeting_defer_secs")]
    pub meeting_defer_secs: u64,
    /// Deliveries remembered per user.
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_analytics_batch_size")]
    pub analytics_batch_size: usize,
    /// Delay step between push token attempts during initialization.
    #[serde(default = "default_token_retry_delay_ms")]
    pub token_retry_delay_ms: u64,
}

// Default functions
fn default_drain_interval_secs() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_backoff_secs() -> u64 {
    60
}
fn default_focus_defer_secs() -> u64 {
    60
}
fn default_meeting_defer_secs() -> u64 {
    5 * 60
}
fn default_history_limit() -> usize {
    200
}
fn default_analytics_batch_size() -> usize {
    20
}
fn default_token_retry_delay_ms() -> u64 {
    500
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            drain_interval_secs: default_drain_interval_secs(),
            max_retries: default_max_retries(),
            retry_backoff_secs: default_retry_backoff_secs(),
            focus_defer_secs: default_focus_defer_secs(),
            meeting_defer_secs: default_meeting_defer_secs(),
            history_limit: default_history_limit(),
            analytics_batch_size: default_analytics_batch_size(),
            token_retry_delay_ms: default_token_retry_delay_ms(),
        }
    }
}

impl NotifyConfig {
    /// Default location of the config file.
    pub fn path() -> Result<PathBuf, ConfigError> {
        data_dir()
            .map(|dir| dir.join("notifications.toml"))
            .map_err(|e| ConfigError::DataDir(e.to_string()))
    }

    /// Load from the default location, writing defaults if the file is missing.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    /// Load from `path`, writing defaults if the file is missing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed or fails
    /// validation, or if the default config cannot be written.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: NotifyConfig =
                    toml::from_str(&content).map_err(|e| ConfigError::LoadFailed {
                        path: path.to_path_buf(),
                        message: e.to_string(),
                    })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }),
        }
    }

    /// Persist to `path`.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))
    }

    /// Persist to the default location.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("using default notification config: {e}");
            Self::default()
        })
    }

    /// Reject values that would stall or spin the pipeline.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };
        if self.drain_interval_secs == 0 {
            return Err(invalid("drain_interval_secs", "must be at least 1"));
        }
        if self.max_retries == 0 {
            return Err(invalid("max_retries", "must be at least 1"));
        }
        if self.analytics_batch_size == 0 {
            return Err(invalid("analytics_batch_size", "must be at least 1"));
        }
        let max_secs = max_delta_secs();
        for (key, value) in [
            ("retry_backoff_secs", self.retry_backoff_secs),
            ("focus_defer_secs", self.focus_defer_secs),
            ("meeting_defer_secs", self.meeting_defer_secs),
        ] {
            if value > max_secs {
                return Err(invalid(key, &format!("must be at most {max_secs}")));
            }
        }
        Ok(())
    }

    pub fn drain_interval(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.drain_interval_secs)
    }

    /// Backoff step, saturated to the largest representable delta.
    pub fn retry_backoff(&self) -> chrono::Duration {
        i64::try_from(self.retry_backoff_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or(chrono::Duration::MAX)
    }

    pub fn token_retry_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.token_retry_delay_ms)
    }

    pub fn deferral_policy(&self) -> DeferralPolicy {
        DeferralPolicy {
            focus_defer_secs: i64::try_from(self.focus_defer_secs).unwrap_or(i64::MAX),
            meeting_defer_secs: i64::try_from(self.meeting_defer_secs).unwrap_or(i64::MAX),
        }
    }
}

/// Largest whole-second delta chrono can represent.
fn max_delta_secs() -> u64 {
    chrono::Duration::MAX.num_seconds().unsigned_abs()
}
