//! Side effects an action can trigger.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ActionError;

/// Haptic feedback patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HapticPattern {
    #[default]
    Light,
    Medium,
    Heavy,
    Success,
    Warning,
    Error,
}

impl std::str::FromStr for HapticPattern {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "light" => Ok(HapticPattern::Light),
            "medium" => Ok(HapticPattern::Medium),
            "heavy" => Ok(HapticPattern::Heavy),
            "success" => Ok(HapticPattern::Success),
            "warning" => Ok(HapticPattern::Warning),
            "error" => Ok(HapticPattern::Error),
            other => Err(format!("unknown haptic pattern: {other}")),
        }
    }
}

/// Application hooks used by the action handler.
///
/// Each call is independent. Implementations report failures through
/// [`ActionError`] and must not block beyond their own I/O.
#[async_trait]
pub trait ActionEffects: Send + Sync {
    async fn navigate(&self, route: &str) -> Result<(), ActionError>;

    async fn complete_task(&self, task_id: &str) -> Result<(), ActionError>;

    async fn play_sound(&self, sound: &str) -> Result<(), ActionError>;

    async fn haptic(&self, pattern: HapticPattern) -> Result<(), ActionError>;
}

/// Effects that do nothing, for headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEffects;

#[async_trait]
impl ActionEffects for NoopEffects {
    async fn navigate(&self, _route: &str) -> Result<(), ActionError> {
        Ok(())
    }

    async fn complete_task(&self, _task_id: &str) -> Result<(), ActionError> {
        Ok(())
    }

    async fn play_sound(&self, _sound: &str) -> Result<(), ActionError> {
        Ok(())
    }

    async fn haptic(&self, _pattern: HapticPattern) -> Result<(), ActionError> {
        Ok(())
    }
}
