//! Boundary to the device notification API.
//!
//! Implementations wrap whatever the host platform offers (local
//! notifications, push registration). Every call may fail; callers treat
//! failures as transient unless stated otherwise.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use super::types::{NotificationRequest, Priority};
use crate::error::PlatformError;

/// Result of a permission request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    /// Delivered quietly (notification center only).
    Provisional,
    Denied,
}

impl PermissionStatus {
    pub fn allows_delivery(self) -> bool {
        !matches!(self, PermissionStatus::Denied)
    }
}

/// How strongly the platform should interrupt the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionLevel {
    Passive,
    Active,
    TimeSensitive,
    Critical,
}

impl From<Priority> for InterruptionLevel {
    fn from(priority: Priority) -> Self {
        match priority {
            Priority::Low => InterruptionLevel::Passive,
            Priority::Normal => InterruptionLevel::Active,
            Priority::High => InterruptionLevel::TimeSensitive,
            Priority::Urgent => InterruptionLevel::Critical,
        }
    }
}

/// What the platform displays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub channel_id: String,
    pub interruption_level: InterruptionLevel,
    pub data: serde_json::Value,
    pub actions: Vec<String>,
}

impl From<&NotificationRequest> for NotificationContent {
    fn from(request: &NotificationRequest) -> Self {
        Self {
            title: request.title.clone(),
            body: request.message.clone(),
            channel_id: request.category.channel_id().to_string(),
            interruption_level: request.priority.into(),
            data: request.data.clone(),
            actions: request.actions.clone(),
        }
    }
}

/// Callbacks delivered by the platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PlatformEvent {
    /// The notification was shown while the app was running.
    Received { id: String },
    /// The user picked an action on the notification.
    ActionResponse {
        id: String,
        action: String,
        #[serde(default)]
        payload: serde_json::Value,
    },
}

/// Device notification API.
#[async_trait]
pub trait NotificationPlatform: Send + Sync {
    async fn request_permissions(&self) -> Result<PermissionStatus, PlatformError>;

    async fn get_push_token(&self) -> Result<String, PlatformError>;

    /// Post `content` under `id`. `trigger = None` delivers immediately.
    async fn schedule_local(
        &self,
        id: &str,
        content: &NotificationContent,
        trigger: Option<DateTime<Utc>>,
    ) -> Result<(), PlatformError>;

    /// Withdraw a scheduled or delivered notification.
    async fn cancel(&self, id: &str) -> Result<(), PlatformError>;

    /// Stream of received/response callbacks.
    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent>;
}
