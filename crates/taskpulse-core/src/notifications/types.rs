//! Notification data model: requests, queue items, decisions and history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Notification priority, ordered from least to most important.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority: {other}")),
        }
    }
}

/// What kind of message a notification carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Reminder,
    Alert,
    Update,
    Achievement,
    System,
}

impl std::str::FromStr for NotificationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "reminder" => Ok(NotificationType::Reminder),
            "alert" => Ok(NotificationType::Alert),
            "update" => Ok(NotificationType::Update),
            "achievement" => Ok(NotificationType::Achievement),
            "system" => Ok(NotificationType::System),
            other => Err(format!("unknown notification type: {other}")),
        }
    }
}

/// Category used for preference lookups, daily caps and platform channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationCategory {
    Tasks,
    Deadlines,
    Focus,
    Breaks,
    Achievements,
    Collaboration,
    System,
}

impl NotificationCategory {
    pub const ALL: [NotificationCategory; 7] = [
        NotificationCategory::Tasks,
        NotificationCategory::Deadlines,
        NotificationCategory::Focus,
        NotificationCategory::Breaks,
        NotificationCategory::Achievements,
        NotificationCategory::Collaboration,
        NotificationCategory::System,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            NotificationCategory::Tasks => "tasks",
            NotificationCategory::Deadlines => "deadlines",
            NotificationCategory::Focus => "focus",
            NotificationCategory::Breaks => "breaks",
            NotificationCategory::Achievements => "achievements",
            NotificationCategory::Collaboration => "collaboration",
            NotificationCategory::System => "system",
        }
    }

    /// Platform channel the category is posted to.
    pub fn channel_id(self) -> &'static str {
        self.as_str()
    }

    /// Daily cap applied when the user never configured the category.
    pub fn default_max_per_day(self) -> u32 {
        match self {
            NotificationCategory::Tasks => 20,
            NotificationCategory::Deadlines => 10,
            NotificationCategory::Focus | NotificationCategory::Breaks => 30,
            NotificationCategory::Achievements => 5,
            NotificationCategory::Collaboration => 15,
            NotificationCategory::System => 10,
        }
    }
}

impl std::fmt::Display for NotificationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NotificationCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NotificationCategory::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

/// A caller-supplied notification. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub id: String,
    pub notification_type: NotificationType,
    pub category: NotificationCategory,
    pub title: String,
    pub message: String,
    #[serde(default)]
    pub priority: Priority,
    pub user_id: String,
    /// Requested delivery time; `None` means as soon as permitted.
    #[serde(default)]
    pub scheduled_for: Option<DateTime<Utc>>,
    /// Opaque payload forwarded to the action handler.
    #[serde(default)]
    pub data: serde_json::Value,
    /// Action identifiers offered to the user, in display order.
    #[serde(default)]
    pub actions: Vec<String>,
}

impl NotificationRequest {
    /// Create a request with a fresh id, normal priority and no payload.
    pub fn new(
        user_id: impl Into<String>,
        notification_type: NotificationType,
        category: NotificationCategory,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            notification_type,
            category,
            title: title.into(),
            message: message.into(),
            priority: Priority::Normal,
            user_id: user_id.into(),
            scheduled_for: None,
            data: serde_json::Value::Null,
            actions: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn scheduled_at(mut self, at: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(at);
        self
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = data;
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions = actions.into_iter().map(Into::into).collect();
        self
    }

    /// Reject requests that can never be delivered.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("id must not be empty".into());
        }
        if self.user_id.trim().is_empty() {
            return Err("user_id must not be empty".into());
        }
        if self.title.trim().is_empty() {
            return Err("title must not be empty".into());
        }
        Ok(())
    }
}

/// A request waiting in the delivery queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueItem {
    pub request: NotificationRequest,
    /// Delivery time decided by the scheduler.
    pub scheduled_time: DateTime<Utc>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub enqueued_at: DateTime<Utc>,
}

impl QueueItem {
    pub fn new(
        request: NotificationRequest,
        scheduled_time: DateTime<Utc>,
        max_retries: u32,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        Self {
            request,
            scheduled_time,
            retry_count: 0,
            max_retries,
            enqueued_at,
        }
    }

    pub fn id(&self) -> &str {
        &self.request.id
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.scheduled_time <= now
    }
}

/// Which scheduling rule produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionReason {
    UrgentBypass,
    DoNotDisturbDeferred,
    DoNotDisturbSkipped,
    FocusDeferred,
    FocusSkipped,
    MeetingDeferred,
    MeetingSkipped,
    DailyLimitReached,
    Default,
    FailOpen,
}

impl std::fmt::Display for DecisionReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            DecisionReason::UrgentBypass => "urgent notification bypasses all rules",
            DecisionReason::DoNotDisturbDeferred => "deferred until do-not-disturb ends",
            DecisionReason::DoNotDisturbSkipped => "skipped due to do-not-disturb",
            DecisionReason::FocusDeferred => "deferred while user is focused",
            DecisionReason::FocusSkipped => "skipped during focus",
            DecisionReason::MeetingDeferred => "deferred until after meeting",
            DecisionReason::MeetingSkipped => "skipped during meeting",
            DecisionReason::DailyLimitReached => "daily limit reached",
            DecisionReason::Default => "default schedule",
            DecisionReason::FailOpen => "scheduler error, sending immediately",
        };
        f.write_str(text)
    }
}

/// Scheduler output. Not persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDecision {
    pub scheduled_time: DateTime<Utc>,
    pub should_send: bool,
    pub reason: DecisionReason,
}

impl ScheduleDecision {
    pub fn send(scheduled_time: DateTime<Utc>, reason: DecisionReason) -> Self {
        Self {
            scheduled_time,
            should_send: true,
            reason,
        }
    }

    pub fn skip(now: DateTime<Utc>, reason: DecisionReason) -> Self {
        Self {
            scheduled_time: now,
            should_send: false,
            reason,
        }
    }
}

/// What the user is doing right now, as reported by the app.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserActivity {
    pub is_focused: bool,
    pub is_in_meeting: bool,
    pub last_activity: DateTime<Utc>,
}

impl UserActivity {
    pub fn idle(last_activity: DateTime<Utc>) -> Self {
        Self {
            is_focused: false,
            is_in_meeting: false,
            last_activity,
        }
    }
}

/// A delivered notification, kept for daily caps and status lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    pub category: NotificationCategory,
    pub delivered_at: DateTime<Utc>,
}

/// Snapshot of user context handed to the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulingContext {
    pub now: DateTime<Utc>,
    pub user_activity: UserActivity,
    #[serde(default)]
    pub notification_history: Vec<HistoryEntry>,
}

impl SchedulingContext {
    /// Context for an idle user with no delivery history.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            user_activity: UserActivity::idle(now),
            notification_history: Vec::new(),
        }
    }
}

/// Lifecycle of a notification as seen by the service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending {
        scheduled_time: DateTime<Utc>,
        retry_count: u32,
    },
    Delivered {
        delivered_at: DateTime<Utc>,
    },
    Unknown,
}

/// Result of a successful `schedule_notification` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScheduleOutcome {
    /// Enqueued for delivery at `scheduled_time`.
    Queued {
        id: String,
        scheduled_time: DateTime<Utc>,
        reason: DecisionReason,
    },
    /// Handled but not delivered.
    Suppressed { id: String, reason: DecisionReason },
}

impl ScheduleOutcome {
    pub fn id(&self) -> &str {
        match self {
            ScheduleOutcome::Queued { id, .. } | ScheduleOutcome::Suppressed { id, .. } => id,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self, ScheduleOutcome::Queued { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_is_ordinal() {
        assert!(Priority::Low < Priority::Normal);
        assert!(Priority::High < Priority::Urgent);
        assert_eq!("URGENT".parse::<Priority>().unwrap(), Priority::Urgent);
    }

    #[test]
    fn category_parses_from_channel_name() {
        for category in NotificationCategory::ALL {
            assert_eq!(category.channel_id().parse::<NotificationCategory>().unwrap(), category);
        }
        assert!("marketing".parse::<NotificationCategory>().is_err());
    }

    #[test]
    fn request_validation_rejects_blank_fields() {
        let request = NotificationRequest::new(
            "",
            NotificationType::Reminder,
            NotificationCategory::Tasks,
            "Title",
            "Body",
        );
        assert!(request.validate().is_err());

        let request = NotificationRequest::new(
            "u1",
            NotificationType::Reminder,
            NotificationCategory::Tasks,
            "  ",
            "Body",
        );
        assert!(request.validate().unwrap_err().contains("title"));
    }

    #[test]
    fn reason_display_is_human_readable() {
        assert_eq!(DecisionReason::DailyLimitReached.to_string(), "daily limit reached");
        assert_eq!(
            DecisionReason::DoNotDisturbSkipped.to_string(),
            "skipped due to do-not-disturb"
        );
    }
}
