//! Notification scheduling and delivery.
//!
//! A request flows through the [`NotificationService`]:
//!
//! 1. Preferences gate it (global opt-out, per-category switch)
//! 2. The [`SmartScheduler`] decides whether and when to send it
//! 3. The [`DeliveryQueue`] holds it until due
//! 4. The drain loop hands due items to the [`NotificationPlatform`], retrying failures

mod analytics;
mod platform;
mod preferences;
mod queue;
mod scheduler;
mod service;
mod types;

pub use analytics::{AnalyticsEvent, AnalyticsEventKind, AnalyticsSink, NoopAnalytics, TracingAnalytics};
pub use platform::{
    InterruptionLevel, NotificationContent, NotificationPlatform, PermissionStatus, PlatformEvent,
};
pub use preferences::{
    CategoryPreference, DoNotDisturb, InMemoryPreferencesStore, JsonPreferencesStore,
    PreferencesPatch, PreferencesStore, SmartScheduling, TimeOfDay, UserPreferences,
};
pub use queue::{DeliveryQueue, RetryOutcome};
pub use scheduler::{DeferralPolicy, SmartScheduler};
pub use service::{DrainReport, InitializeOutcome, NotificationService, ServiceBuilder};
pub use types::{
    DecisionReason, HistoryEntry, NotificationCategory, NotificationRequest, NotificationStatus,
    NotificationType, Priority, QueueItem, ScheduleDecision, ScheduleOutcome, SchedulingContext,
    UserActivity,
};
