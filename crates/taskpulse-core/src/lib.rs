//! # TaskPulse Core Library
//!
//! Notification scheduling and delivery for the TaskPulse productivity app.
//! All operations are available through the library and the standalone CLI;
//! the host app plugs in its own platform, preference store and effects.
//!
//! ## Architecture
//!
//! - **Smart scheduler**: a pure rule evaluator deciding whether and when a
//!   notification is sent (urgency, do-not-disturb, focus, meetings, daily caps)
//! - **Delivery queue**: in-memory queue drained on an interval, with linear
//!   retry backoff for failed dispatches
//! - **Service**: the façade callers use; owns the queue, history and
//!   background tasks
//! - **Actions**: maps notification action ids to app effects
//! - **Storage**: TOML configuration and JSON preferences in the data directory
//!
//! ## Key Components
//!
//! - [`NotificationService`]: scheduling, cancellation and lifecycle
//! - [`SmartScheduler`]: delivery decisions
//! - [`ActionHandler`]: action dispatch
//! - [`NotifyConfig`]: pipeline tuning

pub mod actions;
pub mod clock;
pub mod error;
pub mod notifications;
pub mod storage;

pub use actions::{ActionEffects, ActionHandler, ActionResult, HapticPattern};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorInfo, PlatformError, PreferencesError, Result, ServiceError};
pub use notifications::{
    NotificationCategory, NotificationPlatform, NotificationRequest, NotificationService,
    NotificationType, Priority, SmartScheduler, UserPreferences,
};
pub use storage::NotifyConfig;
