//! Core error types for taskpulse-core.
//!
//! This module defines the error hierarchy using thiserror. Every public
//! service operation returns [`ServiceError`]; the narrower enums describe
//! failures of the collaborators the service talks to.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::notifications::NotificationCategory;

/// Error returned by every public [`NotificationService`](crate::NotificationService) operation.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// The user switched notifications off globally.
    #[error("User {user_id} has opted out of notifications")]
    UserOptedOut { user_id: String },

    /// The request's category is disabled for this user.
    #[error("Category '{category}' is disabled for user {user_id}")]
    CategoryDisabled {
        user_id: String,
        category: NotificationCategory,
    },

    /// The request failed validation before reaching the scheduler.
    #[error("Invalid notification request: {0}")]
    InvalidRequest(String),

    /// `initialize()` has not completed successfully.
    #[error("Notification service is not initialized")]
    NotInitialized,

    /// `dispose()` was called.
    #[error("Notification service has been disposed")]
    Disposed,

    /// The platform refused notification permissions.
    #[error("Notification permission denied")]
    PermissionDenied,

    /// Platform call failed.
    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    /// Preferences could not be loaded or stored.
    #[error("Preferences error: {0}")]
    Preferences(#[from] PreferencesError),
}

/// Serialisable error payload handed to callers across a UI or FFI boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
    pub recoverable: bool,
}

impl ServiceError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::UserOptedOut { .. } => "USER_OPTED_OUT",
            ServiceError::CategoryDisabled { .. } => "CATEGORY_DISABLED",
            ServiceError::InvalidRequest(_) => "INVALID_REQUEST",
            ServiceError::NotInitialized => "NOT_INITIALIZED",
            ServiceError::Disposed => "SERVICE_DISPOSED",
            ServiceError::PermissionDenied => "PERMISSION_DENIED",
            ServiceError::Platform(_) => "PLATFORM_ERROR",
            ServiceError::Preferences(_) => "PREFERENCES_ERROR",
        }
    }

    /// Whether retrying the same call later may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            ServiceError::Platform(e) => e.is_transient(),
            ServiceError::Preferences(PreferencesError::Io(_)) => true,
            ServiceError::NotInitialized => true,
            _ => false,
        }
    }

    pub fn info(&self) -> ErrorInfo {
        ErrorInfo {
            code: self.code().to_string(),
            message: self.to_string(),
            recoverable: self.is_recoverable(),
        }
    }
}

/// Failures reported by a [`NotificationPlatform`](crate::notifications::NotificationPlatform).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    /// The platform could not be configured (no notification support, missing entitlement).
    #[error("platform unavailable: {0}")]
    Unavailable(String),

    /// Push token could not be fetched.
    #[error("push token unavailable: {0}")]
    TokenUnavailable(String),

    /// Scheduling a local notification failed.
    #[error("dispatch failed for {id}: {message}")]
    DispatchFailed { id: String, message: String },

    /// Cancelling a notification failed.
    #[error("cancel failed for {id}: {message}")]
    CancelFailed { id: String, message: String },
}

impl PlatformError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, PlatformError::Unavailable(_))
    }
}

/// Preferences loading, validation and persistence errors.
#[derive(Error, Debug)]
pub enum PreferencesError {
    /// Invalid preference value
    #[error("Invalid preference value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Preferences file could not be parsed
    #[error("Failed to parse preferences file {path}: {source}")]
    ParseFailed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data directory could not be resolved
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Scheduler evaluation errors. The service treats every one of these as fail-open.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchedulerError {
    /// The end of the do-not-disturb window has no instant on the current local date.
    #[error("do-not-disturb window end {end} cannot be resolved on {date}")]
    UnresolvableWindowEnd { end: String, date: String },

    /// Date arithmetic left the representable range.
    #[error("time arithmetic overflow while computing {0}")]
    TimeOverflow(&'static str),

    /// UTC offset outside of the valid range.
    #[error("invalid UTC offset: {0} minutes")]
    InvalidOffset(i32),
}

/// Analytics sink failures. These are logged and discarded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalyticsError {
    #[error("analytics sink rejected batch: {0}")]
    Rejected(String),

    #[error("analytics sink unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised by action side effects. The action handler converts these to
/// a failed [`ActionResult`](crate::actions::ActionResult).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ActionError {
    #[error("navigation to '{route}' failed: {message}")]
    Navigation { route: String, message: String },

    #[error("task '{task_id}' could not be completed: {message}")]
    TaskUpdate { task_id: String, message: String },

    #[error("sound playback failed: {0}")]
    Sound(String),

    #[error("haptic feedback failed: {0}")]
    Haptic(String),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Data directory could not be resolved
    #[error("Failed to access data directory: {0}")]
    DataDir(String),
}

/// Result type alias for ServiceError
pub type Result<T, E = ServiceError> = std::result::Result<T, E>;
