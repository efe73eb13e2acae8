//! Notification action handling.
//!
//! Maps the action a user picked on a notification to an application effect
//! and reports what happened.

pub mod effects;
pub mod handler;

pub use effects::{ActionEffects, HapticPattern, NoopEffects};
pub use handler::{ActionHandler, ActionKind, ActionResult};
