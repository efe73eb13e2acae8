//! Console stand-ins for the device notification API and app effects.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use taskpulse_core::actions::{ActionEffects, HapticPattern};
use taskpulse_core::error::{ActionError, PlatformError};
use taskpulse_core::notifications::{
    NotificationContent, NotificationPlatform, PermissionStatus, PlatformEvent,
};
use tokio::sync::broadcast;

/// Prints notifications to stdout.
pub struct ConsolePlatform {
    events: broadcast::Sender<PlatformEvent>,
}

impl ConsolePlatform {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(16);
        Self { events }
    }
}

impl Default for ConsolePlatform {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationPlatform for ConsolePlatform {
    async fn request_permissions(&self) -> Result<PermissionStatus, PlatformError> {
        Ok(PermissionStatus::Granted)
    }

    async fn get_push_token(&self) -> Result<String, PlatformError> {
        Ok(format!("console-{}", std::process::id()))
    }

    async fn schedule_local(
        &self,
        id: &str,
        content: &NotificationContent,
        trigger: Option<DateTime<Utc>>,
    ) -> Result<(), PlatformError> {
        let when = trigger.map_or_else(|| "now".to_string(), |t| t.to_rfc3339());
        println!(
            "[{}] {} ({:?}, {when})",
            content.channel_id, content.title, content.interruption_level
        );
        println!("    {}", content.body);
        if !content.actions.is_empty() {
            println!("    actions: {}", content.actions.join(", "));
        }
        println!("    id: {id}");
        // nobody may be listening yet
        let _ = self.events.send(PlatformEvent::Received { id: id.to_string() });
        Ok(())
    }

    async fn cancel(&self, id: &str) -> Result<(), PlatformError> {
        println!("cancelled {id}");
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
        self.events.subscribe()
    }
}

/// Prints what each action would do.
pub struct ConsoleEffects;

#[async_trait]
impl ActionEffects for ConsoleEffects {
    async fn navigate(&self, route: &str) -> Result<(), ActionError> {
        println!("-> navigate to {route}");
        Ok(())
    }

    async fn complete_task(&self, task_id: &str) -> Result<(), ActionError> {
        println!("-> task {task_id} marked complete");
        Ok(())
    }

    async fn play_sound(&self, sound: &str) -> Result<(), ActionError> {
        println!("-> play sound '{sound}'");
        Ok(())
    }

    async fn haptic(&self, pattern: HapticPattern) -> Result<(), ActionError> {
        println!("-> haptic {pattern:?}");
        Ok(())
    }
}
