//! Action dispatch.
//!
//! Every action resolves to an [`ActionResult`]; effect failures become a
//! failed result with a generic message and are logged.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::effects::{ActionEffects, HapticPattern, NoopEffects};

const DEFAULT_ROUTE: &str = "/notifications";
const TASKS_ROUTE: &str = "/tasks";
const DEFAULT_SOUND: &str = "default";
const GENERIC_FAILURE: &str = "Action failed";

/// Outcome of handling one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_to: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_data: Option<Value>,
}

impl ActionResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            redirect_to: None,
            additional_data: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            redirect_to: None,
            additional_data: None,
        }
    }

    pub fn redirect(mut self, route: impl Into<String>) -> Self {
        self.redirect_to = Some(route.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.additional_data = Some(data);
        self
    }
}

/// Known action identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Open,
    CompleteTask,
    PlaySound,
    Haptic,
    Dismiss,
}

impl ActionKind {
    pub fn parse(action_id: &str) -> Option<Self> {
        match action_id {
            "open" | "view" => Some(ActionKind::Open),
            "complete_task" => Some(ActionKind::CompleteTask),
            "play_sound" => Some(ActionKind::PlaySound),
            "haptic" => Some(ActionKind::Haptic),
            "dismiss" => Some(ActionKind::Dismiss),
            _ => None,
        }
    }
}

/// Maps action identifiers to effects.
#[derive(Clone)]
pub struct ActionHandler {
    effects: Arc<dyn ActionEffects>,
}

impl Default for ActionHandler {
    fn default() -> Self {
        Self::new(Arc::new(NoopEffects))
    }
}

impl ActionHandler {
    pub fn new(effects: Arc<dyn ActionEffects>) -> Self {
        Self { effects }
    }

    /// Handle `action_id` with the notification's payload.
    pub async fn handle(&self, action_id: &str, payload: &Value) -> ActionResult {
        let Some(kind) = ActionKind::parse(action_id) else {
            return ActionResult::failed("Unknown action");
        };

        match kind {
            ActionKind::Open => {
                let route = str_field(payload, "route").unwrap_or(DEFAULT_ROUTE);
                match self.effects.navigate(route).await {
                    Ok(()) => ActionResult::ok("Opened").redirect(route),
                    Err(e) => failure(action_id, &e),
                }
            }
            ActionKind::CompleteTask => {
                let Some(task_id) = str_field(payload, "task_id") else {
                    return ActionResult::failed("Missing task id");
                };
                match self.effects.complete_task(task_id).await {
                    Ok(()) => ActionResult::ok("Task completed")
                        .redirect(TASKS_ROUTE)
                        .with_data(serde_json::json!({ "task_id": task_id })),
                    Err(e) => failure(action_id, &e),
                }
            }
            ActionKind::PlaySound => {
                let sound = str_field(payload, "sound").unwrap_or(DEFAULT_SOUND);
                match self.effects.play_sound(sound).await {
                    Ok(()) => ActionResult::ok("Sound played"),
                    Err(e) => failure(action_id, &e),
                }
            }
            ActionKind::Haptic => {
                let pattern = str_field(payload, "pattern")
                    .and_then(|p| p.parse::<HapticPattern>().ok())
                    .unwrap_or_default();
                match self.effects.haptic(pattern).await {
                    Ok(()) => ActionResult::ok("Haptic feedback triggered"),
                    Err(e) => failure(action_id, &e),
                }
            }
            ActionKind::Dismiss => ActionResult::ok("Dismissed"),
        }
    }
}

fn str_field<'a>(payload: &'a Value, key: &str) -> Option<&'a str> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn failure(action_id: &str, error: &dyn std::error::Error) -> ActionResult {
    tracing::warn!("action '{action_id}' failed: {error}");
    ActionResult::failed(GENERIC_FAILURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ActionError;
    use async_trait::async_trait;
    use serde_json::json;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingEffects {
        calls: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl ActionEffects for RecordingEffects {
        async fn navigate(&self, route: &str) -> Result<(), ActionError> {
            if self.fail {
                return Err(ActionError::Navigation {
                    route: route.into(),
                    message: "no navigator".into(),
                });
            }
            self.calls.lock().await.push(format!("navigate:{route}"));
            Ok(())
        }

        async fn complete_task(&self, task_id: &str) -> Result<(), ActionError> {
            if self.fail {
                return Err(ActionError::TaskUpdate {
                    task_id: task_id.into(),
                    message: "locked".into(),
                });
            }
            self.calls.lock().await.push(format!("complete:{task_id}"));
            Ok(())
        }

        async fn play_sound(&self, sound: &str) -> Result<(), ActionError> {
            self.calls.lock().await.push(format!("sound:{sound}"));
            Ok(())
        }

        async fn haptic(&self, pattern: HapticPattern) -> Result<(), ActionError> {
            self.calls.lock().await.push(format!("haptic:{pattern:?}"));
            Ok(())
        }
    }

    #[tokio::test]
    async fn unknown_action_fails_without_effects() {
        let effects = Arc::new(RecordingEffects::default());
        let handler = ActionHandler::new(effects.clone());

        let result = handler.handle("launch_rocket", &Value::Null).await;
        assert!(!result.success);
        assert_eq!(result.message, "Unknown action");
        assert!(effects.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn open_navigates_to_payload_route() {
        let effects = Arc::new(RecordingEffects::default());
        let handler = ActionHandler::new(effects.clone());

        let result = handler.handle("view", &json!({ "route": "/tasks/42" })).await;
        assert!(result.success);
        assert_eq!(result.redirect_to.as_deref(), Some("/tasks/42"));

        let result = handler.handle("open", &Value::Null).await;
        assert_eq!(result.redirect_to.as_deref(), Some(DEFAULT_ROUTE));
        assert_eq!(
            *effects.calls.lock().await,
            vec!["navigate:/tasks/42".to_string(), "navigate:/notifications".to_string()]
        );
    }

    #[tokio::test]
    async fn complete_task_requires_task_id() {
        let handler = ActionHandler::new(Arc::new(RecordingEffects::default()));

        let missing = handler.handle("complete_task", &json!({})).await;
        assert!(!missing.success);
        assert_eq!(missing.message, "Missing task id");

        let done = handler
            .handle("complete_task", &json!({ "task_id": "t-7" }))
            .await;
        assert!(done.success);
        assert_eq!(done.additional_data, Some(json!({ "task_id": "t-7" })));
    }

    #[tokio::test]
    async fn effect_errors_become_generic_failures() {
        let handler = ActionHandler::new(Arc::new(RecordingEffects {
            fail: true,
            ..RecordingEffects::default()
        }));

        let result = handler.handle("open", &Value::Null).await;
        assert!(!result.success);
        assert_eq!(result.message, GENERIC_FAILURE);
        assert!(result.redirect_to.is_none());
    }

    #[tokio::test]
    async fn haptic_falls_back_to_light_pattern() {
        let effects = Arc::new(RecordingEffects::default());
        let handler = ActionHandler::new(effects.clone());

        handler.handle("haptic", &json!({ "pattern": "rumble" })).await;
        handler.handle("haptic", &json!({ "pattern": "success" })).await;
        handler.handle("play_sound", &Value::Null).await;
        assert_eq!(
            *effects.calls.lock().await,
            vec![
                "haptic:Light".to_string(),
                "haptic:Success".to_string(),
                "sound:default".to_string()
            ]
        );
    }

    #[tokio::test]
    async fn dismiss_is_a_successful_no_op() {
        let result = ActionHandler::default().handle("dismiss", &Value::Null).await;
        assert!(result.success);
        assert!(result.additional_data.is_none());
    }
}
