use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::Args;
use taskpulse_core::actions::ActionHandler;
use taskpulse_core::notifications::{
    JsonPreferencesStore, NotificationCategory, NotificationRequest, NotificationService,
    NotificationStatus, NotificationType, Priority, ScheduleOutcome, TracingAnalytics,
};
use taskpulse_core::NotifyConfig;

use crate::console::{ConsoleEffects, ConsolePlatform};

#[derive(Args)]
pub struct SendArgs {
    user_id: String,
    title: String,
    message: String,
    #[arg(long, default_value = "tasks")]
    category: NotificationCategory,
    #[arg(long, default_value = "normal")]
    priority: Priority,
    #[arg(long = "type", default_value = "reminder")]
    notification_type: NotificationType,
    /// Action offered on the notification (repeatable)
    #[arg(long = "action")]
    actions: Vec<String>,
    /// JSON payload handed to actions
    #[arg(long)]
    data: Option<String>,
    /// Deliver this many seconds from now
    #[arg(long)]
    in_secs: Option<u64>,
    /// Simulate the user picking this action after delivery
    #[arg(long)]
    respond: Option<String>,
}

pub async fn run(args: SendArgs) -> Result<(), Box<dyn std::error::Error>> {
    let deliver_at = match args.in_secs {
        Some(secs) => Some(
            seconds_from(Utc::now(), secs)
                .ok_or_else(|| format!("--in-secs {secs} is too large"))?,
        ),
        None => None,
    };

    let config = NotifyConfig::load()?;
    let service = NotificationService::builder(Arc::new(ConsolePlatform::new()))
        .config(config)
        .preferences(Arc::new(JsonPreferencesStore::open()?))
        .analytics(Arc::new(TracingAnalytics))
        .actions(ActionHandler::new(Arc::new(ConsoleEffects)))
        .build();
    service.initialize().await?;

    let data = match &args.data {
        Some(raw) => serde_json::from_str(raw)?,
        None => serde_json::Value::Null,
    };
    let mut request = NotificationRequest::new(
        &args.user_id,
        args.notification_type,
        args.category,
        &args.title,
        &args.message,
    )
    .with_priority(args.priority)
    .with_actions(args.actions)
    .with_data(data.clone());

    let outcome = match deliver_at {
        Some(at) => {
            request = request.scheduled_at(at);
            service.schedule_notification(request).await?
        }
        None => service.send_immediate_notification(request).await?,
    };

    let id = match outcome {
        ScheduleOutcome::Suppressed { id, reason } => {
            println!("suppressed {id}: {reason}");
            service.dispose().await?;
            return Ok(());
        }
        ScheduleOutcome::Queued {
            id, scheduled_time, ..
        } => {
            let wait = scheduled_time - Utc::now();
            if let Ok(wait) = wait.to_std() {
                println!("queued {id} for {}", scheduled_time.to_rfc3339());
                tokio::time::sleep(wait).await;
                service.drain_once().await?;
            }
            id
        }
    };

    match service.notification_status(&id).await? {
        NotificationStatus::Delivered { .. } => {
            if let Some(action) = &args.respond {
                let result = service.handle_action(&id, action, &data).await?;
                println!("{}", serde_json::to_string_pretty(&result)?);
            }
        }
        NotificationStatus::Pending { retry_count, .. } => {
            println!("{id} not delivered yet ({retry_count} failed attempts)");
        }
        NotificationStatus::Unknown => println!("{id} was dropped"),
    }

    service.dispose().await?;
    Ok(())
}

/// `now + secs`, or `None` past the representable range.
fn seconds_from(now: DateTime<Utc>, secs: u64) -> Option<DateTime<Utc>> {
    let delay = chrono::Duration::try_seconds(i64::try_from(secs).ok()?)?;
    now.checked_add_signed(delay)
}
