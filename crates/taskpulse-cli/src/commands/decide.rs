use chrono::{DateTime, Utc};
use clap::Args;
use taskpulse_core::notifications::{
    HistoryEntry, JsonPreferencesStore, NotificationCategory, NotificationRequest,
    NotificationType, PreferencesStore, Priority, SchedulingContext, SmartScheduler,
    UserActivity,
};
use taskpulse_core::NotifyConfig;

#[derive(Args)]
pub struct DecideArgs {
    user_id: String,
    #[arg(long, default_value = "tasks")]
    category: NotificationCategory,
    #[arg(long, default_value = "normal")]
    priority: Priority,
    /// Evaluate at this instant (RFC 3339) instead of now
    #[arg(long)]
    at: Option<DateTime<Utc>>,
    /// Requested delivery time (RFC 3339)
    #[arg(long)]
    scheduled_for: Option<DateTime<Utc>>,
    /// User is in a focus session
    #[arg(long)]
    focused: bool,
    /// User is in a meeting
    #[arg(long)]
    in_meeting: bool,
    /// Deliveries in this category already made today
    #[arg(long, default_value_t = 0)]
    delivered_today: u32,
    /// Output as JSON
    #[arg(long)]
    json: bool,
}

pub async fn run(args: DecideArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = NotifyConfig::load_or_default();
    let store = JsonPreferencesStore::open()?;
    let prefs = store.get(&args.user_id).await?.unwrap_or_default();

    if !prefs.enabled {
        println!("rejected: {} has opted out", args.user_id);
        return Ok(());
    }
    if !prefs.category(args.category).enabled {
        println!("rejected: category {} is disabled", args.category);
        return Ok(());
    }

    let now = args.at.unwrap_or_else(Utc::now);
    let mut request = NotificationRequest::new(
        &args.user_id,
        NotificationType::Reminder,
        args.category,
        "Dry run",
        "",
    )
    .with_priority(args.priority);
    request.scheduled_for = args.scheduled_for;

    let context = SchedulingContext {
        now,
        user_activity: UserActivity {
            is_focused: args.focused,
            is_in_meeting: args.in_meeting,
            last_activity: now,
        },
        notification_history: (0..args.delivered_today)
            .map(|i| HistoryEntry {
                id: format!("history-{i}"),
                category: args.category,
                delivered_at: now,
            })
            .collect(),
    };

    let scheduler = SmartScheduler::with_policy(config.deferral_policy());
    let decision = match scheduler.decide(&request, &prefs, &context) {
        Ok(decision) => decision,
        Err(e) => {
            tracing::warn!("scheduler failed, sending as requested: {e}");
            SmartScheduler::fail_open(&request, now)
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
    } else if decision.should_send {
        println!("send at {} ({})", decision.scheduled_time.to_rfc3339(), decision.reason);
    } else {
        println!("suppressed ({})", decision.reason);
    }
    Ok(())
}
