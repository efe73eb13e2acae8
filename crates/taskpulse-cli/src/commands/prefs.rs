use clap::Subcommand;
use taskpulse_core::notifications::{
    CategoryPreference, DoNotDisturb, JsonPreferencesStore, NotificationCategory,
    PreferencesPatch, PreferencesStore, SmartScheduling, TimeOfDay,
};

#[derive(Subcommand)]
pub enum PrefsAction {
    /// Show a user's preferences (defaults if none are stored)
    Show {
        user_id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Update a user's preferences
    Set {
        user_id: String,
        /// Global switch
        #[arg(long)]
        enabled: Option<bool>,
        /// Category to change (tasks, deadlines, focus, breaks, achievements, collaboration, system)
        #[arg(long)]
        category: Option<NotificationCategory>,
        /// Enable or disable --category
        #[arg(long, requires = "category")]
        category_enabled: Option<bool>,
        /// Daily limit for --category
        #[arg(long, requires = "category")]
        max_per_day: Option<u32>,
        /// Do-not-disturb switch
        #[arg(long)]
        dnd: Option<bool>,
        /// Do-not-disturb start (HH:MM)
        #[arg(long)]
        dnd_start: Option<TimeOfDay>,
        /// Do-not-disturb end (HH:MM)
        #[arg(long)]
        dnd_end: Option<TimeOfDay>,
        /// Smart scheduling master switch
        #[arg(long)]
        smart: Option<bool>,
        /// Suppress while focused
        #[arg(long)]
        skip_focus: Option<bool>,
        /// Suppress while in a meeting
        #[arg(long)]
        skip_meetings: Option<bool>,
        /// Offset from UTC in minutes
        #[arg(long, allow_hyphen_values = true)]
        utc_offset: Option<i32>,
    },
    /// Remove a user's stored preferences
    Reset { user_id: String },
}

pub async fn run(action: PrefsAction) -> Result<(), Box<dyn std::error::Error>> {
    let store = JsonPreferencesStore::open()?;

    match action {
        PrefsAction::Show { user_id, json } => {
            let prefs = store.get(&user_id).await?.unwrap_or_default();
            if json {
                println!("{}", serde_json::to_string_pretty(&prefs)?);
            } else {
                println!("User: {user_id}");
                println!("Enabled: {}", prefs.enabled);
                println!(
                    "Do not disturb: {} ({} - {})",
                    on_off(prefs.do_not_disturb.enabled),
                    prefs.do_not_disturb.start,
                    prefs.do_not_disturb.end
                );
                println!(
                    "Smart scheduling: {} (focus: {}, meetings: {})",
                    on_off(prefs.smart_scheduling.enabled),
                    on_off(prefs.smart_scheduling.skip_during_focus),
                    on_off(prefs.smart_scheduling.skip_during_meetings)
                );
                println!("UTC offset: {} min", prefs.utc_offset_minutes);
                println!("Categories:");
                for category in NotificationCategory::ALL {
                    let pref = prefs.category(category);
                    println!(
                        "  {:<14} {:<4} max {}/day",
                        category.as_str(),
                        on_off(pref.enabled),
                        pref.max_per_day
                    );
                }
            }
        }
        PrefsAction::Set {
            user_id,
            enabled,
            category,
            category_enabled,
            max_per_day,
            dnd,
            dnd_start,
            dnd_end,
            smart,
            skip_focus,
            skip_meetings,
            utc_offset,
        } => {
            let current = store.get(&user_id).await?.unwrap_or_default();
            let mut patch = PreferencesPatch {
                enabled,
                utc_offset_minutes: utc_offset,
                ..PreferencesPatch::default()
            };

            if let Some(category) = category {
                let existing = current.category(category);
                let pref = CategoryPreference {
                    enabled: category_enabled.unwrap_or(existing.enabled),
                    max_per_day: max_per_day.unwrap_or(existing.max_per_day),
                };
                patch.categories = PreferencesPatch::category(category, pref).categories;
            }

            if dnd.is_some() || dnd_start.is_some() || dnd_end.is_some() {
                let existing = current.do_not_disturb;
                patch.do_not_disturb = Some(DoNotDisturb {
                    enabled: dnd.unwrap_or(existing.enabled),
                    start: dnd_start.unwrap_or(existing.start),
                    end: dnd_end.unwrap_or(existing.end),
                });
            }

            if smart.is_some() || skip_focus.is_some() || skip_meetings.is_some() {
                let existing = current.smart_scheduling;
                patch.smart_scheduling = Some(SmartScheduling {
                    enabled: smart.unwrap_or(existing.enabled),
                    skip_during_focus: skip_focus.unwrap_or(existing.skip_during_focus),
                    skip_during_meetings: skip_meetings.unwrap_or(existing.skip_during_meetings),
                });
            }

            if patch == PreferencesPatch::default() {
                return Err("nothing to update".into());
            }

            store.set(&user_id, &patch).await?;
            println!("preferences updated for {user_id}");
        }
        PrefsAction::Reset { user_id } => {
            if store.remove(&user_id).await? {
                println!("preferences reset for {user_id}");
            } else {
                println!("no stored preferences for {user_id}");
            }
        }
    }
    Ok(())
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}
