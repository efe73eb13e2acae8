//! Smart scheduler - decides whether and when a notification is delivered.
//!
//! Rules are evaluated in a fixed order and the first match wins:
//!
//! 1. **Urgent**: always sent immediately
//! 2. **Do-not-disturb**: high priority deferred to the end of the window, rest skipped
//! 3. **Focus**: high priority deferred shortly after the last activity, rest skipped
//! 4. **Meeting**: high priority deferred a few minutes, rest skipped
//! 5. **Daily cap**: skipped once the category reached its limit today
//! 6. **Default**: sent at the requested time, or now
//!
//! The scheduler is pure. Errors are returned rather than swallowed so the
//! caller can fail open.

use chrono::{DateTime, Duration, FixedOffset, LocalResult, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::preferences::UserPreferences;
use super::types::{
    DecisionReason, NotificationRequest, Priority, ScheduleDecision, SchedulingContext,
};
use crate::error::SchedulerError;

/// Deferral delays applied by the context rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferralPolicy {
    /// Added to the user's last activity when deferring during focus.
    pub focus_defer_secs: i64,
    /// Added to now when deferring during a meeting.
    pub meeting_defer_secs: i64,
}

impl Default for DeferralPolicy {
    fn default() -> Self {
        Self {
            focus_defer_secs: 60,
            meeting_defer_secs: 5 * 60,
        }
    }
}

/// Stateless rule evaluator.
#[derive(Debug, Clone, Default)]
pub struct SmartScheduler {
    policy: DeferralPolicy,
}

impl SmartScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy(policy: DeferralPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &DeferralPolicy {
        &self.policy
    }

    /// Decide delivery for `request` given the user's preferences and context.
    pub fn decide(
        &self,
        request: &NotificationRequest,
        prefs: &UserPreferences,
        context: &SchedulingContext,
    ) -> Result<ScheduleDecision, SchedulerError> {
        let now = context.now;

        if request.priority == Priority::Urgent {
            return Ok(ScheduleDecision::send(now, DecisionReason::UrgentBypass));
        }

        let offset = prefs
            .offset()
            .ok_or(SchedulerError::InvalidOffset(prefs.utc_offset_minutes))?;

        if let Some(decision) = self.check_do_not_disturb(request, prefs, now, offset)? {
            return Ok(decision);
        }

        let activity = &context.user_activity;
        let smart = &prefs.smart_scheduling;

        if smart.enabled && activity.is_focused && smart.skip_during_focus {
            return if request.priority == Priority::High {
                let at = Duration::try_seconds(self.policy.focus_defer_secs)
                    .and_then(|delay| activity.last_activity.checked_add_signed(delay))
                    .ok_or(SchedulerError::TimeOverflow("focus deferral"))?;
                Ok(ScheduleDecision::send(at, DecisionReason::FocusDeferred))
            } else {
                Ok(ScheduleDecision::skip(now, DecisionReason::FocusSkipped))
            };
        }

        if smart.enabled && activity.is_in_meeting && smart.skip_during_meetings {
            return if request.priority == Priority::High {
                let at = Duration::try_seconds(self.policy.meeting_defer_secs)
                    .and_then(|delay| now.checked_add_signed(delay))
                    .ok_or(SchedulerError::TimeOverflow("meeting deferral"))?;
                Ok(ScheduleDecision::send(at, DecisionReason::MeetingDeferred))
            } else {
                Ok(ScheduleDecision::skip(now, DecisionReason::MeetingSkipped))
            };
        }

        let cap = prefs.category(request.category).max_per_day;
        if Self::delivered_today(request, context, offset) >= cap as usize {
            return Ok(ScheduleDecision::skip(now, DecisionReason::DailyLimitReached));
        }

        Ok(ScheduleDecision::send(
            request.scheduled_for.unwrap_or(now),
            DecisionReason::Default,
        ))
    }

    fn check_do_not_disturb(
        &self,
        request: &NotificationRequest,
        prefs: &UserPreferences,
        now: DateTime<Utc>,
        offset: FixedOffset,
    ) -> Result<Option<ScheduleDecision>, SchedulerError> {
        let dnd = &prefs.do_not_disturb;
        if !dnd.enabled {
            return Ok(None);
        }

        let local_now = now.with_timezone(&offset);
        if !dnd.contains(local_now.time()) {
            return Ok(None);
        }

        if request.priority != Priority::High {
            return Ok(Some(ScheduleDecision::skip(
                now,
                DecisionReason::DoNotDisturbSkipped,
            )));
        }

        let date = local_now.date_naive();
        let end = match offset.from_local_datetime(&date.and_time(dnd.end.as_naive())) {
            LocalResult::Single(end) => end.with_timezone(&Utc),
            _ => {
                return Err(SchedulerError::UnresolvableWindowEnd {
                    end: dnd.end.to_string(),
                    date: date.to_string(),
                })
            }
        };

        let end = if end <= now {
            end.checked_add_signed(Duration::days(1))
                .ok_or(SchedulerError::TimeOverflow("do-not-disturb end"))?
        } else {
            end
        };

        Ok(Some(ScheduleDecision::send(
            end,
            DecisionReason::DoNotDisturbDeferred,
        )))
    }

    /// Deliveries in the request's category on the user's current local date.
    fn delivered_today(
        request: &NotificationRequest,
        context: &SchedulingContext,
        offset: FixedOffset,
    ) -> usize {
        let today = context.now.with_timezone(&offset).date_naive();
        context
            .notification_history
            .iter()
            .filter(|entry| entry.category == request.category)
            .filter(|entry| entry.delivered_at.with_timezone(&offset).date_naive() == today)
            .count()
    }

    /// Decision used when [`decide`](Self::decide) fails: send as requested.
    pub fn fail_open(request: &NotificationRequest, now: DateTime<Utc>) -> ScheduleDecision {
        ScheduleDecision::send(request.scheduled_for.unwrap_or(now), DecisionReason::FailOpen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notifications::preferences::{CategoryPreference, DoNotDisturb};
    use crate::notifications::types::{
        HistoryEntry, NotificationCategory, NotificationType, UserActivity,
    };
    use proptest::prelude::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn request(priority: Priority) -> NotificationRequest {
        NotificationRequest::new(
            "u1",
            NotificationType::Reminder,
            NotificationCategory::Tasks,
            "Stand-up",
            "Starts in 5 minutes",
        )
        .with_priority(priority)
    }

    fn with_dnd(start: &str, end: &str) -> UserPreferences {
        UserPreferences {
            do_not_disturb: DoNotDisturb {
                enabled: true,
                start: start.parse().unwrap(),
                end: end.parse().unwrap(),
            },
            ..UserPreferences::default()
        }
    }

    fn focused(now: DateTime<Utc>, last_activity: DateTime<Utc>) -> SchedulingContext {
        SchedulingContext {
            now,
            user_activity: UserActivity {
                is_focused: true,
                is_in_meeting: false,
                last_activity,
            },
            notification_history: Vec::new(),
        }
    }

    #[test]
    fn urgent_bypasses_every_rule() {
        let now = at("2026-10-18T23:30:00Z");
        let prefs = with_dnd("22:00", "07:00");
        let mut ctx = focused(now, now);
        ctx.user_activity.is_in_meeting = true;

        let decision = SmartScheduler::new()
            .decide(&request(Priority::Urgent), &prefs, &ctx)
            .unwrap();
        assert!(decision.should_send);
        assert_eq!(decision.scheduled_time, now);
        assert_eq!(decision.reason, DecisionReason::UrgentBypass);
    }

    #[test]
    fn normal_priority_is_skipped_inside_overnight_dnd() {
        let now = at("2026-10-18T23:30:00Z");
        let decision = SmartScheduler::new()
            .decide(
                &request(Priority::Normal),
                &with_dnd("22:00", "07:00"),
                &SchedulingContext::at(now),
            )
            .unwrap();
        assert!(!decision.should_send);
        assert_eq!(decision.reason, DecisionReason::DoNotDisturbSkipped);
    }

    #[test]
    fn low_priority_is_dropped_not_deferred() {
        let now = at("2026-10-18T02:00:00Z");
        let decision = SmartScheduler::new()
            .decide(
                &request(Priority::Low),
                &with_dnd("22:00", "07:00"),
                &SchedulingContext::at(now),
            )
            .unwrap();
        assert!(!decision.should_send);
    }

    #[test]
    fn high_priority_before_midnight_defers_to_next_morning() {
        let now = at("2026-10-18T23:30:00Z");
        let decision = SmartScheduler::new()
            .decide(
                &request(Priority::High),
                &with_dnd("22:00", "07:00"),
                &SchedulingContext::at(now),
            )
            .unwrap();
        assert!(decision.should_send);
        assert_eq!(decision.reason, DecisionReason::DoNotDisturbDeferred);
        assert_eq!(decision.scheduled_time, at("2026-10-19T07:00:00Z"));
    }

    #[test]
    fn high_priority_after_midnight_defers_to_same_morning() {
        let now = at("2026-10-19T03:15:00Z");
        let decision = SmartScheduler::new()
            .decide(
                &request(Priority::High),
                &with_dnd("22:00", "07:00"),
                &SchedulingContext::at(now),
            )
            .unwrap();
        assert_eq!(decision.scheduled_time, at("2026-10-19T07:00:00Z"));
    }

    #[test]
    fn dnd_window_uses_user_offset() {
        // 23:30 in UTC+2 is 21:30 UTC
        let now = at("2026-10-18T21:30:00Z");
        let mut prefs = with_dnd("22:00", "07:00");
        prefs.utc_offset_minutes = 120;

        let decision = SmartScheduler::new()
            .decide(&request(Priority::High), &prefs, &SchedulingContext::at(now))
            .unwrap();
        assert_eq!(decision.reason, DecisionReason::DoNotDisturbDeferred);
        assert_eq!(decision.scheduled_time, at("2026-10-19T05:00:00Z"));
    }

    #[test]
    fn outside_dnd_falls_through_to_default() {
        let now = at("2026-10-18T12:00:00Z");
        let decision = SmartScheduler::new()
            .decide(
                &request(Priority::Normal),
                &with_dnd("22:00", "07:00"),
                &SchedulingContext::at(now),
            )
            .unwrap();
        assert!(decision.should_send);
        assert_eq!(decision.reason, DecisionReason::Default);
        assert_eq!(decision.scheduled_time, now);
    }

    #[test]
    fn focus_defers_high_after_last_activity() {
        let now = at("2026-10-18T10:00:00Z");
        let last = at("2026-10-18T09:58:00Z");
        let decision = SmartScheduler::new()
            .decide(&request(Priority::High), &UserPreferences::default(), &focused(now, last))
            .unwrap();
        assert!(decision.should_send);
        assert_eq!(decision.reason, DecisionReason::FocusDeferred);
        assert_eq!(decision.scheduled_time, at("2026-10-18T09:59:00Z"));
    }

    #[test]
    fn focus_skips_normal_priority() {
        let now = at("2026-10-18T10:00:00Z");
        let decision = SmartScheduler::new()
            .decide(&request(Priority::Normal), &UserPreferences::default(), &focused(now, now))
            .unwrap();
        assert!(!decision.should_send);
        assert_eq!(decision.reason, DecisionReason::FocusSkipped);
    }

    #[test]
    fn focus_rule_respects_toggle() {
        let now = at("2026-10-18T10:00:00Z");
        let mut prefs = UserPreferences::default();
        prefs.smart_scheduling.skip_during_focus = false;

        let decision = SmartScheduler::new()
            .decide(&request(Priority::Normal), &prefs, &focused(now, now))
            .unwrap();
        assert!(decision.should_send);
        assert_eq!(decision.reason, DecisionReason::Default);
    }

    #[test]
    fn meeting_defers_high_by_five_minutes() {
        let now = at("2026-10-18T10:00:00Z");
        let mut ctx = SchedulingContext::at(now);
        ctx.user_activity.is_in_meeting = true;

        let scheduler = SmartScheduler::new();
        let high = scheduler
            .decide(&request(Priority::High), &UserPreferences::default(), &ctx)
            .unwrap();
        assert_eq!(high.reason, DecisionReason::MeetingDeferred);
        assert_eq!(high.scheduled_time, at("2026-10-18T10:05:00Z"));

        let low = scheduler
            .decide(&request(Priority::Low), &UserPreferences::default(), &ctx)
            .unwrap();
        assert!(!low.should_send);
        assert_eq!(low.reason, DecisionReason::MeetingSkipped);
    }

    #[test]
    fn smart_scheduling_master_switch_disables_context_rules() {
        let now = at("2026-10-18T10:00:00Z");
        let mut prefs = UserPreferences::default();
        prefs.smart_scheduling.enabled = false;
        let mut ctx = focused(now, now);
        ctx.user_activity.is_in_meeting = true;

        let decision = SmartScheduler::new()
            .decide(&request(Priority::Normal), &prefs, &ctx)
            .unwrap();
        assert_eq!(decision.reason, DecisionReason::Default);
    }

    #[test]
    fn dnd_is_checked_before_focus() {
        let now = at("2026-10-18T23:00:00Z");
        let decision = SmartScheduler::new()
            .decide(
                &request(Priority::High),
                &with_dnd("22:00", "07:00"),
                &focused(now, now),
            )
            .unwrap();
        assert_eq!(decision.reason, DecisionReason::DoNotDisturbDeferred);
    }

    #[test]
    fn daily_cap_counts_only_today_and_same_category() {
        let now = at("2026-10-18T15:00:00Z");
        let mut prefs = UserPreferences::default();
        prefs.categories.insert(
            NotificationCategory::Tasks,
            CategoryPreference {
                enabled: true,
                max_per_day: 3,
            },
        );

        let entry = |id: &str, category, delivered_at: &str| HistoryEntry {
            id: id.to_string(),
            category,
            delivered_at: at(delivered_at),
        };

        let mut ctx = SchedulingContext::at(now);
        ctx.notification_history = vec![
            entry("a", NotificationCategory::Tasks, "2026-10-18T08:00:00Z"),
            entry("b", NotificationCategory::Tasks, "2026-10-18T09:00:00Z"),
            entry("c", NotificationCategory::Tasks, "2026-10-17T22:00:00Z"),
            entry("d", NotificationCategory::Focus, "2026-10-18T10:00:00Z"),
        ];

        let scheduler = SmartScheduler::new();
        let decision = scheduler
            .decide(&request(Priority::Normal), &prefs, &ctx)
            .unwrap();
        assert!(decision.should_send, "only two tasks delivered today");

        ctx.notification_history
            .push(entry("e", NotificationCategory::Tasks, "2026-10-18T11:00:00Z"));
        let decision = scheduler
            .decide(&request(Priority::Normal), &prefs, &ctx)
            .unwrap();
        assert!(!decision.should_send);
        assert_eq!(decision.reason, DecisionReason::DailyLimitReached);
    }

    #[test]
    fn default_honours_requested_time() {
        let now = at("2026-10-18T12:00:00Z");
        let later = at("2026-10-18T18:00:00Z");
        let decision = SmartScheduler::new()
            .decide(
                &request(Priority::Low).scheduled_at(later),
                &UserPreferences::default(),
                &SchedulingContext::at(now),
            )
            .unwrap();
        assert_eq!(decision.scheduled_time, later);
    }

    #[test]
    fn invalid_offset_is_an_error_and_fail_open_sends() {
        let now = at("2026-10-18T12:00:00Z");
        let prefs = UserPreferences {
            utc_offset_minutes: 100_000,
            ..UserPreferences::default()
        };
        let req = request(Priority::Normal);
        let err = SmartScheduler::new()
            .decide(&req, &prefs, &SchedulingContext::at(now))
            .unwrap_err();
        assert_eq!(err, SchedulerError::InvalidOffset(100_000));

        let fallback = SmartScheduler::fail_open(&req, now);
        assert!(fallback.should_send);
        assert_eq!(fallback.scheduled_time, now);
        assert_eq!(fallback.reason, DecisionReason::FailOpen);
    }

    #[test]
    fn unrepresentable_deferral_is_a_time_overflow() {
        let now = at("2026-10-18T10:00:00Z");
        let scheduler = SmartScheduler::with_policy(DeferralPolicy {
            focus_defer_secs: i64::MAX,
            meeting_defer_secs: i64::MAX,
        });
        let req = request(Priority::High);

        let err = scheduler
            .decide(&req, &UserPreferences::default(), &focused(now, now))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::TimeOverflow(_)));

        let mut ctx = SchedulingContext::at(now);
        ctx.user_activity.is_in_meeting = true;
        let err = scheduler
            .decide(&req, &UserPreferences::default(), &ctx)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::TimeOverflow(_)));
    }

    proptest! {
        #[test]
        fn urgent_is_always_immediate(
            secs in 0i64..(365 * 24 * 3600),
            focused in any::<bool>(),
            meeting in any::<bool>(),
        ) {
            let now = at("2026-01-01T00:00:00Z") + Duration::seconds(secs);
            let mut ctx = SchedulingContext::at(now);
            ctx.user_activity.is_focused = focused;
            ctx.user_activity.is_in_meeting = meeting;

            let decision = SmartScheduler::new()
                .decide(&request(Priority::Urgent), &with_dnd("22:00", "07:00"), &ctx)
                .unwrap();
            prop_assert!(decision.should_send);
            prop_assert_eq!(decision.scheduled_time, now);
        }

        #[test]
        fn dnd_deferral_lands_after_now_within_a_day(secs in 0i64..(7 * 24 * 3600)) {
            let now = at("2026-10-18T00:00:00Z") + Duration::seconds(secs);
            let decision = SmartScheduler::new()
                .decide(
                    &request(Priority::High),
                    &with_dnd("22:00", "07:00"),
                    &SchedulingContext::at(now),
                )
                .unwrap();
            if decision.reason == DecisionReason::DoNotDisturbDeferred {
                prop_assert!(decision.scheduled_time > now);
                prop_assert!(decision.scheduled_time - now <= Duration::days(1));
            } else {
                prop_assert_eq!(decision.reason, DecisionReason::Default);
            }
        }
    }
}
