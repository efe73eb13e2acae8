//! Notification service façade.
//!
//! [`NotificationService`] is a cheaply cloneable handle. Every clone talks to
//! the same queue, history and background tasks. Background tasks hold a weak
//! reference and stop on their own once the last handle is dropped.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::analytics::{
    AnalyticsBatcher, AnalyticsEvent, AnalyticsEventKind, AnalyticsSink, NoopAnalytics,
};
use super::platform::{NotificationContent, NotificationPlatform, PermissionStatus, PlatformEvent};
use super::preferences::{
    InMemoryPreferencesStore, PreferencesPatch, PreferencesStore, UserPreferences,
};
use super::queue::{DeliveryQueue, RetryOutcome};
use super::scheduler::SmartScheduler;
use super::types::{
    HistoryEntry, NotificationRequest, NotificationStatus, QueueItem, ScheduleOutcome,
    SchedulingContext, UserActivity,
};
use crate::actions::{ActionHandler, ActionResult};
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, ServiceError};
use crate::storage::NotifyConfig;

/// What `initialize()` negotiated with the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeOutcome {
    pub permission: PermissionStatus,
    /// `None` when every token attempt failed.
    pub push_token: Option<String>,
}

/// Counts from one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub dispatched: usize,
    pub retried: usize,
    pub dropped: usize,
}

enum Lifecycle {
    Uninitialized,
    Ready {
        outcome: InitializeOutcome,
        tasks: Vec<JoinHandle<()>>,
    },
    Disposed,
}

/// Builder for [`NotificationService`].
///
/// Only the platform is mandatory. The rest default to an in-memory
/// preferences store, a no-op analytics sink, no-op action effects, the
/// system clock and [`NotifyConfig::default`].
pub struct ServiceBuilder {
    config: NotifyConfig,
    platform: Arc<dyn NotificationPlatform>,
    preferences: Arc<dyn PreferencesStore>,
    analytics: Arc<dyn AnalyticsSink>,
    actions: ActionHandler,
    clock: Arc<dyn Clock>,
}

impl ServiceBuilder {
    pub fn new(platform: Arc<dyn NotificationPlatform>) -> Self {
        Self {
            config: NotifyConfig::default(),
            platform,
            preferences: Arc::new(InMemoryPreferencesStore::new()),
            analytics: Arc::new(NoopAnalytics),
            actions: ActionHandler::default(),
            clock: Arc::new(SystemClock),
        }
    }

    pub fn config(mut self, config: NotifyConfig) -> Self {
        self.config = config;
        self
    }

    pub fn preferences(mut self, store: Arc<dyn PreferencesStore>) -> Self {
        self.preferences = store;
        self
    }

    pub fn analytics(mut self, sink: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = sink;
        self
    }

    pub fn actions(mut self, handler: ActionHandler) -> Self {
        self.actions = handler;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn build(self) -> NotificationService {
        let scheduler = SmartScheduler::with_policy(self.config.deferral_policy());
        let analytics = AnalyticsBatcher::new(self.analytics, self.config.analytics_batch_size);
        NotificationService {
            inner: Arc::new(ServiceInner {
                scheduler,
                analytics,
                platform: self.platform,
                preferences: self.preferences,
                actions: self.actions,
                clock: self.clock,
                queue: Mutex::new(DeliveryQueue::new()),
                history: Mutex::new(HashMap::new()),
                activity: Mutex::new(HashMap::new()),
                lifecycle: Mutex::new(Lifecycle::Uninitialized),
                draining: AtomicBool::new(false),
                in_flight: Mutex::new(HashMap::new()),
                config: self.config,
            }),
        }
    }
}

/// Entry point for scheduling, cancelling and delivering notifications.
#[derive(Clone)]
pub struct NotificationService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    config: NotifyConfig,
    platform: Arc<dyn NotificationPlatform>,
    preferences: Arc<dyn PreferencesStore>,
    scheduler: SmartScheduler,
    actions: ActionHandler,
    analytics: AnalyticsBatcher,
    clock: Arc<dyn Clock>,
    queue: Mutex<DeliveryQueue>,
    /// Recent deliveries per user, oldest first.
    history: Mutex<HashMap<String, VecDeque<HistoryEntry>>>,
    activity: Mutex<HashMap<String, UserActivity>>,
    lifecycle: Mutex<Lifecycle>,
    draining: AtomicBool,
    /// Items taken by the running drain pass, flagged once cancelled.
    in_flight: Mutex<HashMap<String, bool>>,
}

impl NotificationService {
    /// Assemble a service from all of its collaborators.
    pub fn new(
        config: NotifyConfig,
        platform: Arc<dyn NotificationPlatform>,
        preferences: Arc<dyn PreferencesStore>,
        analytics: Arc<dyn AnalyticsSink>,
        actions: ActionHandler,
        clock: Arc<dyn Clock>,
    ) -> Self {
        ServiceBuilder::new(platform)
            .config(config)
            .preferences(preferences)
            .analytics(analytics)
            .actions(actions)
            .clock(clock)
            .build()
    }

    pub fn builder(platform: Arc<dyn NotificationPlatform>) -> ServiceBuilder {
        ServiceBuilder::new(platform)
    }

    pub fn config(&self) -> &NotifyConfig {
        &self.inner.config
    }

    /// Request permissions, register for push, and start the background tasks.
    ///
    /// Calling this again after success returns the first outcome. The
    /// lifecycle lock is not held while talking to the platform, so a
    /// concurrent [`dispose`](Self::dispose) wins and no tasks are started.
    ///
    /// # Errors
    ///
    /// - `PERMISSION_DENIED` if the user refused notifications
    /// - `PLATFORM_ERROR` if the permission request itself failed
    /// - `SERVICE_DISPOSED` after [`dispose`](Self::dispose)
    pub async fn initialize(&self) -> Result<InitializeOutcome> {
        if let Some(settled) = self.inner.settled_initialize().await {
            return settled;
        }

        let permission = self.inner.platform.request_permissions().await?;
        if !permission.allows_delivery() {
            tracing::warn!("notification permission denied");
            return Err(ServiceError::PermissionDenied);
        }
        let push_token = self.inner.fetch_push_token().await;

        let mut lifecycle = self.inner.lifecycle.lock().await;
        match &*lifecycle {
            Lifecycle::Ready { outcome, .. } => return Ok(outcome.clone()),
            Lifecycle::Disposed => {
                tracing::debug!("disposed during initialization");
                return Err(ServiceError::Disposed);
            }
            Lifecycle::Uninitialized => {}
        }

        let events = self.inner.platform.subscribe();
        let tasks = vec![
            spawn_event_listener(Arc::downgrade(&self.inner), events),
            spawn_drain_loop(Arc::downgrade(&self.inner), self.inner.config.drain_interval()),
        ];

        let outcome = InitializeOutcome {
            permission,
            push_token,
        };
        tracing::info!(
            permission = ?outcome.permission,
            has_token = outcome.push_token.is_some(),
            "notification service initialized"
        );
        *lifecycle = Lifecycle::Ready {
            outcome: outcome.clone(),
            tasks,
        };
        Ok(outcome)
    }

    /// Run a request through preferences and the scheduler, queueing it if it should be sent.
    ///
    /// A suppressed request is a successful call with [`ScheduleOutcome::Suppressed`].
    pub async fn schedule_notification(
        &self,
        request: NotificationRequest,
    ) -> Result<ScheduleOutcome> {
        self.inner.ensure_ready().await?;
        request.validate().map_err(ServiceError::InvalidRequest)?;

        let prefs = self.inner.preferences_for(&request.user_id).await?;
        if !prefs.enabled {
            tracing::debug!(user_id = %request.user_id, "user opted out, rejecting {}", request.id);
            return Err(ServiceError::UserOptedOut {
                user_id: request.user_id,
            });
        }
        if !prefs.category(request.category).enabled {
            tracing::debug!(user_id = %request.user_id, "category {} disabled", request.category);
            return Err(ServiceError::CategoryDisabled {
                user_id: request.user_id,
                category: request.category,
            });
        }

        let now = self.inner.clock.now();
        let context = self.inner.context_for(&request.user_id, now).await;
        let decision = match self.inner.scheduler.decide(&request, &prefs, &context) {
            Ok(decision) => decision,
            Err(e) => {
                tracing::warn!("scheduler failed for {}, sending as requested: {e}", request.id);
                SmartScheduler::fail_open(&request, now)
            }
        };
        tracing::debug!(
            id = %request.id,
            should_send = decision.should_send,
            scheduled_time = %decision.scheduled_time,
            "{}",
            decision.reason
        );

        let id = request.id.clone();
        let user_id = request.user_id.clone();
        let category = request.category;

        if !decision.should_send {
            self.inner
                .track(
                    &id,
                    Some(&user_id),
                    AnalyticsEventKind::Suppressed {
                        category,
                        reason: decision.reason,
                    },
                )
                .await;
            return Ok(ScheduleOutcome::Suppressed {
                id,
                reason: decision.reason,
            });
        }

        let priority = request.priority;
        let item = QueueItem::new(
            request,
            decision.scheduled_time,
            self.inner.config.max_retries,
            now,
        );
        self.inner.queue.lock().await.push(item);
        self.inner.drain().await;

        self.inner
            .track(
                &id,
                Some(&user_id),
                AnalyticsEventKind::Scheduled {
                    category,
                    priority,
                    reason: decision.reason,
                },
            )
            .await;

        Ok(ScheduleOutcome::Queued {
            id,
            scheduled_time: decision.scheduled_time,
            reason: decision.reason,
        })
    }

    /// Schedule for right now. Preference and context rules still apply.
    pub async fn send_immediate_notification(
        &self,
        mut request: NotificationRequest,
    ) -> Result<ScheduleOutcome> {
        request.scheduled_for = Some(self.inner.clock.now());
        self.schedule_notification(request).await
    }

    /// Remove a notification from the queue and withdraw it from the platform.
    ///
    /// Unknown ids succeed. Platform failures are logged, not returned. An
    /// item being dispatched right now is not retried if that dispatch fails.
    pub async fn cancel_notification(&self, id: &str) -> Result<()> {
        self.inner.ensure_ready().await?;

        let removed = {
            let mut queue = self.inner.queue.lock().await;
            let removed = queue.remove(id);
            if removed.is_none() {
                if let Some(cancelled) = self.inner.in_flight.lock().await.get_mut(id) {
                    tracing::info!("cancelling {id} while it is being dispatched");
                    *cancelled = true;
                }
            }
            removed
        };
        if let Err(e) = self.inner.platform.cancel(id).await {
            tracing::warn!("platform cancel for {id} failed: {e}");
        }

        if let Some(item) = removed {
            tracing::info!("cancelled queued notification {id}");
            self.inner
                .track(id, Some(&item.request.user_id), AnalyticsEventKind::Cancelled)
                .await;
        }
        Ok(())
    }

    /// Stored preferences, or defaults for users who never saved any.
    pub async fn get_user_preferences(&self, user_id: &str) -> Result<UserPreferences> {
        self.inner.ensure_not_disposed().await?;
        self.inner.preferences_for(user_id).await
    }

    /// Apply `patch`. Turning notifications off drops the user's queued items.
    pub async fn update_user_preferences(
        &self,
        user_id: &str,
        patch: PreferencesPatch,
    ) -> Result<UserPreferences> {
        self.inner.ensure_not_disposed().await?;
        let prefs = self.inner.preferences.set(user_id, &patch).await?;

        if patch.disables() {
            let removed = self.inner.queue.lock().await.remove_for_user(user_id);
            if !removed.is_empty() {
                tracing::info!(
                    "user {user_id} disabled notifications, dropped {} pending",
                    removed.len()
                );
            }
            for item in removed {
                self.inner
                    .track(item.id(), Some(user_id), AnalyticsEventKind::Cancelled)
                    .await;
            }
        }
        Ok(prefs)
    }

    /// Where a notification is in its lifecycle.
    pub async fn notification_status(&self, id: &str) -> Result<NotificationStatus> {
        self.inner.ensure_not_disposed().await?;

        if let Some(item) = self.inner.queue.lock().await.get(id) {
            return Ok(NotificationStatus::Pending {
                scheduled_time: item.scheduled_time,
                retry_count: item.retry_count,
            });
        }
        let history = self.inner.history.lock().await;
        let delivered = history
            .values()
            .flat_map(|entries| entries.iter())
            .find(|entry| entry.id == id);
        Ok(match delivered {
            Some(entry) => NotificationStatus::Delivered {
                delivered_at: entry.delivered_at,
            },
            None => NotificationStatus::Unknown,
        })
    }

    /// Queued items owned by `user_id`, in queue order.
    pub async fn pending_notifications(&self, user_id: &str) -> Result<Vec<QueueItem>> {
        self.inner.ensure_not_disposed().await?;
        Ok(self
            .inner
            .queue
            .lock()
            .await
            .iter()
            .filter(|item| item.request.user_id == user_id)
            .cloned()
            .collect())
    }

    /// Record what the user is doing; read by later scheduling decisions.
    pub async fn set_user_activity(&self, user_id: &str, activity: UserActivity) -> Result<()> {
        self.inner.ensure_not_disposed().await?;
        self.inner
            .activity
            .lock()
            .await
            .insert(user_id.to_string(), activity);
        Ok(())
    }

    /// Run one drain pass now.
    ///
    /// Returns an empty report if another pass is already running.
    pub async fn drain_once(&self) -> Result<DrainReport> {
        self.inner.ensure_ready().await?;
        Ok(self.inner.drain().await)
    }

    /// Handle an action the user picked on notification `id`.
    pub async fn handle_action(
        &self,
        id: &str,
        action: &str,
        payload: &serde_json::Value,
    ) -> Result<ActionResult> {
        self.inner.ensure_ready().await?;
        Ok(self.inner.handle_action(id, action, payload).await)
    }

    /// Stop background tasks, flush analytics and reject every later call.
    pub async fn dispose(&self) -> Result<()> {
        let previous = {
            let mut lifecycle = self.inner.lifecycle.lock().await;
            std::mem::replace(&mut *lifecycle, Lifecycle::Disposed)
        };
        match previous {
            Lifecycle::Disposed => return Ok(()),
            Lifecycle::Ready { tasks, .. } => {
                for task in tasks {
                    task.abort();
                }
            }
            Lifecycle::Uninitialized => {}
        }

        let abandoned = std::mem::take(&mut *self.inner.queue.lock().await);
        if !abandoned.is_empty() {
            tracing::info!("disposing with {} undelivered notifications", abandoned.len());
        }
        self.inner.analytics.flush().await;
        tracing::info!("notification service disposed");
        Ok(())
    }
}

impl ServiceInner {
    async fn ensure_ready(&self) -> Result<()> {
        match &*self.lifecycle.lock().await {
            Lifecycle::Ready { .. } => Ok(()),
            Lifecycle::Uninitialized => Err(ServiceError::NotInitialized),
            Lifecycle::Disposed => Err(ServiceError::Disposed),
        }
    }

    /// The result of an earlier `initialize()`, if it no longer needs to run.
    async fn settled_initialize(&self) -> Option<Result<InitializeOutcome>> {
        match &*self.lifecycle.lock().await {
            Lifecycle::Ready { outcome, .. } => Some(Ok(outcome.clone())),
            Lifecycle::Disposed => Some(Err(ServiceError::Disposed)),
            Lifecycle::Uninitialized => None,
        }
    }

    async fn ensure_not_disposed(&self) -> Result<()> {
        match &*self.lifecycle.lock().await {
            Lifecycle::Disposed => Err(ServiceError::Disposed),
            _ => Ok(()),
        }
    }

    async fn preferences_for(&self, user_id: &str) -> Result<UserPreferences> {
        Ok(self.preferences.get(user_id).await?.unwrap_or_default())
    }

    async fn context_for(&self, user_id: &str, now: DateTime<Utc>) -> SchedulingContext {
        let user_activity = self
            .activity
            .lock()
            .await
            .get(user_id)
            .copied()
            .unwrap_or_else(|| UserActivity::idle(now));
        let notification_history = self
            .history
            .lock()
            .await
            .get(user_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default();
        SchedulingContext {
            now,
            user_activity,
            notification_history,
        }
    }

    /// Linear backoff between attempts; gives up after `max_retries`.
    async fn fetch_push_token(&self) -> Option<String> {
        let attempts = self.config.max_retries.max(1);
        for attempt in 1..=attempts {
            match self.platform.get_push_token().await {
                Ok(token) => return Some(token),
                Err(e) => {
                    tracing::warn!("push token attempt {attempt}/{attempts} failed: {e}");
                    if attempt < attempts {
                        tokio::time::sleep(self.config.token_retry_delay() * attempt).await;
                    }
                }
            }
        }
        tracing::warn!("continuing without a push token");
        None
    }

    async fn drain(&self) -> DrainReport {
        let Some(_guard) = DrainGuard::acquire(&self.draining) else {
            tracing::debug!("drain already in progress");
            return DrainReport::default();
        };

        // queue before in_flight, same as cancel_notification
        let due = {
            let mut queue = self.queue.lock().await;
            let due = queue.take_due(self.clock.now());
            let mut in_flight = self.in_flight.lock().await;
            for item in &due {
                in_flight.insert(item.id().to_string(), false);
            }
            due
        };
        let mut report = DrainReport::default();

        for item in due {
            let content = NotificationContent::from(&item.request);
            let sent = self.platform.schedule_local(item.id(), &content, None).await;
            match sent {
                Ok(()) => {
                    self.in_flight.lock().await.remove(item.id());
                    report.dispatched += 1;
                    tracing::info!(id = %item.id(), user_id = %item.request.user_id, "delivered");
                    self.record_delivery(&item).await;
                    self.track(
                        item.id(),
                        Some(&item.request.user_id),
                        AnalyticsEventKind::Delivered {
                            category: item.request.category,
                            attempts: item.retry_count + 1,
                        },
                    )
                    .await;
                }
                Err(e) => {
                    let now = self.clock.now();
                    let backoff = self.config.retry_backoff();
                    let id = item.id().to_string();
                    // cancel and opt-out take the queue lock too
                    let outcome = {
                        let mut queue = self.queue.lock().await;
                        let cancelled = self.in_flight.lock().await.remove(&id).unwrap_or(false);
                        if cancelled || !self.still_wanted(&item).await {
                            None
                        } else {
                            Some(queue.retry(item, now, backoff))
                        }
                    };
                    match outcome {
                        None => {
                            report.dropped += 1;
                            tracing::info!(
                                "dispatch of {id} failed after it was withdrawn, not retrying: {e}"
                            );
                        }
                        Some(RetryOutcome::Rescheduled { id, at, attempt }) => {
                            report.retried += 1;
                            tracing::warn!(
                                "dispatch of {id} failed (attempt {attempt}), retrying at {at}: {e}"
                            );
                        }
                        Some(RetryOutcome::Exhausted(item)) => {
                            report.dropped += 1;
                            tracing::error!(
                                "dropping {} after {} attempts: {e}",
                                item.id(),
                                item.retry_count
                            );
                            self.track(
                                item.id(),
                                Some(&item.request.user_id),
                                AnalyticsEventKind::DeliveryFailed {
                                    category: item.request.category,
                                    attempts: item.retry_count,
                                },
                            )
                            .await;
                        }
                    }
                }
            }
        }
        report
    }

    /// Whether the owner still accepts notifications. Store errors keep the item.
    async fn still_wanted(&self, item: &QueueItem) -> bool {
        match self.preferences.get(&item.request.user_id).await {
            Ok(prefs) => prefs.map_or(true, |p| p.enabled),
            Err(e) => {
                tracing::warn!("preferences lookup for {} failed: {e}", item.id());
                true
            }
        }
    }

    async fn record_delivery(&self, item: &QueueItem) {
        let entry = HistoryEntry {
            id: item.id().to_string(),
            category: item.request.category,
            delivered_at: self.clock.now(),
        };
        let mut history = self.history.lock().await;
        let entries = history.entry(item.request.user_id.clone()).or_default();
        entries.push_back(entry);
        while entries.len() > self.config.history_limit {
            entries.pop_front();
        }
    }

    async fn handle_action(
        &self,
        id: &str,
        action: &str,
        payload: &serde_json::Value,
    ) -> ActionResult {
        let result = self.actions.handle(action, payload).await;
        tracing::debug!(id, action, success = result.success, "{}", result.message);
        self.track(
            id,
            None,
            AnalyticsEventKind::ActionHandled {
                action: action.to_string(),
                success: result.success,
            },
        )
        .await;
        result
    }

    async fn track(&self, id: &str, user_id: Option<&str>, kind: AnalyticsEventKind) {
        self.analytics
            .track(AnalyticsEvent {
                notification_id: id.to_string(),
                user_id: user_id.map(str::to_string),
                at: self.clock.now(),
                kind,
            })
            .await;
    }
}

/// Holds the drain flag; clears it on drop.
struct DrainGuard<'a>(&'a AtomicBool);

impl<'a> DrainGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| DrainGuard(flag))
    }
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn spawn_drain_loop(inner: Weak<ServiceInner>, period: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(inner) = inner.upgrade() else {
                break;
            };
            let report = inner.drain().await;
            if report != DrainReport::default() {
                tracing::debug!(?report, "drain pass");
            }
        }
    })
}

fn spawn_event_listener(
    inner: Weak<ServiceInner>,
    mut events: broadcast::Receiver<PlatformEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let event = match events.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("platform event listener lagged, skipped {skipped} events");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let Some(inner) = inner.upgrade() else {
                break;
            };
            match event {
                PlatformEvent::Received { id } => {
                    tracing::debug!("notification {id} received in foreground");
                }
                PlatformEvent::ActionResponse {
                    id,
                    action,
                    payload,
                } => {
                    inner.handle_action(&id, &action, &payload).await;
                }
            }
        }
    })
}
