//! Fire-and-forget analytics.
//!
//! Events are buffered and handed to the sink in batches on detached tasks.
//! Sink failures are logged and dropped; they never reach the caller.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use super::types::{DecisionReason, NotificationCategory, Priority};
use crate::error::AnalyticsError;

/// Something worth counting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalyticsEventKind {
    Scheduled {
        category: NotificationCategory,
        priority: Priority,
        reason: DecisionReason,
    },
    Suppressed {
        category: NotificationCategory,
        reason: DecisionReason,
    },
    Delivered {
        category: NotificationCategory,
        attempts: u32,
    },
    DeliveryFailed {
        category: NotificationCategory,
        attempts: u32,
    },
    Cancelled,
    ActionHandled {
        action: String,
        success: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsEvent {
    pub notification_id: String,
    pub user_id: Option<String>,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: AnalyticsEventKind,
}

/// Destination for analytics batches.
#[async_trait]
pub trait AnalyticsSink: Send + Sync {
    async fn record(&self, batch: Vec<AnalyticsEvent>) -> Result<(), AnalyticsError>;
}

/// Sink that discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAnalytics;

#[async_trait]
impl AnalyticsSink for NoopAnalytics {
    async fn record(&self, _batch: Vec<AnalyticsEvent>) -> Result<(), AnalyticsError> {
        Ok(())
    }
}

/// Sink that logs each event at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAnalytics;

#[async_trait]
impl AnalyticsSink for TracingAnalytics {
    async fn record(&self, batch: Vec<AnalyticsEvent>) -> Result<(), AnalyticsError> {
        for event in &batch {
            tracing::debug!(
                notification_id = %event.notification_id,
                kind = ?event.kind,
                "analytics event"
            );
        }
        Ok(())
    }
}

/// Buffers events and flushes them to a sink in the background.
pub(crate) struct AnalyticsBatcher {
    sink: Arc<dyn AnalyticsSink>,
    batch_size: usize,
    pending: Mutex<Vec<AnalyticsEvent>>,
}

impl AnalyticsBatcher {
    pub(crate) fn new(sink: Arc<dyn AnalyticsSink>, batch_size: usize) -> Self {
        Self {
            sink,
            batch_size: batch_size.max(1),
            pending: Mutex::new(Vec::new()),
        }
    }

    /// Buffer an event; a full batch is shipped on a detached task.
    pub(crate) async fn track(&self, event: AnalyticsEvent) {
        let batch = {
            let mut pending = self.pending.lock().await;
            pending.push(event);
            if pending.len() < self.batch_size {
                return;
            }
            std::mem::take(&mut *pending)
        };

        let sink = Arc::clone(&self.sink);
        tokio::spawn(async move {
            let size = batch.len();
            if let Err(e) = sink.record(batch).await {
                tracing::warn!("dropped {size} analytics events: {e}");
            }
        });
    }

    /// Ship whatever is buffered and wait for the sink.
    pub(crate) async fn flush(&self) {
        let batch = std::mem::take(&mut *self.pending.lock().await);
        if batch.is_empty() {
            return;
        }
        let size = batch.len();
        if let Err(e) = self.sink.record(batch).await {
            tracing::warn!("dropped {size} analytics events on flush: {e}");
        }
    }

    #[cfg(test)]
    async fn buffered(&self) -> usize {
        self.pending.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CollectingSink {
        batches: Mutex<Vec<Vec<AnalyticsEvent>>>,
        fail: bool,
    }

    #[async_trait]
    impl AnalyticsSink for CollectingSink {
        async fn record(&self, batch: Vec<AnalyticsEvent>) -> Result<(), AnalyticsError> {
            if self.fail {
                return Err(AnalyticsError::Unavailable("offline".into()));
            }
            self.batches.lock().await.push(batch);
            Ok(())
        }
    }

    fn event(id: &str) -> AnalyticsEvent {
        AnalyticsEvent {
            notification_id: id.to_string(),
            user_id: Some("u1".into()),
            at: Utc::now(),
            kind: AnalyticsEventKind::Cancelled,
        }
    }

    #[tokio::test]
    async fn flush_ships_partial_batch() {
        let sink = Arc::new(CollectingSink::default());
        let batcher = AnalyticsBatcher::new(sink.clone(), 10);

        batcher.track(event("a")).await;
        batcher.track(event("b")).await;
        assert_eq!(batcher.buffered().await, 2);

        batcher.flush().await;
        assert_eq!(batcher.buffered().await, 0);
        let batches = sink.batches.lock().await;
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[tokio::test]
    async fn full_batch_leaves_buffer_empty() {
        let sink = Arc::new(CollectingSink::default());
        let batcher = AnalyticsBatcher::new(sink, 2);

        batcher.track(event("a")).await;
        batcher.track(event("b")).await;
        assert_eq!(batcher.buffered().await, 0);
    }

    #[tokio::test]
    async fn failing_sink_is_swallowed() {
        let sink = Arc::new(CollectingSink {
            fail: true,
            ..CollectingSink::default()
        });
        let batcher = AnalyticsBatcher::new(sink, 5);
        batcher.track(event("a")).await;
        batcher.flush().await;
        assert_eq!(batcher.buffered().await, 0);
    }

    #[test]
    fn event_serializes_flat() {
        let json = serde_json::to_value(event("n1")).unwrap();
        assert_eq!(json["kind"], "cancelled");
        assert_eq!(json["notification_id"], "n1");
    }
}
