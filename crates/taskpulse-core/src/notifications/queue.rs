//! In-memory delivery queue with linear retry backoff.

use chrono::{DateTime, Duration, Utc};

use super::types::QueueItem;

/// What happened to an item whose dispatch failed.
#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    /// Re-enqueued for another attempt.
    Rescheduled { id: String, at: DateTime<Utc>, attempt: u32 },
    /// Retries exhausted, item dropped.
    Exhausted(QueueItem),
}

/// Pending notifications in insertion order.
#[derive(Debug, Default)]
pub struct DeliveryQueue {
    items: Vec<QueueItem>,
}

impl DeliveryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an item. An item with the same id replaces the queued one in place.
    pub fn push(&mut self, item: QueueItem) {
        if let Some(existing) = self.items.iter_mut().find(|i| i.id() == item.id()) {
            *existing = item;
        } else {
            self.items.push(item);
        }
    }

    /// Remove and return every item due at `now`, keeping insertion order.
    pub fn take_due(&mut self, now: DateTime<Utc>) -> Vec<QueueItem> {
        let (due, pending): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.items).into_iter().partition(|i| i.is_due(now));
        self.items = pending;
        due
    }

    /// Count a failed attempt and either re-enqueue the item or give up on it.
    ///
    /// The next attempt is scheduled `backoff * retry_count` after `now`,
    /// saturating at the latest representable instant.
    pub fn retry(&mut self, mut item: QueueItem, now: DateTime<Utc>, backoff: Duration) -> RetryOutcome {
        item.retry_count = item.retry_count.saturating_add(1);
        if item.retry_count >= item.max_retries {
            return RetryOutcome::Exhausted(item);
        }

        let delay = i32::try_from(item.retry_count)
            .ok()
            .and_then(|n| backoff.checked_mul(n))
            .unwrap_or(Duration::MAX);
        item.scheduled_time = now
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let outcome = RetryOutcome::Rescheduled {
            id: item.id().to_string(),
            at: item.scheduled_time,
            attempt: item.retry_count,
        };
        self.push(item);
        outcome
    }

    /// Remove a queued item by id.
    pub fn remove(&mut self, id: &str) -> Option<QueueItem> {
        let pos = self.items.iter().position(|i| i.id() == id)?;
        Some(self.items.remove(pos))
    }

    /// Remove every queued item owned by `user_id`.
    pub fn remove_for_user(&mut self, user_id: &str) -> Vec<QueueItem> {
        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut self.items)
            .into_iter()
            .partition(|i| i.request.user_id == user_id);
        self.items = kept;
        removed
    }

    pub fn get(&self, id: &str) -> Option<&QueueItem> {
        self.items.iter().find(|i| i.id() == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueueItem> {
        self.items.iter()
    }

    /// Earliest scheduled time among queued items.
    pub fn next_due(&self) -> Option<DateTime<Utc>> {
        self.items.iter().map(|i| i.scheduled_time).min()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
