//! Bounded outbox for event delivery with linear backoff.
//!
//! The queue never performs I/O. A transport (in the browser, a `fetch`
//! to the log endpoint) takes ready entries, sends them and reports back
//! with [`DeliveryQueue::ack`] or [`DeliveryQueue::nack`]. All times are
//! milliseconds on the caller's clock.

use crate::events::{AnalysisEvent, EventSink};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::VecDeque;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    pub capacity: usize,
    /// Delivery attempts before an entry is dropped.
    pub max_attempts: u32,
    /// The n-th retry waits `retry_delay_ms * n`.
    pub retry_delay_ms: f64,
    pub max_age_ms: f64,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            capacity: 256,
            max_attempts: 3,
            retry_delay_ms: 1000.0,
            max_age_ms: 300_000.0,
        }
    }
}

/// An entry handed to the transport.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dispatch {
    pub id: u64,
    pub attempt: u32,
    pub event: AnalysisEvent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub in_flight: usize,
    pub dropped: usize,
}

#[derive(Debug, Clone)]
struct Entry {
    id: u64,
    event: AnalysisEvent,
    failures: u32,
    added_at_ms: f64,
    next_attempt_ms: f64,
    in_flight: bool,
}

#[derive(Debug)]
pub struct DeliveryQueue {
    settings: DeliverySettings,
    entries: VecDeque<Entry>,
    next_id: u64,
    dropped: usize,
}

impl Default for DeliveryQueue {
    fn default() -> Self {
        Self::new(DeliverySettings::default())
    }
}

impl DeliveryQueue {
    pub fn new(settings: DeliverySettings) -> Self {
        Self {
            settings,
            entries: VecDeque::new(),
            next_id: 0,
            dropped: 0,
        }
    }

    pub fn settings(&self) -> &DeliverySettings {
        &self.settings
    }

    /// Enqueues an event; when full, the oldest entry is dropped.
    pub fn push(&mut self, event: AnalysisEvent, now_ms: f64) -> u64 {
        if self.settings.capacity == 0 {
            self.dropped += 1;
            return self.next_id;
        }
        while self.entries.len() >= self.settings.capacity {
            self.entries.pop_front();
            self.dropped += 1;
        }
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_back(Entry {
            id,
            event,
            failures: 0,
            added_at_ms: now_ms,
            next_attempt_ms: now_ms,
            in_flight: false,
        });
        id
    }

    /// Marks up to `limit` due entries as in flight and returns them,
    /// oldest first. Expired entries are pruned first.
    pub fn take_ready(&mut self, now_ms: f64, limit: usize) -> Vec<Dispatch> {
        self.prune_expired(now_ms);
        let mut ready = Vec::new();
        for entry in self.entries.iter_mut() {
            if ready.len() >= limit {
                break;
            }
            if entry.in_flight || entry.next_attempt_ms > now_ms {
                continue;
            }
            entry.in_flight = true;
            ready.push(Dispatch {
                id: entry.id,
                attempt: entry.failures + 1,
                event: entry.event.clone(),
            });
        }
        ready
    }

    /// Removes a delivered entry. Returns false for unknown ids.
    pub fn ack(&mut self, id: u64) -> bool {
        match self.position(id) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Records a failed delivery and schedules the retry, or drops the entry
    /// once `max_attempts` is reached. Returns false for unknown ids.
    pub fn nack(&mut self, id: u64, now_ms: f64) -> bool {
        let Some(index) = self.position(id) else {
            return false;
        };
        let max_attempts = self.settings.max_attempts;
        let delay = self.settings.retry_delay_ms;
        let entry = &mut self.entries[index];
        entry.failures += 1;
        entry.in_flight = false;
        if entry.failures >= max_attempts {
            log::warn!(
                "dropping event '{}' after {} failed deliveries",
                entry.event.message,
                entry.failures
            );
            self.entries.remove(index);
            self.dropped += 1;
        } else {
            entry.next_attempt_ms = now_ms + delay * entry.failures as f64;
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn status(&self) -> QueueStatus {
        QueueStatus {
            pending: self.entries.iter().filter(|e| !e.in_flight).count(),
            in_flight: self.entries.iter().filter(|e| e.in_flight).count(),
            dropped: self.dropped,
        }
    }

    fn position(&self, id: u64) -> Option<usize> {
        self.entries.iter().position(|entry| entry.id == id)
    }

    fn prune_expired(&mut self, now_ms: f64) {
        let max_age = self.settings.max_age_ms;
        let before = self.entries.len();
        self.entries
            .retain(|entry| entry.in_flight || now_ms - entry.added_at_ms <= max_age);
        let expired = before - self.entries.len();
        if expired > 0 {
            log::warn!("dropping {} expired events", expired);
            self.dropped += expired;
        }
    }
}

/// A shared queue acts as a sink; the event timestamp is the enqueue time.
impl EventSink for RefCell<DeliveryQueue> {
    fn emit(&self, event: AnalysisEvent) {
        let now_ms = event.timestamp.timestamp_millis() as f64;
        self.borrow_mut().push(event, now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventLevel;

    fn event(message: &str) -> AnalysisEvent {
        AnalysisEvent::new(EventLevel::Info, message, "test", "analysis")
    }

    #[test]
    fn ready_entries_are_handed_out_once() {
        let mut queue = DeliveryQueue::default();
        let first = queue.push(event("a"), 0.0);
        queue.push(event("b"), 0.0);

        let batch = queue.take_ready(0.0, 10);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[0].id, first);
        assert_eq!(batch[0].attempt, 1);
        assert!(queue.take_ready(0.0, 10).is_empty());
        assert_eq!(queue.status().in_flight, 2);

        assert!(queue.ack(first));
        assert!(!queue.ack(first));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn take_ready_respects_limit() {
        let mut queue = DeliveryQueue::default();
        for i in 0..5 {
            queue.push(event(&i.to_string()), 0.0);
        }
        let batch = queue.take_ready(0.0, 2);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].event.message, "1");
        assert_eq!(queue.status().pending, 3);
    }

    #[test]
    fn backoff_grows_linearly_then_drops() {
        let mut queue = DeliveryQueue::default();
        let id = queue.push(event("flaky"), 0.0);

        let mut now = 0.0;
        for failure in 1..=2u32 {
            let batch = queue.take_ready(now, 1);
            assert_eq!(batch.len(), 1, "attempt {failure} should be ready");
            assert_eq!(batch[0].attempt, failure);
            assert!(queue.nack(id, now));

            let retry_at = now + 1000.0 * failure as f64;
            assert!(queue.take_ready(retry_at - 1.0, 1).is_empty());
            now = retry_at;
        }

        let batch = queue.take_ready(now, 1);
        assert_eq!(batch[0].attempt, 3);
        assert!(queue.nack(id, now));
        assert!(queue.is_empty());
        assert_eq!(queue.status().dropped, 1);
        assert!(!queue.nack(id, now));
    }

    #[test]
    fn stale_entries_expire() {
        let mut queue = DeliveryQueue::default();
        queue.push(event("old"), 0.0);
        queue.push(event("new"), 200_000.0);

        let batch = queue.take_ready(300_001.0, 10);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].event.message, "new");
        assert_eq!(queue.status().dropped, 1);
    }

    #[test]
    fn full_queue_drops_oldest() {
        let mut queue = DeliveryQueue::new(DeliverySettings {
            capacity: 2,
            ..DeliverySettings::default()
        });
        queue.push(event("a"), 0.0);
        queue.push(event("b"), 0.0);
        queue.push(event("c"), 0.0);

        let messages: Vec<String> = queue
            .take_ready(0.0, 10)
            .into_iter()
            .map(|d| d.event.message)
            .collect();
        assert_eq!(messages, vec!["b", "c"]);
        assert_eq!(queue.status().dropped, 1);
    }

    #[test]
    fn shared_queue_is_an_event_sink() {
        let queue = RefCell::new(DeliveryQueue::default());
        queue.emit(event("via sink"));
        let now = chrono::Utc::now().timestamp_millis() as f64;
        let batch = queue.borrow_mut().take_ready(now + 1.0, 10);
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].event.message, "via sink");
    }
}
