//! In-process multi-producer multi-subscriber event bus (spec §4.7).
//!
//! Sequence numbering follows the teacher's `EventBus`: a single
//! process-wide `AtomicU64` stamped onto every event before broadcast, so
//! subscribers can detect gaps and reorderings independent of arrival
//! timing.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::broadcast;

use crate::domain::models::{EventPayload, RuntimeEvent};

/// Default per-subscriber channel capacity. A lagging subscriber drops the
/// oldest buffered events rather than blocking producers (spec §4.7: "slow
/// subscriber does not block producers; bounded backpressure is a
/// permitted implementation refinement").
const DEFAULT_CAPACITY: usize = 4096;

/// Broadcasts [`RuntimeEvent`]s to every subscriber in emission order.
pub struct EventBus {
    sender: broadcast::Sender<RuntimeEvent>,
    sequence: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl EventBus {
    /// Build a bus with the given per-subscriber channel capacity.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            sequence: AtomicU64::new(0),
        }
    }

    /// Stamp and broadcast an event payload, returning the envelope that
    /// was sent (even if there were zero subscribers — a send error there
    /// is not a failure).
    pub fn publish(&self, payload: EventPayload) -> RuntimeEvent {
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let event = RuntimeEvent {
            sequence,
            timestamp: Utc::now(),
            payload,
        };
        let _ = self.sender.send(event.clone());
        event
    }

    /// Subscribe to every future event, in emission order.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<RuntimeEvent> {
        self.sender.subscribe()
    }

    /// Current subscriber count, for diagnostics.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn sequence_numbers_are_monotonically_increasing() {
        let bus = EventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(EventPayload::OrchestratorStarted);
        bus.publish(EventPayload::OrchestratorStopped);
        let first = rx.recv().await.unwrap();
        let second = rx.recv().await.unwrap();
        assert!(second.sequence > first.sequence);
    }

    #[tokio::test]
    async fn multiple_subscribers_each_see_every_event_in_order() {
        let bus = EventBus::default();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();
        bus.publish(EventPayload::SupervisorKilled);
        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.sequence, e2.sequence);
    }

    #[tokio::test]
    async fn publishing_with_no_subscribers_does_not_panic() {
        let bus = EventBus::default();
        bus.publish(EventPayload::OrchestratorStarted);
        assert_eq!(bus.subscriber_count(), 0);
    }
}
