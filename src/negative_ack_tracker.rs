use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::message_id::MessageId;

/// Delays requested redeliveries by `negative_ack_redelivery_delay`, then
/// surfaces them for a redelivery request. Driven by the session actor's
/// single timer; this type holds no clock of its own so tests can supply
/// deterministic instants.
pub struct NegativeAckTracker {
    delay: Duration,
    due: HashMap<MessageId, Instant>,
}

impl NegativeAckTracker {
    pub fn new(delay: Duration) -> Self {
        NegativeAckTracker {
            delay,
            due: HashMap::new(),
        }
    }

    /// Track `id` as nacked at `now`. If `id` was already tracked, the
    /// earlier due time wins.
    pub fn add(&mut self, id: MessageId, now: Instant) {
        self.due.entry(id).or_insert(now + self.delay);
    }

    /// Drain every id whose due time has arrived by `now`.
    pub fn drain_due(&mut self, now: Instant) -> Vec<MessageId> {
        let due_ids: Vec<MessageId> = self
            .due
            .iter()
            .filter(|(_, &due)| due <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &due_ids {
            self.due.remove(id);
        }
        due_ids
    }

    pub fn is_empty(&self) -> bool {
        self.due.is_empty()
    }

    pub fn clear(&mut self) {
        self.due.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(e: i64) -> MessageId {
        MessageId::individual(1, e, 0)
    }

    #[test]
    fn nack_delays_redelivery_by_configured_interval() {
        let mut t = NegativeAckTracker::new(Duration::from_millis(100));
        let t0 = Instant::now();
        t.add(id(1), t0);

        assert!(t.drain_due(t0 + Duration::from_millis(50)).is_empty());
        let due = t.drain_due(t0 + Duration::from_millis(100));
        assert_eq!(due, vec![id(1)]);
        // Draining again finds nothing left.
        assert!(t.drain_due(t0 + Duration::from_millis(200)).is_empty());
    }

    #[test]
    fn re_adding_tracked_id_keeps_earlier_due_time() {
        let mut t = NegativeAckTracker::new(Duration::from_millis(100));
        let t0 = Instant::now();
        t.add(id(1), t0);
        // A later nack of the same id must not push the due time out.
        t.add(id(1), t0 + Duration::from_millis(50));
        let due = t.drain_due(t0 + Duration::from_millis(100));
        assert_eq!(due, vec![id(1)]);
    }
}
