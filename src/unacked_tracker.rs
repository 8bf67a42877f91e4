use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use crate::message_id::MessageId;

/// Partitions delivered-but-unacked ids into time buckets of width
/// `tick` (`ack_timeout_tick_time`, or `ack_timeout` itself when the tick
/// is zero) and reports whichever bucket expires on each `tick()` call.
/// The caller (the session actor) is responsible for actually calling
/// `tick()` on a timer and for turning the returned ids into a
/// `RedeliverUnacknowledged` command.
pub struct UnackedTracker {
    num_buckets: usize,
    buckets: VecDeque<HashSet<MessageId>>,
}

impl UnackedTracker {
    /// `ack_timeout` of zero disables the tracker; callers should simply
    /// not construct/tick one in that case. `tick` must be non-zero and
    /// `<= ack_timeout`.
    pub fn new(ack_timeout: Duration, tick: Duration) -> Self {
        assert!(!tick.is_zero(), "tick duration must be non-zero");
        let num_buckets = ((ack_timeout.as_nanos() / tick.as_nanos().max(1)) as usize).max(1);
        let mut buckets = VecDeque::with_capacity(num_buckets);
        for _ in 0..num_buckets {
            buckets.push_back(HashSet::new());
        }
        UnackedTracker { num_buckets, buckets }
    }

    /// Track `id` as delivered-but-unacked, landing in the newest bucket.
    pub fn add(&mut self, id: MessageId) {
        self.buckets.back_mut().expect("at least one bucket").insert(id);
    }

    /// Idempotent removal of a single id from whichever bucket holds it.
    pub fn remove(&mut self, id: &MessageId) {
        for bucket in self.buckets.iter_mut() {
            bucket.remove(id);
        }
    }

    /// Remove every tracked id `<= id` (cumulative ack), idempotent.
    pub fn remove_until(&mut self, id: &MessageId) {
        for bucket in self.buckets.iter_mut() {
            bucket.retain(|tracked| tracked > id);
        }
    }

    pub fn clear(&mut self) {
        for bucket in self.buckets.iter_mut() {
            bucket.clear();
        }
    }

    /// Idempotent shutdown; same as `clear` since there's no background
    /// resource to release in this implementation.
    pub fn close(&mut self) {
        self.clear();
    }

    /// Rotate the bucket ring: the oldest bucket expires and is returned,
    /// a fresh bucket is pushed in as the newest.
    pub fn tick(&mut self) -> Vec<MessageId> {
        let expired = self.buckets.pop_front().unwrap_or_default();
        self.buckets.push_back(HashSet::new());
        debug_assert_eq!(self.buckets.len(), self.num_buckets);
        expired.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(e: i64) -> MessageId {
        MessageId::individual(1, e, 0)
    }

    #[test]
    fn tracked_id_expires_after_num_buckets_ticks() {
        let mut t = UnackedTracker::new(Duration::from_secs(3), Duration::from_secs(1));
        t.add(id(1));
        assert!(t.tick().is_empty());
        assert!(t.tick().is_empty());
        let expired = t.tick();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0], id(1));
    }

    #[test]
    fn remove_before_expiry_prevents_redelivery() {
        let mut t = UnackedTracker::new(Duration::from_secs(2), Duration::from_secs(1));
        t.add(id(1));
        t.remove(&id(1));
        assert!(t.tick().is_empty());
        assert!(t.tick().is_empty());
    }

    #[test]
    fn remove_until_clears_cumulative_prefix() {
        let mut t = UnackedTracker::new(Duration::from_secs(1), Duration::from_secs(1));
        t.add(id(1));
        t.add(id(2));
        t.add(id(3));
        t.remove_until(&id(2));
        let expired = t.tick();
        assert_eq!(expired, vec![id(3)]);
    }

    #[test]
    fn close_is_idempotent() {
        let mut t = UnackedTracker::new(Duration::from_secs(1), Duration::from_secs(1));
        t.add(id(1));
        t.close();
        t.close();
        assert!(t.tick().is_empty());
    }
}
