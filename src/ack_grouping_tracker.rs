use std::collections::{HashMap, HashSet};

use crate::message::AckType;
use crate::message_id::MessageId;

/// What the caller should do with an id just handed to [`AckGroupingTracker::add`].
pub enum AddAckOutcome {
    /// Buffered; will go out on the next [`AckGroupingTracker::flush`].
    Buffered,
    /// Non-persistent topic: send this ack frame immediately instead of
    /// buffering it; grouping is a no-op passthrough on such topics.
    SendImmediately(MessageId, AckType),
}

/// Coalesces individual acks into periodic batched ack frames. Flushes on a
/// tick (`acknowledgements_group_time`) or on seek/close.
pub struct AckGroupingTracker {
    persistent: bool,
    pending: HashMap<MessageId, AckType>,
    last_flushed: HashSet<MessageId>,
}

impl AckGroupingTracker {
    pub fn new(persistent: bool) -> Self {
        AckGroupingTracker {
            persistent,
            pending: HashMap::new(),
            last_flushed: HashSet::new(),
        }
    }

    pub fn add(&mut self, id: MessageId, ack_type: AckType) -> AddAckOutcome {
        if !self.persistent {
            return AddAckOutcome::SendImmediately(id, ack_type);
        }
        self.pending.insert(id, ack_type);
        AddAckOutcome::Buffered
    }

    /// True iff `id` is currently pending an outgoing ack frame, or was
    /// part of the most recently flushed batch.
    pub fn is_duplicate(&self, id: &MessageId) -> bool {
        self.pending.contains_key(id) || self.last_flushed.contains(id)
    }

    /// Drain the pending set into a list of ack frames to send, e.g. on a
    /// periodic `acknowledgements_group_time` tick.
    pub fn flush(&mut self) -> Vec<(MessageId, AckType)> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let drained: Vec<(MessageId, AckType)> = self.pending.drain().collect();
        self.last_flushed = drained.iter().map(|(id, _)| id.clone()).collect();
        drained
    }

    /// Drop all buffered and remembered state (used on seek: flush the
    /// tracker and clear it before reissuing from the new position).
    pub fn clear(&mut self) {
        self.pending.clear();
        self.last_flushed.clear();
    }

    /// Flush whatever is pending and clear remembered state; used on close
    /// so a pending ack still reaches the broker before teardown.
    pub fn flush_and_close(&mut self) -> Vec<(MessageId, AckType)> {
        let out = self.flush();
        self.last_flushed.clear();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(e: i64) -> MessageId {
        MessageId::individual(1, e, 0)
    }

    #[test]
    fn persistent_topic_buffers_and_flushes() {
        let mut t = AckGroupingTracker::new(true);
        assert!(matches!(t.add(id(1), AckType::Individual), AddAckOutcome::Buffered));
        assert!(t.is_duplicate(&id(1)));
        let flushed = t.flush();
        assert_eq!(flushed.len(), 1);
        assert!(t.is_duplicate(&id(1)));
        assert!(t.flush().is_empty());
    }

    #[test]
    fn non_persistent_topic_sends_immediately() {
        let mut t = AckGroupingTracker::new(false);
        match t.add(id(1), AckType::Cumulative) {
            AddAckOutcome::SendImmediately(got_id, got_type) => {
                assert_eq!(got_id, id(1));
                assert_eq!(got_type, AckType::Cumulative);
            }
            AddAckOutcome::Buffered => panic!("expected immediate send"),
        }
        assert!(!t.is_duplicate(&id(1)));
    }

    #[test]
    fn clear_forgets_duplicates() {
        let mut t = AckGroupingTracker::new(true);
        t.add(id(1), AckType::Individual);
        t.flush();
        assert!(t.is_duplicate(&id(1)));
        t.clear();
        assert!(!t.is_duplicate(&id(1)));
    }
}
