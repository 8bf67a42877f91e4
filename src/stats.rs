use std::sync::atomic::{AtomicU64, Ordering};

/// Counters exposed through `GetStats`. `StatTick` is the hook point a
/// future stats recorder collaborator (out of scope here) would use to
/// flush these periodically; the core itself just keeps the running
/// counts.
#[derive(Default)]
pub struct StatsCounters {
    num_msgs_received: AtomicU64,
    num_bytes_received: AtomicU64,
    num_acks_sent: AtomicU64,
    num_receive_failed: AtomicU64,
    num_batches_received: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub num_msgs_received: u64,
    pub num_bytes_received: u64,
    pub num_acks_sent: u64,
    pub num_receive_failed: u64,
    pub num_batches_received: u64,
}

impl StatsCounters {
    pub fn record_message(&self, payload_len: usize) {
        self.num_msgs_received.fetch_add(1, Ordering::Relaxed);
        self.num_bytes_received.fetch_add(payload_len as u64, Ordering::Relaxed);
    }

    pub fn record_batch(&self) {
        self.num_batches_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ack(&self) {
        self.num_acks_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_receive_failed(&self) {
        self.num_receive_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> Stats {
        Stats {
            num_msgs_received: self.num_msgs_received.load(Ordering::Relaxed),
            num_bytes_received: self.num_bytes_received.load(Ordering::Relaxed),
            num_acks_sent: self.num_acks_sent.load(Ordering::Relaxed),
            num_receive_failed: self.num_receive_failed.load(Ordering::Relaxed),
            num_batches_received: self.num_batches_received.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let c = StatsCounters::default();
        c.record_message(10);
        c.record_message(5);
        c.record_batch();
        c.record_ack();
        c.record_receive_failed();
        let s = c.snapshot();
        assert_eq!(s.num_msgs_received, 2);
        assert_eq!(s.num_bytes_received, 15);
        assert_eq!(s.num_batches_received, 1);
        assert_eq!(s.num_acks_sent, 1);
        assert_eq!(s.num_receive_failed, 1);
    }
}
