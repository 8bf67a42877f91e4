use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// Per-batch ack state shared across every [`crate::message_id::MessageId`]
/// belonging to the same broker entry.
///
/// A fixed-size bitmap tracks which sub-messages are still outstanding; the
/// acker is dropped once every sub-message has been consumed or discarded,
/// which in Rust terms just means every `Arc<BatchAcker>` clone has gone out
/// of scope.
pub struct BatchAcker {
    bits: Mutex<Vec<bool>>,
    outstanding: AtomicUsize,
    prev_batch_cumulatively_acked: AtomicUsize, // used as a bool
}

impl BatchAcker {
    pub fn new(num_messages: usize) -> Self {
        BatchAcker {
            bits: Mutex::new(vec![true; num_messages]),
            outstanding: AtomicUsize::new(num_messages),
            prev_batch_cumulatively_acked: AtomicUsize::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.bits.lock().expect("BatchAcker mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::SeqCst)
    }

    /// Clears bit `i`. Returns `true` iff this was the last outstanding bit.
    pub fn ack_individual(&self, i: usize) -> bool {
        let mut bits = self.bits.lock().expect("BatchAcker mutex poisoned");
        if std::mem::replace(&mut bits[i], false) {
            drop(bits);
            self.outstanding.fetch_sub(1, Ordering::SeqCst) == 1
        } else {
            self.outstanding.load(Ordering::SeqCst) == 0
        }
    }

    /// Clears every bit in `[0..=i]` (a cumulative ack within the batch).
    /// Returns `true` iff this clears out every remaining bit.
    pub fn ack_group(&self, i: usize) -> bool {
        let mut bits = self.bits.lock().expect("BatchAcker mutex poisoned");
        let mut cleared = 0usize;
        for bit in bits.iter_mut().take(i + 1) {
            if std::mem::replace(bit, false) {
                cleared += 1;
            }
        }
        drop(bits);
        if cleared > 0 {
            self.outstanding.fetch_sub(cleared, Ordering::SeqCst) == cleared
        } else {
            self.outstanding.load(Ordering::SeqCst) == 0
        }
    }

    /// Whether the prior entry has already been cumulatively acked on this
    /// consumer's behalf — the flag the partial-cumulative-ack rule
    /// consults before also acking the previous entry's last sub-message.
    pub fn prev_batch_cumulatively_acked(&self) -> bool {
        self.prev_batch_cumulatively_acked.load(Ordering::SeqCst) != 0
    }

    pub fn set_prev_batch_cumulatively_acked(&self) {
        self.prev_batch_cumulatively_acked.store(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn individual_ack_decrements_and_reports_completion() {
        let acker = BatchAcker::new(3);
        assert!(!acker.ack_individual(0));
        assert!(!acker.ack_individual(1));
        assert!(acker.ack_individual(2));
        assert_eq!(acker.outstanding(), 0);
    }

    #[test]
    fn duplicate_individual_ack_is_idempotent() {
        let acker = BatchAcker::new(2);
        assert!(!acker.ack_individual(0));
        // Re-acking the same bit must not double-decrement outstanding.
        assert!(!acker.ack_individual(0));
        assert_eq!(acker.outstanding(), 1);
    }

    #[test]
    fn group_ack_clears_prefix() {
        let acker = BatchAcker::new(4);
        assert!(!acker.ack_group(1));
        assert_eq!(acker.outstanding(), 2);
        assert!(acker.ack_group(3));
        assert_eq!(acker.outstanding(), 0);
    }

    #[test]
    fn prev_batch_flag_starts_clear() {
        let acker = BatchAcker::new(1);
        assert!(!acker.prev_batch_cumulatively_acked());
        acker.set_prev_batch_cumulatively_acked();
        assert!(acker.prev_batch_cumulatively_acked());
    }
}
