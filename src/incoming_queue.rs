use std::collections::VecDeque;

use crate::message::Message;

/// An insertion-ordered FIFO of delivered-but-not-yet-consumed messages,
/// with a running byte count. Invariant maintained by construction:
/// `incoming_bytes == sum of payload lengths currently queued`.
pub struct IncomingQueue<T> {
    queue: VecDeque<Message<T>>,
    incoming_bytes: usize,
}

impl<T> IncomingQueue<T> {
    pub fn new() -> Self {
        IncomingQueue {
            queue: VecDeque::new(),
            incoming_bytes: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn incoming_bytes(&self) -> usize {
        self.incoming_bytes
    }

    pub fn push_back(&mut self, msg: Message<T>) {
        self.incoming_bytes += msg.payload_bytes.len();
        self.queue.push_back(msg);
    }

    pub fn pop_front(&mut self) -> Option<Message<T>> {
        let msg = self.queue.pop_front()?;
        self.incoming_bytes -= msg.payload_bytes.len();
        Some(msg)
    }

    pub fn peek_front(&self) -> Option<&Message<T>> {
        self.queue.front()
    }

    /// Drain every message for which `pred` returns true, but only from
    /// the contiguous head prefix — stops at the first message that
    /// doesn't match ("purge any contiguous head prefix whose ids are in
    /// the set").
    pub fn drain_matching_head_prefix(&mut self, mut pred: impl FnMut(&Message<T>) -> bool) -> Vec<Message<T>> {
        let mut drained = Vec::new();
        while let Some(front) = self.queue.front() {
            if pred(front) {
                drained.push(self.pop_front().expect("front just peeked"));
            } else {
                break;
            }
        }
        drained
    }

    /// Empty the queue entirely, returning whatever was left, and reset
    /// the byte count to 0.
    pub fn clear(&mut self) -> Vec<Message<T>> {
        self.incoming_bytes = 0;
        self.queue.drain(..).collect()
    }
}

impl<T> Default for IncomingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
