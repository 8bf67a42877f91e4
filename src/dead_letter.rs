use std::collections::HashMap;

use crate::config::DeadLetterPolicy;
use crate::message::RawMessage;
use crate::message_id::MessageId;

/// The DLQ producer collaborator. Interceptor chain, stats recorder, and
/// dead-letter sink are all external collaborators invoked at fixed hook
/// points; construction of each lives outside this crate.
pub trait DeadLetterSink: Send + Sync {
    fn publish(&self, topic: &str, message: &RawMessage);
}

/// Buffers messages whose redelivery count exceeds `max_redelivery_count`,
/// then forwards them to a DLQ producer and acks the original. A `None`
/// policy means the feature is disabled: every method is then a no-op
/// that buffers nothing and reports nothing past its limit.
pub struct DeadLetterProcessor {
    policy: Option<DeadLetterPolicy>,
    buffered: HashMap<MessageId, RawMessage>,
}

impl DeadLetterProcessor {
    pub fn new(policy: Option<DeadLetterPolicy>) -> Self {
        DeadLetterProcessor {
            policy,
            buffered: HashMap::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.policy.is_some()
    }

    /// Whether `raw.redelivery_count` has crossed the configured limit; if
    /// so, remember the message under its original id for later
    /// processing as the "forward to the dead-letter processor as well"
    /// hook.
    pub fn maybe_buffer(&mut self, raw: &RawMessage) -> bool {
        match &self.policy {
            None => false,
            Some(policy) => {
                if raw.redelivery_count >= policy.max_redelivery_count {
                    self.buffered.insert(raw.id.clone(), raw.clone());
                    true
                } else {
                    false
                }
            }
        }
    }

    /// If `id` was buffered, publish it to the DLQ topic and ack the
    /// source via `ack_fn`, then forget it. Returns whether `id` was
    /// buffered — consulted while building a redelivery request, to split
    /// ids between "forward to DLQ" and "request redelivery".
    pub fn process_messages(&mut self, id: &MessageId, sink: &dyn DeadLetterSink, ack_fn: impl FnOnce(&MessageId)) -> bool {
        let policy = match &self.policy {
            Some(p) => p,
            None => return false,
        };
        if let Some(raw) = self.buffered.remove(id) {
            sink.publish(&policy.dead_letter_topic, &raw);
            ack_fn(id);
            true
        } else {
            false
        }
    }

    pub fn clear(&mut self) {
        self.buffered.clear();
    }

    pub fn close(&mut self) {
        self.clear();
    }
}
