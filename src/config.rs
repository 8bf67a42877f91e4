use std::time::Duration;

/// How a subscription shares entries among multiple consumers (spec
/// section 6 / GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionType {
    Exclusive,
    Shared,
    Failover,
    KeyShared,
}

impl SubscriptionType {
    /// Redelivery of a specific id set (as opposed to the unbounded form)
    /// is only meaningful for `Shared`/`KeyShared`.
    pub fn supports_selective_redelivery(self) -> bool {
        matches!(self, SubscriptionType::Shared | SubscriptionType::KeyShared)
    }
}

/// Whether the broker or the client owns the subscription cursor (spec
/// GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionMode {
    Durable,
    NonDurable,
}

/// Where a non-durable subscription starts when no explicit position was
/// ever established.
#[derive(Debug, Clone)]
pub enum InitialPosition {
    Latest,
    Earliest,
}

#[derive(Debug, Clone, Default)]
pub struct KeySharedPolicy {
    pub sticky_hash_ranges: Vec<(u32, u32)>,
}

/// Governs `batch_receive`.
#[derive(Debug, Clone)]
pub struct BatchReceivePolicy {
    pub max_num_messages: usize,
    pub max_num_bytes: usize,
    pub timeout: Duration,
}

impl Default for BatchReceivePolicy {
    fn default() -> Self {
        BatchReceivePolicy {
            max_num_messages: 100,
            max_num_bytes: 10 * 1024 * 1024,
            timeout: Duration::from_millis(100),
        }
    }
}

/// Dead-letter-queue policy. `None` on `ConsumerConfig::dead_letters_processor`
/// means disabled.
#[derive(Debug, Clone)]
pub struct DeadLetterPolicy {
    pub max_redelivery_count: u32,
    pub dead_letter_topic: String,
}

/// Every configuration knob the consumer actor needs, plus the
/// timer/timeout fields its background tickers run on.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub subscription_name: String,
    pub subscription_type: SubscriptionType,
    pub subscription_mode: SubscriptionMode,
    pub initial_position: InitialPosition,

    pub receiver_queue_size: usize,

    pub ack_timeout: Duration,
    pub ack_timeout_tick_time: Duration,
    pub acknowledgements_group_time: Duration,
    pub negative_ack_redelivery_delay: Duration,

    pub read_compacted: bool,
    pub reset_include_head: bool,
    /// Non-persistent topics make the ack grouping tracker a no-op
    /// passthrough.
    pub non_persistent_topic: bool,

    pub dead_letters_processor: Option<DeadLetterPolicy>,
    pub key_shared_policy: Option<KeySharedPolicy>,
    pub batch_receive_policy: BatchReceivePolicy,
    pub auto_update_partitions: bool,

    pub operation_timeout: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        ConsumerConfig {
            subscription_name: String::new(),
            subscription_type: SubscriptionType::Exclusive,
            subscription_mode: SubscriptionMode::Durable,
            initial_position: InitialPosition::Latest,
            receiver_queue_size: 1000,
            ack_timeout: Duration::ZERO,
            ack_timeout_tick_time: Duration::from_secs(1),
            acknowledgements_group_time: Duration::from_millis(100),
            negative_ack_redelivery_delay: Duration::from_millis(60_000),
            read_compacted: false,
            reset_include_head: false,
            non_persistent_topic: false,
            dead_letters_processor: None,
            key_shared_policy: None,
            batch_receive_policy: BatchReceivePolicy::default(),
            auto_update_partitions: true,
            operation_timeout: Duration::from_secs(30),
        }
    }
}

impl ConsumerConfig {
    /// Half the receive queue; the flow controller refills once consumed
    /// permits cross this.
    pub fn flow_refill_threshold(&self) -> usize {
        self.receiver_queue_size / 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sensible_flow_threshold() {
        let cfg = ConsumerConfig::default();
        assert_eq!(cfg.flow_refill_threshold(), 500);
    }

    #[test]
    fn redelivery_selectivity_matches_subscription_type() {
        assert!(SubscriptionType::Shared.supports_selective_redelivery());
        assert!(SubscriptionType::KeyShared.supports_selective_redelivery());
        assert!(!SubscriptionType::Exclusive.supports_selective_redelivery());
        assert!(!SubscriptionType::Failover.supports_selective_redelivery());
    }
}
