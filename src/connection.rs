use std::time::Duration;

use async_trait::async_trait;

use crate::config::{KeySharedPolicy, SubscriptionMode, SubscriptionType};
use crate::error::ConsumerResult;
use crate::message::AckType;
use crate::message_id::MessageId;

/// Schema info forwarded on `Subscribe` so the broker can validate/convert
/// on the server side. The schema layer itself (decode, versioned
/// providers) is an external collaborator.
#[derive(Debug, Clone, Default)]
pub struct SchemaInfo {
    pub name: String,
    pub schema_data: Vec<u8>,
}

/// The `Subscribe` command.
#[derive(Debug, Clone)]
pub struct SubscribeFrame {
    pub topic: String,
    pub subscription_name: String,
    pub consumer_id: u64,
    pub request_id: u64,
    pub subscription_type: SubscriptionType,
    pub initial_position_is_latest: bool,
    pub read_compacted: bool,
    pub start_message_id: Option<MessageId>,
    pub durable: bool,
    pub start_rollback_duration: Duration,
    pub create_topic_if_missing: bool,
    pub key_shared_policy: Option<KeySharedPolicy>,
    pub schema_info: Option<SchemaInfo>,
}

#[derive(Debug, Clone)]
pub struct AckFrame {
    pub consumer_id: u64,
    pub ids: Vec<MessageId>,
    pub ack_type: AckType,
    /// Set when this ack is the "error-ack" a corrupted delivery sends,
    /// otherwise `None`.
    pub validation_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RedeliverFrame {
    pub consumer_id: u64,
    /// `None` means "redeliver everything"
    /// (`RedeliverUnacknowledged{consumer_id, msg_ids?}`).
    pub ids: Option<Vec<MessageId>>,
}

#[derive(Debug, Clone)]
pub enum SeekFrame {
    ByTimestamp { consumer_id: u64, request_id: u64, timestamp: u64 },
    ByMessageId { consumer_id: u64, request_id: u64, id: MessageId },
}

/// The subset of the framed wire protocol the session actor drives. The
/// wire codec itself — framing, checksums, compression — is an external
/// collaborator; this trait is the seam the actor sends through.
#[async_trait]
pub trait ClientCnx: Send + Sync {
    async fn add_consumer(&self, consumer_id: u64);
    async fn remove_consumer(&self, consumer_id: u64);

    async fn send_subscribe(&self, frame: SubscribeFrame) -> ConsumerResult<()>;
    async fn send_flow(&self, consumer_id: u64, permits: i32) -> ConsumerResult<()>;
    async fn send_ack(&self, frame: AckFrame) -> ConsumerResult<()>;
    async fn send_redeliver(&self, frame: RedeliverFrame) -> ConsumerResult<()>;
    async fn send_seek(&self, frame: SeekFrame) -> ConsumerResult<()>;
    async fn send_get_last_message_id(&self, consumer_id: u64, request_id: u64) -> ConsumerResult<MessageId>;
    async fn send_close_consumer(&self, consumer_id: u64, request_id: u64) -> ConsumerResult<()>;
    async fn send_unsubscribe(&self, consumer_id: u64, request_id: u64) -> ConsumerResult<()>;
}

/// Connection pool + lookup service collaborator: given a topic name,
/// yields a multiplexed framed connection. The core only uses
/// it to obtain and reacquire a connection; everything about how that
/// connection is dialed, pooled, or load balanced lives outside this crate.
#[async_trait]
pub trait ConnectionProvider: Send + Sync {
    async fn get_connection(&self, topic: &str) -> ConsumerResult<std::sync::Arc<dyn ClientCnx>>;
}
