//! Per-consumer session engine for a partitioned, log-based pub/sub broker
//! client. This crate implements the state machine that maintains a
//! subscription to one topic partition, regulates flow from the broker,
//! delivers batched or individual messages to the application in order,
//! reconciles acknowledgements with redelivery, and survives transparent
//! reconnection across broker outages.
//!
//! Everything upstream of the wire (connection pooling/lookup, framing,
//! schema decoding, interceptor chains, dead-letter publishing) is an
//! external collaborator reached through the traits in [`connection`],
//! [`schema`], [`dead_letter`], and [`interceptor`].

pub mod ack_grouping_tracker;
pub mod backoff;
pub mod batch_acker;
pub mod commands;
pub mod config;
pub mod connection;
pub mod consumer;
pub mod dead_letter;
pub mod error;
pub mod flow_control;
pub mod incoming_queue;
pub mod interceptor;
pub mod message;
pub mod message_id;
pub mod negative_ack_tracker;
pub mod schema;
pub mod session;
pub mod stats;
pub mod unacked_tracker;

pub use config::{
    BatchReceivePolicy, ConsumerConfig, DeadLetterPolicy, InitialPosition, KeySharedPolicy, SubscriptionMode, SubscriptionType,
};
pub use connection::{AckFrame, ClientCnx, ConnectionProvider, RedeliverFrame, SchemaInfo, SeekFrame, SubscribeFrame};
pub use consumer::Consumer;
pub use dead_letter::DeadLetterSink;
pub use error::{BrokerErrorCode, ConsumerError, ConsumerResult};
pub use interceptor::{ConsumerInterceptor, NoopInterceptor};
pub use message::{AckType, DeliveryCorruption, Message, Messages, RawMessage, SingleMessageMetadata};
pub use message_id::{EntryId, MessageId, MessageIdKind, SeekTarget};
pub use schema::{SchemaDecoder, SchemaProvider};
pub use session::SessionParams;
pub use stats::Stats;
