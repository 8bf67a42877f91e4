use tokio::sync::oneshot;

use crate::error::ConsumerResult;
use crate::message::{AckType, Message, Messages, RawMessage};
use crate::message_id::{MessageId, SeekTarget};
use crate::stats::Stats;

/// Every input the session actor accepts. All mutable state lives behind
/// this single serialized queue; broker frames, application calls, timer
/// ticks, and connection-state transitions are all just variants here.
pub enum Command<T> {
    Receive(oneshot::Sender<ConsumerResult<Message<T>>>),
    BatchReceive(oneshot::Sender<ConsumerResult<Messages<T>>>),
    SendBatchByTimeout,

    Acknowledge(MessageId, AckType),
    NegativeAcknowledge(MessageId),
    RedeliverUnacknowledged(Vec<MessageId>, oneshot::Sender<()>),
    RedeliverAllUnacknowledged(oneshot::Sender<()>),

    SeekAsync(SeekTarget, oneshot::Sender<ConsumerResult<()>>),
    HasMessageAvailable(oneshot::Sender<ConsumerResult<bool>>),
    GetLastMessageId(oneshot::Sender<ConsumerResult<MessageId>>),

    ConnectionOpened,
    ConnectionClosed,
    ConnectionFailed(String),

    MessageReceived(RawMessage),
    ReachedEndOfTopic,
    HasReachedEndOfTopic(oneshot::Sender<bool>),
    ActiveConsumerChanged(bool),

    /// Internal self-post emitted by the flow controller; not driven by
    /// an external caller.
    SendFlowPermits(i32),
    AckTimeoutTick,
    NegativeAckTick,
    AckFlushTick,
    StatTick,
    GetStats(oneshot::Sender<Stats>),

    Close(oneshot::Sender<ConsumerResult<()>>),
    Unsubscribe(oneshot::Sender<ConsumerResult<()>>),
}
