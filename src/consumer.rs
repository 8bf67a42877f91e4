use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, oneshot};

use crate::commands::Command;
use crate::error::{ConsumerError, ConsumerResult};
use crate::message::{AckType, Message, Messages};
use crate::message_id::{EntryId, MessageId, SeekTarget};
use crate::session::{self, SessionParams};
use crate::stats::{Stats, StatsCounters};

/// The public handle a façade hands to an application. Every method posts
/// a [`Command`] to the
/// session actor and awaits its reply; no state lives here beyond what's
/// needed to answer `consumer_id`/`topic`/`name` without a round trip.
pub struct Consumer<T> {
    consumer_id: u64,
    topic: String,
    name: String,
    commands: mpsc::UnboundedSender<Command<T>>,
    last_message_id_in_broker: Arc<Mutex<EntryId>>,
    closed: Arc<AtomicBool>,
    stats: Arc<StatsCounters>,
}

impl<T: Send + 'static> Consumer<T> {
    /// Spawn the session actor and wait for the first subscribe attempt to
    /// resolve.
    pub async fn new(params: SessionParams<T>, name: String) -> ConsumerResult<Self> {
        let consumer_id = params.consumer_id;
        let topic = params.topic.clone();
        let (handle, subscribe_rx) = session::spawn(params);
        subscribe_rx.await.unwrap_or(Err(ConsumerError::NotConnected))?;

        Ok(Consumer {
            consumer_id,
            topic,
            name,
            commands: handle.commands,
            last_message_id_in_broker: handle.last_message_id_in_broker,
            closed: handle.closed,
            stats: handle.stats,
        })
    }

    fn check_open(&self) -> ConsumerResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ConsumerError::AlreadyClosed)
        } else {
            Ok(())
        }
    }

    fn post(&self, cmd: Command<T>) -> ConsumerResult<()> {
        self.check_open()?;
        self.commands.send(cmd).map_err(|_| ConsumerError::AlreadyClosed)
    }

    async fn call_result<R>(&self, make: impl FnOnce(oneshot::Sender<ConsumerResult<R>>) -> Command<T>) -> ConsumerResult<R> {
        self.check_open()?;
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).map_err(|_| ConsumerError::AlreadyClosed)?;
        rx.await.map_err(|_| ConsumerError::AlreadyClosed)?
    }

    async fn call_plain<R>(&self, make: impl FnOnce(oneshot::Sender<R>) -> Command<T>) -> ConsumerResult<R> {
        self.check_open()?;
        let (tx, rx) = oneshot::channel();
        self.commands.send(make(tx)).map_err(|_| ConsumerError::AlreadyClosed)?;
        rx.await.map_err(|_| ConsumerError::AlreadyClosed)
    }

    pub async fn receive(&self) -> ConsumerResult<Message<T>> {
        self.call_result(Command::Receive).await
    }

    pub async fn batch_receive(&self) -> ConsumerResult<Messages<T>> {
        self.call_result(Command::BatchReceive).await
    }

    pub fn acknowledge(&self, id: MessageId) -> ConsumerResult<()> {
        self.post(Command::Acknowledge(id, AckType::Individual))
    }

    pub fn acknowledge_messages(&self, ids: impl IntoIterator<Item = MessageId>) -> ConsumerResult<()> {
        self.check_open()?;
        for id in ids {
            self.commands
                .send(Command::Acknowledge(id, AckType::Individual))
                .map_err(|_| ConsumerError::AlreadyClosed)?;
        }
        Ok(())
    }

    pub fn acknowledge_cumulative(&self, id: MessageId) -> ConsumerResult<()> {
        self.post(Command::Acknowledge(id, AckType::Cumulative))
    }

    pub fn negative_acknowledge(&self, id: MessageId) -> ConsumerResult<()> {
        self.post(Command::NegativeAcknowledge(id))
    }

    pub fn negative_acknowledge_messages(&self, ids: impl IntoIterator<Item = MessageId>) -> ConsumerResult<()> {
        self.check_open()?;
        for id in ids {
            self.commands.send(Command::NegativeAcknowledge(id)).map_err(|_| ConsumerError::AlreadyClosed)?;
        }
        Ok(())
    }

    pub async fn redeliver_unacknowledged(&self, ids: Vec<MessageId>) -> ConsumerResult<()> {
        self.call_plain(|tx| Command::RedeliverUnacknowledged(ids, tx)).await
    }

    pub async fn redeliver_all_unacknowledged(&self) -> ConsumerResult<()> {
        self.call_plain(Command::RedeliverAllUnacknowledged).await
    }

    pub async fn seek(&self, id: MessageId) -> ConsumerResult<()> {
        self.call_result(|tx| Command::SeekAsync(SeekTarget::MessageId(id), tx)).await
    }

    pub async fn seek_by_timestamp(&self, timestamp: u64) -> ConsumerResult<()> {
        self.call_result(|tx| Command::SeekAsync(SeekTarget::Timestamp(timestamp), tx)).await
    }

    pub async fn get_last_message_id(&self) -> ConsumerResult<MessageId> {
        self.call_result(Command::GetLastMessageId).await
    }

    pub async fn has_message_available(&self) -> ConsumerResult<bool> {
        self.call_result(Command::HasMessageAvailable).await
    }

    pub async fn has_reached_end_of_topic(&self) -> ConsumerResult<bool> {
        self.call_plain(Command::HasReachedEndOfTopic).await
    }

    pub async fn get_stats(&self) -> ConsumerResult<Stats> {
        self.call_plain(Command::GetStats).await
    }

    /// Local counters are also readable without a round trip through the
    /// actor, since `StatsCounters` is plain atomics.
    pub fn stats_snapshot(&self) -> Stats {
        self.stats.snapshot()
    }

    pub fn consumer_id(&self) -> u64 {
        self.consumer_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The one field the session actor exposes outside its own command
    /// queue: read under the same mutex the actor writes through, giving
    /// acquire/release ordering for free.
    pub fn last_message_id_in_broker(&self) -> EntryId {
        *self.last_message_id_in_broker.lock().expect("last_message_id_in_broker mutex poisoned")
    }

    pub async fn unsubscribe(&self) -> ConsumerResult<()> {
        self.call_result(Command::Unsubscribe).await
    }

    /// Idempotent: once closed, further calls return `Ok(())` without a
    /// queue round trip.
    pub async fn close(&self) -> ConsumerResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.call_result(Command::Close).await
    }
}
