use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, oneshot};

use crate::ack_grouping_tracker::{AckGroupingTracker, AddAckOutcome};
use crate::backoff::Backoff;
use crate::batch_acker::BatchAcker;
use crate::commands::Command;
use crate::config::{ConsumerConfig, InitialPosition, SubscriptionMode};
use crate::connection::{
    AckFrame, ClientCnx, ConnectionProvider, RedeliverFrame, SchemaInfo, SeekFrame, SubscribeFrame,
};
use crate::dead_letter::{DeadLetterProcessor, DeadLetterSink};
use crate::error::{ConsumerError, ConsumerResult};
use crate::flow_control::FlowController;
use crate::interceptor::ConsumerInterceptor;
use crate::message::{AckType, Message, Messages, RawMessage};
use crate::message_id::{EntryId, MessageId, MessageIdKind, SeekTarget};
use crate::negative_ack_tracker::NegativeAckTracker;
use crate::schema::{select_decoder, SchemaProvider};
use crate::stats::StatsCounters;
use crate::unacked_tracker::UnackedTracker;

use bytes::Bytes;

/// Where the session is with respect to a broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Ready,
    Reconnecting,
    Closing,
    Closed,
    Failed,
}

struct BatchWaiter<T> {
    reply: oneshot::Sender<ConsumerResult<Messages<T>>>,
    cancelled: Arc<AtomicBool>,
}

/// Construction parameters for a session actor; bundled so `spawn` doesn't
/// need a long positional argument list.
pub struct SessionParams<T> {
    pub consumer_id: u64,
    pub topic: String,
    pub config: ConsumerConfig,
    pub connection_provider: Arc<dyn ConnectionProvider>,
    pub schema_provider: Arc<dyn SchemaProvider<T>>,
    pub interceptor: Arc<dyn ConsumerInterceptor<T>>,
    pub dlq_sink: Option<Arc<dyn DeadLetterSink>>,
    pub remove_self: Option<Box<dyn FnOnce() + Send>>,
    pub initial_start_message_id: Option<MessageId>,
    pub start_message_rollback_duration: Duration,
}

/// Everything a running session hands back to whoever spawned it.
pub struct SessionHandle<T> {
    pub commands: mpsc::UnboundedSender<Command<T>>,
    pub last_message_id_in_broker: Arc<Mutex<EntryId>>,
    pub closed: Arc<AtomicBool>,
    pub stats: Arc<StatsCounters>,
}

/// The per-consumer session actor. All fields are private to this module;
/// every outside interaction is a [`Command`] sent over the channel handed
/// out by [`spawn`].
pub struct ConsumerSession<T> {
    consumer_id: u64,
    topic: String,
    config: ConsumerConfig,

    connection_provider: Arc<dyn ConnectionProvider>,
    schema_provider: Arc<dyn SchemaProvider<T>>,
    interceptor: Arc<dyn ConsumerInterceptor<T>>,
    dlq_sink: Option<Arc<dyn DeadLetterSink>>,
    remove_self: Option<Box<dyn FnOnce() + Send>>,

    state: ConnectionState,
    cnx: Option<Arc<dyn ClientCnx>>,

    incoming: crate::incoming_queue::IncomingQueue<T>,
    receive_waiters: VecDeque<oneshot::Sender<ConsumerResult<Message<T>>>>,
    batch_waiters: VecDeque<BatchWaiter<T>>,

    flow: FlowController,
    ack_tracker: AckGroupingTracker,
    unacked: Option<UnackedTracker>,
    neg_ack: NegativeAckTracker,
    dlq: DeadLetterProcessor,
    backoff: Backoff,
    stats: Arc<StatsCounters>,

    start_message_id: Option<MessageId>,
    initial_start_message_id: Option<MessageId>,
    last_dequeued_message_id: MessageId,
    last_message_id_in_broker: Arc<Mutex<EntryId>>,
    during_seek: Option<MessageId>,
    start_message_rollback_duration: Duration,

    subscribe_deadline: Instant,
    subscribe_tsc: Option<oneshot::Sender<ConsumerResult<()>>>,
    next_request_id: u64,
    self_tx: mpsc::UnboundedSender<Command<T>>,

    reached_end_of_topic: bool,
    active_consumer: bool,
    closed: Arc<AtomicBool>,
}

/// Spawn a session actor and its background timers. Returns a handle for
/// posting commands and a receiver that resolves once the first subscribe
/// attempt succeeds or fails permanently.
pub fn spawn<T: Send + 'static>(params: SessionParams<T>) -> (SessionHandle<T>, oneshot::Receiver<ConsumerResult<()>>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (subscribe_tx, subscribe_rx) = oneshot::channel();
    let last_broker = Arc::new(Mutex::new(EntryId::UNKNOWN));
    let closed = Arc::new(AtomicBool::new(false));
    let stats = Arc::new(StatsCounters::default());

    let unacked = if params.config.ack_timeout.is_zero() {
        None
    } else {
        let tick = if params.config.ack_timeout_tick_time.is_zero() {
            params.config.ack_timeout
        } else {
            params.config.ack_timeout_tick_time
        };
        Some(UnackedTracker::new(params.config.ack_timeout, tick))
    };

    let session = ConsumerSession {
        consumer_id: params.consumer_id,
        topic: params.topic,
        config: params.config.clone(),
        connection_provider: params.connection_provider,
        schema_provider: params.schema_provider,
        interceptor: params.interceptor,
        dlq_sink: params.dlq_sink,
        remove_self: params.remove_self,
        state: ConnectionState::Connecting,
        cnx: None,
        incoming: crate::incoming_queue::IncomingQueue::new(),
        receive_waiters: VecDeque::new(),
        batch_waiters: VecDeque::new(),
        flow: FlowController::new(params.config.receiver_queue_size),
        ack_tracker: AckGroupingTracker::new(!params.config.non_persistent_topic),
        unacked,
        neg_ack: NegativeAckTracker::new(params.config.negative_ack_redelivery_delay),
        dlq: DeadLetterProcessor::new(params.config.dead_letters_processor.clone()),
        backoff: Backoff::new(Duration::from_millis(100), Duration::from_secs(60), params.config.operation_timeout * 10),
        stats: stats.clone(),
        start_message_id: params.initial_start_message_id.clone(),
        initial_start_message_id: params.initial_start_message_id,
        last_dequeued_message_id: MessageId::earliest(),
        last_message_id_in_broker: last_broker.clone(),
        during_seek: None,
        start_message_rollback_duration: params.start_message_rollback_duration,
        subscribe_deadline: Instant::now() + params.config.operation_timeout,
        subscribe_tsc: Some(subscribe_tx),
        next_request_id: 0,
        self_tx: tx.clone(),
        reached_end_of_topic: false,
        active_consumer: true,
        closed: closed.clone(),
    };

    if !params.config.ack_timeout.is_zero() {
        let tick = if params.config.ack_timeout_tick_time.is_zero() {
            params.config.ack_timeout
        } else {
            params.config.ack_timeout_tick_time
        };
        spawn_ticker(tx.clone(), tick, || Command::AckTimeoutTick);
    }
    if !params.config.negative_ack_redelivery_delay.is_zero() {
        let poll = (params.config.negative_ack_redelivery_delay / 10).max(Duration::from_millis(50));
        spawn_ticker(tx.clone(), poll, || Command::NegativeAckTick);
    }
    if !params.config.acknowledgements_group_time.is_zero() {
        spawn_ticker(tx.clone(), params.config.acknowledgements_group_time, || Command::AckFlushTick);
    }

    tokio::spawn(session.run(rx));
    let _ = tx.send(Command::ConnectionOpened);

    (
        SessionHandle {
            commands: tx,
            last_message_id_in_broker: last_broker,
            closed,
            stats,
        },
        subscribe_rx,
    )
}

fn spawn_ticker<T, F>(tx: mpsc::UnboundedSender<Command<T>>, period: Duration, mut factory: F)
where
    T: Send + 'static,
    F: FnMut() -> Command<T> + Send + 'static,
{
    if period.is_zero() {
        return;
    }
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if tx.send(factory()).is_err() {
                break;
            }
        }
    });
}

fn has_more(broker: EntryId, reference: EntryId, inclusive: bool) -> bool {
    broker.entry_id != -1 && if inclusive { broker >= reference } else { broker > reference }
}

impl<T: Send + 'static> ConsumerSession<T> {
    pub async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command<T>>) {
        while let Some(cmd) = rx.recv().await {
            if !self.handle(cmd).await {
                break;
            }
        }
    }

    async fn handle(&mut self, cmd: Command<T>) -> bool {
        match cmd {
            Command::Receive(reply) => {
                self.handle_receive(reply).await;
                true
            }
            Command::BatchReceive(reply) => {
                self.handle_batch_receive(reply).await;
                true
            }
            Command::SendBatchByTimeout => {
                if let Some(waiter) = self.batch_waiters.pop_front() {
                    let bundle = self.drain_batch().await;
                    let _ = waiter.reply.send(Ok(bundle));
                }
                true
            }
            Command::Acknowledge(id, ack_type) => {
                self.handle_acknowledge(id, ack_type).await;
                true
            }
            Command::NegativeAcknowledge(id) => {
                self.interceptor.on_negative_acknowledge(&id);
                self.neg_ack.add(id, Instant::now());
                true
            }
            Command::RedeliverUnacknowledged(ids, reply) => {
                if let Err(e) = self.redeliver_unacknowledged(ids).await {
                    log::warn!("redelivery request failed: {e}");
                }
                let _ = reply.send(());
                true
            }
            Command::RedeliverAllUnacknowledged(reply) => {
                if let Err(e) = self.redeliver_all_unacknowledged().await {
                    log::warn!("redeliver-all request failed: {e}");
                }
                let _ = reply.send(());
                true
            }
            Command::SeekAsync(target, reply) => {
                self.handle_seek(target, reply).await;
                true
            }
            Command::HasMessageAvailable(reply) => {
                let result = self.has_message_available().await;
                let _ = reply.send(result);
                true
            }
            Command::GetLastMessageId(reply) => {
                let result = self.fetch_last_message_id().await;
                let _ = reply.send(result);
                true
            }
            Command::ConnectionOpened => {
                self.on_connection_opened().await;
                true
            }
            Command::ConnectionClosed => {
                self.cnx = None;
                if !matches!(self.state, ConnectionState::Closing | ConnectionState::Closed | ConnectionState::Failed) {
                    self.fail_or_retry_subscribe(ConsumerError::NotConnected);
                }
                true
            }
            Command::ConnectionFailed(msg) => {
                self.cnx = None;
                if !matches!(self.state, ConnectionState::Closing | ConnectionState::Closed | ConnectionState::Failed) {
                    self.fail_or_retry_subscribe(ConsumerError::Transport(msg));
                }
                true
            }
            Command::MessageReceived(raw) => {
                self.handle_message_received(raw).await;
                true
            }
            Command::ReachedEndOfTopic => {
                self.reached_end_of_topic = true;
                true
            }
            Command::HasReachedEndOfTopic(reply) => {
                let _ = reply.send(self.reached_end_of_topic);
                true
            }
            Command::ActiveConsumerChanged(active) => {
                self.active_consumer = active;
                self.interceptor.on_active_consumer_changed(active);
                true
            }
            Command::SendFlowPermits(n) => {
                self.send_flow(n).await;
                true
            }
            Command::AckTimeoutTick => {
                if let Some(unacked) = &mut self.unacked {
                    let expired = unacked.tick();
                    if !expired.is_empty() {
                        self.request_redelivery(expired).await;
                    }
                }
                true
            }
            Command::NegativeAckTick => {
                let due = self.neg_ack.drain_due(Instant::now());
                if !due.is_empty() {
                    self.request_redelivery(due).await;
                }
                true
            }
            Command::AckFlushTick => {
                let flushed = self.ack_tracker.flush();
                for (id, ack_type) in flushed {
                    self.send_ack_frame(vec![id], ack_type).await;
                }
                true
            }
            Command::StatTick => true,
            Command::GetStats(reply) => {
                let _ = reply.send(self.stats.snapshot());
                true
            }
            Command::Close(reply) => self.handle_close(reply).await,
            Command::Unsubscribe(reply) => self.handle_unsubscribe(reply).await,
        }
    }

    fn next_request_id(&mut self) -> u64 {
        self.next_request_id += 1;
        self.next_request_id
    }

    fn is_retriable(err: &ConsumerError) -> bool {
        match err {
            ConsumerError::Broker { code, .. } => code.is_retriable(),
            ConsumerError::Transport(_) | ConsumerError::NotConnected | ConsumerError::ConnectionFailedOnSend => true,
            _ => false,
        }
    }

    fn reconnect_later(&mut self, err: ConsumerError) {
        log::warn!("connection attempt failed for {}, retrying: {err}", self.topic);
        self.state = ConnectionState::Reconnecting;
        let delay = self.backoff.next();
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Command::ConnectionOpened);
        });
    }

    /// First-connection failures respect `subscribe_timeout` and resolve
    /// `subscribe_tsc`; once subscribed, the client retries forever on its
    /// own backoff schedule.
    fn fail_or_retry_subscribe(&mut self, err: ConsumerError) {
        if self.subscribe_tsc.is_none() {
            self.reconnect_later(err);
            return;
        }
        if Self::is_retriable(&err) && Instant::now() < self.subscribe_deadline {
            self.reconnect_later(err);
        } else {
            log::error!("subscribe to {} failed permanently: {err}", self.topic);
            self.state = ConnectionState::Failed;
            if let Some(tsc) = self.subscribe_tsc.take() {
                let _ = tsc.send(Err(err));
            }
        }
    }

    async fn on_connection_opened(&mut self) {
        if matches!(self.state, ConnectionState::Closing | ConnectionState::Closed | ConnectionState::Failed) {
            return;
        }
        let cnx = match self.connection_provider.get_connection(&self.topic).await {
            Ok(cnx) => cnx,
            Err(e) => {
                self.fail_or_retry_subscribe(e);
                return;
            }
        };
        cnx.add_consumer(self.consumer_id).await;

        let resume = self.clear_receiver_queue();
        self.start_message_id = resume.clone();
        self.dlq.clear();

        let durable = self.config.subscription_mode == SubscriptionMode::Durable;
        let apply_rollback = resume == self.initial_start_message_id;

        if !durable && resume.is_none() {
            log::warn!("Start messageId is missing");
        }

        let frame = SubscribeFrame {
            topic: self.topic.clone(),
            subscription_name: self.config.subscription_name.clone(),
            consumer_id: self.consumer_id,
            request_id: self.next_request_id(),
            subscription_type: self.config.subscription_type,
            initial_position_is_latest: matches!(self.config.initial_position, InitialPosition::Latest),
            read_compacted: self.config.read_compacted,
            start_message_id: if durable { None } else { resume.clone() },
            durable,
            start_rollback_duration: if apply_rollback { self.start_message_rollback_duration } else { Duration::ZERO },
            create_topic_if_missing: false,
            key_shared_policy: self.config.key_shared_policy.clone(),
            schema_info: None::<SchemaInfo>,
        };

        match cnx.send_subscribe(frame).await {
            Ok(()) => {
                self.state = ConnectionState::Ready;
                self.cnx = Some(cnx.clone());
                self.backoff.reset();
                if let Some(tsc) = self.subscribe_tsc.take() {
                    let _ = tsc.send(Ok(()));
                }
                if self.config.receiver_queue_size > 0 {
                    let n = self.config.receiver_queue_size as i32;
                    if let Err(e) = cnx.send_flow(self.consumer_id, n).await {
                        log::warn!("initial flow send failed: {e}");
                    }
                }
            }
            Err(e) => self.fail_or_retry_subscribe(e),
        }
    }

    fn clear_receiver_queue(&mut self) -> Option<MessageId> {
        let head = self.incoming.pop_front();
        self.incoming.clear();

        if let Some(seek_id) = self.during_seek.take() {
            return Some(seek_id);
        }
        if self.config.subscription_mode == SubscriptionMode::Durable {
            return self.start_message_id.clone();
        }
        if let Some(head_msg) = head {
            return Some(head_msg.id.predecessor());
        }
        if !self.last_dequeued_message_id.is_earliest() {
            return Some(self.last_dequeued_message_id.clone());
        }
        self.start_message_id.clone()
    }

    async fn send_flow(&mut self, permits: i32) {
        match (&self.state, self.cnx.clone()) {
            (ConnectionState::Ready, Some(cnx)) => {
                if let Err(e) = cnx.send_flow(self.consumer_id, permits).await {
                    log::warn!("flow send failed: {e}");
                }
            }
            _ => {
                log::debug!("dropping flow emission on a non-ready connection; next ConnectionOpened resends a full window");
            }
        }
    }

    async fn credit_permits(&mut self, delta: i32) {
        if let Some(to_send) = self.flow.increase(delta) {
            self.send_flow(to_send).await;
        }
    }

    fn build_decoder(&self, schema_version: Option<u32>) -> Box<dyn FnOnce(&Bytes) -> T + Send> {
        let provider = self.schema_provider.clone();
        Box::new(move |bytes: &Bytes| {
            let decoder = select_decoder(provider.as_ref(), schema_version);
            decoder.decode(bytes)
        })
    }

    fn maybe_dead_letter(&mut self, raw: &RawMessage) {
        if let Some(policy) = &self.config.dead_letters_processor {
            if raw.redelivery_count >= policy.max_redelivery_count {
                self.dlq.maybe_buffer(raw);
            }
        }
    }

    /// A discard sends a negative-ack frame for the id and increments
    /// receive-failure stats.
    async fn discard(&mut self, id: MessageId, err: ConsumerError) {
        log::error!("discarding corrupted delivery {id:?}: {err}");
        self.stats.record_receive_failed();
        if let Some(cnx) = self.cnx.clone() {
            let frame = AckFrame {
                consumer_id: self.consumer_id,
                ids: vec![id],
                ack_type: AckType::Individual,
                validation_error: Some(err.to_string()),
            };
            if let Err(e) = cnx.send_ack(frame).await {
                log::warn!("failed to send error-ack: {e}");
            }
        }
    }

    async fn handle_message_received(&mut self, raw: RawMessage) {
        match raw.corruption {
            crate::message::DeliveryCorruption::ChecksumMismatch => {
                self.discard(raw.id, ConsumerError::ChecksumMismatch).await;
                return;
            }
            crate::message::DeliveryCorruption::DecompressionError => {
                self.discard(raw.id, ConsumerError::DecompressionError).await;
                return;
            }
            crate::message::DeliveryCorruption::UncompressedSizeCorruption => {
                self.discard(raw.id, ConsumerError::UncompressedSizeCorruption).await;
                return;
            }
            crate::message::DeliveryCorruption::None => {}
        }

        if self.ack_tracker.is_duplicate(&raw.id) {
            self.credit_permits(raw.metadata.num_messages).await;
            return;
        }

        self.stats.record_message(raw.payload.len());

        if raw.metadata.num_messages <= 1 && !raw.metadata.has_batch {
            self.handle_single_entry(raw).await;
        } else {
            self.handle_batched_entry(raw).await;
        }
    }

    async fn handle_single_entry(&mut self, raw: RawMessage) {
        if let Some(start) = self.start_message_id.clone() {
            if raw.id.same_entry(&start) {
                let prior = if self.config.reset_include_head { raw.id < start } else { raw.id <= start };
                if prior {
                    self.credit_permits(1).await;
                    return;
                }
            }
        }

        self.maybe_dead_letter(&raw);

        let decoder = self.build_decoder(raw.metadata.schema_version);
        let msg = Message::new(
            raw.id.clone(),
            raw.payload.clone(),
            raw.key.clone(),
            raw.key_is_b64,
            raw.properties.clone(),
            raw.metadata.schema_version,
            None,
            decoder,
        );

        if let Some(unacked) = &mut self.unacked {
            unacked.add(msg.id.clone());
        }

        self.deliver(msg).await;
    }

    async fn handle_batched_entry(&mut self, raw: RawMessage) {
        let num = raw.metadata.num_messages.max(1) as usize;
        if raw.sub_messages.len() != num {
            self.discard(raw.id, ConsumerError::BatchDeserializeError).await;
            return;
        }

        self.maybe_dead_letter(&raw);
        self.stats.record_batch();

        let acker = Arc::new(BatchAcker::new(num));
        let start = self.start_message_id.clone();
        let mut skipped = 0i32;

        for (i, sub) in raw.sub_messages.into_iter().enumerate() {
            let id = MessageId::cumulative(raw.id.ledger_id, raw.id.entry_id, raw.id.partition, i as i32, acker.clone());

            if let Some(start_id) = &start {
                if id.same_entry(start_id) {
                    let prior = if self.config.reset_include_head { id < *start_id } else { id <= *start_id };
                    if prior {
                        skipped += 1;
                        continue;
                    }
                }
            }

            let decoder = self.build_decoder(raw.metadata.schema_version);
            let msg = Message::new(
                id.clone(),
                sub.payload,
                sub.key,
                sub.key_is_b64,
                sub.properties,
                raw.metadata.schema_version,
                sub.sequence_id,
                decoder,
            );

            if let Some(unacked) = &mut self.unacked {
                unacked.add(msg.id.clone());
            }
            self.deliver(msg).await;
        }

        if skipped > 0 {
            self.credit_permits(skipped).await;
        }
    }

    /// Shared "fast path vs. enqueue" delivery logic. Crediting one permit
    /// either way mirrors the cost of a message that leaves the broker's
    /// in-flight budget, whether it lands in `incoming` first or is handed
    /// straight to a waiter.
    async fn deliver(&mut self, msg: Message<T>) {
        if let Some(waiter) = self.receive_waiters.pop_front() {
            self.last_dequeued_message_id = msg.id.clone();
            self.interceptor.before_consume(&msg);
            let _ = waiter.send(Ok(msg));
            self.credit_permits(1).await;
            return;
        }
        self.incoming.push_back(msg);
        self.try_complete_batch_waiter().await;
    }

    async fn handle_receive(&mut self, reply: oneshot::Sender<ConsumerResult<Message<T>>>) {
        if let Some(msg) = self.incoming.pop_front() {
            self.last_dequeued_message_id = msg.id.clone();
            self.interceptor.before_consume(&msg);
            self.credit_permits(1).await;
            let _ = reply.send(Ok(msg));
        } else {
            self.receive_waiters.push_back(reply);
        }
    }

    fn batch_threshold_met(&self) -> bool {
        let policy = &self.config.batch_receive_policy;
        !self.incoming.is_empty() && (self.incoming.len() >= policy.max_num_messages || self.incoming.incoming_bytes() >= policy.max_num_bytes)
    }

    async fn drain_batch(&mut self) -> Messages<T> {
        let policy = self.config.batch_receive_policy.clone();
        let mut out = Vec::new();
        let mut bytes = 0usize;
        while out.len() < policy.max_num_messages {
            let next_len = match self.incoming.peek_front() {
                Some(m) => m.payload_bytes.len(),
                None => break,
            };
            if !out.is_empty() && bytes + next_len > policy.max_num_bytes {
                break;
            }
            let msg = self.incoming.pop_front().expect("front just peeked");
            bytes += msg.payload_bytes.len();
            self.last_dequeued_message_id = msg.id.clone();
            self.interceptor.before_consume(&msg);
            out.push(msg);
        }
        if !out.is_empty() {
            self.credit_permits(out.len() as i32).await;
        }
        Messages { messages: out }
    }

    async fn handle_batch_receive(&mut self, reply: oneshot::Sender<ConsumerResult<Messages<T>>>) {
        if self.batch_waiters.is_empty() && self.batch_threshold_met() {
            let bundle = self.drain_batch().await;
            let _ = reply.send(Ok(bundle));
            return;
        }
        let cancelled = Arc::new(AtomicBool::new(false));
        self.batch_waiters.push_back(BatchWaiter { reply, cancelled: cancelled.clone() });

        let timeout = self.config.batch_receive_policy.timeout;
        let tx = self.self_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if !cancelled.load(Ordering::SeqCst) {
                let _ = tx.send(Command::SendBatchByTimeout);
            }
        });
    }

    async fn try_complete_batch_waiter(&mut self) {
        if self.batch_waiters.is_empty() || !self.batch_threshold_met() {
            return;
        }
        if let Some(waiter) = self.batch_waiters.pop_front() {
            waiter.cancelled.store(true, Ordering::SeqCst);
            let bundle = self.drain_batch().await;
            let _ = waiter.reply.send(Ok(bundle));
        }
    }

    fn unacked_remove(&mut self, id: &MessageId) {
        if let Some(u) = &mut self.unacked {
            u.remove(id);
        }
    }

    fn unacked_remove_until(&mut self, id: &MessageId) {
        if let Some(u) = &mut self.unacked {
            u.remove_until(id);
        }
    }

    async fn enqueue_ack(&mut self, id: MessageId, ack_type: AckType) {
        match self.ack_tracker.add(id, ack_type) {
            AddAckOutcome::Buffered => {}
            AddAckOutcome::SendImmediately(id, ack_type) => self.send_ack_frame(vec![id], ack_type).await,
        }
    }

    async fn send_ack_frame(&mut self, ids: Vec<MessageId>, ack_type: AckType) {
        self.stats.record_ack();
        if let Some(cnx) = self.cnx.clone() {
            let frame = AckFrame { consumer_id: self.consumer_id, ids, ack_type, validation_error: None };
            if let Err(e) = cnx.send_ack(frame).await {
                log::warn!("ack send failed: {e}");
            }
        } else {
            log::debug!("dropping ack on disconnected consumer");
        }
    }

    /// Implements the partial-cumulative-ack rule plus the plain
    /// individual/cumulative cases.
    async fn handle_acknowledge(&mut self, id: MessageId, ack_type: AckType) {
        self.interceptor.on_acknowledge(&id, ack_type);

        let forward = match &id.kind {
            MessageIdKind::Individual => {
                match ack_type {
                    AckType::Individual => self.unacked_remove(&id),
                    AckType::Cumulative => self.unacked_remove_until(&id),
                }
                Some((id.clone(), ack_type))
            }
            MessageIdKind::Cumulative(i, acker) => {
                let i = *i as usize;
                let acker = acker.clone();
                let done = match ack_type {
                    AckType::Individual => acker.ack_individual(i),
                    AckType::Cumulative => acker.ack_group(i),
                };

                if ack_type == AckType::Cumulative && !acker.prev_batch_cumulatively_acked() {
                    acker.set_prev_batch_cumulatively_acked();
                    let prev_entry = MessageId::individual(id.ledger_id, id.entry_id - 1, id.partition);
                    self.unacked_remove_until(&prev_entry);
                    self.enqueue_ack(prev_entry, AckType::Cumulative).await;
                }

                if done {
                    let entry_id = MessageId::individual(id.ledger_id, id.entry_id, id.partition);
                    self.unacked_remove(&entry_id);
                    Some((entry_id, AckType::Individual))
                } else {
                    None
                }
            }
        };

        if let Some((fwd_id, fwd_type)) = forward {
            self.enqueue_ack(fwd_id, fwd_type).await;
        }
    }

    async fn redeliver_unacknowledged(&mut self, ids: Vec<MessageId>) -> ConsumerResult<()> {
        if !self.config.subscription_type.supports_selective_redelivery() {
            return self.redeliver_all_unacknowledged().await;
        }

        let purged = self.incoming.drain_matching_head_prefix(|m| ids.iter().any(|id| id == &m.id));
        if !purged.is_empty() {
            self.credit_permits(purged.len() as i32).await;
        }

        let Some(cnx) = self.cnx.clone() else {
            log::warn!("skipping redeliver request, connection not ready");
            return Ok(());
        };

        let mut dlq_acked = Vec::new();
        let mut to_redeliver = Vec::new();
        if let Some(sink) = self.dlq_sink.clone() {
            for id in ids {
                let mut acked_here = None;
                let forwarded = self.dlq.process_messages(&id, sink.as_ref(), |acked_id| acked_here = Some(acked_id.clone()));
                if forwarded {
                    if let Some(acked_id) = acked_here {
                        dlq_acked.push(acked_id);
                    }
                } else {
                    to_redeliver.push(id);
                }
            }
        } else {
            to_redeliver = ids;
        }

        for id in dlq_acked {
            self.enqueue_ack(id, AckType::Individual).await;
        }

        for chunk in to_redeliver.chunks(1000) {
            let frame = RedeliverFrame { consumer_id: self.consumer_id, ids: Some(chunk.to_vec()) };
            cnx.send_redeliver(frame).await?;
        }
        Ok(())
    }

    async fn redeliver_all_unacknowledged(&mut self) -> ConsumerResult<()> {
        let Some(cnx) = self.cnx.clone() else {
            log::warn!("skipping redeliver-all request, connection not ready");
            return Ok(());
        };
        let frame = RedeliverFrame { consumer_id: self.consumer_id, ids: None };
        cnx.send_redeliver(frame).await?;

        let drained = self.incoming.clear();
        if !drained.is_empty() {
            self.credit_permits(drained.len() as i32).await;
        }
        if let Some(unacked) = &mut self.unacked {
            unacked.clear();
        }
        Ok(())
    }

    async fn request_redelivery(&mut self, ids: Vec<MessageId>) {
        if let Err(e) = self.redeliver_unacknowledged(ids).await {
            log::warn!("timer-driven redelivery request failed: {e}");
        }
    }

    async fn handle_seek(&mut self, target: SeekTarget, reply: oneshot::Sender<ConsumerResult<()>>) {
        let Some(cnx) = self.cnx.clone() else {
            let _ = reply.send(Err(ConsumerError::NotConnected));
            return;
        };

        let request_id = self.next_request_id();
        let frame = match &target {
            SeekTarget::Timestamp(ts) => SeekFrame::ByTimestamp { consumer_id: self.consumer_id, request_id, timestamp: *ts },
            SeekTarget::MessageId(id) => SeekFrame::ByMessageId { consumer_id: self.consumer_id, request_id, id: id.clone() },
        };

        match cnx.send_seek(frame).await {
            Ok(()) => {
                self.during_seek = Some(match target {
                    SeekTarget::Timestamp(_) => MessageId::earliest(),
                    SeekTarget::MessageId(id) => id,
                });
                self.last_dequeued_message_id = MessageId::earliest();

                let flushed = self.ack_tracker.flush();
                for (id, ack_type) in flushed {
                    self.send_ack_frame(vec![id], ack_type).await;
                }
                self.ack_tracker.clear();
                self.incoming.clear();

                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    async fn seek_internal(&mut self, target: SeekTarget) -> ConsumerResult<()> {
        let (tx, rx) = oneshot::channel();
        self.handle_seek(target, tx).await;
        rx.await.unwrap_or(Err(ConsumerError::AlreadyClosed))
    }

    async fn fetch_last_message_id(&mut self) -> ConsumerResult<MessageId> {
        let cnx = self.cnx.clone().ok_or(ConsumerError::NotConnected)?;
        let request_id = self.next_request_id();
        cnx.send_get_last_message_id(self.consumer_id, request_id).await
    }

    async fn has_message_available(&mut self) -> ConsumerResult<bool> {
        let have_dequeued = !self.last_dequeued_message_id.is_earliest();

        let (reference, inclusive) = if have_dequeued {
            (self.last_dequeued_message_id.clone(), false)
        } else {
            let start = self.start_message_id.clone().unwrap_or_else(|| self.last_dequeued_message_id.clone());
            if start == MessageId::latest() {
                let last = self.fetch_last_message_id().await?;
                self.seek_internal(SeekTarget::MessageId(last)).await?;
                return Ok(self.config.reset_include_head);
            }
            (start, self.config.reset_include_head)
        };

        if !self.incoming.is_empty() {
            return Ok(true);
        }

        let broker = *self.last_message_id_in_broker.lock().expect("last_message_id_in_broker mutex poisoned");
        if has_more(broker, EntryId::from_message_id(&reference), inclusive) {
            return Ok(true);
        }

        let refreshed = self.fetch_last_message_id().await?;
        let refreshed_entry = EntryId::from_message_id(&refreshed);
        *self.last_message_id_in_broker.lock().expect("last_message_id_in_broker mutex poisoned") = refreshed_entry;
        Ok(has_more(refreshed_entry, EntryId::from_message_id(&reference), inclusive))
    }

    /// Flushes pending acks then releases every collaborator and wakes
    /// every waiter with `AlreadyClosed` (the open question resolved as
    /// flush-then-close).
    async fn stop_consumer(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
        self.state = ConnectionState::Closed;

        let flushed = self.ack_tracker.flush_and_close();
        for (id, ack_type) in flushed {
            self.send_ack_frame(vec![id], ack_type).await;
        }
        if let Some(unacked) = &mut self.unacked {
            unacked.close();
        }
        self.neg_ack.clear();
        self.dlq.close();
        if let Some(cnx) = self.cnx.take() {
            cnx.remove_consumer(self.consumer_id).await;
        }

        while let Some(w) = self.receive_waiters.pop_front() {
            let _ = w.send(Err(ConsumerError::AlreadyClosed));
        }
        while let Some(w) = self.batch_waiters.pop_front() {
            w.cancelled.store(true, Ordering::SeqCst);
            let _ = w.reply.send(Err(ConsumerError::AlreadyClosed));
        }

        if let Some(remove_self) = self.remove_self.take() {
            remove_self();
        }
    }

    async fn handle_close(&mut self, reply: oneshot::Sender<ConsumerResult<()>>) -> bool {
        if matches!(self.state, ConnectionState::Closed | ConnectionState::Failed) {
            let _ = reply.send(Ok(()));
            return false;
        }
        self.state = ConnectionState::Closing;
        if let Some(cnx) = self.cnx.clone() {
            let request_id = self.next_request_id();
            if let Err(e) = cnx.send_close_consumer(self.consumer_id, request_id).await {
                log::warn!("close_consumer frame failed, closing locally anyway: {e}");
            }
        }
        self.stop_consumer().await;
        let _ = reply.send(Ok(()));
        false
    }

    async fn handle_unsubscribe(&mut self, reply: oneshot::Sender<ConsumerResult<()>>) -> bool {
        if matches!(self.state, ConnectionState::Closed | ConnectionState::Failed) {
            let _ = reply.send(Ok(()));
            return false;
        }
        self.state = ConnectionState::Closing;

        let Some(cnx) = self.cnx.clone() else {
            self.stop_consumer().await;
            let _ = reply.send(Ok(()));
            return false;
        };

        let request_id = self.next_request_id();
        match cnx.send_unsubscribe(self.consumer_id, request_id).await {
            Ok(()) => {
                self.stop_consumer().await;
                let _ = reply.send(Ok(()));
                false
            }
            Err(e) => {
                log::warn!("unsubscribe failed: {e}");
                self.state = ConnectionState::Ready;
                let _ = reply.send(Err(e));
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeadLetterPolicy, SubscriptionType};
    use crate::dead_letter::DeadLetterSink;
    use crate::interceptor::NoopInterceptor;
    use crate::message::{Compression, DeliveryCorruption, EntryMetadata, SingleMessageMetadata};
    use crate::schema::{SchemaDecoder, SchemaProvider};
    use std::collections::HashMap as Map;

    struct IdentityDecoder;
    impl SchemaDecoder<String> for IdentityDecoder {
        fn decode(&self, bytes: &Bytes) -> String {
            String::from_utf8(bytes.to_vec()).unwrap()
        }
    }
    struct IdentityProvider;
    impl SchemaProvider<String> for IdentityProvider {
        fn base_decoder(&self) -> Arc<dyn SchemaDecoder<String>> {
            Arc::new(IdentityDecoder)
        }
        fn decoder_for_version(&self, _version: u32) -> Option<Arc<dyn SchemaDecoder<String>>> {
            None
        }
    }

    #[derive(Default)]
    struct MockCnx {
        subscribes: Mutex<Vec<SubscribeFrame>>,
        acks: Mutex<Vec<AckFrame>>,
        flows: Mutex<Vec<i32>>,
        redelivers: Mutex<Vec<RedeliverFrame>>,
        seeks: Mutex<Vec<SeekFrame>>,
        last_message_id: Mutex<Option<MessageId>>,
    }

    #[async_trait::async_trait]
    impl ClientCnx for MockCnx {
        async fn add_consumer(&self, _consumer_id: u64) {}
        async fn remove_consumer(&self, _consumer_id: u64) {}

        async fn send_subscribe(&self, frame: SubscribeFrame) -> ConsumerResult<()> {
            self.subscribes.lock().unwrap().push(frame);
            Ok(())
        }
        async fn send_flow(&self, _consumer_id: u64, permits: i32) -> ConsumerResult<()> {
            self.flows.lock().unwrap().push(permits);
            Ok(())
        }
        async fn send_ack(&self, frame: AckFrame) -> ConsumerResult<()> {
            self.acks.lock().unwrap().push(frame);
            Ok(())
        }
        async fn send_redeliver(&self, frame: RedeliverFrame) -> ConsumerResult<()> {
            self.redelivers.lock().unwrap().push(frame);
            Ok(())
        }
        async fn send_seek(&self, frame: SeekFrame) -> ConsumerResult<()> {
            self.seeks.lock().unwrap().push(frame);
            Ok(())
        }
        async fn send_get_last_message_id(&self, _consumer_id: u64, _request_id: u64) -> ConsumerResult<MessageId> {
            Ok(self.last_message_id.lock().unwrap().clone().unwrap_or_else(MessageId::earliest))
        }
        async fn send_close_consumer(&self, _consumer_id: u64, _request_id: u64) -> ConsumerResult<()> {
            Ok(())
        }
        async fn send_unsubscribe(&self, _consumer_id: u64, _request_id: u64) -> ConsumerResult<()> {
            Ok(())
        }
    }

    struct MockProvider {
        cnx: Arc<MockCnx>,
    }

    #[async_trait::async_trait]
    impl ConnectionProvider for MockProvider {
        async fn get_connection(&self, _topic: &str) -> ConsumerResult<Arc<dyn ClientCnx>> {
            Ok(self.cnx.clone())
        }
    }

    struct RecordingSink {
        published: Mutex<Vec<(String, MessageId)>>,
    }
    impl DeadLetterSink for RecordingSink {
        fn publish(&self, topic: &str, message: &RawMessage) {
            self.published.lock().unwrap().push((topic.to_string(), message.id.clone()));
        }
    }

    /// Builds a session already `Ready` and wired to a [`MockCnx`], bypassing
    /// `spawn`'s background timers so tests drive every tick explicitly.
    fn build(config: ConsumerConfig) -> (ConsumerSession<String>, Arc<MockCnx>) {
        let (tx, _rx) = mpsc::unbounded_channel();
        let cnx = Arc::new(MockCnx::default());
        let session = ConsumerSession {
            consumer_id: 1,
            topic: "persistent://p/ns/topic".to_string(),
            config: config.clone(),
            connection_provider: Arc::new(MockProvider { cnx: cnx.clone() }),
            schema_provider: Arc::new(IdentityProvider),
            interceptor: Arc::new(NoopInterceptor),
            dlq_sink: None,
            remove_self: None,
            state: ConnectionState::Ready,
            cnx: Some(cnx.clone()),
            incoming: crate::incoming_queue::IncomingQueue::new(),
            receive_waiters: VecDeque::new(),
            batch_waiters: VecDeque::new(),
            flow: FlowController::new(config.receiver_queue_size),
            ack_tracker: AckGroupingTracker::new(!config.non_persistent_topic),
            unacked: None,
            neg_ack: NegativeAckTracker::new(config.negative_ack_redelivery_delay),
            dlq: DeadLetterProcessor::new(config.dead_letters_processor.clone()),
            backoff: Backoff::new(Duration::from_millis(100), Duration::from_secs(60), config.operation_timeout * 10),
            stats: Arc::new(StatsCounters::default()),
            start_message_id: None,
            initial_start_message_id: None,
            last_dequeued_message_id: MessageId::earliest(),
            last_message_id_in_broker: Arc::new(Mutex::new(EntryId::UNKNOWN)),
            during_seek: None,
            start_message_rollback_duration: Duration::ZERO,
            subscribe_deadline: Instant::now() + Duration::from_secs(30),
            subscribe_tsc: None,
            next_request_id: 0,
            self_tx: tx,
            reached_end_of_topic: false,
            active_consumer: true,
            closed: Arc::new(AtomicBool::new(false)),
        };
        (session, cnx)
    }

    fn raw_single(entry: i64) -> RawMessage {
        RawMessage {
            id: MessageId::individual(1, entry, 0),
            payload: Bytes::from_static(b"payload"),
            metadata: EntryMetadata {
                num_messages: 1,
                has_batch: false,
                compression: Compression::None,
                uncompressed_size: 7,
                schema_version: None,
            },
            corruption: DeliveryCorruption::None,
            redelivery_count: 0,
            key: None,
            key_is_b64: false,
            properties: Map::new(),
            sub_messages: Vec::new(),
        }
    }

    fn raw_batch(entry: i64, num: usize) -> RawMessage {
        let sub_messages = (0..num)
            .map(|i| SingleMessageMetadata {
                payload: Bytes::from(format!("m{i}")),
                key: None,
                key_is_b64: false,
                properties: Map::new(),
                sequence_id: None,
            })
            .collect();
        RawMessage {
            id: MessageId::individual(1, entry, 0),
            payload: Bytes::from_static(b"batch"),
            metadata: EntryMetadata {
                num_messages: num as i32,
                has_batch: true,
                compression: Compression::None,
                uncompressed_size: 5,
                schema_version: None,
            },
            corruption: DeliveryCorruption::None,
            redelivery_count: 0,
            key: None,
            key_is_b64: false,
            properties: Map::new(),
            sub_messages,
        }
    }

    // receiver_queue_size = 10, five individual deliveries each immediately
    // consumed via `Receive` -> exactly one Flow(5) frame, no more.
    #[tokio::test]
    async fn flow_refill_after_half_queue_consumed() {
        let mut config = ConsumerConfig::default();
        config.receiver_queue_size = 10;
        let (mut session, cnx) = build(config);

        for entry in 0..5 {
            session.handle_message_received(raw_single(entry)).await;
            let (tx, rx) = oneshot::channel();
            session.handle_receive(tx).await;
            rx.await.unwrap().unwrap();
        }

        assert_eq!(cnx.flows.lock().unwrap().as_slice(), &[5]);
    }

    // Scenario 2: a batched entry straddling a non-durable resubscribe point
    // only delivers sub-messages at or after the start id, and credits a
    // permit for each one skipped.
    #[tokio::test]
    async fn batch_split_skips_sub_messages_before_start_id() {
        let mut config = ConsumerConfig::default();
        config.receiver_queue_size = 10;
        let (mut session, _cnx) = build(config);

        let acker = Arc::new(BatchAcker::new(4));
        session.start_message_id = Some(MessageId::cumulative(1, 7, 0, 2, acker));

        session.handle_batched_entry(raw_batch(7, 4)).await;

        // reset_include_head is false by default, so the start index itself
        // has already been delivered and is skipped along with everything
        // before it: indices 0,1,2 skipped, only index 3 delivered.
        assert_eq!(session.incoming.len(), 1);
        let first = session.incoming.pop_front().unwrap();
        match &first.id.kind {
            MessageIdKind::Cumulative(i, _) => assert_eq!(*i, 3),
            _ => panic!("expected cumulative id"),
        }
        // Three skipped sub-messages (indices 0,1,2) credit three permits.
        assert_eq!(session.flow.available_permits(), 3);
    }

    // Scenario 3: a negative-acknowledged message is redelivered once its
    // delay elapses. Zero delay makes the due time immediate and
    // deterministic without a real sleep.
    #[tokio::test]
    async fn negative_ack_requests_redelivery_once_due() {
        let mut config = ConsumerConfig::default();
        config.negative_ack_redelivery_delay = Duration::ZERO;
        config.subscription_type = SubscriptionType::Shared;
        let (mut session, cnx) = build(config);

        let id = MessageId::individual(1, 1, 0);
        session.handle(Command::NegativeAcknowledge(id.clone())).await;
        session.handle(Command::NegativeAckTick).await;

        let redelivers = cnx.redelivers.lock().unwrap();
        assert_eq!(redelivers.len(), 1);
        assert_eq!(redelivers[0].ids.as_ref().unwrap(), &vec![id]);
    }

    // Scenario 4: resubscribing mid-stream (non-durable) resumes just after
    // the last message still sitting in the incoming queue, not from
    // whatever was last handed to the application.
    #[tokio::test]
    async fn clear_receiver_queue_resumes_before_queued_head() {
        let config = ConsumerConfig {
            subscription_mode: SubscriptionMode::NonDurable,
            ..ConsumerConfig::default()
        };
        let (mut session, _cnx) = build(config);

        let queued = Message::new(MessageId::individual(1, 9, 0), Bytes::new(), None, false, Map::new(), None, None, |_| String::new());
        session.incoming.push_back(queued);
        session.last_dequeued_message_id = MessageId::individual(1, 5, 0);

        let resume = session.clear_receiver_queue().unwrap();
        assert_eq!(resume.ledger_id, 1);
        assert_eq!(resume.entry_id, 8);
        assert!(session.incoming.is_empty());
    }

    // Scenario 5: a pending seek target takes priority over every other
    // resume rule, and is consumed (not reapplied on the next reconnect).
    #[tokio::test]
    async fn clear_receiver_queue_prefers_pending_seek() {
        let config = ConsumerConfig {
            subscription_mode: SubscriptionMode::NonDurable,
            ..ConsumerConfig::default()
        };
        let (mut session, _cnx) = build(config);
        session.during_seek = Some(MessageId::individual(2, 4, 0));
        session.last_dequeued_message_id = MessageId::individual(9, 9, 0);

        let resume = session.clear_receiver_queue().unwrap();
        assert_eq!(resume.ledger_id, 2);
        assert_eq!(resume.entry_id, 4);
        assert!(session.during_seek.is_none());

        // A second reconnect without an intervening seek falls through to
        // the last-dequeued rule instead of repeating the old seek target.
        let resume2 = session.clear_receiver_queue().unwrap();
        assert_eq!(resume2.ledger_id, 9);
    }

    // Redelivery requests for an id that has crossed the dead-letter
    // threshold are diverted to the DLQ sink and acked instead of being
    // sent to the broker as a redeliver frame.
    #[tokio::test]
    async fn redeliver_unacknowledged_diverts_dead_lettered_ids() {
        let mut config = ConsumerConfig::default();
        config.subscription_type = SubscriptionType::Shared;
        // Non-persistent so the resulting ack goes out immediately instead
        // of waiting for the next group-ack flush.
        config.non_persistent_topic = true;
        config.dead_letters_processor = Some(DeadLetterPolicy {
            max_redelivery_count: 2,
            dead_letter_topic: "topic-DLQ".to_string(),
        });
        let (mut session, cnx) = build(config);
        let sink = Arc::new(RecordingSink { published: Mutex::new(Vec::new()) });
        session.dlq_sink = Some(sink.clone());

        let mut raw = raw_single(3);
        raw.redelivery_count = 2;
        session.maybe_dead_letter(&raw);

        let id = MessageId::individual(1, 3, 0);
        session.redeliver_unacknowledged(vec![id.clone()]).await.unwrap();

        assert_eq!(sink.published.lock().unwrap().len(), 1);
        assert!(cnx.redelivers.lock().unwrap().is_empty());
        assert_eq!(cnx.acks.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn has_message_available_true_when_incoming_nonempty() {
        let (mut session, _cnx) = build(ConsumerConfig::default());
        session.handle_message_received(raw_single(1)).await;
        assert!(session.has_message_available().await.unwrap());
    }

    // A corrupted delivery is discarded with an error-ack instead of being
    // queued, and counted under receive failures.
    #[tokio::test]
    async fn corrupted_delivery_sends_error_ack_and_is_discarded() {
        let (mut session, cnx) = build(ConsumerConfig::default());
        let mut raw = raw_single(1);
        raw.corruption = DeliveryCorruption::ChecksumMismatch;

        session.handle_message_received(raw).await;

        assert!(session.incoming.is_empty());
        let acks = cnx.acks.lock().unwrap();
        assert_eq!(acks.len(), 1);
        assert!(acks[0].validation_error.is_some());
        assert_eq!(session.stats.snapshot().num_receive_failed, 1);
    }

    // Closing flushes any grouped acks still pending and answers every
    // outstanding waiter with AlreadyClosed rather than dropping them.
    #[tokio::test]
    async fn stop_consumer_flushes_acks_and_rejects_waiters() {
        let (mut session, cnx) = build(ConsumerConfig::default());
        session.enqueue_ack(MessageId::individual(1, 1, 0), AckType::Individual).await;

        let (tx, rx) = oneshot::channel();
        session.receive_waiters.push_back(tx);

        session.stop_consumer().await;

        assert_eq!(cnx.acks.lock().unwrap().len(), 1);
        assert!(matches!(rx.await.unwrap(), Err(ConsumerError::AlreadyClosed)));
        assert!(session.closed.load(Ordering::SeqCst));
    }
}
