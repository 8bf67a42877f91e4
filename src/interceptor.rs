use crate::message::{AckType, Message};
use crate::message_id::MessageId;

/// Interceptor chain collaborator, invoked at fixed hook points. Default
/// methods are no-ops so a consumer can be built without one; a real
/// interceptor chain lives outside this crate.
pub trait ConsumerInterceptor<T>: Send + Sync {
    fn before_consume(&self, _msg: &Message<T>) {}
    fn on_acknowledge(&self, _id: &MessageId, _ack_type: AckType) {}
    fn on_negative_acknowledge(&self, _id: &MessageId) {}
    fn on_active_consumer_changed(&self, _active: bool) {}
}

/// The no-op default used when a consumer is built without an explicit
/// interceptor chain.
pub struct NoopInterceptor;

impl<T> ConsumerInterceptor<T> for NoopInterceptor {}
