use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use bytes::Bytes;

use crate::message_id::MessageId;

/// Compression codec carried in a `RawMessage`'s metadata, consulted by the
/// wire codec (out of scope) before the core ever sees the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Zlib,
    Brotli,
}

/// Metadata accompanying a decompressed, checksum-verified delivery from the
/// wire codec.
#[derive(Debug, Clone)]
pub struct EntryMetadata {
    pub num_messages: i32,
    pub has_batch: bool,
    pub compression: Compression,
    pub uncompressed_size: u32,
    pub schema_version: Option<u32>,
}

/// The wire codec's verdict on a delivery: whether it decoded cleanly, or
/// which corruption path the core should take. Framing itself is always
/// valid by the time a `RawMessage` reaches the core; this only covers
/// the checks that depend on payload contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryCorruption {
    None,
    ChecksumMismatch,
    DecompressionError,
    UncompressedSizeCorruption,
}

/// An opaque delivery handed to the session actor by the wire codec: framing
/// already parsed, payload already decompressed where `corruption ==
/// None`. For a batched entry the codec has already split
/// the envelope into `sub_messages`; `payload` then holds the whole-batch
/// buffer the sub-message payloads were sliced from and is otherwise unused
/// by the core.
#[derive(Debug, Clone)]
pub struct RawMessage {
    pub id: MessageId,
    pub payload: Bytes,
    pub metadata: EntryMetadata,
    pub corruption: DeliveryCorruption,
    pub redelivery_count: u32,
    pub key: Option<String>,
    pub key_is_b64: bool,
    pub properties: HashMap<String, String>,
    pub sub_messages: Vec<SingleMessageMetadata>,
}

/// A sub-message's own metadata and payload slice within a batched entry.
#[derive(Debug, Clone)]
pub struct SingleMessageMetadata {
    pub payload: Bytes,
    pub key: Option<String>,
    pub key_is_b64: bool,
    pub properties: HashMap<String, String>,
    pub sequence_id: Option<u64>,
}

/// The type of acknowledgement requested for a [`MessageId`]
/// (`Ack{..., ack_type}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckType {
    Individual,
    Cumulative,
}

/// A single application-visible message. Decoding into `T` is deferred
/// until `.value()` is first called, so a batch's decode cost is only
/// paid for sub-messages the application actually consumes.
pub struct Message<T> {
    pub id: MessageId,
    pub payload_bytes: Bytes,
    pub key: Option<String>,
    pub key_is_b64: bool,
    pub properties: HashMap<String, String>,
    pub schema_version: Option<u32>,
    pub sequence_id: Option<u64>,
    decoded: OnceLock<T>,
    decoder: Mutex<Option<Box<dyn FnOnce(&Bytes) -> T + Send>>>,
}

impl<T> Message<T> {
    pub fn new(
        id: MessageId,
        payload_bytes: Bytes,
        key: Option<String>,
        key_is_b64: bool,
        properties: HashMap<String, String>,
        schema_version: Option<u32>,
        sequence_id: Option<u64>,
        decode: impl FnOnce(&Bytes) -> T + Send + 'static,
    ) -> Self {
        Message {
            id,
            payload_bytes,
            key,
            key_is_b64,
            properties,
            schema_version,
            sequence_id,
            decoded: OnceLock::new(),
            decoder: Mutex::new(Some(Box::new(decode))),
        }
    }

    /// Run the deferred decoder on first access; memoized thereafter.
    pub fn value(&self) -> &T {
        if self.decoded.get().is_none() {
            let mut guard = self.decoder.lock().expect("Message decoder mutex poisoned");
            if self.decoded.get().is_none() {
                let f = guard.take().expect("Message decoder already consumed");
                let v = f(&self.payload_bytes);
                let _ = self.decoded.set(v);
            }
        }
        self.decoded.get().expect("decoded value just set")
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Message<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("key", &self.key)
            .field("schema_version", &self.schema_version)
            .finish()
    }
}

/// A bundle returned by `batch_receive`.
pub struct Messages<T> {
    pub messages: Vec<Message<T>>,
}

impl<T> Messages<T> {
    pub fn total_bytes(&self) -> usize {
        self.messages.iter().map(|m| m.payload_bytes.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_id::MessageId;

    #[test]
    fn decode_is_memoized() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let calls = std::sync::Arc::new(AtomicUsize::new(0));
        let calls2 = calls.clone();
        let msg = Message::new(
            MessageId::individual(1, 1, 0),
            Bytes::from_static(b"hello"),
            None,
            false,
            HashMap::new(),
            None,
            None,
            move |b| {
                calls2.fetch_add(1, Ordering::SeqCst);
                String::from_utf8(b.to_vec()).unwrap()
            },
        );
        assert_eq!(msg.value(), "hello");
        assert_eq!(msg.value(), "hello");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
