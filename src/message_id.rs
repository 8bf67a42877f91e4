use std::cmp::Ordering;
use std::sync::Arc;

use crate::batch_acker::BatchAcker;

/// The ordering key for every message in the system.
///
/// Comparison is lexicographic on `(ledger_id, entry_id, batch_index)`; the
/// `partition` component is carried along but does not participate in
/// ordering within a single partition's consumer.
#[derive(Debug, Clone)]
pub struct MessageId {
    pub ledger_id: i64,
    pub entry_id: i64,
    pub partition: i32,
    pub batch_index: i32,
    pub kind: MessageIdKind,
}

/// Whether this id addresses one whole (non-batched) entry, or a specific
/// sub-message of a batch sharing a [`BatchAcker`].
#[derive(Debug, Clone)]
pub enum MessageIdKind {
    Individual,
    Cumulative(i32, Arc<BatchAcker>),
}

impl MessageId {
    pub const BATCH_INDEX_NONE: i32 = -1;

    pub fn individual(ledger_id: i64, entry_id: i64, partition: i32) -> Self {
        MessageId {
            ledger_id,
            entry_id,
            partition,
            batch_index: Self::BATCH_INDEX_NONE,
            kind: MessageIdKind::Individual,
        }
    }

    pub fn cumulative(ledger_id: i64, entry_id: i64, partition: i32, batch_index: i32, acker: Arc<BatchAcker>) -> Self {
        MessageId {
            ledger_id,
            entry_id,
            partition,
            batch_index,
            kind: MessageIdKind::Cumulative(batch_index, acker),
        }
    }

    /// The sentinel that compares less than every real id.
    pub fn earliest() -> Self {
        MessageId {
            ledger_id: i64::MIN,
            entry_id: i64::MIN,
            partition: -1,
            batch_index: Self::BATCH_INDEX_NONE,
            kind: MessageIdKind::Individual,
        }
    }

    /// The sentinel that compares greater than every real id.
    pub fn latest() -> Self {
        MessageId {
            ledger_id: i64::MAX,
            entry_id: i64::MAX,
            partition: -1,
            batch_index: i32::MAX,
            kind: MessageIdKind::Individual,
        }
    }

    pub fn is_earliest(&self) -> bool {
        self.ledger_id == i64::MIN && self.entry_id == i64::MIN
    }

    /// Whether this id is on the same broker entry as `other` (same
    /// ledger/entry, ignoring batch index).
    pub fn same_entry(&self, other: &MessageId) -> bool {
        self.ledger_id == other.ledger_id && self.entry_id == other.entry_id
    }

    /// The predecessor of this id for resubscription purposes. For
    /// `Cumulative(i, acker)` that's `Cumulative(i-1, acker)` as long as
    /// `i > 0`; per the documented open question, index 0 falls through to
    /// the "prior entry" `Individual` case rather than producing an
    /// invalid `Cumulative(-1, _)`.
    pub fn predecessor(&self) -> MessageId {
        match &self.kind {
            MessageIdKind::Cumulative(i, acker) if *i > 0 => {
                MessageId::cumulative(self.ledger_id, self.entry_id, self.partition, i - 1, acker.clone())
            }
            _ => MessageId::individual(self.ledger_id, self.entry_id - 1, self.partition),
        }
    }
}

impl PartialEq for MessageId {
    fn eq(&self, other: &Self) -> bool {
        self.cmp_key() == other.cmp_key()
    }
}
impl Eq for MessageId {}

impl MessageId {
    fn cmp_key(&self) -> (i64, i64, i32) {
        (self.ledger_id, self.entry_id, self.batch_index)
    }
}

impl PartialOrd for MessageId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MessageId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.cmp_key().cmp(&other.cmp_key())
    }
}

impl std::hash::Hash for MessageId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.cmp_key().hash(state);
    }
}

/// A seek target, either a broker-side timestamp or a specific message id.
#[derive(Debug, Clone)]
pub enum SeekTarget {
    Timestamp(u64),
    MessageId(MessageId),
}

/// A `Copy`able entry-level id, used for the one field the session actor
/// exposes outside its own command queue: `last_message_id_in_broker`.
/// `entry_id == -1` is the "no last message known yet" sentinel `has_more`
/// checks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EntryId {
    pub ledger_id: i64,
    pub entry_id: i64,
    pub partition: i32,
}

impl EntryId {
    pub const UNKNOWN: EntryId = EntryId {
        ledger_id: -1,
        entry_id: -1,
        partition: -1,
    };

    pub fn to_message_id(self) -> MessageId {
        MessageId::individual(self.ledger_id, self.entry_id, self.partition)
    }

    pub fn from_message_id(id: &MessageId) -> Self {
        EntryId {
            ledger_id: id.ledger_id,
            entry_id: id.entry_id,
            partition: id.partition,
        }
    }
}
