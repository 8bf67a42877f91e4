use std::fmt;

/// Error surface for the consumer session core.
#[derive(Debug, thiserror::Error)]
pub enum ConsumerError {
    #[error("consumer is already closed")]
    AlreadyClosed,

    #[error("not connected to a broker")]
    NotConnected,

    #[error("operation timed out")]
    Timeout,

    #[error("failed to decompress message payload")]
    DecompressionError,

    #[error("failed to deserialize batch envelope")]
    BatchDeserializeError,

    #[error("checksum mismatch on received entry")]
    ChecksumMismatch,

    #[error("decompressed payload size does not match metadata")]
    UncompressedSizeCorruption,

    #[error("failed to send frame on the connection")]
    ConnectionFailedOnSend,

    #[error("broker error {code}: {message}")]
    Broker { code: BrokerErrorCode, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Broker error codes, subdivided into retriable and fatal per a static
/// table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerErrorCode {
    ServiceNotReady,
    TooManyRequests,
    PersistenceError,
    ConsumerBusy,
    SubscriptionNotFound,
    TopicNotFound,
    AuthenticationError,
    AuthorizationError,
    UnsupportedVersionError,
}

impl BrokerErrorCode {
    /// Whether a subscribe/lookup attempt that failed with this code
    /// should be retried (`reconnect_later`) rather than failing
    /// `subscribe_tsc` outright.
    pub fn is_retriable(self) -> bool {
        use BrokerErrorCode::*;
        matches!(self, ServiceNotReady | TooManyRequests | PersistenceError | ConsumerBusy)
    }
}

impl fmt::Display for BrokerErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl ConsumerError {
    /// Is this the corruption-family of errors that trigger local recovery
    /// (send a negative-ack and continue) rather than tearing down the
    /// session?
    pub fn is_local_recovery(&self) -> bool {
        matches!(
            self,
            ConsumerError::DecompressionError
                | ConsumerError::BatchDeserializeError
                | ConsumerError::ChecksumMismatch
                | ConsumerError::UncompressedSizeCorruption
        )
    }
}

pub type ConsumerResult<T> = Result<T, ConsumerError>;
