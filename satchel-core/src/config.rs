use serde::{Deserialize, Serialize};

/// The default visibility timeout for new queues, in seconds.
pub const DEFAULT_VT: u32 = 60;

/// The default delivery delay for new queues, in seconds.
pub const DEFAULT_DELAY: u32 = 0;

/// The default maximum message size for new queues, in bytes.
pub const DEFAULT_MAXSIZE: u64 = 65565;

/// The default number of message retries for new queues.
pub const DEFAULT_RETRIES: u32 = 5;

/// Configuration for a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// The length of time, in seconds, that a received message stays
    /// invisible to other consumers.
    pub vt: u32,
    /// Delivery delay applied to new messages, in seconds.
    pub delay: u32,
    /// Maximum message size in bytes. 0 means unbounded.
    pub maxsize: u64,
    /// Number of retries before a message is considered poisoned.
    /// Stored and surfaced, not enforced by the atomic operations.
    pub retries: u32,
    /// Optional default time-to-live for messages, in seconds.
    /// Stored and surfaced, not enforced by the atomic operations.
    pub ttl: Option<u64>,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            vt: DEFAULT_VT,
            delay: DEFAULT_DELAY,
            maxsize: DEFAULT_MAXSIZE,
            retries: DEFAULT_RETRIES,
            ttl: None,
        }
    }
}

/// Counters and derived state of a queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueMetadata {
    /// Epoch seconds when the queue was created.
    pub created: i64,
    /// Epoch seconds of the last configuration change.
    pub modified: i64,
    /// Total number of messages ever pushed to this queue.
    pub totalsent: u64,
    /// Total number of messages ever received from this queue.
    pub totalrecv: u64,
    /// Current number of messages in the queue.
    pub msgs: u64,
    /// Number of messages whose delivery time lies in the future,
    /// evaluated at query time. Typically messages in flight.
    pub hiddenmsgs: u64,
}

/// A queue's configuration together with its counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueInfo {
    pub config: QueueConfig,
    pub metadata: QueueMetadata,
}
