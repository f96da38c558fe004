use crate::codec::Metadata;

/// A message as returned by the store-level receive operations.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueMessage {
    /// Time-sortable unique id assigned at push.
    pub message_id: String,
    /// Opaque payload bytes.
    pub body: Vec<u8>,
    /// Decoded metadata map; always contains `sent`.
    pub metadata: Metadata,
    /// Epoch seconds when the message was pushed.
    pub sent: i64,
    /// Retrieval count, including the receive that returned this value.
    pub rc: u32,
    /// Epoch milliseconds of the first retrieval.
    pub fr: i64,
}

/// A message received through the typed [`Queue`](crate::queue::Queue)
/// facade, with the payload deserialized.
#[derive(Debug, Clone)]
pub struct ReceivedMessage<T> {
    pub queue_name: String,
    pub message_id: String,
    /// The deserialized payload.
    pub data: T,
    pub metadata: Metadata,
    /// Epoch seconds when the message was pushed.
    pub sent: i64,
    /// Epoch milliseconds of the first retrieval.
    pub first_retrieved: i64,
    pub retrieval_count: u32,
    /// Time-to-live in seconds, if one was attached at push.
    pub ttl: Option<u64>,
}

impl<T> ReceivedMessage<T> {
    /// Epoch seconds at which this message expires, if it carries a ttl.
    /// Expiry is advisory: the core does not reap expired messages.
    pub fn expires(&self) -> Option<i64> {
        self.ttl.map(|ttl| self.sent + ttl as i64)
    }
}
