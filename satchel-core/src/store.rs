use std::collections::{BTreeMap, BTreeSet};

use crate::codec::Metadata;
use crate::config::{QueueConfig, QueueInfo};
use crate::message::QueueMessage;
use crate::stream::{ConsumerGroupInfo, StreamMessage};
use crate::SatchelResult;

/// One message of a batch push.
#[derive(Debug, Clone, Default)]
pub struct PushEntry {
    pub body: Vec<u8>,
    /// Per-message delay override, seconds. Falls back to the queue delay.
    pub delay: Option<u32>,
    pub metadata: Option<Metadata>,
}

/// The atomic queue data plane.
///
/// Every operation is all-or-nothing: implementations execute each call as
/// a single serialized transaction on the storage engine, so observers
/// never see a partially applied mutation. All invariants (index/map
/// agreement, counter coupling, visibility accounting) are owned here.
pub trait QueueStore: Send + Sync {
    /// Creates a queue. Returns `true` on first creation, `false` if the
    /// queue already exists; an existing configuration is never
    /// overwritten.
    fn create_queue(&self, name: &str, config: &QueueConfig) -> SatchelResult<bool>;

    /// Removes a queue and all of its messages. No-op if missing.
    fn delete_queue(&self, name: &str) -> SatchelResult<()>;

    /// Snapshot of all queue names.
    fn list_queues(&self) -> SatchelResult<BTreeSet<String>>;

    /// Returns configuration and counters, with `msgs` and `hiddenmsgs`
    /// evaluated against the current time. Creates the queue with default
    /// configuration if it does not exist.
    fn queue_info(&self, name: &str) -> SatchelResult<QueueInfo>;

    /// Non-creating variant of [`queue_info`](QueueStore::queue_info);
    /// fails with `QueueDoesNotExist` for unknown queues.
    fn describe_queue(&self, name: &str) -> SatchelResult<QueueInfo>;

    /// Updates the visibility timeout and bumps `modified`.
    fn set_queue_vt(&self, name: &str, vt: u32) -> SatchelResult<()>;

    /// Updates the delivery delay and bumps `modified`.
    fn set_queue_delay(&self, name: &str, delay: u32) -> SatchelResult<()>;

    /// Updates the maximum message size and bumps `modified`.
    fn set_queue_maxsize(&self, name: &str, maxsize: u64) -> SatchelResult<()>;

    /// Appends a message, creating the queue with defaults if missing.
    /// `sent` (epoch seconds) is injected into the metadata. Fails with
    /// `MessageTooLarge` when the queue bounds message size.
    fn push_message(
        &self,
        name: &str,
        body: &[u8],
        delay: Option<u32>,
        metadata: Option<Metadata>,
    ) -> SatchelResult<String>;

    /// Pushes a batch of messages as one transaction, returning their ids
    /// in order. All-or-nothing: if any entry would fail, nothing is
    /// written.
    fn push_many(&self, name: &str, entries: &[PushEntry]) -> SatchelResult<Vec<String>>;

    /// Receives the next visible message, hiding it for the effective
    /// visibility timeout. Returns `None` when no message is visible.
    fn get_message(&self, name: &str, vt: Option<u32>) -> SatchelResult<Option<QueueMessage>>;

    /// Deletes a message. Idempotent; deleting an unknown id or a message
    /// on an unknown queue is a no-op and leaves all counters unchanged.
    fn delete_message(&self, name: &str, message_id: &str) -> SatchelResult<()>;

    /// Receives and deletes the next visible message in one atomic step.
    /// The returned `rc` reflects the final retrieval, so a first pop
    /// reports `rc == 1`.
    fn pop_message(&self, name: &str) -> SatchelResult<Option<QueueMessage>>;
}

/// The append-only log surface with consumer groups.
pub trait StreamStore: Send + Sync {
    /// Appends an entry and returns its broker-assigned id. Ids are
    /// `"{ms}-{seq}"` strings totally ordered by publish order.
    fn publish(&self, stream: &str, fields: &BTreeMap<String, String>) -> SatchelResult<String>;

    /// Creates a consumer group. Idempotent. `from_start` positions the
    /// cursor at the head (`0-0`); otherwise at the current tail.
    fn create_consumer_group(&self, stream: &str, group: &str, from_start: bool)
        -> SatchelResult<()>;

    fn list_consumer_groups(&self, stream: &str) -> SatchelResult<Vec<ConsumerGroupInfo>>;

    /// Removes a group with its consumers and pending entries. No-op if
    /// missing.
    fn delete_consumer_group(&self, stream: &str, group: &str) -> SatchelResult<()>;

    /// Registers a consumer, creating the group from the head if absent.
    /// Idempotent.
    fn create_consumer(&self, stream: &str, group: &str, consumer: &str) -> SatchelResult<()>;

    /// Reads up to `count` entries past the group cursor. Unless `noack`,
    /// delivered entries enter the pending set owned by `consumer`. With a
    /// timeout the call blocks until entries arrive or the deadline
    /// passes; with `None` it returns immediately.
    #[allow(clippy::too_many_arguments)]
    fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        timeout_ms: Option<u64>,
        noack: bool,
    ) -> SatchelResult<Vec<StreamMessage>>;

    /// Transfers ownership of up to `count` entries that have been pending
    /// with any consumer of the group for at least `min_idle_ms`. Claimed
    /// entries restart their pending timer under `consumer`.
    fn auto_claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> SatchelResult<Vec<StreamMessage>>;

    /// Acknowledges delivered entries, removing them from the pending set.
    /// Returns how many were actually pending.
    fn ack(&self, stream: &str, group: &str, ids: &[String]) -> SatchelResult<u64>;
}
