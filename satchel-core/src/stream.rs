use std::collections::BTreeMap;
use std::sync::Arc;

use crate::id::short_id;
use crate::store::StreamStore;
use crate::validation::validate_queue_name;
use crate::SatchelResult;

/// How long an entry may sit in the pending set before another consumer
/// of the group may claim it, in milliseconds.
pub const DEFAULT_MAX_PENDING_TIME_MS: u64 = 3_000;

/// Information about a consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerGroupInfo {
    pub name: String,
    /// Number of consumers registered in the group.
    pub consumers: u64,
    /// Entries delivered but not yet acknowledged.
    pub pending: u64,
    /// Id of the last entry delivered to the group's consumers.
    pub last_delivered_id: String,
    /// Logical read counter of the group.
    pub entries_read: u64,
    /// Entries still waiting to be delivered to the group.
    pub lag: u64,
}

/// An entry read from a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMessage {
    /// Broker-assigned `"{ms}-{seq}"` id.
    pub stream_id: String,
    pub fields: BTreeMap<String, String>,
}

impl StreamMessage {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Producer-side handle for one stream.
pub struct Stream {
    store: Arc<dyn StreamStore>,
    name: String,
}

impl Stream {
    pub fn new(store: Arc<dyn StreamStore>, name: &str) -> SatchelResult<Self> {
        validate_queue_name(name)?;
        Ok(Self {
            store,
            name: name.to_string(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Appends an entry and returns its id.
    pub fn publish(&self, fields: &BTreeMap<String, String>) -> SatchelResult<String> {
        self.store.publish(&self.name, fields)
    }

    /// Creates a consumer group; `from_start` reads history, otherwise the
    /// group starts at the current tail. Idempotent.
    pub fn create_consumer_group(&self, group: &str, from_start: bool) -> SatchelResult<()> {
        self.store.create_consumer_group(&self.name, group, from_start)
    }

    pub fn list_consumer_groups(&self) -> SatchelResult<Vec<ConsumerGroupInfo>> {
        self.store.list_consumer_groups(&self.name)
    }

    pub fn delete_consumer_group(&self, group: &str) -> SatchelResult<()> {
        self.store.delete_consumer_group(&self.name, group)
    }

    pub fn create_consumer(&self, group: &str, consumer: &str) -> SatchelResult<()> {
        self.store.create_consumer(&self.name, group, consumer)
    }
}

/// A consumer within a consumer group.
///
/// `get` prefers entries other consumers left pending for longer than
/// [`max_pending_time_ms`](Consumer::with_max_pending_time) before reading
/// fresh ones, so work abandoned by a crashed consumer is picked up
/// automatically.
pub struct Consumer {
    store: Arc<dyn StreamStore>,
    stream: String,
    group: String,
    consumer: String,
    max_pending_time_ms: u64,
}

impl Consumer {
    /// Registers a consumer, creating the group (from the head) and the
    /// consumer if they do not exist. A `None` name draws a random
    /// [`short_id`].
    pub fn new(
        store: Arc<dyn StreamStore>,
        stream: &str,
        group: &str,
        consumer: Option<&str>,
    ) -> SatchelResult<Self> {
        validate_queue_name(stream)?;
        let consumer = consumer.map_or_else(short_id, str::to_string);
        store.create_consumer_group(stream, group, true)?;
        store.create_consumer(stream, group, &consumer)?;
        Ok(Self {
            store,
            stream: stream.to_string(),
            group: group.to_string(),
            consumer,
            max_pending_time_ms: DEFAULT_MAX_PENDING_TIME_MS,
        })
    }

    pub fn with_max_pending_time(mut self, ms: u64) -> Self {
        self.max_pending_time_ms = ms;
        self
    }

    pub fn name(&self) -> &str {
        &self.consumer
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// Consumes up to `count` entries: first auto-claims entries idle in
    /// the group's pending set, then reads from the unread tail, blocking
    /// up to `timeout_ms` (non-blocking when `None`). Claimed entries come
    /// first. Every returned entry is pending until [`ack`](Consumer::ack)ed.
    pub fn get(&self, count: usize, timeout_ms: Option<u64>) -> SatchelResult<Vec<StreamMessage>> {
        let mut messages = self.store.auto_claim(
            &self.stream,
            &self.group,
            &self.consumer,
            self.max_pending_time_ms,
            count,
        )?;
        if messages.len() < count {
            let fresh = self.store.read_group(
                &self.stream,
                &self.group,
                &self.consumer,
                count - messages.len(),
                timeout_ms,
                false,
            )?;
            messages.extend(fresh);
        }
        Ok(messages)
    }

    /// Acknowledges entries, removing them from the pending set.
    pub fn ack(&self, ids: &[String]) -> SatchelResult<u64> {
        self.store.ack(&self.stream, &self.group, ids)
    }

    /// Reads with auto-acknowledge: returned entries never enter the
    /// pending set.
    pub fn pop(&self, count: usize, timeout_ms: Option<u64>) -> SatchelResult<Vec<StreamMessage>> {
        self.store.read_group(
            &self.stream,
            &self.group,
            &self.consumer,
            count,
            timeout_ms,
            true,
        )
    }
}
