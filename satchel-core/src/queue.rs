use std::sync::Arc;

use parking_lot::RwLock;

use crate::codec::{FieldValue, Metadata};
use crate::config::{QueueConfig, QueueInfo};
use crate::error::{SatchelError, SatchelResult};
use crate::message::{QueueMessage, ReceivedMessage};
use crate::serialize::{JsonCodec, PayloadCodec};
use crate::store::{PushEntry, QueueStore};
use crate::validation::{validate_interval, validate_queue_name};

/// Typed handle for one queue.
///
/// Wraps a [`QueueStore`] with name validation and payload
/// (de)serialization. The handle keeps a configuration snapshot for
/// convenience; it is advisory and may lag behind changes made through
/// other handles. Safety is inherited from the store's atomicity; the
/// facade holds no locks around operations.
pub struct Queue<C: PayloadCodec = JsonCodec> {
    store: Arc<dyn QueueStore>,
    name: String,
    config: RwLock<QueueConfig>,
    codec: C,
}

impl Queue<JsonCodec> {
    /// Opens a queue with the default JSON payload codec, creating it with
    /// default configuration if it does not exist.
    pub fn open(store: Arc<dyn QueueStore>, name: &str) -> SatchelResult<Self> {
        Self::with_codec(store, name, JsonCodec)
    }
}

impl<C: PayloadCodec> Queue<C> {
    /// Opens a queue with a custom payload codec.
    pub fn with_codec(store: Arc<dyn QueueStore>, name: &str, codec: C) -> SatchelResult<Self> {
        validate_queue_name(name)?;
        let info = store.queue_info(name)?;
        Ok(Self {
            store,
            name: name.to_string(),
            config: RwLock::new(info.config),
            codec,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The configuration snapshot taken at open or at the last setter call
    /// through this handle.
    pub fn config(&self) -> QueueConfig {
        self.config.read().clone()
    }

    /// Serializes `value` and pushes it. `delay` overrides the queue
    /// delay; `ttl` (seconds) travels in the message metadata and is not
    /// enforced by the core.
    pub fn push(
        &self,
        value: &C::Value,
        delay: Option<u32>,
        ttl: Option<u64>,
    ) -> SatchelResult<String> {
        if let Some(delay) = delay {
            validate_interval(delay)?;
        }
        let body = self.serialize(value)?;
        self.store
            .push_message(&self.name, &body, delay, ttl_metadata(ttl))
    }

    /// Pushes a batch of values as one transaction, returning their ids in
    /// order. If any value fails to serialize or any push would fail,
    /// nothing is written.
    pub fn push_many(
        &self,
        values: &[C::Value],
        delay: Option<u32>,
        ttl: Option<u64>,
    ) -> SatchelResult<Vec<String>> {
        if let Some(delay) = delay {
            validate_interval(delay)?;
        }
        let mut entries = Vec::with_capacity(values.len());
        for value in values {
            entries.push(PushEntry {
                body: self.serialize(value)?,
                delay,
                metadata: ttl_metadata(ttl),
            });
        }
        self.store.push_many(&self.name, &entries)
    }

    /// Receives the next visible message, deserialized. Returns `None`
    /// when the queue is empty or fully hidden. A failed deserialization
    /// surfaces `UndeserializableMessage` and leaves the message in
    /// flight until its visibility timeout expires.
    pub fn get(&self, vt: Option<u32>) -> SatchelResult<Option<ReceivedMessage<C::Value>>> {
        if let Some(vt) = vt {
            validate_interval(vt)?;
        }
        let Some(message) = self.store.get_message(&self.name, vt)? else {
            return Ok(None);
        };
        self.into_received(message).map(Some)
    }

    /// Like [`get`](Queue::get), but an empty queue is an error.
    pub fn get_required(&self, vt: Option<u32>) -> SatchelResult<ReceivedMessage<C::Value>> {
        self.get(vt)?
            .ok_or_else(|| SatchelError::NoMessageInQueue(self.name.clone()))
    }

    /// Receives the next visible message and deletes it on success.
    pub fn pop(&self) -> SatchelResult<Option<ReceivedMessage<C::Value>>> {
        let Some(message) = self.get(None)? else {
            return Ok(None);
        };
        self.delete(&message.message_id)?;
        Ok(Some(message))
    }

    /// Like [`pop`](Queue::pop), but an empty queue is an error.
    pub fn pop_required(&self) -> SatchelResult<ReceivedMessage<C::Value>> {
        self.pop()?
            .ok_or_else(|| SatchelError::NoMessageInQueue(self.name.clone()))
    }

    /// Deletes a message if it exists.
    pub fn delete(&self, message_id: &str) -> SatchelResult<()> {
        self.store.delete_message(&self.name, message_id)
    }

    /// Current configuration and counters, straight from the store.
    pub fn info(&self) -> SatchelResult<QueueInfo> {
        self.store.queue_info(&self.name)
    }

    pub fn set_visibility_timeout(&self, vt: u32) -> SatchelResult<()> {
        validate_interval(vt)?;
        self.store.set_queue_vt(&self.name, vt)?;
        self.config.write().vt = vt;
        Ok(())
    }

    pub fn set_initial_delay(&self, delay: u32) -> SatchelResult<()> {
        validate_interval(delay)?;
        self.store.set_queue_delay(&self.name, delay)?;
        self.config.write().delay = delay;
        Ok(())
    }

    pub fn set_max_size(&self, maxsize: u64) -> SatchelResult<()> {
        self.store.set_queue_maxsize(&self.name, maxsize)?;
        self.config.write().maxsize = maxsize;
        Ok(())
    }

    fn serialize(&self, value: &C::Value) -> SatchelResult<Vec<u8>> {
        self.codec
            .serialize(value)
            .map_err(|e| SatchelError::UnserializableMessage(e.to_string()))
    }

    fn into_received(&self, message: QueueMessage) -> SatchelResult<ReceivedMessage<C::Value>> {
        let data = self
            .codec
            .deserialize(&message.body)
            .map_err(|e| SatchelError::UndeserializableMessage(e.to_string()))?;
        let ttl = match message.metadata.get("ttl") {
            Some(FieldValue::Int(ttl)) if *ttl >= 0 => Some(*ttl as u64),
            _ => None,
        };
        Ok(ReceivedMessage {
            queue_name: self.name.clone(),
            message_id: message.message_id,
            data,
            metadata: message.metadata,
            sent: message.sent,
            first_retrieved: message.fr,
            retrieval_count: message.rc,
            ttl,
        })
    }
}

fn ttl_metadata(ttl: Option<u64>) -> Option<Metadata> {
    ttl.map(|ttl| {
        let mut metadata = Metadata::new();
        metadata.insert("ttl".to_string(), FieldValue::Int(ttl as i64));
        metadata
    })
}
