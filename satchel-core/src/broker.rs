use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::{QueueConfig, QueueInfo};
use crate::error::{SatchelError, SatchelResult};
use crate::queue::Queue;
use crate::store::QueueStore;
use crate::validation::validate_queue_name;

/// Owns the queue-handle registry for one storage backend.
///
/// `queue` returns a shared handle, constructing and caching it on first
/// use. The registry only caches default-codec queues; open a
/// [`Queue::with_codec`] directly for custom payload formats.
pub struct Broker {
    store: Arc<dyn QueueStore>,
    queues: RwLock<HashMap<String, Arc<Queue>>>,
}

impl Broker {
    pub fn new(store: Arc<dyn QueueStore>) -> Self {
        Self {
            store,
            queues: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> Arc<dyn QueueStore> {
        self.store.clone()
    }

    /// Returns the shared handle for `name`, opening the queue (and
    /// creating it with defaults) on first use.
    pub fn queue(&self, name: &str) -> SatchelResult<Arc<Queue>> {
        if let Some(queue) = self.queues.read().get(name) {
            return Ok(queue.clone());
        }
        let queue = Arc::new(Queue::open(self.store.clone(), name)?);
        // Another caller may have opened the same queue while we did;
        // whoever got the write lock first wins.
        let mut queues = self.queues.write();
        Ok(queues.entry(name.to_string()).or_insert(queue).clone())
    }

    /// Creates a queue with an explicit configuration. Unlike the
    /// idempotent store operation, an existing queue is an error here.
    pub fn create_queue(&self, name: &str, config: &QueueConfig) -> SatchelResult<()> {
        validate_queue_name(name)?;
        if !self.store.create_queue(name, config)? {
            return Err(SatchelError::QueueAlreadyExists(name.to_string()));
        }
        Ok(())
    }

    /// Configuration and counters of an existing queue; unknown names fail
    /// with `QueueDoesNotExist` rather than being created.
    pub fn describe_queue(&self, name: &str) -> SatchelResult<QueueInfo> {
        self.store.describe_queue(name)
    }

    /// Deletes the queue with all its messages and evicts the cached
    /// handle.
    pub fn delete_queue(&self, name: &str) -> SatchelResult<()> {
        self.queues.write().remove(name);
        self.store.delete_queue(name)
    }

    pub fn list_queues(&self) -> SatchelResult<BTreeSet<String>> {
        self.store.list_queues()
    }
}
