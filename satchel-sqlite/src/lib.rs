pub mod schema;

mod queue_store;
mod stream_store;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use parking_lot::{Condvar, Mutex as SignalMutex};
use rusqlite::Connection;
use satchel_core::error::{SatchelError, SatchelResult};
use satchel_core::time::{SystemTimeProvider, TimeProvider};

/// Embedded queue and stream storage backed by SQLite.
///
/// Every operation runs as a single transaction while holding the
/// connection lock. That single-writer serialization makes each operation
/// atomic from the point of view of concurrent producers and consumers;
/// observers never see a partially applied mutation.
pub struct Storage {
    conn: Mutex<Connection>,
    clock: Arc<dyn TimeProvider>,
    publish_signal: PublishSignal,
}

impl Storage {
    pub fn open<P: AsRef<Path>>(path: P) -> SatchelResult<Self> {
        Self::from_connection(Connection::open(path).map_err(db_err)?)
    }

    pub fn open_in_memory() -> SatchelResult<Self> {
        Self::from_connection(Connection::open_in_memory().map_err(db_err)?)
    }

    fn from_connection(conn: Connection) -> SatchelResult<Self> {
        conn.execute_batch(schema::CREATE_TABLES).map_err(db_err)?;
        Ok(Self {
            conn: Mutex::new(conn),
            clock: Arc::new(SystemTimeProvider),
            publish_signal: PublishSignal::new(),
        })
    }

    /// Replaces the wall clock, e.g. with a manual provider in tests.
    pub fn with_clock(mut self, clock: Arc<dyn TimeProvider>) -> Self {
        self.clock = clock;
        self
    }

    pub(crate) fn clock(&self) -> &dyn TimeProvider {
        &*self.clock
    }
}

pub(crate) fn db_err(e: rusqlite::Error) -> SatchelError {
    SatchelError::Storage(e.to_string())
}

/// Wakes blocked group readers when entries are published.
pub(crate) struct PublishSignal {
    generation: SignalMutex<u64>,
    condvar: Condvar,
}

impl PublishSignal {
    fn new() -> Self {
        Self {
            generation: SignalMutex::new(0),
            condvar: Condvar::new(),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        *self.generation.lock()
    }

    pub(crate) fn notify(&self) {
        *self.generation.lock() += 1;
        self.condvar.notify_all();
    }

    /// Blocks until a publish moves the generation past `seen` or the
    /// deadline passes. Returns `false` on deadline.
    pub(crate) fn wait_past(&self, seen: u64, deadline: Instant) -> bool {
        let mut generation = self.generation.lock();
        while *generation == seen {
            if self
                .condvar
                .wait_until(&mut generation, deadline)
                .timed_out()
            {
                return *generation != seen;
            }
        }
        true
    }
}
