use std::sync::RwLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Clock abstraction used by storage backends.
///
/// Operations read `now_system_us` exactly once and derive millisecond and
/// second values from that single snapshot.
pub trait TimeProvider: Send + Sync {
    fn now_instant(&self) -> Instant;

    /// Wall-clock microseconds since the epoch.
    fn now_system_us(&self) -> i64;

    fn now_system_ms(&self) -> i64 {
        self.now_system_us() / 1_000
    }

    fn now_system_s(&self) -> i64 {
        self.now_system_us() / 1_000_000
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeProvider;

impl TimeProvider for SystemTimeProvider {
    fn now_instant(&self) -> Instant {
        Instant::now()
    }

    fn now_system_us(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_micros() as i64
    }
}

/// A manual time provider for deterministic tests and simulations.
#[derive(Debug)]
pub struct ManualTimeProvider {
    instant: RwLock<Instant>,
    system_us: RwLock<i64>,
}

impl ManualTimeProvider {
    pub fn new(instant: Instant, system_us: i64) -> Self {
        Self {
            instant: RwLock::new(instant),
            system_us: RwLock::new(system_us),
        }
    }

    pub fn set_time(&self, instant: Instant, system_us: i64) {
        *self.instant.write().unwrap() = instant;
        *self.system_us.write().unwrap() = system_us;
    }

    pub fn advance(&self, duration: Duration) {
        *self.instant.write().unwrap() += duration;
        *self.system_us.write().unwrap() += duration.as_micros() as i64;
    }
}

impl TimeProvider for ManualTimeProvider {
    fn now_instant(&self) -> Instant {
        *self.instant.read().unwrap()
    }

    fn now_system_us(&self) -> i64 {
        *self.system_us.read().unwrap()
    }
}
