use super::{Clock, Keyspace, SystemClock};
use parking_lot::RwLock;
use std::sync::Arc;

/// Thread-safe handle to one keyspace.
///
/// Clones share the same keyspace and clock. Every access first advances
/// the keyspace to the clock's current time, so expiry is evaluated against
/// the same timeline for all callers.
#[derive(Clone)]
pub struct SharedKeyspace<C: Clock = SystemClock> {
    keyspace: Arc<RwLock<Keyspace>>,
    clock: C,
}

impl SharedKeyspace<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock::new())
    }
}

impl Default for SharedKeyspace<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> SharedKeyspace<C> {
    pub fn with_clock(clock: C) -> Self {
        let mut keyspace = Keyspace::new();
        keyspace.set_time(clock.now());
        SharedKeyspace {
            keyspace: Arc::new(RwLock::new(keyspace)),
            clock,
        }
    }

    pub fn with_lock<F, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut Keyspace) -> R,
    {
        let mut keyspace = self.keyspace.write();
        keyspace.set_time(self.clock.now());
        f(&mut keyspace)
    }

    pub fn evict_expired(&self) -> usize {
        self.with_lock(|keyspace| keyspace.evict_expired())
    }

    pub fn dbsize(&self) -> usize {
        self.keyspace.read().dbsize()
    }
}
