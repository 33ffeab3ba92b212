//! In-process keyed store backing the record indexes.
//!
//! A small Redis-shaped state machine: string keys with optional expiry and
//! score-ordered sets. It is the reference backend for the storage engine;
//! the engine only ever talks to it through `storage::IndexBackend`.
//!
//! - `Keyspace`: the single-threaded state machine
//! - `SharedKeyspace`: `Arc<RwLock<_>>` handle that stamps every access with clock time
//! - `ExpirySweeper`: background task evicting expired keys
//! - `OrderedSet`: score-ordered member set

mod clock;
mod expiry;
mod shared;
mod sorted_set;

pub use clock::{Clock, ClockTime, SimulatedClock, SystemClock};
pub use expiry::{ExpirySweeper, SweeperHandle, MIN_SWEEP_PERIOD};
pub use shared::SharedKeyspace;
pub use sorted_set::OrderedSet;

use ahash::AHashMap;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyspaceError {
    #[error("WRONGTYPE operation against a key holding the wrong kind of value: {0}")]
    WrongType(String),
    #[error("invalid expire time for key {0}")]
    InvalidExpire(String),
}

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    String(Bytes),
    SortedSet(OrderedSet),
}

/// Keyed state machine with lazy and eager expiry.
///
/// Time only moves through `set_time`; the keyspace never reads a clock
/// itself.
#[derive(Debug, Default)]
pub struct Keyspace {
    data: AHashMap<String, Value>,
    expirations: AHashMap<String, ClockTime>,
    current_time: ClockTime,
}

impl Keyspace {
    pub fn new() -> Self {
        Keyspace {
            data: AHashMap::new(),
            expirations: AHashMap::new(),
            current_time: ClockTime::ZERO,
        }
    }

    /// Move time forward without evicting; expired keys are still
    /// invisible to reads. Time never moves backwards.
    pub fn set_time(&mut self, time: ClockTime) {
        self.current_time = self.current_time.max(time);
    }

    fn is_expired(&self, key: &str) -> bool {
        self.expirations
            .get(key)
            .is_some_and(|expires_at| *expires_at <= self.current_time)
    }

    fn remove_key(&mut self, key: &str) {
        self.data.remove(key);
        self.expirations.remove(key);
    }

    fn get_value(&mut self, key: &str) -> Option<&Value> {
        if self.is_expired(key) {
            self.remove_key(key);
            return None;
        }
        self.data.get(key)
    }

    /// SET key value EX ttl
    pub fn set_ex(&mut self, key: &str, value: Bytes, ttl: Duration) -> Result<(), KeyspaceError> {
        if ttl.is_zero() {
            return Err(KeyspaceError::InvalidExpire(key.to_string()));
        }

        let expires_at = self.current_time + ttl;
        self.data.insert(key.to_string(), Value::String(value));
        self.expirations.insert(key.to_string(), expires_at);

        debug_assert!(self.data.contains_key(key), "Postcondition: set_ex must store key");
        debug_assert!(
            self.expirations.contains_key(key),
            "Postcondition: set_ex must record expiration"
        );
        Ok(())
    }

    /// GET key; `None` when absent or expired
    pub fn get(&mut self, key: &str) -> Result<Option<Bytes>, KeyspaceError> {
        match self.get_value(key) {
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(KeyspaceError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    /// ZADD key score member; returns true when the member is new
    pub fn zadd(&mut self, key: &str, score: i64, member: Bytes) -> Result<bool, KeyspaceError> {
        if self.is_expired(key) {
            self.remove_key(key);
        }
        let value = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::SortedSet(OrderedSet::new()));
        match value {
            Value::SortedSet(zset) => Ok(zset.add(member, score)),
            _ => Err(KeyspaceError::WrongType(key.to_string())),
        }
    }

    /// ZRANGEBYSCORE key min max (both inclusive)
    pub fn zrange_by_score(
        &mut self,
        key: &str,
        min: i64,
        max: i64,
    ) -> Result<Vec<(Bytes, i64)>, KeyspaceError> {
        match self.get_value(key) {
            Some(Value::SortedSet(zset)) => Ok(zset.range_by_score(min, max)),
            Some(_) => Err(KeyspaceError::WrongType(key.to_string())),
            None => Ok(Vec::new()),
        }
    }

    /// Ordered set stored at `key`, `None` when missing
    pub fn sorted_set(&mut self, key: &str) -> Result<Option<&OrderedSet>, KeyspaceError> {
        match self.get_value(key) {
            Some(Value::SortedSet(zset)) => Ok(Some(zset)),
            Some(_) => Err(KeyspaceError::WrongType(key.to_string())),
            None => Ok(None),
        }
    }

    pub fn zcard(&mut self, key: &str) -> Result<usize, KeyspaceError> {
        Ok(self.sorted_set(key)?.map_or(0, OrderedSet::len))
    }

    /// Drop every key whose expiry has passed. Returns the number evicted.
    pub fn evict_expired(&mut self) -> usize {
        #[cfg(debug_assertions)]
        let pre_data_len = self.data.len();

        let now = self.current_time;
        let expired_keys: Vec<String> = self
            .expirations
            .iter()
            .filter(|(_, &expires_at)| expires_at <= now)
            .map(|(k, _)| k.clone())
            .collect();

        let count = expired_keys.len();
        for key in expired_keys {
            self.remove_key(&key);
        }

        #[cfg(debug_assertions)]
        debug_assert_eq!(
            self.data.len(),
            pre_data_len.saturating_sub(count),
            "Postcondition: data size must decrease by evicted count"
        );

        count
    }

    /// Number of keys, including expired keys not yet evicted
    pub fn dbsize(&self) -> usize {
        self.data.len()
    }
}
