//! Backing store abstraction
//!
//! The storage engine needs exactly four commands from its backing store:
//! an ordered-set insert, an ordered-set score range, a keyed write with
//! expiry and a keyed read. Anything offering those (the in-process
//! keyspace, a networked Redis, an embedded KV) can sit behind
//! `IndexBackend`.
//!
//! Implementations:
//! - `InMemoryBackend`: in-process keyspace, the reference backend
//! - `SimulatedBackend`: fault-injecting wrapper for tests and DST

use crate::keyspace::KeyspaceError;
use bytes::Bytes;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub type BackendResult<T> = Result<T, BackendError>;

pub type BackendFuture<'a, T> = Pin<Box<dyn Future<Output = BackendResult<T>> + Send + 'a>>;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend connection is not open")]
    Disconnected,
    #[error("backend connect failed: {0}")]
    ConnectFailed(String),
    #[error("{command} rejected: {reason}")]
    Rejected {
        command: &'static str,
        reason: String,
    },
    #[error("{command} timed out")]
    Timeout { command: &'static str },
    #[error(transparent)]
    Keyspace(#[from] KeyspaceError),
}

pub trait IndexBackend: Send + Sync + 'static {
    /// Acquire the connection. Calling it on an open connection is a no-op.
    fn connect(&self) -> BackendFuture<'_, ()>;

    /// Release the connection. Calling it on a closed connection is a no-op.
    fn disconnect(&self) -> BackendFuture<'_, ()>;

    /// ZADD: add `member` to the ordered set at `key` with `score`
    fn zadd<'a>(&'a self, key: &'a str, score: i64, member: Bytes) -> BackendFuture<'a, ()>;

    /// SET with EX: store `value` at `key`, expiring after `ttl`
    fn set_ex<'a>(&'a self, key: &'a str, value: Bytes, ttl: Duration) -> BackendFuture<'a, ()>;

    /// GET: `None` when missing or expired
    fn get<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<Bytes>>;

    /// ZRANGEBYSCORE with inclusive bounds, ascending
    fn zrange_by_score<'a>(&'a self, key: &'a str, min: i64, max: i64)
        -> BackendFuture<'a, Vec<Bytes>>;
}

impl<B: IndexBackend + ?Sized> IndexBackend for Arc<B> {
    fn connect(&self) -> BackendFuture<'_, ()> {
        (**self).connect()
    }

    fn disconnect(&self) -> BackendFuture<'_, ()> {
        (**self).disconnect()
    }

    fn zadd<'a>(&'a self, key: &'a str, score: i64, member: Bytes) -> BackendFuture<'a, ()> {
        (**self).zadd(key, score, member)
    }

    fn set_ex<'a>(&'a self, key: &'a str, value: Bytes, ttl: Duration) -> BackendFuture<'a, ()> {
        (**self).set_ex(key, value, ttl)
    }

    fn get<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<Bytes>> {
        (**self).get(key)
    }

    fn zrange_by_score<'a>(
        &'a self,
        key: &'a str,
        min: i64,
        max: i64,
    ) -> BackendFuture<'a, Vec<Bytes>> {
        (**self).zrange_by_score(key, min, max)
    }
}
