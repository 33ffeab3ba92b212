use super::backend::{BackendError, BackendFuture, IndexBackend};
use crate::keyspace::{Clock, ExpirySweeper, SharedKeyspace, SweeperHandle, SystemClock};
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Reference backend over an in-process keyspace.
///
/// Each clone is an independent connection to the same keyspace: connecting
/// or disconnecting one clone does not affect the others.
pub struct InMemoryBackend<C: Clock = SystemClock> {
    keyspace: SharedKeyspace<C>,
    connected: AtomicBool,
    sweep_interval: Option<Duration>,
    sweeper: Mutex<Option<SweeperHandle>>,
}

impl InMemoryBackend<SystemClock> {
    pub fn new() -> Self {
        Self::with_keyspace(SharedKeyspace::new())
    }
}

impl Default for InMemoryBackend<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> InMemoryBackend<C> {
    pub fn with_keyspace(keyspace: SharedKeyspace<C>) -> Self {
        InMemoryBackend {
            keyspace,
            connected: AtomicBool::new(false),
            sweep_interval: None,
            sweeper: Mutex::new(None),
        }
    }

    /// Run an `ExpirySweeper` while connected. Requires a tokio runtime at
    /// connect time.
    pub fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval = Some(interval);
        self
    }

    pub fn keyspace(&self) -> &SharedKeyspace<C> {
        &self.keyspace
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn ensure_connected(&self) -> Result<(), BackendError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(BackendError::Disconnected)
        }
    }
}

impl<C: Clock> Clone for InMemoryBackend<C> {
    fn clone(&self) -> Self {
        InMemoryBackend {
            keyspace: self.keyspace.clone(),
            connected: AtomicBool::new(false),
            sweep_interval: self.sweep_interval,
            sweeper: Mutex::new(None),
        }
    }
}

impl<C: Clock> IndexBackend for InMemoryBackend<C> {
    fn connect(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            if self.connected.swap(true, Ordering::AcqRel) {
                return Ok(());
            }
            if let Some(period) = self.sweep_interval {
                let handle = ExpirySweeper::new(self.keyspace.clone(), period).spawn();
                *self.sweeper.lock() = Some(handle);
            }
            debug!("in-memory backend connected");
            Ok(())
        })
    }

    fn disconnect(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            if !self.connected.swap(false, Ordering::AcqRel) {
                return Ok(());
            }
            let sweeper = self.sweeper.lock().take();
            if let Some(handle) = sweeper {
                handle.stop().await;
            }
            debug!("in-memory backend disconnected");
            Ok(())
        })
    }

    fn zadd<'a>(&'a self, key: &'a str, score: i64, member: Bytes) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_connected()?;
            self.keyspace.with_lock(|ks| ks.zadd(key, score, member))?;
            Ok(())
        })
    }

    fn set_ex<'a>(&'a self, key: &'a str, value: Bytes, ttl: Duration) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.ensure_connected()?;
            self.keyspace.with_lock(|ks| ks.set_ex(key, value, ttl))?;
            Ok(())
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<Bytes>> {
        Box::pin(async move {
            self.ensure_connected()?;
            Ok(self.keyspace.with_lock(|ks| ks.get(key))?)
        })
    }

    fn zrange_by_score<'a>(
        &'a self,
        key: &'a str,
        min: i64,
        max: i64,
    ) -> BackendFuture<'a, Vec<Bytes>> {
        Box::pin(async move {
            self.ensure_connected()?;
            let entries = self.keyspace.with_lock(|ks| ks.zrange_by_score(key, min, max))?;
            Ok(entries.into_iter().map(|(member, _)| member).collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keyspace::SimulatedClock;

    #[tokio::test]
    async fn test_commands_require_connection() {
        let backend = InMemoryBackend::new();
        assert!(matches!(
            backend.get("k").await,
            Err(BackendError::Disconnected)
        ));

        backend.connect().await.unwrap();
        assert_eq!(backend.get("k").await.unwrap(), None);

        backend.disconnect().await.unwrap();
        assert!(matches!(
            backend.zadd("z", 1, Bytes::from_static(b"m")).await,
            Err(BackendError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_and_disconnect_are_idempotent() {
        let backend = InMemoryBackend::new().with_sweep_interval(Duration::from_millis(10));
        backend.disconnect().await.unwrap();
        backend.connect().await.unwrap();
        backend.connect().await.unwrap();
        backend.disconnect().await.unwrap();
        backend.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_clones_are_independent_connections() {
        let backend = InMemoryBackend::with_keyspace(SharedKeyspace::with_clock(
            SimulatedClock::new(0),
        ));
        backend.connect().await.unwrap();
        backend
            .set_ex("k", Bytes::from_static(b"v"), Duration::from_secs(1))
            .await
            .unwrap();

        let reader = backend.clone();
        assert!(matches!(reader.get("k").await, Err(BackendError::Disconnected)));
        reader.connect().await.unwrap();
        assert_eq!(reader.get("k").await.unwrap(), Some(Bytes::from_static(b"v")));

        reader.disconnect().await.unwrap();
        assert!(backend.is_connected());
    }

    #[tokio::test]
    async fn test_range_returns_members_in_score_order() {
        let backend = InMemoryBackend::new();
        backend.connect().await.unwrap();
        backend.zadd("z", 30, Bytes::from_static(b"c")).await.unwrap();
        backend.zadd("z", 10, Bytes::from_static(b"a")).await.unwrap();
        backend.zadd("z", 20, Bytes::from_static(b"b")).await.unwrap();

        let members = backend.zrange_by_score("z", 10, 20).await.unwrap();
        assert_eq!(
            members,
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]
        );
    }
}
