use super::backend::IndexBackend;
use super::codec::{self, CodecError};
use super::{RecordStore, StorageError, StorageFuture, StorageResult};
use crate::model::Record;
use parking_lot::Mutex;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const DEFAULT_POINT_TTL: Duration = Duration::from_secs(500);
pub const DEFAULT_ORDER_INDEX_KEY: &str = "events";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LifecycleState {
    Idle,
    Open,
    Closed,
}

/// Reference `RecordStore`: point index plus order index over one backend.
pub struct DualIndexStore<B: IndexBackend> {
    backend: B,
    point_ttl: Duration,
    order_key: String,
    state: Mutex<LifecycleState>,
    /// Held across the backend await so open and close never interleave
    transition: tokio::sync::Mutex<()>,
}

impl<B: IndexBackend> DualIndexStore<B> {
    pub fn new(backend: B) -> Self {
        DualIndexStore {
            backend,
            point_ttl: DEFAULT_POINT_TTL,
            order_key: DEFAULT_ORDER_INDEX_KEY.to_string(),
            state: Mutex::new(LifecycleState::Idle),
            transition: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_point_ttl(mut self, ttl: Duration) -> Self {
        self.point_ttl = ttl;
        self
    }

    pub fn with_order_key(mut self, key: impl Into<String>) -> Self {
        self.order_key = key.into();
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn order_key(&self) -> &str {
        &self.order_key
    }

    pub fn is_open(&self) -> bool {
        *self.state.lock() == LifecycleState::Open
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(StorageError::NotOpen)
        }
    }

    async fn open_inner(&self) -> StorageResult<()> {
        let _transition = self.transition.lock().await;
        if self.is_open() {
            return Ok(());
        }
        self.backend.connect().await?;
        *self.state.lock() = LifecycleState::Open;
        info!(order_key = %self.order_key, point_ttl_secs = self.point_ttl.as_secs(), "record store opened");
        Ok(())
    }

    async fn close_inner(&self) -> StorageResult<()> {
        let _transition = self.transition.lock().await;
        let previous = std::mem::replace(&mut *self.state.lock(), LifecycleState::Closed);
        if previous == LifecycleState::Closed {
            return Ok(());
        }
        // Idle means open never completed; the backend may still hold a
        // half-acquired connection, and disconnect is idempotent.
        if let Err(e) = self.backend.disconnect().await {
            warn!(error = %e, "record store disconnect failed");
            return Err(e.into());
        }
        info!("record store closed");
        Ok(())
    }

    async fn put_inner(&self, record: Record) -> StorageResult<()> {
        self.ensure_open()?;
        let key = record.id.to_string();
        if !record.has_valid_identity() {
            return Err(StorageError::Corrupt {
                key,
                source: CodecError::NilIdentity,
            });
        }
        let encoded = codec::encode(&record).map_err(|source| StorageError::Corrupt {
            key: key.clone(),
            source,
        })?;

        self.backend
            .zadd(&self.order_key, record.timestamp, encoded.clone())
            .await?;

        if let Err(source) = self.backend.set_ex(&key, encoded, self.point_ttl).await {
            error!(
                id = %record.id,
                timestamp = record.timestamp,
                error = %source,
                "point index write failed after order index write; indexes diverge"
            );
            return Err(StorageError::PartialPut {
                id: record.id,
                source,
            });
        }
        Ok(())
    }

    async fn get_by_id_inner(&self, id: Uuid) -> StorageResult<Record> {
        self.ensure_open()?;
        let key = id.to_string();
        let Some(frame) = self.backend.get(&key).await? else {
            debug!(%id, "point lookup miss");
            return Err(StorageError::NotFound);
        };

        codec::decode(&frame).map_err(|source| {
            error!(%key, error = %source, "corrupt point index entry");
            StorageError::Corrupt { key, source }
        })
    }

    async fn list_by_period_inner(&self, from: i64, to: i64) -> StorageResult<Vec<Record>> {
        self.ensure_open()?;
        let members = self
            .backend
            .zrange_by_score(&self.order_key, from, to)
            .await?;
        if members.is_empty() {
            debug!(from, to, "range scan matched nothing");
            return Err(StorageError::NotFound);
        }

        let mut records = Vec::with_capacity(members.len());
        for member in &members {
            match codec::decode(member) {
                Ok(record) => records.push(record),
                Err(source) => {
                    let key = format!("{}[{}..={}]", self.order_key, from, to);
                    error!(%key, error = %source, "corrupt order index entry, aborting scan");
                    return Err(StorageError::Corrupt { key, source });
                }
            }
        }
        Ok(records)
    }
}

impl<B: IndexBackend> RecordStore for DualIndexStore<B> {
    fn open(&self) -> StorageFuture<'_, ()> {
        Box::pin(self.open_inner())
    }

    fn close(&self) -> StorageFuture<'_, ()> {
        Box::pin(self.close_inner())
    }

    fn put(&self, record: Record) -> StorageFuture<'_, ()> {
        Box::pin(self.put_inner(record))
    }

    fn get_by_id(&self, id: Uuid) -> StorageFuture<'_, Record> {
        Box::pin(self.get_by_id_inner(id))
    }

    fn list_by_period(&self, from: i64, to: i64) -> StorageFuture<'_, Vec<Record>> {
        Box::pin(self.list_by_period_inner(from, to))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{InMemoryBackend, SimulatedBackend, SimulatedBackendConfig};
    use crate::storage::{BackendFuture, IndexBackend};
    use bytes::Bytes;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    /// In-memory backend whose connect yields for a while and counts calls
    #[derive(Clone, Default)]
    struct SlowConnect {
        inner: InMemoryBackend,
        connects: Arc<AtomicU64>,
    }

    impl IndexBackend for SlowConnect {
        fn connect(&self) -> BackendFuture<'_, ()> {
            Box::pin(async move {
                self.connects.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                self.inner.connect().await
            })
        }

        fn disconnect(&self) -> BackendFuture<'_, ()> {
            self.inner.disconnect()
        }

        fn zadd<'a>(&'a self, key: &'a str, score: i64, member: Bytes) -> BackendFuture<'a, ()> {
            self.inner.zadd(key, score, member)
        }

        fn set_ex<'a>(&'a self, key: &'a str, value: Bytes, ttl: Duration) -> BackendFuture<'a, ()> {
            self.inner.set_ex(key, value, ttl)
        }

        fn get<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<Bytes>> {
            self.inner.get(key)
        }

        fn zrange_by_score<'a>(
            &'a self,
            key: &'a str,
            min: i64,
            max: i64,
        ) -> BackendFuture<'a, Vec<Bytes>> {
            self.inner.zrange_by_score(key, min, max)
        }
    }

    async fn open_store() -> DualIndexStore<InMemoryBackend> {
        let store = DualIndexStore::new(InMemoryBackend::new());
        store.open().await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = open_store().await;
        let record = Record::new(Uuid::new_v4(), 1_000, 42);
        store.put(record).await.unwrap();

        assert_eq!(store.get_by_id(record.id).await.unwrap(), record);
        assert_eq!(store.list_by_period(1_000, 1_000).await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_operations_require_open() {
        let store = DualIndexStore::new(InMemoryBackend::new());
        let record = Record::new(Uuid::new_v4(), 1, 1);
        assert!(matches!(store.put(record).await, Err(StorageError::NotOpen)));
        assert!(matches!(
            store.get_by_id(record.id).await,
            Err(StorageError::NotOpen)
        ));

        store.open().await.unwrap();
        store.close().await.unwrap();
        assert!(matches!(
            store.list_by_period(0, 10).await,
            Err(StorageError::NotOpen)
        ));
    }

    #[tokio::test]
    async fn test_close_after_failed_open() {
        let backend = SimulatedBackend::new(
            InMemoryBackend::new(),
            1,
            SimulatedBackendConfig {
                connect_fail_prob: 1.0,
                ..SimulatedBackendConfig::no_faults()
            },
        );
        let store = DualIndexStore::new(backend);
        assert!(store.open().await.is_err());
        assert!(!store.is_open());

        store.close().await.unwrap();
        // second close is a no-op
        store.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_opens_connect_once() {
        let backend = SlowConnect::default();
        let store = DualIndexStore::new(backend.clone());

        let (first, second) = tokio::join!(store.open(), store.open());
        first.unwrap();
        second.unwrap();
        assert!(store.is_open());
        assert_eq!(backend.connects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_during_open_leaves_store_closed() {
        let store = DualIndexStore::new(SlowConnect::default());

        let (opened, closed) = tokio::join!(store.open(), async {
            tokio::task::yield_now().await;
            store.close().await
        });
        opened.unwrap();
        closed.unwrap();
        assert!(!store.is_open());
        assert!(matches!(
            store.put(Record::new(Uuid::new_v4(), 1, 1)).await,
            Err(StorageError::NotOpen)
        ));
    }

    #[tokio::test]
    async fn test_missing_is_not_found() {
        let store = open_store().await;
        assert!(store
            .get_by_id(Uuid::new_v4())
            .await
            .unwrap_err()
            .is_not_found());
        assert!(store.list_by_period(0, 100).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_undecodable_point_entry_is_corrupt() {
        let store = open_store().await;
        let id = Uuid::new_v4();
        store
            .backend()
            .keyspace()
            .with_lock(|ks| ks.set_ex(&id.to_string(), Bytes::from_static(b"garbage"), DEFAULT_POINT_TTL))
            .unwrap();

        let err = store.get_by_id(id).await.unwrap_err();
        assert!(err.is_corrupt());
        assert!(!err.is_not_found());
    }

    #[tokio::test]
    async fn test_one_corrupt_member_fails_whole_scan() {
        let store = open_store().await;
        store.put(Record::new(Uuid::new_v4(), 10, 1)).await.unwrap();
        store.put(Record::new(Uuid::new_v4(), 30, 3)).await.unwrap();
        store
            .backend()
            .keyspace()
            .with_lock(|ks| ks.zadd(DEFAULT_ORDER_INDEX_KEY, 20, Bytes::from_static(b"junk")))
            .unwrap();

        assert!(store.list_by_period(0, 100).await.unwrap_err().is_corrupt());
        assert_eq!(store.list_by_period(25, 35).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_nil_identity_rejected_on_put() {
        let store = open_store().await;
        let err = store.put(Record::new(Uuid::nil(), 1, 1)).await.unwrap_err();
        assert!(err.is_corrupt());
        assert!(store.list_by_period(0, 10).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_custom_order_key() {
        let store = DualIndexStore::new(InMemoryBackend::new()).with_order_key("packs");
        store.open().await.unwrap();
        store.put(Record::new(Uuid::new_v4(), 5, 5)).await.unwrap();

        let card = store.backend().keyspace().with_lock(|ks| ks.zcard("packs")).unwrap();
        assert_eq!(card, 1);
    }
}
