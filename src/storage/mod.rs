//! Storage engine for derived records
//!
//! Two coupled indexes over the same record bytes:
//! - point index: record id → encoded record, with a fixed expiry
//! - order index: one ordered set scored by record timestamp, no expiry
//!
//! A record can outlive its point entry and stay reachable by range scan.
//! The two writes of a put are not atomic; a point write failing after the
//! order write landed is reported as `StorageError::PartialPut`.

mod backend;
pub mod codec;
mod dual_index;
mod memory;
mod simulated;

pub use backend::{BackendError, BackendFuture, BackendResult, IndexBackend};
pub use codec::CodecError;
pub use dual_index::{DualIndexStore, DEFAULT_ORDER_INDEX_KEY, DEFAULT_POINT_TTL};
pub use memory::InMemoryBackend;
pub use simulated::{SimulatedBackend, SimulatedBackendConfig, SimulatedBackendStats};

use crate::model::Record;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found")]
    NotFound,
    #[error("corrupt entry at {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: CodecError,
    },
    #[error("store is not open")]
    NotOpen,
    #[error("partial put for {id}: order index written, point index failed: {source}")]
    PartialPut {
        id: Uuid,
        #[source]
        source: BackendError,
    },
    #[error(transparent)]
    Backend(#[from] BackendError),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound)
    }

    pub fn is_corrupt(&self) -> bool {
        matches!(self, StorageError::Corrupt { .. })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = StorageResult<T>> + Send + 'a>>;

/// Record persistence seen by the query service.
pub trait RecordStore: Send + Sync + 'static {
    /// Acquire the backing connection
    fn open(&self) -> StorageFuture<'_, ()>;

    /// Release the backing connection. Never panics, also after a failed `open`.
    fn close(&self) -> StorageFuture<'_, ()>;

    fn put(&self, record: Record) -> StorageFuture<'_, ()>;

    /// `NotFound` when absent or expired, `Corrupt` when undecodable
    fn get_by_id(&self, id: Uuid) -> StorageFuture<'_, Record>;

    /// Records with `from <= timestamp <= to`, ascending; ties in insertion order.
    ///
    /// `NotFound` on zero matches. One undecodable entry fails the whole scan.
    fn list_by_period(&self, from: i64, to: i64) -> StorageFuture<'_, Vec<Record>>;
}

impl<S: RecordStore + ?Sized> RecordStore for Arc<S> {
    fn open(&self) -> StorageFuture<'_, ()> {
        (**self).open()
    }

    fn close(&self) -> StorageFuture<'_, ()> {
        (**self).close()
    }

    fn put(&self, record: Record) -> StorageFuture<'_, ()> {
        (**self).put(record)
    }

    fn get_by_id(&self, id: Uuid) -> StorageFuture<'_, Record> {
        (**self).get_by_id(id)
    }

    fn list_by_period(&self, from: i64, to: i64) -> StorageFuture<'_, Vec<Record>> {
        (**self).list_by_period(from, to)
    }
}
