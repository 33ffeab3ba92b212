//! Query service: storage outcomes translated into service outcomes
//!
//! Transport adapters (REST, RPC) talk to `QueryService` only and never see
//! storage error types.

use crate::model::{Record, ReduceError};
use crate::storage::{RecordStore, StorageError};
use thiserror::Error;
use tracing::{debug, error, warn};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    #[error("not found")]
    NotFound,
    #[error("corrupt data: {0}")]
    Corrupt(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ReduceError> for ServiceError {
    fn from(e: ReduceError) -> Self {
        ServiceError::InvalidInput(e.to_string())
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;

pub struct QueryService<S: RecordStore> {
    store: S,
}

impl<S: RecordStore> QueryService<S> {
    pub fn new(store: S) -> Self {
        QueryService { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn open(&self) -> ServiceResult<()> {
        self.store
            .open()
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))
    }

    /// Shutdown path: failures are logged, never raised.
    pub async fn close(&self) {
        if let Err(e) = self.store.close().await {
            warn!(error = %e, "closing record store failed");
        }
    }

    pub async fn put(&self, record: Record) -> ServiceResult<()> {
        self.store
            .put(record)
            .await
            .map_err(|e| ServiceError::Internal(e.to_string()))
    }

    pub async fn get_by_id(&self, id: Uuid) -> ServiceResult<Record> {
        let record = match self.store.get_by_id(id).await {
            Ok(record) => record,
            Err(StorageError::NotFound) => {
                debug!(%id, "record not found");
                return Err(ServiceError::NotFound);
            }
            Err(e @ StorageError::Corrupt { .. }) => return Err(ServiceError::Corrupt(e.to_string())),
            Err(e) => return Err(ServiceError::Internal(e.to_string())),
        };

        if !record.has_valid_identity() {
            error!(requested = %id, "store returned a record with nil identity");
            return Err(ServiceError::Corrupt(format!(
                "record for {} has nil identity",
                id
            )));
        }
        Ok(record)
    }

    pub async fn list_by_period(&self, from: i64, to: i64) -> ServiceResult<Vec<Record>> {
        if from > to {
            return Err(ServiceError::InvalidInput(format!(
                "inverted period: from {} > to {}",
                from, to
            )));
        }

        match self.store.list_by_period(from, to).await {
            Ok(records) if records.is_empty() => Err(ServiceError::NotFound),
            Ok(records) => Ok(records),
            Err(StorageError::NotFound) => Err(ServiceError::NotFound),
            Err(e @ StorageError::Corrupt { .. }) => Err(ServiceError::Corrupt(e.to_string())),
            Err(e) => Err(ServiceError::Internal(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageFuture, StorageResult};
    use parking_lot::Mutex;

    /// Store stub returning whatever it was primed with
    struct StubStore {
        get: Mutex<Option<StorageResult<Record>>>,
        list: Mutex<Option<StorageResult<Vec<Record>>>>,
    }

    impl StubStore {
        fn new() -> Self {
            StubStore {
                get: Mutex::new(None),
                list: Mutex::new(None),
            }
        }
    }

    impl RecordStore for StubStore {
        fn open(&self) -> StorageFuture<'_, ()> {
            Box::pin(async { Ok(()) })
        }

        fn close(&self) -> StorageFuture<'_, ()> {
            Box::pin(async { Err(StorageError::NotOpen) })
        }

        fn put(&self, _record: Record) -> StorageFuture<'_, ()> {
            Box::pin(async { Err(StorageError::NotOpen) })
        }

        fn get_by_id(&self, _id: Uuid) -> StorageFuture<'_, Record> {
            let result = self.get.lock().take().unwrap_or(Err(StorageError::NotFound));
            Box::pin(async move { result })
        }

        fn list_by_period(&self, _from: i64, _to: i64) -> StorageFuture<'_, Vec<Record>> {
            let result = self.list.lock().take().unwrap_or(Err(StorageError::NotFound));
            Box::pin(async move { result })
        }
    }

    #[tokio::test]
    async fn test_nil_identity_from_store_is_corrupt() {
        let stub = StubStore::new();
        *stub.get.lock() = Some(Ok(Record::new(Uuid::nil(), 1, 1)));
        let service = QueryService::new(stub);

        let err = service.get_by_id(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_not_found_promoted() {
        let service = QueryService::new(StubStore::new());
        assert_eq!(
            service.get_by_id(Uuid::new_v4()).await,
            Err(ServiceError::NotFound)
        );
        assert_eq!(service.list_by_period(0, 1).await, Err(ServiceError::NotFound));
    }

    #[tokio::test]
    async fn test_empty_list_is_not_found() {
        let stub = StubStore::new();
        *stub.list.lock() = Some(Ok(Vec::new()));
        let service = QueryService::new(stub);
        assert_eq!(service.list_by_period(0, 1).await, Err(ServiceError::NotFound));
    }

    #[tokio::test]
    async fn test_inverted_period_rejected() {
        let service = QueryService::new(StubStore::new());
        assert!(matches!(
            service.list_by_period(10, 5).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_storage_failures_become_internal() {
        let service = QueryService::new(StubStore::new());
        let err = service.put(Record::new(Uuid::new_v4(), 1, 1)).await.unwrap_err();
        assert!(matches!(err, ServiceError::Internal(_)));

        // close swallows the error
        service.close().await;
    }

    #[test]
    fn test_reduce_error_is_invalid_input() {
        let err: ServiceError = ReduceError::EmptySequence(Uuid::nil()).into();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }
}
