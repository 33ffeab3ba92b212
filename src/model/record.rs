use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Raw input pack as delivered by a producer.
///
/// Consumed exactly once by the reducer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub id: Uuid,
    /// Capture time in Unix microseconds
    pub timestamp: i64,
    pub values: Vec<i64>,
}

impl Batch {
    pub fn new(id: Uuid, timestamp: i64, values: Vec<i64>) -> Self {
        Batch {
            id,
            timestamp,
            values,
        }
    }
}

/// Derived record persisted by the storage engine.
///
/// The JSON shape (`id`, `ts`, `max`) is what transport adapters hand out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    #[serde(rename = "ts")]
    pub timestamp: i64,
    pub max: i64,
}

impl Record {
    pub fn new(id: Uuid, timestamp: i64, max: i64) -> Self {
        Record { id, timestamp, max }
    }

    /// A nil identity is never produced by a healthy pipeline; seeing one
    /// on the read path means the stored bytes are damaged.
    #[inline]
    pub fn has_valid_identity(&self) -> bool {
        !self.id.is_nil()
    }
}
