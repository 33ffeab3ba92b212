use super::{Batch, Record};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReduceError {
    /// Producers must never emit an empty pack, but the reducer checks anyway.
    #[error("batch {0} has an empty value sequence")]
    EmptySequence(uuid::Uuid),
}

/// Reduce a batch to its record: identity and timestamp carried over,
/// summary is the maximum of the sequence.
pub fn reduce(batch: &Batch) -> Result<Record, ReduceError> {
    let max = batch
        .values
        .iter()
        .copied()
        .max()
        .ok_or(ReduceError::EmptySequence(batch.id))?;

    Ok(Record::new(batch.id, batch.timestamp, max))
}
