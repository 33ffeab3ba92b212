//! Data model for the ingestion pipeline
//!
//! - `Batch`: one externally produced pack of raw integers
//! - `Record`: the derived, persisted summary of exactly one batch
//! - `reduce`: the pure mapping from one to the other

mod record;
mod reducer;

pub use record::{Batch, Record};
pub use reducer::{reduce, ReduceError};
