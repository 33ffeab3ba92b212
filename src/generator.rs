//! Synthetic batch producer
//!
//! Deterministic for a given seed apart from capture timestamps, which come
//! from the wall clock unless supplied via `next_batch_at`.

use crate::config::GeneratorConfig;
use crate::model::Batch;
use crate::simulator::DeterministicRng;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GeneratorError {
    #[error("pack length must be at least 1")]
    InvalidLength,
    #[error("value limit must be positive, got {0}")]
    InvalidValueLimit(i64),
}

#[derive(Debug, Clone)]
pub struct BatchGenerator {
    rng: DeterministicRng,
    pack_length: usize,
    value_limit: i64,
}

impl BatchGenerator {
    pub fn new(seed: u64, pack_length: usize, value_limit: i64) -> Result<Self, GeneratorError> {
        if pack_length == 0 {
            return Err(GeneratorError::InvalidLength);
        }
        if value_limit <= 0 {
            return Err(GeneratorError::InvalidValueLimit(value_limit));
        }
        Ok(BatchGenerator {
            rng: DeterministicRng::new(seed),
            pack_length,
            value_limit,
        })
    }

    pub fn from_config(config: &GeneratorConfig) -> Result<Self, GeneratorError> {
        Self::new(config.seed, config.pack_length, config.value_limit)
    }

    pub fn next_id(&mut self) -> Uuid {
        let mut bytes = [0u8; 16];
        self.rng.fill_bytes(&mut bytes);
        uuid::Builder::from_random_bytes(bytes).into_uuid()
    }

    /// Batch stamped with the current wall clock in Unix microseconds
    pub fn next_batch(&mut self) -> Batch {
        self.next_batch_at(unix_micros())
    }

    pub fn next_batch_at(&mut self, timestamp: i64) -> Batch {
        let id = self.next_id();
        let limit = self.value_limit as u64;
        let values = (0..self.pack_length)
            .map(|_| self.rng.gen_range(0, limit) as i64)
            .collect();
        Batch::new(id, timestamp, values)
    }

    /// Emit one batch per `interval` until `limit` batches were sent, `stop`
    /// flips to true, or the queue closes. Returns the number sent.
    pub async fn run(
        mut self,
        queue: mpsc::Sender<Batch>,
        interval: Duration,
        limit: Option<u64>,
        mut stop: watch::Receiver<bool>,
    ) -> u64 {
        let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut sent = 0u64;

        while limit.map_or(true, |limit| sent < limit) {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = stop.changed() => {
                    if changed.is_err() || *stop.borrow() {
                        debug!(sent, "generator stopped");
                        break;
                    }
                    continue;
                }
            }

            if queue.send(self.next_batch()).await.is_err() {
                debug!(sent, "input queue closed, generator exiting");
                break;
            }
            sent += 1;
        }

        info!(sent, "generator finished");
        sent
    }
}

fn unix_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}
