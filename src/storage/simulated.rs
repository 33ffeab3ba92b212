//! Simulated backend with fault injection
//!
//! Wraps any `IndexBackend` and injects faults with configured
//! probabilities, drawn from a seeded RNG so a failing run replays exactly.
//! Write faults are injected *before* the wrapped command runs: a rejected
//! write never reaches the inner store.

use super::backend::{BackendError, BackendFuture, IndexBackend};
use crate::simulator::DeterministicRng;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Fault probabilities, each in `[0.0, 1.0]`
#[derive(Debug, Clone)]
pub struct SimulatedBackendConfig {
    /// Probability that `connect` fails
    pub connect_fail_prob: f64,
    /// Probability that an order-index write (ZADD) is rejected
    pub zadd_fail_prob: f64,
    /// Probability that a point-index write (SET EX) is rejected
    pub set_fail_prob: f64,
    /// Probability that a point read (GET) fails
    pub get_fail_prob: f64,
    /// Probability that a point read returns damaged bytes
    pub get_corrupt_prob: f64,
    /// Probability that a range read fails
    pub range_fail_prob: f64,
    /// Probability that one member of a range read comes back damaged
    pub range_corrupt_prob: f64,
    /// Probability that any command times out instead of running
    pub timeout_prob: f64,
    /// Simulated latency range in microseconds (min, max)
    pub latency_range_us: (u64, u64),
}

impl Default for SimulatedBackendConfig {
    fn default() -> Self {
        SimulatedBackendConfig {
            connect_fail_prob: 0.0,
            zadd_fail_prob: 0.01,      // 1%
            set_fail_prob: 0.01,       // 1%
            get_fail_prob: 0.01,       // 1%
            get_corrupt_prob: 0.001,   // 0.1%
            range_fail_prob: 0.01,     // 1%
            range_corrupt_prob: 0.001, // 0.1%
            timeout_prob: 0.005,       // 0.5%
            latency_range_us: (0, 200),
        }
    }
}

impl SimulatedBackendConfig {
    /// No faults - for baseline testing
    pub fn no_faults() -> Self {
        SimulatedBackendConfig {
            connect_fail_prob: 0.0,
            zadd_fail_prob: 0.0,
            set_fail_prob: 0.0,
            get_fail_prob: 0.0,
            get_corrupt_prob: 0.0,
            range_fail_prob: 0.0,
            range_corrupt_prob: 0.0,
            timeout_prob: 0.0,
            latency_range_us: (0, 0),
        }
    }

    /// High chaos configuration for stress testing
    pub fn high_chaos() -> Self {
        SimulatedBackendConfig {
            connect_fail_prob: 0.0,
            zadd_fail_prob: 0.05,
            set_fail_prob: 0.10,
            get_fail_prob: 0.05,
            get_corrupt_prob: 0.01,
            range_fail_prob: 0.05,
            range_corrupt_prob: 0.01,
            timeout_prob: 0.02,
            latency_range_us: (0, 1_000),
        }
    }

    /// Every point-index write is rejected while order-index writes succeed:
    /// opens the consistency window on every put.
    pub fn point_writes_rejected() -> Self {
        SimulatedBackendConfig {
            set_fail_prob: 1.0,
            ..Self::no_faults()
        }
    }
}

/// Counters per injected fault
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SimulatedBackendStats {
    pub connect_attempts: u64,
    pub connect_failures: u64,
    pub zadd_attempts: u64,
    pub zadd_failures: u64,
    pub set_attempts: u64,
    pub set_failures: u64,
    pub get_attempts: u64,
    pub get_failures: u64,
    pub get_corruptions: u64,
    pub range_attempts: u64,
    pub range_failures: u64,
    pub range_corruptions: u64,
    pub timeouts: u64,
}

struct SimulatedInner {
    rng: DeterministicRng,
    stats: SimulatedBackendStats,
}

/// Fault-injecting wrapper; clones share RNG, stats and inner backend
pub struct SimulatedBackend<B: IndexBackend> {
    inner: Arc<B>,
    config: SimulatedBackendConfig,
    state: Arc<Mutex<SimulatedInner>>,
}

impl<B: IndexBackend> Clone for SimulatedBackend<B> {
    fn clone(&self) -> Self {
        SimulatedBackend {
            inner: self.inner.clone(),
            config: self.config.clone(),
            state: self.state.clone(),
        }
    }
}

impl<B: IndexBackend> SimulatedBackend<B> {
    pub fn new(inner: B, seed: u64, config: SimulatedBackendConfig) -> Self {
        SimulatedBackend {
            inner: Arc::new(inner),
            config,
            state: Arc::new(Mutex::new(SimulatedInner {
                rng: DeterministicRng::new(seed),
                stats: SimulatedBackendStats::default(),
            })),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn stats(&self) -> SimulatedBackendStats {
        self.state.lock().stats.clone()
    }

    fn roll(&self, probability: f64) -> bool {
        self.state.lock().rng.gen_bool(probability)
    }

    fn record<F: FnOnce(&mut SimulatedBackendStats)>(&self, f: F) {
        f(&mut self.state.lock().stats);
    }

    fn damage(&self, data: Bytes) -> Bytes {
        if data.is_empty() {
            return data;
        }
        let idx = self.state.lock().rng.gen_range(0, data.len() as u64) as usize;
        let mut damaged = data.to_vec();
        damaged[idx] ^= 0xFF;
        Bytes::from(damaged)
    }

    /// Latency then timeout check, shared by every command
    async fn before_command(&self, command: &'static str) -> Result<(), BackendError> {
        let (min, max) = self.config.latency_range_us;
        if max > 0 {
            let latency_us = self.state.lock().rng.gen_range(min, max.max(min + 1));
            if latency_us > 0 {
                tokio::time::sleep(Duration::from_micros(latency_us)).await;
            }
        }
        if self.roll(self.config.timeout_prob) {
            self.record(|s| s.timeouts += 1);
            return Err(BackendError::Timeout { command });
        }
        Ok(())
    }
}

impl<B: IndexBackend> IndexBackend for SimulatedBackend<B> {
    fn connect(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move {
            self.record(|s| s.connect_attempts += 1);
            if self.roll(self.config.connect_fail_prob) {
                self.record(|s| s.connect_failures += 1);
                return Err(BackendError::ConnectFailed(
                    "simulated connect failure".to_string(),
                ));
            }
            self.inner.connect().await
        })
    }

    fn disconnect(&self) -> BackendFuture<'_, ()> {
        Box::pin(async move { self.inner.disconnect().await })
    }

    fn zadd<'a>(&'a self, key: &'a str, score: i64, member: Bytes) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.record(|s| s.zadd_attempts += 1);
            self.before_command("ZADD").await?;
            if self.roll(self.config.zadd_fail_prob) {
                self.record(|s| s.zadd_failures += 1);
                return Err(BackendError::Rejected {
                    command: "ZADD",
                    reason: "simulated write failure".to_string(),
                });
            }
            self.inner.zadd(key, score, member).await
        })
    }

    fn set_ex<'a>(&'a self, key: &'a str, value: Bytes, ttl: Duration) -> BackendFuture<'a, ()> {
        Box::pin(async move {
            self.record(|s| s.set_attempts += 1);
            self.before_command("SET").await?;
            if self.roll(self.config.set_fail_prob) {
                self.record(|s| s.set_failures += 1);
                return Err(BackendError::Rejected {
                    command: "SET",
                    reason: "simulated write failure".to_string(),
                });
            }
            self.inner.set_ex(key, value, ttl).await
        })
    }

    fn get<'a>(&'a self, key: &'a str) -> BackendFuture<'a, Option<Bytes>> {
        Box::pin(async move {
            self.record(|s| s.get_attempts += 1);
            self.before_command("GET").await?;
            if self.roll(self.config.get_fail_prob) {
                self.record(|s| s.get_failures += 1);
                return Err(BackendError::Rejected {
                    command: "GET",
                    reason: "simulated read failure".to_string(),
                });
            }

            let value = self.inner.get(key).await?;
            match value {
                Some(data) if self.roll(self.config.get_corrupt_prob) => {
                    self.record(|s| s.get_corruptions += 1);
                    Ok(Some(self.damage(data)))
                }
                other => Ok(other),
            }
        })
    }

    fn zrange_by_score<'a>(
        &'a self,
        key: &'a str,
        min: i64,
        max: i64,
    ) -> BackendFuture<'a, Vec<Bytes>> {
        Box::pin(async move {
            self.record(|s| s.range_attempts += 1);
            self.before_command("ZRANGEBYSCORE").await?;
            if self.roll(self.config.range_fail_prob) {
                self.record(|s| s.range_failures += 1);
                return Err(BackendError::Rejected {
                    command: "ZRANGEBYSCORE",
                    reason: "simulated read failure".to_string(),
                });
            }

            let mut members = self.inner.zrange_by_score(key, min, max).await?;
            if !members.is_empty() && self.roll(self.config.range_corrupt_prob) {
                self.record(|s| s.range_corruptions += 1);
                let idx = self.state.lock().rng.gen_range(0, members.len() as u64) as usize;
                let damaged = self.damage(members[idx].clone());
                members[idx] = damaged;
            }
            Ok(members)
        })
    }
}
