//! Deterministic randomness for fault injection and synthetic workloads

mod rng;

pub use rng::DeterministicRng;
