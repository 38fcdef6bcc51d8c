use std::sync::atomic::{AtomicU64, Ordering};

use super::domain::ReputationEvent;

/// Injected throttle deciding which gained/lost events trigger an incremental
/// snapshot update. Replaces inline randomness so the policy is testable and
/// tunable.
pub trait SamplingPolicy: Send + Sync {
    fn should_sample(&self, event: &ReputationEvent) -> bool;
}

/// Deterministic counter-based policy: samples the 1st, (n+1)th, (2n+1)th…
/// event it sees. An interval of 10 approximates the historical 10% rate
/// while bounding snapshot write amplification.
#[derive(Debug)]
pub struct EveryNth {
    interval: u64,
    seen: AtomicU64,
}

impl EveryNth {
    pub fn new(interval: u64) -> Self {
        Self {
            interval: interval.max(1),
            seen: AtomicU64::new(0),
        }
    }
}

impl SamplingPolicy for EveryNth {
    fn should_sample(&self, _event: &ReputationEvent) -> bool {
        self.seen.fetch_add(1, Ordering::Relaxed) % self.interval == 0
    }
}

/// Sample every event. Used by the forced refresh path and in tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysSample;

impl SamplingPolicy for AlwaysSample {
    fn should_sample(&self, _event: &ReputationEvent) -> bool {
        true
    }
}

/// Sample nothing. Lets tests assert that the throttle is actually consulted.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverSample;

impl SamplingPolicy for NeverSample {
    fn should_sample(&self, _event: &ReputationEvent) -> bool {
        false
    }
}
