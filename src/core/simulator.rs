//! Bus Simulation Knobs
//!
//! Seedable randomness, wire latency and transient fault injection for the
//! simulated Modbus bus.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Shared random source.
///
/// Every random decision of a bus (seed values, drift, faults, synthetic CRCs)
/// draws from one of these, so a seeded bus replays identically.
#[derive(Debug, Clone)]
pub struct SimRng {
    inner: Arc<Mutex<StdRng>>,
}

impl SimRng {
    /// Deterministic source
    pub fn seeded(seed: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StdRng::seed_from_u64(seed))),
        }
    }

    /// Source seeded from the OS
    pub fn from_entropy() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StdRng::from_entropy())),
        }
    }

    /// Seeded when `seed` is given, OS entropy otherwise
    pub fn from_option(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }

    /// Uniform register value in [0, 65535]
    pub fn register_value(&self) -> u16 {
        self.inner.lock().gen()
    }

    /// Signed drift in [-max, max]
    pub fn drift(&self, max: u16) -> i32 {
        let max = i32::from(max);
        self.inner.lock().gen_range(-max..=max)
    }

    /// `true` with the given probability
    pub fn chance(&self, probability: f64) -> bool {
        if probability <= 0.0 {
            return false;
        }
        if probability >= 1.0 {
            return true;
        }
        self.inner.lock().gen_bool(probability)
    }

    /// Random 16-bit word
    pub fn word(&self) -> u16 {
        self.inner.lock().gen()
    }
}

impl Default for SimRng {
    fn default() -> Self {
        Self::from_entropy()
    }
}

/// Latency simulation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LatencyConfig {
    /// Base latency in ms
    pub base_ms: u64,
    /// Upper bound in ms, whatever the connection timeout says
    pub max_ms: u64,
}

impl Default for LatencyConfig {
    fn default() -> Self {
        Self {
            base_ms: 50,
            max_ms: 100,
        }
    }
}

/// Latency simulator
#[derive(Debug, Clone)]
pub struct LatencySimulator {
    config: LatencyConfig,
}

impl LatencySimulator {
    /// Create a simulator with the given bounds
    pub fn new(config: LatencyConfig) -> Self {
        Self { config }
    }

    /// Wire delay for one transaction.
    ///
    /// The base latency is capped by the connection timeout, when one was
    /// configured, and always by `max_ms`.
    pub fn delay(&self, timeout_ms: Option<u64>) -> Duration {
        let mut ms = self.config.base_ms.min(self.config.max_ms);
        if let Some(timeout) = timeout_ms {
            ms = ms.min(timeout);
        }
        Duration::from_millis(ms)
    }

    /// Apply latency simulation
    pub async fn apply(&self, timeout_ms: Option<u64>) {
        let delay = self.delay(timeout_ms);
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Transient fault injection
#[derive(Debug, Clone)]
pub struct FaultInjector {
    failure_probability: f64,
}

impl FaultInjector {
    /// Probabilities outside [0, 1] are clamped
    pub fn new(failure_probability: f64) -> Self {
        Self {
            failure_probability: failure_probability.clamp(0.0, 1.0),
        }
    }

    /// Failure probability after clamping to [0, 1]
    pub fn probability(&self) -> f64 {
        self.failure_probability
    }

    /// Decide whether the current transaction faults
    pub fn should_fail(&self, rng: &SimRng) -> bool {
        rng.chance(self.failure_probability)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_sources_agree() {
        let a = SimRng::seeded(7);
        let b = SimRng::seeded(7);
        let xs: Vec<u16> = (0..16).map(|_| a.register_value()).collect();
        let ys: Vec<u16> = (0..16).map(|_| b.register_value()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_drift_bounds() {
        let rng = SimRng::seeded(1);
        for _ in 0..1000 {
            let d = rng.drift(5);
            assert!((-5..=5).contains(&d));
        }
        assert_eq!(rng.drift(0), 0);
    }

    #[test]
    fn test_latency_capping() {
        let sim = LatencySimulator::new(LatencyConfig::default());
        assert_eq!(sim.delay(None), Duration::from_millis(50));
        assert_eq!(sim.delay(Some(20)), Duration::from_millis(20));
        assert_eq!(sim.delay(Some(500)), Duration::from_millis(50));

        let slow = LatencySimulator::new(LatencyConfig { base_ms: 400, max_ms: 100 });
        assert_eq!(slow.delay(None), Duration::from_millis(100));
    }

    #[test]
    fn test_fault_extremes() {
        let rng = SimRng::seeded(3);
        assert!(!FaultInjector::new(0.0).should_fail(&rng));
        assert!(FaultInjector::new(1.0).should_fail(&rng));
        assert_eq!(FaultInjector::new(4.0).probability(), 1.0);
    }
}
