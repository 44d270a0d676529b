//! Circuit-breaker chain (C6): per-instance health state derived from
//! reported call outcomes, via pluggable strategies.

mod error_count;
mod error_rate;
mod status;

pub use error_count::ErrorCountStrategy;
pub use error_rate::ErrorRateStrategy;
pub use status::{CircuitState, ErrorCountStatus};

use std::sync::Arc;

use crate::model::InstanceGauge;
use crate::rcu::RcuMap;

/// A pluggable strategy driving one instance's breaker status from
/// telemetry (`real_time_circuit_break`) and from scheduled sweeps
/// (`timing_circuit_break`).
///
/// Strategies share the same [`ErrorCountStatus`] record shape; what
/// differs is the Closed-state trigger (consecutive failures vs. a
/// sliding error rate) and, for the rate strategy, the extra bucket
/// bookkeeping layered on top of it.
pub trait CircuitBreakerStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Ingests one telemetry record for `instance_id`.
    fn real_time_circuit_break(&self, instance_id: &str, gauge: InstanceGauge);

    /// Performs scheduled transitions (Open -> HalfOpen, HalfOpen ->
    /// Open/Closed) for `instance_id`. A no-op if the instance has no
    /// recorded status yet.
    fn timing_circuit_break(&self, instance_id: &str);

    /// Evicts per-instance status idle longer than the strategy's own
    /// expiry whose instance no longer exists (§4.6.3).
    fn clean_status(&self, now_ms: u64, instance_exists: &dyn Fn(&str) -> bool);

    /// The instance's current breaker state under this strategy, or
    /// `None` if no telemetry has been recorded for it yet — a strategy
    /// with no opinion reports the instance healthy by default.
    fn state_of(&self, instance_id: &str) -> Option<CircuitState>;
}

/// A service's set of circuit-breaker strategies, applied in order.
///
/// Mirrors a service owning a chain of strategy plugins, each maintaining
/// its own per-instance status records (kept separate rather than shared,
/// since an error-count strategy's open/half-open state is independent of
/// an error-rate strategy's).
pub struct CircuitBreakerChainData {
    strategies: Vec<Box<dyn CircuitBreakerStrategy>>,
}

impl CircuitBreakerChainData {
    pub fn new(strategies: Vec<Box<dyn CircuitBreakerStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn report(&self, instance_id: &str, gauge: InstanceGauge) {
        for strategy in &self.strategies {
            strategy.real_time_circuit_break(instance_id, gauge);
        }
    }

    pub fn sweep(&self, instance_id: &str) {
        for strategy in &self.strategies {
            strategy.timing_circuit_break(instance_id);
        }
    }

    /// Runs §4.6.3's `CleanStatus` across every strategy in the chain.
    pub fn clean_status(&self, now_ms: u64, instance_exists: &dyn Fn(&str) -> bool) {
        for strategy in &self.strategies {
            strategy.clean_status(now_ms, instance_exists);
        }
    }

    /// An instance is considered healthy only if every strategy in the
    /// chain agrees (none of them has it Open or HalfOpen).
    pub fn is_instance_healthy(&self, instance_id: &str) -> bool {
        self.strategies.iter().all(|s| {
            s.state_of(instance_id).map(|state| state == CircuitState::Closed).unwrap_or(true)
        })
    }
}

/// Per-service registry of [`CircuitBreakerChainData`], keyed by service
/// name and backed by the RCU map so lookups never block reporters.
pub struct InstancesCircuitBreakerStatus {
    chains: RcuMap<String, CircuitBreakerChainData>,
}

impl Default for InstancesCircuitBreakerStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl InstancesCircuitBreakerStatus {
    pub fn new() -> Self {
        Self { chains: RcuMap::new() }
    }

    pub fn get_or_create_chain(
        &self,
        service: &str,
        factory: impl FnOnce() -> CircuitBreakerChainData,
    ) -> Arc<CircuitBreakerChainData> {
        self.chains.create_or_get(service.to_string(), factory)
    }

    pub fn chain(&self, service: &str) -> Option<Arc<CircuitBreakerChainData>> {
        self.chains.get(&service.to_string())
    }

    pub fn remove_chain(&self, service: &str) {
        self.chains.delete(service.to_string());
    }
}
