//! Error-count strategy (§4.6.1): opens after `continuous_error_threshold`
//! consecutive reported failures, recovers through a half-open probation
//! window shared with [`super::error_rate::ErrorRateStrategy`].

use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::status::{CircuitState, ErrorCountStatus};
use super::CircuitBreakerStrategy;
use crate::model::InstanceGauge;
use crate::rcu::RcuMap;

#[derive(Debug, Clone, Copy)]
pub struct ErrorCountConfig {
    pub continuous_error_threshold: u32,
    pub request_count_after_half_open: u32,
    pub success_count_after_half_open: u32,
    pub half_open_sleep_window_ms: u64,
    pub metric_expired_time_ms: u64,
}

impl Default for ErrorCountConfig {
    fn default() -> Self {
        Self {
            continuous_error_threshold: 10,
            request_count_after_half_open: 10,
            success_count_after_half_open: 8,
            half_open_sleep_window_ms: 30_000,
            metric_expired_time_ms: 60_000,
        }
    }
}

pub struct ErrorCountStrategy {
    config: ErrorCountConfig,
    statuses: RcuMap<String, ErrorCountStatus>,
}

impl ErrorCountStrategy {
    pub fn new(config: ErrorCountConfig) -> Self {
        Self { config, statuses: RcuMap::new() }
    }

    pub fn get_or_create_status(&self, instance_id: &str) -> Arc<ErrorCountStatus> {
        self.statuses.create_or_get(instance_id.to_string(), ErrorCountStatus::new)
    }

    pub fn status_of(&self, instance_id: &str) -> Option<Arc<ErrorCountStatus>> {
        self.statuses.get(&instance_id.to_string())
    }

    /// Evicts per-instance status idle longer than `metric_expired_time_ms`
    /// whose instance no longer exists, per §4.6.3. Entries for instances
    /// that still exist are retained regardless of age.
    pub fn clean_status(&self, now_ms: u64, instance_exists: impl Fn(&str) -> bool) {
        let expiry = self.config.metric_expired_time_ms;
        self.statuses.retain(|instance_id, status| {
            let idle = now_ms.saturating_sub(status.last_update_time());
            idle < expiry || instance_exists(instance_id)
        });
    }
}

impl CircuitBreakerStrategy for ErrorCountStrategy {
    fn name(&self) -> &'static str {
        "errorCount"
    }

    fn real_time_circuit_break(&self, instance_id: &str, gauge: InstanceGauge) {
        let status = self.get_or_create_status(instance_id);
        let now = crate::time::now_ms();
        match status.state() {
            CircuitState::Closed => {
                if gauge.report.is_failure() {
                    let count = status.error_count.fetch_add(1, Ordering::AcqRel) + 1;
                    if count >= self.config.continuous_error_threshold
                        && status.try_transition(CircuitState::Closed, CircuitState::Open)
                    {
                        // Unlike Open->HalfOpen and HalfOpen->*, the Closed->Open
                        // edge does not reset counters (§4.6.1): error_count
                        // keeps the value that triggered the trip.
                        status.last_update_time.store(now, Ordering::Release);
                        tracing::debug!(
                            instance_id,
                            from = "closed",
                            to = "open",
                            error_count = count,
                            "errorCount breaker opened"
                        );
                    }
                } else {
                    status.error_count.store(0, Ordering::Release);
                }
            }
            CircuitState::Open => {
                // Telemetry observed but does not drive transitions here;
                // recovery is only decided by the scheduled sweep.
            }
            CircuitState::HalfOpen => status.admit_half_open(
                gauge.report.is_failure(),
                self.config.request_count_after_half_open,
                self.config.success_count_after_half_open,
                now,
            ),
        }
    }

    fn timing_circuit_break(&self, instance_id: &str) {
        let Some(status) = self.statuses.get(&instance_id.to_string()) else { return };
        status.sweep(
            self.config.request_count_after_half_open,
            self.config.success_count_after_half_open,
            self.config.half_open_sleep_window_ms,
            crate::time::now_ms(),
        );
    }

    fn clean_status(&self, now_ms: u64, instance_exists: &dyn Fn(&str) -> bool) {
        ErrorCountStrategy::clean_status(self, now_ms, instance_exists)
    }

    fn state_of(&self, instance_id: &str) -> Option<CircuitState> {
        self.status_of(instance_id).map(|s| s.state())
    }
}
