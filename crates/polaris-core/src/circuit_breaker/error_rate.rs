//! Error-rate strategy (§4.6.2, supplemented from the original
//! implementation's sibling `ErrorRateCircuitBreaker`): opens once a
//! sliding window of recent calls both clears a minimum volume and its
//! failure fraction crosses a configured threshold. Recovery (Open ->
//! HalfOpen -> Closed/Open) is identical to [`super::error_count`]'s rule,
//! since both share the admission-budget half-open semantics — only the
//! Closed-state trigger differs.

use std::sync::Arc;

use parking_lot::Mutex;

use super::status::{CircuitState, ErrorCountStatus};
use super::CircuitBreakerStrategy;
use crate::model::InstanceGauge;
use crate::rcu::RcuMap;

#[derive(Debug, Clone, Copy)]
pub struct ErrorRateConfig {
    pub request_volume_threshold: u32,
    pub error_rate_threshold: f64,
    pub metric_num_buckets: usize,
    pub metric_bucket_time_ms: u64,
    pub request_count_after_half_open: u32,
    pub success_count_after_half_open: u32,
    pub half_open_sleep_window_ms: u64,
    pub metric_expired_time_ms: u64,
}

impl Default for ErrorRateConfig {
    fn default() -> Self {
        Self {
            request_volume_threshold: 10,
            error_rate_threshold: 0.5,
            metric_num_buckets: 10,
            metric_bucket_time_ms: 1000,
            request_count_after_half_open: 10,
            success_count_after_half_open: 8,
            half_open_sleep_window_ms: 30_000,
            metric_expired_time_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct Bucket {
    success: u32,
    error: u32,
}

struct Buckets {
    slots: Vec<Bucket>,
    current_index: usize,
    bucket_start_time: u64,
}

impl Buckets {
    fn new(num_buckets: usize) -> Self {
        Self {
            slots: vec![Bucket::default(); num_buckets.max(1)],
            current_index: 0,
            bucket_start_time: 0,
        }
    }

    /// Rotates forward to the bucket covering `now_ms`, zeroing every
    /// bucket the rotation skips over (so a quiet window doesn't leave
    /// stale counts behind once traffic resumes).
    fn rotate(&mut self, now_ms: u64, bucket_time_ms: u64) {
        if bucket_time_ms == 0 {
            return;
        }
        let elapsed_buckets = now_ms.saturating_sub(self.bucket_start_time) / bucket_time_ms;
        if elapsed_buckets == 0 {
            return;
        }
        let len = self.slots.len();
        let steps = elapsed_buckets.min(len as u64) as usize;
        for _ in 0..steps {
            self.current_index = (self.current_index + 1) % len;
            self.slots[self.current_index] = Bucket::default();
        }
        self.bucket_start_time += elapsed_buckets * bucket_time_ms;
    }

    fn record(&mut self, is_failure: bool) {
        let bucket = &mut self.slots[self.current_index];
        if is_failure {
            bucket.error += 1;
        } else {
            bucket.success += 1;
        }
    }

    fn totals(&self) -> (u32, u32) {
        self.slots.iter().fold((0u32, 0u32), |(t, e), b| (t + b.success + b.error, e + b.error))
    }

    fn clear(&mut self) {
        for b in &mut self.slots {
            *b = Bucket::default();
        }
    }
}

/// Combines the shared Open/HalfOpen breaker record with the rate
/// strategy's own bucketed call history.
pub struct ErrorRateStatus {
    breaker: ErrorCountStatus,
    buckets: Mutex<Buckets>,
}

impl ErrorRateStatus {
    fn new(num_buckets: usize) -> Self {
        Self { breaker: ErrorCountStatus::new(), buckets: Mutex::new(Buckets::new(num_buckets)) }
    }

    pub fn state(&self) -> CircuitState {
        self.breaker.state()
    }

    pub fn success_count(&self) -> u32 {
        self.breaker.success_count()
    }

    pub fn error_count(&self) -> u32 {
        self.breaker.error_count()
    }

    pub fn last_update_time(&self) -> u64 {
        self.breaker.last_update_time()
    }
}

pub struct ErrorRateStrategy {
    config: ErrorRateConfig,
    statuses: RcuMap<String, ErrorRateStatus>,
}

impl ErrorRateStrategy {
    pub fn new(config: ErrorRateConfig) -> Self {
        Self { config, statuses: RcuMap::new() }
    }

    pub fn get_or_create_status(&self, instance_id: &str) -> Arc<ErrorRateStatus> {
        let num_buckets = self.config.metric_num_buckets;
        self.statuses
            .create_or_get(instance_id.to_string(), move || ErrorRateStatus::new(num_buckets))
    }

    pub fn clean_status(&self, now_ms: u64, instance_exists: impl Fn(&str) -> bool) {
        let expiry = self.config.metric_expired_time_ms;
        self.statuses.retain(|instance_id, status| {
            let idle = now_ms.saturating_sub(status.last_update_time());
            idle < expiry || instance_exists(instance_id)
        });
    }
}

impl CircuitBreakerStrategy for ErrorRateStrategy {
    fn name(&self) -> &'static str {
        "errorRate"
    }

    fn real_time_circuit_break(&self, instance_id: &str, gauge: InstanceGauge) {
        let status = self.get_or_create_status(instance_id);
        let now = crate::time::now_ms();
        match status.breaker.state() {
            CircuitState::Closed => {
                let mut buckets = status.buckets.lock();
                buckets.rotate(now, self.config.metric_bucket_time_ms);
                buckets.record(gauge.report.is_failure());
                let (total, errors) = buckets.totals();
                if total >= self.config.request_volume_threshold {
                    let rate = errors as f64 / total as f64;
                    if rate >= self.config.error_rate_threshold
                        && status.breaker.try_transition(CircuitState::Closed, CircuitState::Open)
                    {
                        buckets.clear();
                        status.breaker.last_update_time.store(now, std::sync::atomic::Ordering::Release);
                        tracing::debug!(
                            instance_id,
                            from = "closed",
                            to = "open",
                            rate,
                            total,
                            "errorRate breaker opened"
                        );
                    }
                }
            }
            CircuitState::Open => {}
            CircuitState::HalfOpen => status.breaker.admit_half_open(
                gauge.report.is_failure(),
                self.config.request_count_after_half_open,
                self.config.success_count_after_half_open,
                now,
            ),
        }
    }

    fn timing_circuit_break(&self, instance_id: &str) {
        let Some(status) = self.statuses.get(&instance_id.to_string()) else { return };
        status.breaker.sweep(
            self.config.request_count_after_half_open,
            self.config.success_count_after_half_open,
            self.config.half_open_sleep_window_ms,
            crate::time::now_ms(),
        );
    }

    fn clean_status(&self, now_ms: u64, instance_exists: &dyn Fn(&str) -> bool) {
        ErrorRateStrategy::clean_status(self, now_ms, instance_exists)
    }

    fn state_of(&self, instance_id: &str) -> Option<CircuitState> {
        self.status_of_rate(instance_id).map(|s| s.state())
    }
}

impl ErrorRateStrategy {
    /// Typed accessor for callers that need the full rate-strategy record
    /// (bucket state included), not just the breaker state `state_of` on
    /// the trait exposes.
    pub fn status_of_rate(&self, instance_id: &str) -> Option<Arc<ErrorRateStatus>> {
        self.statuses.get(&instance_id.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ReportCode;

    fn strategy() -> ErrorRateStrategy {
        ErrorRateStrategy::new(ErrorRateConfig {
            request_volume_threshold: 10,
            error_rate_threshold: 0.5,
            metric_num_buckets: 1,
            metric_bucket_time_ms: 1000,
            request_count_after_half_open: 3,
            success_count_after_half_open: 2,
            half_open_sleep_window_ms: 10_000,
            metric_expired_time_ms: 60_000,
        })
    }

    fn report(s: &ErrorRateStrategy, id: &str, code: ReportCode) {
        s.real_time_circuit_break(id, InstanceGauge::new(code, 1));
    }

    // S7 — opens on rate, not raw count.
    #[test]
    fn s7_opens_on_rate_crossing_threshold() {
        crate::time::enable_fake_clock(0);
        let s = strategy();
        for _ in 0..4 {
            report(&s, "i1", ReportCode::Error);
        }
        for _ in 0..6 {
            report(&s, "i1", ReportCode::Ok);
        }
        assert_eq!(s.status_of_rate("i1").unwrap().state(), CircuitState::Closed);

        report(&s, "i1", ReportCode::Error); // 11 calls, 5 errors, 0.4545
        assert_eq!(s.status_of_rate("i1").unwrap().state(), CircuitState::Closed);

        report(&s, "i1", ReportCode::Error); // 12 calls, 6 errors, 0.5
        assert_eq!(s.status_of_rate("i1").unwrap().state(), CircuitState::Open);
        crate::time::disable_fake_clock();
    }

    #[test]
    fn below_volume_threshold_never_opens_regardless_of_rate() {
        let s = strategy();
        for _ in 0..9 {
            report(&s, "i1", ReportCode::Error);
        }
        assert_eq!(s.status_of_rate("i1").unwrap().state(), CircuitState::Closed);
    }

    #[test]
    fn half_open_recovery_matches_error_count_rule() {
        crate::time::enable_fake_clock(0);
        let s = strategy();
        for _ in 0..10 {
            report(&s, "i1", ReportCode::Error);
        }
        assert_eq!(s.status_of_rate("i1").unwrap().state(), CircuitState::Open);

        crate::time::advance_fake_clock(10_000);
        s.timing_circuit_break("i1");
        assert_eq!(s.status_of_rate("i1").unwrap().state(), CircuitState::HalfOpen);

        report(&s, "i1", ReportCode::Ok);
        report(&s, "i1", ReportCode::Ok);
        s.timing_circuit_break("i1");
        assert_eq!(s.status_of_rate("i1").unwrap().state(), CircuitState::Closed);
        crate::time::disable_fake_clock();
    }

    #[test]
    fn bucket_rotation_clears_expired_counts() {
        crate::time::enable_fake_clock(0);
        let s = ErrorRateStrategy::new(ErrorRateConfig {
            metric_num_buckets: 2,
            metric_bucket_time_ms: 1000,
            request_volume_threshold: 100,
            ..Default::default()
        });
        report(&s, "i1", ReportCode::Error);
        crate::time::advance_fake_clock(5000); // well past both buckets' width
        report(&s, "i1", ReportCode::Ok);
        let status = s.status_of_rate("i1").unwrap();
        let (total, errors) = status.buckets.lock().totals();
        assert_eq!(total, 1, "rotation should have cleared the stale error");
        assert_eq!(errors, 0);
        crate::time::disable_fake_clock();
    }
}
