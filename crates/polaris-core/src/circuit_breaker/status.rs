//! Per-instance per-strategy breaker record shared by every strategy in
//! the chain.
//!
//! Every field is updated with an atomic read-modify-write; state
//! transitions are CAS-guarded on the expected prior state so a
//! transition out of any state is linearized — exactly one concurrent
//! caller observes success, matching §3's "at most once per admission
//! cycle" invariant.

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CircuitState {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl CircuitState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Closed,
            1 => Self::Open,
            2 => Self::HalfOpen,
            other => unreachable!("invalid circuit state encoding: {other}"),
        }
    }
}

pub struct ErrorCountStatus {
    state: AtomicU8,
    pub(super) error_count: AtomicU32,
    pub(super) success_count: AtomicU32,
    pub(super) last_update_time: AtomicU64,
}

impl Default for ErrorCountStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorCountStatus {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(CircuitState::Closed as u8),
            error_count: AtomicU32::new(0),
            success_count: AtomicU32::new(0),
            last_update_time: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> CircuitState {
        CircuitState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::Acquire)
    }

    pub fn success_count(&self) -> u32 {
        self.success_count.load(Ordering::Acquire)
    }

    pub fn last_update_time(&self) -> u64 {
        self.last_update_time.load(Ordering::Acquire)
    }

    pub(super) fn try_transition(&self, from: CircuitState, to: CircuitState) -> bool {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(super) fn reset_counts(&self) {
        self.error_count.store(0, Ordering::Release);
        self.success_count.store(0, Ordering::Release);
    }

    /// Shared HalfOpen admission rule (§4.6.1/§4.6.2 — identical across
    /// strategies). A failure that pushes `error_count` past the recovery
    /// budget (`request_count_after_half_open - success_count_after_half_open`)
    /// flips back to Open immediately; a success only advances the
    /// counter, since closing needs a full sweep to confirm (see `sweep`).
    pub(super) fn admit_half_open(
        &self,
        is_failure: bool,
        request_count_after_half_open: u32,
        success_count_after_half_open: u32,
        now_ms: u64,
    ) {
        if is_failure {
            let count = self.error_count.fetch_add(1, Ordering::AcqRel) + 1;
            let budget = request_count_after_half_open.saturating_sub(success_count_after_half_open);
            if count > budget && self.try_transition(CircuitState::HalfOpen, CircuitState::Open) {
                self.reset_counts();
                self.last_update_time.store(now_ms, Ordering::Release);
            }
        } else {
            self.success_count.fetch_add(1, Ordering::AcqRel);
        }
    }

    /// Shared scheduled sweep: Open -> HalfOpen once the sleep window has
    /// elapsed, and HalfOpen -> Closed/Open once the admission budget has
    /// resolved one way or the other.
    pub(super) fn sweep(
        &self,
        request_count_after_half_open: u32,
        success_count_after_half_open: u32,
        half_open_sleep_window_ms: u64,
        now_ms: u64,
    ) {
        match self.state() {
            CircuitState::Open => {
                let last = self.last_update_time();
                if now_ms.saturating_sub(last) >= half_open_sleep_window_ms
                    && self.try_transition(CircuitState::Open, CircuitState::HalfOpen)
                {
                    self.reset_counts();
                    self.last_update_time.store(now_ms, Ordering::Release);
                }
            }
            CircuitState::HalfOpen => {
                let success = self.success_count();
                let error = self.error_count();
                if success >= success_count_after_half_open {
                    if self.try_transition(CircuitState::HalfOpen, CircuitState::Closed) {
                        self.reset_counts();
                        self.last_update_time.store(now_ms, Ordering::Release);
                    }
                } else if success + error >= request_count_after_half_open
                    && self.try_transition(CircuitState::HalfOpen, CircuitState::Open)
                {
                    self.reset_counts();
                    self.last_update_time.store(now_ms, Ordering::Release);
                }
            }
            CircuitState::Closed => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_status_starts_closed_and_zeroed() {
        let status = ErrorCountStatus::new();
        assert_eq!(status.state(), CircuitState::Closed);
        assert_eq!(status.error_count(), 0);
        assert_eq!(status.success_count(), 0);
        assert_eq!(status.last_update_time(), 0);
    }

    #[test]
    fn try_transition_only_succeeds_from_expected_state() {
        let status = ErrorCountStatus::new();
        assert!(!status.try_transition(CircuitState::Open, CircuitState::HalfOpen));
        assert!(status.try_transition(CircuitState::Closed, CircuitState::Open));
        assert_eq!(status.state(), CircuitState::Open);
        // A second attempt from the now-stale "Closed" expectation fails.
        assert!(!status.try_transition(CircuitState::Closed, CircuitState::Open));
    }

    #[test]
    fn sweep_opens_half_open_after_sleep_window() {
        let status = ErrorCountStatus::new();
        status.try_transition(CircuitState::Closed, CircuitState::Open);
        status.last_update_time.store(0, Ordering::Release);
        status.sweep(3, 2, 10_000, 5_000);
        assert_eq!(status.state(), CircuitState::Open, "sleep window not yet elapsed");
        status.sweep(3, 2, 10_000, 10_000);
        assert_eq!(status.state(), CircuitState::HalfOpen);
    }

    #[test]
    fn admit_half_open_success_closes_only_after_sweep() {
        let status = ErrorCountStatus::new();
        status.try_transition(CircuitState::Closed, CircuitState::Open);
        status.sweep(3, 2, 0, 0);
        assert_eq!(status.state(), CircuitState::HalfOpen);

        status.admit_half_open(false, 3, 2, 0);
        status.admit_half_open(false, 3, 2, 0);
        assert_eq!(status.state(), CircuitState::HalfOpen, "closing waits for the sweep");

        status.sweep(3, 2, 0, 0);
        assert_eq!(status.state(), CircuitState::Closed);
        assert_eq!(status.error_count(), 0);
        assert_eq!(status.success_count(), 0);
    }

    #[test]
    fn admit_half_open_failure_past_budget_reopens_immediately() {
        let status = ErrorCountStatus::new();
        status.try_transition(CircuitState::Closed, CircuitState::Open);
        status.sweep(3, 2, 0, 0);
        assert_eq!(status.state(), CircuitState::HalfOpen);

        // budget = request(3) - success(2) = 1 allowed failure.
        status.admit_half_open(true, 3, 2, 100);
        assert_eq!(status.state(), CircuitState::HalfOpen);
        status.admit_half_open(true, 3, 2, 200);
        assert_eq!(status.state(), CircuitState::Open);
        assert_eq!(status.last_update_time(), 200);
    }
}
