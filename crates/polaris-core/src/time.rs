//! Monotonic coarse millisecond clock (C1).
//!
//! Every other component reads time only through [`now_ms`]. Tests enable
//! the fake-clock hook via [`enable_fake_clock`] / [`advance_fake_clock`] so
//! timing-sensitive scenarios (circuit-breaker sleep windows, reactor
//! scheduling) are deterministic instead of racing the wall clock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;

static FAKE_CLOCK_ENABLED: AtomicBool = AtomicBool::new(false);
static FAKE_CLOCK_MS: AtomicU64 = AtomicU64::new(0);

fn real_now_ms() -> u64 {
    // `Instant` has no fixed epoch, so we anchor to process start once and
    // measure elapsed time from there. Monotonic, immune to wall-clock steps.
    static START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();
    let start = START.get_or_init(Instant::now);
    start.elapsed().as_millis() as u64
}

/// Returns the current monotonic time in milliseconds.
pub fn now_ms() -> u64 {
    if FAKE_CLOCK_ENABLED.load(Ordering::Acquire) {
        FAKE_CLOCK_MS.load(Ordering::Acquire)
    } else {
        real_now_ms()
    }
}

/// Switches the process to the fake clock, starting at `initial_ms`.
/// Intended for tests only; affects every caller of [`now_ms`] process-wide.
pub fn enable_fake_clock(initial_ms: u64) {
    FAKE_CLOCK_MS.store(initial_ms, Ordering::Release);
    FAKE_CLOCK_ENABLED.store(true, Ordering::Release);
}

/// Advances the fake clock by `delta_ms`. No-op if the fake clock is not
/// enabled.
pub fn advance_fake_clock(delta_ms: u64) {
    FAKE_CLOCK_MS.fetch_add(delta_ms, Ordering::AcqRel);
}

/// Reverts to the real monotonic clock. Intended for tests only.
pub fn disable_fake_clock() {
    FAKE_CLOCK_ENABLED.store(false, Ordering::Release);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Fake-clock state is process-global; serialize tests that touch it.
    static TEST_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn real_clock_is_monotonic() {
        let _g = TEST_LOCK.lock().unwrap();
        disable_fake_clock();
        let a = now_ms();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let b = now_ms();
        assert!(b >= a);
    }

    #[test]
    fn fake_clock_advances_deterministically() {
        let _g = TEST_LOCK.lock().unwrap();
        enable_fake_clock(1000);
        assert_eq!(now_ms(), 1000);
        advance_fake_clock(500);
        assert_eq!(now_ms(), 1500);
        disable_fake_clock();
    }
}
