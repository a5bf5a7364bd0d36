//! TSC clock for hot-path timing
//!
//! Reading the clock avoids a syscall per sample.

use once_cell::sync::Lazy;
use quanta::Clock;

/// Global TSC clock - zero syscall timestamp reads
pub static CLOCK: Lazy<Clock> = Lazy::new(Clock::new);

/// Get current TSC timestamp (zero syscalls)
#[inline]
pub fn now_tsc() -> u64 {
    CLOCK.raw()
}

/// Seconds elapsed between two raw TSC readings
#[inline]
pub fn elapsed_secs(start: u64, end: u64) -> f64 {
    CLOCK.delta(start, end).as_secs_f64()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_now_tsc_returns_increasing_values() {
        let t1 = now_tsc();
        let t2 = now_tsc();
        assert!(t2 >= t1, "TSC should be monotonic");
    }

    #[test]
    fn test_elapsed_secs_non_negative() {
        let start = now_tsc();
        std::thread::sleep(std::time::Duration::from_millis(1));
        let end = now_tsc();
        assert!(elapsed_secs(start, end) > 0.0);
    }
}
