use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock abstraction used to stamp dosing cycles.
///
/// - now_ms(): milliseconds since the Unix epoch
/// - minute_of_hour(): helper derived from now_ms() (UTC)
pub trait Clock {
    fn now_ms(&self) -> i64;

    /// Minute within the current UTC hour, 0..=59.
    fn minute_of_hour(&self) -> u32 {
        minute_of_hour(self.now_ms())
    }
}

/// Minute within the UTC hour for an epoch-millisecond timestamp.
#[inline]
pub fn minute_of_hour(epoch_ms: i64) -> u32 {
    let minutes = epoch_ms.div_euclid(60_000);
    // rem_euclid keeps the result in 0..60 for pre-epoch timestamps too
    u32::try_from(minutes.rem_euclid(60)).unwrap_or(0)
}

/// Real clock backed by `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl SystemClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(d) => i64::try_from(d.as_millis()).unwrap_or(i64::MAX),
            Err(e) => -i64::try_from(e.duration().as_millis()).unwrap_or(i64::MAX),
        }
    }
}

/// Deterministic clock pinned to a given instant; can be moved manually.
///
/// Clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct FixedClock {
    now_ms: Arc<AtomicI64>,
}

impl FixedClock {
    pub fn new(now_ms: i64) -> Self {
        Self {
            now_ms: Arc::new(AtomicI64::new(now_ms)),
        }
    }

    /// Advance the clock by `ms` milliseconds.
    pub fn advance_ms(&self, ms: i64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }

    /// Pin the clock to an absolute instant.
    pub fn set_ms(&self, now_ms: i64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_ms(&self) -> i64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minute_of_hour_wraps() {
        assert_eq!(minute_of_hour(0), 0);
        assert_eq!(minute_of_hour(55 * 60_000 + 59_999), 55);
        assert_eq!(minute_of_hour(61 * 60_000), 1);
        assert_eq!(minute_of_hour(-60_000), 59);
    }

    #[test]
    fn fixed_clock_is_shared_between_clones() {
        let c = FixedClock::new(1_000);
        let c2 = c.clone();
        c.advance_ms(500);
        assert_eq!(c2.now_ms(), 1_500);
        c2.set_ms(42);
        assert_eq!(c.now_ms(), 42);
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock::new().now_ms() > 1_577_836_800_000);
    }
}
