//! Time port for testable time operations.
//!
//! Dispatch needs two notions of time: wall-clock timestamps for persisted
//! records, and a monotonic reading for presence ages, dedup windows and
//! sweep deadlines. The [`Clock`] trait carries both so tests can steer
//! them together.

use std::time::Duration;

use chrono::{DateTime, Utc};

// ═══════════════════════════════════════════════════════════════════════════════
// CLOCK
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for time operations.
///
/// Production uses [`SystemClock`]; tests use [`FakeClock`] to advance time
/// deterministically. Monotonic readings are durations since an arbitrary
/// process-local origin and must never decrease.
pub trait Clock: Send + Sync {
    /// Current UTC wall-clock time.
    fn now(&self) -> DateTime<Utc>;

    /// Monotonic reading since the clock's origin.
    fn monotonic(&self) -> Duration;

    /// Current unix timestamp in milliseconds.
    fn unix_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SYSTEM CLOCK (Production)
// ═══════════════════════════════════════════════════════════════════════════════

/// Production clock backed by the OS.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: std::time::Instant,
}

impl SystemClock {
    /// Create a clock whose monotonic origin is "now".
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic(&self) -> Duration {
        self.origin.elapsed()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FAKE CLOCK (Testing)
// ═══════════════════════════════════════════════════════════════════════════════

/// Controllable clock for deterministic tests.
///
/// `advance` moves the wall clock and the monotonic reading in lock-step,
/// which is what the sweep and dedup logic assumes of real time.
#[derive(Debug)]
pub struct FakeClock {
    /// Wall-clock time as unix millis.
    wall_millis: std::sync::atomic::AtomicI64,
    /// Monotonic reading in millis.
    mono_millis: std::sync::atomic::AtomicU64,
}

impl FakeClock {
    /// Create a fake clock at the specified wall-clock time.
    #[must_use]
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            wall_millis: std::sync::atomic::AtomicI64::new(start.timestamp_millis()),
            mono_millis: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Create a fake clock at the current time.
    #[must_use]
    pub fn now_fake() -> Self {
        Self::new(Utc::now())
    }

    /// Advance both readings by `duration`.
    pub fn advance(&self, duration: Duration) {
        let millis = u64::try_from(duration.as_millis()).unwrap_or(u64::MAX);
        self.wall_millis.fetch_add(
            i64::try_from(millis).unwrap_or(i64::MAX),
            std::sync::atomic::Ordering::SeqCst,
        );
        self.mono_millis
            .fetch_add(millis, std::sync::atomic::Ordering::SeqCst);
    }

    /// Advance both readings by whole seconds.
    pub fn advance_secs(&self, secs: u64) {
        self.advance(Duration::from_secs(secs));
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.wall_millis.load(std::sync::atomic::Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }

    fn monotonic(&self) -> Duration {
        Duration::from_millis(self.mono_millis.load(std::sync::atomic::Ordering::SeqCst))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.monotonic();
        let b = clock.monotonic();
        assert!(b >= a);
    }

    #[test]
    fn fake_clock_advances_both_readings() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).single().expect("valid");
        let clock = FakeClock::new(start);

        assert_eq!(clock.monotonic(), Duration::ZERO);

        clock.advance_secs(90);
        assert_eq!(clock.monotonic(), Duration::from_secs(90));
        assert_eq!(clock.now() - start, chrono::Duration::seconds(90));
    }

    #[test]
    fn fake_clock_unix_millis_tracks_wall_time() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).single().expect("valid");
        let clock = FakeClock::new(start);
        let before = clock.unix_millis();
        clock.advance(Duration::from_millis(1500));
        assert_eq!(clock.unix_millis() - before, 1500);
    }
}
