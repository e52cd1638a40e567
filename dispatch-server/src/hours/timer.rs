//! Per-driver countdown wheel.
//!
//! The wheel holds the in-memory countdown for every armed driver and is
//! advanced one second at a time. It is deliberately free of I/O: each
//! tick returns the outcomes (warning due, expiry, persist due) and the
//! service performs the async side effects, so nothing here ever holds a
//! lock across an await point.

use dashmap::DashMap;

use crate::types::primitives::DriverId;

/// Warning boundaries in seconds-to-expiry, in firing order.
pub const WARNING_THRESHOLDS: [i64; 3] = [3600, 1800, 600];

/// Seconds added by an expiry auto-extension.
pub const AUTO_EXTENSION_SECONDS: i64 = 12 * 3600;

/// How many warning boundaries a remainder has already fallen past.
///
/// Used to normalize a stale persisted warning count when re-arming, so a
/// driver resuming deep into the warning zone skips the boundaries that lie
/// behind them instead of never reaching the ones ahead.
#[must_use]
pub fn warnings_already_past(remaining_seconds: i64) -> u8 {
    #[allow(clippy::cast_possible_truncation)]
    let past = WARNING_THRESHOLDS
        .iter()
        .filter(|t| remaining_seconds < **t)
        .count() as u8;
    past
}

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRIES & OUTCOMES
// ═══════════════════════════════════════════════════════════════════════════════

/// One armed driver's countdown state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerEntry {
    /// Seconds left.
    pub remaining_seconds: i64,
    /// Warnings already issued this shift (0–3).
    pub warnings_issued: u8,
    /// Ticks since the remainder was last persisted.
    pub ticks_since_persist: u64,
}

impl TimerEntry {
    /// Build an entry from persisted driver fields.
    #[must_use]
    pub const fn new(remaining_seconds: i64, warnings_issued: u8) -> Self {
        Self {
            remaining_seconds,
            warnings_issued,
            ticks_since_persist: 0,
        }
    }
}

/// What one driver's tick produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickOutcome {
    /// The driver.
    pub driver_id: DriverId,
    /// Seconds left after this tick.
    pub remaining_seconds: i64,
    /// A warning boundary was crossed: which warning (1–3) is now due.
    pub warning_due: Option<u8>,
    /// The countdown hit zero.
    pub expired: bool,
    /// The persistence cadence elapsed.
    pub persist_due: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TIMER WHEEL
// ═══════════════════════════════════════════════════════════════════════════════

/// Process-wide countdown map, advanced at one-second granularity.
#[derive(Debug)]
pub struct TimerWheel {
    entries: DashMap<DriverId, TimerEntry>,
    persist_every_ticks: u64,
}

impl TimerWheel {
    /// Create a wheel persisting remainders every `persist_every_ticks`
    /// seconds of run time.
    #[must_use]
    pub fn new(persist_every_ticks: u64) -> Self {
        Self {
            entries: DashMap::new(),
            persist_every_ticks: persist_every_ticks.max(1),
        }
    }

    /// Arm (or re-arm) a driver's countdown.
    pub fn arm(&self, driver_id: DriverId, entry: TimerEntry) {
        self.entries.insert(driver_id, entry);
    }

    /// Disarm a driver, returning the final state for persistence.
    pub fn disarm(&self, driver_id: &DriverId) -> Option<TimerEntry> {
        self.entries.remove(driver_id).map(|(_, entry)| entry)
    }

    /// Whether a driver is armed.
    #[must_use]
    pub fn is_armed(&self, driver_id: &DriverId) -> bool {
        self.entries.contains_key(driver_id)
    }

    /// A driver's current countdown state.
    #[must_use]
    pub fn get(&self, driver_id: &DriverId) -> Option<TimerEntry> {
        self.entries.get(driver_id).map(|e| e.clone())
    }

    /// Apply an expiry auto-extension in place.
    pub fn extend_after_expiry(&self, driver_id: &DriverId) {
        if let Some(mut entry) = self.entries.get_mut(driver_id) {
            entry.remaining_seconds += AUTO_EXTENSION_SECONDS;
            entry.warnings_issued = 0;
        }
    }

    /// Add purchased seconds in place, optionally resetting warnings.
    pub fn add_seconds(&self, driver_id: &DriverId, seconds: i64, reset_warnings: bool) {
        if let Some(mut entry) = self.entries.get_mut(driver_id) {
            entry.remaining_seconds += seconds;
            if reset_warnings {
                entry.warnings_issued = 0;
            }
        }
    }

    /// Mark a driver's remainder as persisted.
    pub fn mark_persisted(&self, driver_id: &DriverId) {
        if let Some(mut entry) = self.entries.get_mut(driver_id) {
            entry.ticks_since_persist = 0;
        }
    }

    /// Record that a warning was handed off for delivery.
    pub fn mark_warned(&self, driver_id: &DriverId, warning: u8) {
        if let Some(mut entry) = self.entries.get_mut(driver_id) {
            entry.warnings_issued = entry.warnings_issued.max(warning);
        }
    }

    /// Advance every armed countdown by one second.
    ///
    /// A warning fires exactly when the remainder lands on its boundary and
    /// it is the next warning in order; the strictly decreasing remainder
    /// makes each boundary fire at most once per shift, re-arms included.
    #[must_use]
    pub fn tick_all(&self) -> Vec<TickOutcome> {
        let mut outcomes = Vec::new();
        for mut entry in self.entries.iter_mut() {
            if entry.remaining_seconds <= 0 {
                // Already expired; the service is still deciding its fate.
                continue;
            }
            entry.remaining_seconds -= 1;
            entry.ticks_since_persist += 1;

            let next_warning = entry.warnings_issued + 1;
            let warning_due = WARNING_THRESHOLDS
                .get(usize::from(entry.warnings_issued))
                .is_some_and(|t| entry.remaining_seconds == *t)
                .then_some(next_warning);

            let expired = entry.remaining_seconds == 0;
            let persist_due = entry.ticks_since_persist >= self.persist_every_ticks;

            if warning_due.is_some() || expired || persist_due {
                outcomes.push(TickOutcome {
                    driver_id: entry.key().clone(),
                    remaining_seconds: entry.remaining_seconds,
                    warning_due,
                    expired,
                    persist_due,
                });
            }
        }
        outcomes
    }

    /// Number of armed drivers.
    #[must_use]
    pub fn armed_count(&self) -> usize {
        self.entries.len()
    }

    /// Ids of every armed driver.
    #[must_use]
    pub fn driver_ids(&self) -> Vec<DriverId> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn drv() -> DriverId {
        DriverId::new("DRV001")
    }

    #[test]
    fn warning_fires_exactly_on_boundary() {
        let wheel = TimerWheel::new(1_000_000);
        wheel.arm(drv(), TimerEntry::new(3602, 0));

        assert!(wheel.tick_all().is_empty(), "3601: nothing");

        let outcomes = wheel.tick_all();
        assert_eq!(outcomes.len(), 1, "3600: warning 1");
        assert_eq!(outcomes[0].warning_due, Some(1));
        assert_eq!(outcomes[0].remaining_seconds, 3600);
        wheel.mark_warned(&drv(), 1);

        assert!(wheel.tick_all().is_empty(), "3599: nothing again");
    }

    #[test]
    fn warnings_fire_in_order() {
        let wheel = TimerWheel::new(1_000_000);
        wheel.arm(drv(), TimerEntry::new(1801, 1));

        let outcomes = wheel.tick_all();
        assert_eq!(outcomes[0].warning_due, Some(2));
        wheel.mark_warned(&drv(), 2);

        // Jump near the third boundary.
        wheel.arm(drv(), TimerEntry::new(601, 2));
        let outcomes = wheel.tick_all();
        assert_eq!(outcomes[0].warning_due, Some(3));
    }

    #[test]
    fn rearm_does_not_refire_a_sent_warning() {
        let wheel = TimerWheel::new(1_000_000);
        // Paused right after warning 1 and resumed: warnings_issued = 1.
        wheel.arm(drv(), TimerEntry::new(3600, 1));
        let outcomes = wheel.tick_all();
        assert!(outcomes.is_empty(), "warning 1 must not repeat at 3599");
    }

    #[test]
    fn expiry_reported_at_zero() {
        let wheel = TimerWheel::new(1_000_000);
        wheel.arm(drv(), TimerEntry::new(1, 3));

        let outcomes = wheel.tick_all();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].expired);
        assert_eq!(outcomes[0].remaining_seconds, 0);

        // The wheel does not tick an expired entry again.
        assert!(wheel.tick_all().is_empty());
    }

    #[test]
    fn auto_extension_resumes_counting() {
        let wheel = TimerWheel::new(1_000_000);
        wheel.arm(drv(), TimerEntry::new(1, 3));
        let _ = wheel.tick_all();

        wheel.extend_after_expiry(&drv());
        let entry = wheel.get(&drv()).expect("armed");
        assert_eq!(entry.remaining_seconds, AUTO_EXTENSION_SECONDS);
        assert_eq!(entry.warnings_issued, 0);

        assert!(wheel.tick_all().is_empty(), "counting again, far from boundaries");
    }

    #[test]
    fn persist_cadence_reports() {
        let wheel = TimerWheel::new(3);
        wheel.arm(drv(), TimerEntry::new(50_000, 0));

        assert!(wheel.tick_all().is_empty());
        assert!(wheel.tick_all().is_empty());
        let outcomes = wheel.tick_all();
        assert_eq!(outcomes.len(), 1);
        assert!(outcomes[0].persist_due);

        wheel.mark_persisted(&drv());
        assert!(wheel.tick_all().is_empty(), "cadence restarts after persist");
    }

    #[test]
    fn past_boundary_count() {
        assert_eq!(warnings_already_past(40_000), 0);
        assert_eq!(warnings_already_past(3600), 0);
        assert_eq!(warnings_already_past(3000), 1);
        assert_eq!(warnings_already_past(700), 2);
        assert_eq!(warnings_already_past(300), 3);
    }

    #[test]
    fn disarm_returns_final_state() {
        let wheel = TimerWheel::new(1_000_000);
        wheel.arm(drv(), TimerEntry::new(30_000, 1));
        let _ = wheel.tick_all();

        let entry = wheel.disarm(&drv()).expect("was armed");
        assert_eq!(entry.remaining_seconds, 29_999);
        assert!(!wheel.is_armed(&drv()));
    }
}
