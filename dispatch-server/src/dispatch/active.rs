//! In-memory dispatch state: the active-ride cache and the booking dedup
//! map.
//!
//! Both are process-local soft state with explicit TTLs; the store remains
//! the source of truth and a restart only loses the dedup window and the
//! rejection mirror.

use std::time::Duration;

use dashmap::DashMap;

use crate::types::entities::{Rejection, Ride};
use crate::types::primitives::RideId;

// ═══════════════════════════════════════════════════════════════════════════════
// ACTIVE RIDES
// ═══════════════════════════════════════════════════════════════════════════════

/// A pending or accepted ride mirrored in memory.
#[derive(Debug, Clone)]
pub struct ActiveRide {
    /// Snapshot of the ride row.
    pub ride: Ride,
    /// Monotonic creation time, for TTL eviction.
    pub created_at: Duration,
}

/// Cache of rides currently being dispatched or served.
#[derive(Debug, Default)]
pub struct ActiveRides {
    map: DashMap<RideId, ActiveRide>,
}

impl ActiveRides {
    /// Create an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a ride snapshot.
    pub fn insert(&self, ride: Ride, now: Duration) {
        self.map.insert(
            ride.raid_id.clone(),
            ActiveRide {
                ride,
                created_at: now,
            },
        );
    }

    /// Refresh the snapshot after a lifecycle change, keeping the original
    /// creation stamp.
    pub fn refresh(&self, ride: Ride) {
        if let Some(mut entry) = self.map.get_mut(&ride.raid_id) {
            entry.ride = ride;
        }
    }

    /// Look up a snapshot.
    #[must_use]
    pub fn get(&self, raid_id: &RideId) -> Option<Ride> {
        self.map.get(raid_id).map(|e| e.ride.clone())
    }

    /// Record a driver's refusal in the mirror.
    pub fn record_rejection(&self, raid_id: &RideId, rejection: Rejection) {
        if let Some(mut entry) = self.map.get_mut(raid_id) {
            entry.ride.rejected_by.push(rejection);
        }
    }

    /// Drop a ride (completion, cancellation).
    pub fn remove(&self, raid_id: &RideId) {
        self.map.remove(raid_id);
    }

    /// Evict entries older than `ttl`; returns how many went.
    pub fn sweep(&self, now: Duration, ttl: Duration) -> usize {
        let before = self.map.len();
        self.map
            .retain(|_, entry| now.saturating_sub(entry.created_at) <= ttl);
        before - self.map.len()
    }

    /// Number of cached rides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEDUP MAP
// ═══════════════════════════════════════════════════════════════════════════════

/// Record of a recent fan-out.
#[derive(Debug, Clone)]
struct DedupEntry {
    raid_id: RideId,
    emitted_at: Duration,
}

/// Suppresses repeated `bookRide` submissions.
///
/// Keyed by a booking fingerprint (passenger + route + vehicle type): a
/// retried client submission carries no ride id yet, so the fingerprint is
/// what identifies "the same booking". The stored raid id lets the retry
/// answer with the id the first submission minted.
#[derive(Debug, Default)]
pub struct DedupMap {
    map: DashMap<String, DedupEntry>,
}

impl DedupMap {
    /// Create an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The raid id fanned out for this fingerprint within `window`, if any.
    #[must_use]
    pub fn recent(&self, fingerprint: &str, now: Duration, window: Duration) -> Option<RideId> {
        self.map.get(fingerprint).and_then(|entry| {
            if now.saturating_sub(entry.emitted_at) < window {
                Some(entry.raid_id.clone())
            } else {
                None
            }
        })
    }

    /// Record a fan-out.
    pub fn record(&self, fingerprint: String, raid_id: RideId, now: Duration) {
        self.map.insert(
            fingerprint,
            DedupEntry {
                raid_id,
                emitted_at: now,
            },
        );
    }

    /// Evict entries older than `ttl`; returns how many went.
    pub fn sweep(&self, now: Duration, ttl: Duration) -> usize {
        let before = self.map.len();
        self.map
            .retain(|_, entry| now.saturating_sub(entry.emitted_at) <= ttl);
        before - self.map.len()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dedup_hits_inside_window_only() {
        let dedup = DedupMap::new();
        let raid = RideId::from_sequence(1);
        dedup.record("fp".into(), raid.clone(), Duration::from_secs(100));

        assert_eq!(
            dedup.recent("fp", Duration::from_secs(103), Duration::from_secs(5)),
            Some(raid)
        );
        assert_eq!(
            dedup.recent("fp", Duration::from_secs(106), Duration::from_secs(5)),
            None
        );
        assert_eq!(
            dedup.recent("other", Duration::from_secs(103), Duration::from_secs(5)),
            None
        );
    }

    #[test]
    fn dedup_sweep_drops_old_entries() {
        let dedup = DedupMap::new();
        dedup.record("a".into(), RideId::from_sequence(1), Duration::from_secs(0));
        dedup.record("b".into(), RideId::from_sequence(2), Duration::from_secs(50));

        let evicted = dedup.sweep(Duration::from_secs(70), Duration::from_secs(60));
        assert_eq!(evicted, 1);
        assert!(
            dedup
                .recent("b", Duration::from_secs(52), Duration::from_secs(5))
                .is_some()
        );
    }
}
