//! Presence registry and live-location fan-out.
//!
//! In-memory assertion of which drivers are connected, where they are and
//! what they are doing. The registry is process-local soft state: the store
//! keeps the durable last-known values, the registry answers the hot
//! queries (broadcasts, nearby lookups, staleness sweeps).
//!
//! Entries follow a single-writer convention: one connection owns a
//! driver's entry, and a later registration simply replaces it.

pub mod sweeper;

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use crate::gateway::{Gateway, SessionId};
use crate::ports::clock::Clock;
use crate::types::enums::{DriverStatus, VehicleType};
use crate::types::events::{DriverLocation, OutboundEvent};
use crate::types::primitives::{DriverId, GeoPoint, RideId};

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRIES
// ═══════════════════════════════════════════════════════════════════════════════

/// One online driver's soft state.
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    /// Owning connection.
    pub session: SessionId,
    /// Last reported position.
    pub location: GeoPoint,
    /// Authoritative vehicle type (re-read from the store at registration).
    pub vehicle_type: VehicleType,
    /// Current availability.
    pub status: DriverStatus,
    /// Whether the driver counts as online.
    pub is_online: bool,
    /// Monotonic time of the last report.
    pub last_update: Duration,
}

/// Tracking record for a passenger sending in-ride locations.
#[derive(Debug, Clone)]
struct UserTrack {
    ride_id: RideId,
    last_update: Duration,
}

/// What one sweep pass changed.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Drivers newly treated as offline; the caller persists their status.
    pub went_offline: Vec<DriverId>,
    /// Presence entries evicted outright.
    pub evicted: usize,
    /// Passenger tracking entries evicted.
    pub user_tracks_evicted: usize,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRESENCE REGISTRY
// ═══════════════════════════════════════════════════════════════════════════════

/// Process-wide map of online drivers and tracked passengers.
pub struct PresenceRegistry {
    entries: DashMap<DriverId, PresenceEntry>,
    user_tracks: DashMap<String, UserTrack>,
    clock: Arc<dyn Clock>,
    /// A driver silent this long is treated as offline.
    offline_after: Duration,
    /// An offline entry this old is evicted.
    evict_after: Duration,
    /// A passenger track this old is evicted.
    user_track_ttl: Duration,
}

impl std::fmt::Debug for PresenceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceRegistry")
            .field("drivers", &self.entries.len())
            .field("user_tracks", &self.user_tracks.len())
            .finish_non_exhaustive()
    }
}

impl PresenceRegistry {
    /// Create a registry with the given staleness deadlines.
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        offline_after: Duration,
        evict_after: Duration,
        user_track_ttl: Duration,
    ) -> Self {
        Self {
            entries: DashMap::new(),
            user_tracks: DashMap::new(),
            clock,
            offline_after,
            evict_after,
            user_track_ttl,
        }
    }

    /// Insert or replace a driver's entry at registration time.
    pub fn upsert(
        &self,
        driver_id: DriverId,
        session: SessionId,
        location: GeoPoint,
        vehicle_type: VehicleType,
        status: DriverStatus,
    ) {
        self.entries.insert(
            driver_id,
            PresenceEntry {
                session,
                location,
                vehicle_type,
                status,
                is_online: true,
                last_update: self.clock.monotonic(),
            },
        );
    }

    /// Record a position report.
    pub fn update_location(
        &self,
        driver_id: &DriverId,
        location: GeoPoint,
        status: Option<DriverStatus>,
    ) {
        if let Some(mut entry) = self.entries.get_mut(driver_id) {
            entry.location = location;
            entry.is_online = true;
            entry.last_update = self.clock.monotonic();
            if let Some(status) = status {
                entry.status = status;
            }
        }
    }

    /// Refresh the freshness stamp without a position change (heartbeat).
    pub fn touch(&self, driver_id: &DriverId) {
        if let Some(mut entry) = self.entries.get_mut(driver_id) {
            entry.is_online = true;
            entry.last_update = self.clock.monotonic();
        }
    }

    /// Record a status change (go-online, accept, complete, go-offline).
    pub fn mark_status(&self, driver_id: &DriverId, status: DriverStatus) {
        if let Some(mut entry) = self.entries.get_mut(driver_id) {
            entry.status = status;
            entry.is_online = status != DriverStatus::Offline;
            entry.last_update = self.clock.monotonic();
        }
    }

    /// One driver's entry, if present.
    #[must_use]
    pub fn get(&self, driver_id: &DriverId) -> Option<PresenceEntry> {
        self.entries.get(driver_id).map(|e| e.clone())
    }

    /// Positions of drivers online and fresh within `max_age`.
    #[must_use]
    pub fn online_snapshot(&self, max_age: Duration) -> Vec<DriverLocation> {
        let now = self.clock.monotonic();
        self.entries
            .iter()
            .filter(|e| e.is_online && now.saturating_sub(e.last_update) <= max_age)
            .map(|e| DriverLocation {
                driver_id: e.key().clone(),
                lat: e.location.lat,
                lng: e.location.lng,
                vehicle_type: e.vehicle_type,
                status: e.status,
            })
            .collect()
    }

    /// Online drivers within `radius_km` of a point, optionally filtered by
    /// vehicle type.
    #[must_use]
    pub fn nearby(
        &self,
        center: GeoPoint,
        radius_km: f64,
        vehicle_type: Option<VehicleType>,
    ) -> Vec<DriverLocation> {
        self.online_snapshot(self.offline_after)
            .into_iter()
            .filter(|d| vehicle_type.is_none_or(|vt| vt == d.vehicle_type))
            .filter(|d| center.distance_km_to(&GeoPoint::new(d.lat, d.lng)) <= radius_km)
            .collect()
    }

    /// Begin (or refresh) tracking of a passenger's in-ride locations.
    pub fn track_user(&self, user_id: &str, ride_id: RideId) {
        self.user_tracks.insert(
            user_id.to_string(),
            UserTrack {
                ride_id,
                last_update: self.clock.monotonic(),
            },
        );
    }

    /// The ride a tracked passenger is on, if any.
    #[must_use]
    pub fn tracked_ride(&self, user_id: &str) -> Option<RideId> {
        self.user_tracks.get(user_id).map(|t| t.ride_id.clone())
    }

    /// Broadcast the bulk position snapshot to every connected session.
    pub fn broadcast_once(&self, gateway: &Gateway) {
        let drivers = self.online_snapshot(self.offline_after);
        gateway.emit_all(&OutboundEvent::DriverLocationsUpdate(drivers));
    }

    /// Apply the staleness rules once.
    ///
    /// 1. Silent past `offline_after` → flagged offline (caller persists)
    /// 2. Offline and silent past `evict_after` → entry evicted
    /// 3. Passenger tracks past their TTL → evicted
    #[must_use]
    pub fn sweep(&self) -> SweepOutcome {
        let now = self.clock.monotonic();
        let mut outcome = SweepOutcome::default();

        for mut entry in self.entries.iter_mut() {
            let age = now.saturating_sub(entry.last_update);
            if entry.is_online && age > self.offline_after {
                entry.is_online = false;
                entry.status = DriverStatus::Offline;
                outcome.went_offline.push(entry.key().clone());
            }
        }

        let before = self.entries.len();
        self.entries.retain(|_, entry| {
            let age = now.saturating_sub(entry.last_update);
            entry.is_online || age <= self.evict_after
        });
        outcome.evicted = before - self.entries.len();

        let tracks_before = self.user_tracks.len();
        self.user_tracks
            .retain(|_, track| now.saturating_sub(track.last_update) <= self.user_track_ttl);
        outcome.user_tracks_evicted = tracks_before - self.user_tracks.len();

        outcome
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::clock::FakeClock;

    fn registry() -> (PresenceRegistry, Arc<FakeClock>, Arc<Gateway>) {
        let clock = Arc::new(FakeClock::now_fake());
        let gateway = Arc::new(Gateway::new());
        let registry = PresenceRegistry::new(
            clock.clone(),
            Duration::from_secs(60),
            Duration::from_secs(300),
            Duration::from_secs(1800),
        );
        (registry, clock, gateway)
    }

    fn seed(registry: &PresenceRegistry, gateway: &Gateway, id: &str, vt: VehicleType) {
        let (session, _rx) = gateway.register();
        registry.upsert(
            DriverId::new(id),
            session,
            GeoPoint::new(11.34, 77.72),
            vt,
            DriverStatus::Live,
        );
    }

    #[test]
    fn fresh_drivers_appear_in_snapshot() {
        let (registry, _clock, gateway) = registry();
        seed(&registry, &gateway, "DRV001", VehicleType::Bike);
        seed(&registry, &gateway, "DRV002", VehicleType::Taxi);

        let snapshot = registry.online_snapshot(Duration::from_secs(60));
        assert_eq!(snapshot.len(), 2);
    }

    #[test]
    fn stale_drivers_drop_out_of_snapshot() {
        let (registry, clock, gateway) = registry();
        seed(&registry, &gateway, "DRV001", VehicleType::Bike);

        clock.advance_secs(61);
        assert!(registry.online_snapshot(Duration::from_secs(60)).is_empty());

        // A heartbeat brings the driver back.
        registry.touch(&DriverId::new("DRV001"));
        assert_eq!(registry.online_snapshot(Duration::from_secs(60)).len(), 1);
    }

    #[test]
    fn sweep_marks_silent_drivers_offline_then_evicts() {
        let (registry, clock, gateway) = registry();
        seed(&registry, &gateway, "DRV001", VehicleType::Bike);

        clock.advance_secs(61);
        let outcome = registry.sweep();
        assert_eq!(outcome.went_offline, vec![DriverId::new("DRV001")]);
        assert_eq!(outcome.evicted, 0);
        assert_eq!(
            registry.get(&DriverId::new("DRV001")).map(|e| e.status),
            Some(DriverStatus::Offline)
        );

        // Another five silent minutes evicts the entry.
        clock.advance_secs(301);
        let outcome = registry.sweep();
        assert_eq!(outcome.evicted, 1);
        assert!(registry.get(&DriverId::new("DRV001")).is_none());
    }

    #[test]
    fn sweep_is_idempotent_on_offline_flagging() {
        let (registry, clock, gateway) = registry();
        seed(&registry, &gateway, "DRV001", VehicleType::Bike);

        clock.advance_secs(61);
        assert_eq!(registry.sweep().went_offline.len(), 1);
        // Second pass has nothing new to flag.
        assert!(registry.sweep().went_offline.is_empty());
    }

    #[test]
    fn nearby_filters_by_radius_and_type() {
        let (registry, _clock, gateway) = registry();
        seed(&registry, &gateway, "DRV001", VehicleType::Bike);

        let (session, _rx) = gateway.register();
        registry.upsert(
            DriverId::new("DRV_FAR"),
            session,
            GeoPoint::new(13.08, 80.27), // a different city
            VehicleType::Bike,
            DriverStatus::Live,
        );

        let near = registry.nearby(GeoPoint::new(11.34, 77.72), 5.0, None);
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].driver_id, DriverId::new("DRV001"));

        let taxis = registry.nearby(GeoPoint::new(11.34, 77.72), 5.0, Some(VehicleType::Taxi));
        assert!(taxis.is_empty());
    }

    #[test]
    fn user_tracks_expire() {
        let (registry, clock, _gateway) = registry();
        registry.track_user("user-1", RideId::from_sequence(1));
        assert!(registry.tracked_ride("user-1").is_some());

        clock.advance_secs(1801);
        let outcome = registry.sweep();
        assert_eq!(outcome.user_tracks_evicted, 1);
        assert!(registry.tracked_ride("user-1").is_none());
    }
}
