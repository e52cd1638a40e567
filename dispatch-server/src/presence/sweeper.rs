//! Periodic staleness sweeper.
//!
//! One pass applies every TTL rule the soft state carries: silent drivers
//! go offline (persisted), long-dead presence entries are evicted, stale
//! active rides and dedup entries are dropped, passenger tracks expire and
//! the wallet idempotency cache is pruned.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, instrument, warn};

use crate::dispatch::{ActiveRides, DedupMap};
use crate::error::Result;
use crate::ports::clock::Clock;
use crate::ports::store::{DriverStore, Store};
use crate::presence::PresenceRegistry;
use crate::types::enums::DriverStatus;
use crate::wallet::WalletLedger;

// ═══════════════════════════════════════════════════════════════════════════════
// SWEEPER
// ═══════════════════════════════════════════════════════════════════════════════

/// Applies the staleness deadlines on a fixed cadence.
pub struct Sweeper {
    presence: Arc<PresenceRegistry>,
    active: Arc<ActiveRides>,
    dedup: Arc<DedupMap>,
    wallet: Arc<WalletLedger>,
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    active_ride_ttl: Duration,
    dedup_ttl: Duration,
}

impl std::fmt::Debug for Sweeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Sweeper").finish_non_exhaustive()
    }
}

impl Sweeper {
    /// Wire up the sweeper.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        presence: Arc<PresenceRegistry>,
        active: Arc<ActiveRides>,
        dedup: Arc<DedupMap>,
        wallet: Arc<WalletLedger>,
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        active_ride_ttl: Duration,
        dedup_ttl: Duration,
    ) -> Self {
        Self {
            presence,
            active,
            dedup,
            wallet,
            store,
            clock,
            active_ride_ttl,
            dedup_ttl,
        }
    }

    /// Run one sweep pass.
    ///
    /// # Errors
    ///
    /// Returns store failures from persisting offline statuses; the
    /// in-memory evictions have already happened by then and are not
    /// rolled back.
    #[instrument(skip(self))]
    pub async fn sweep_once(&self) -> Result<()> {
        let outcome = self.presence.sweep();

        for driver_id in &outcome.went_offline {
            if let Err(err) = self
                .store
                .set_driver_status(driver_id, DriverStatus::Offline)
                .await
            {
                warn!(driver_id = %driver_id, error = %err, "Failed to persist sweeper offline");
            }
        }

        let now = self.clock.monotonic();
        let rides_evicted = self.active.sweep(now, self.active_ride_ttl);
        let dedup_evicted = self.dedup.sweep(now, self.dedup_ttl);
        self.wallet.sweep();

        if !outcome.went_offline.is_empty() || rides_evicted > 0 || dedup_evicted > 0 {
            debug!(
                went_offline = outcome.went_offline.len(),
                presence_evicted = outcome.evicted,
                user_tracks_evicted = outcome.user_tracks_evicted,
                rides_evicted,
                dedup_evicted,
                "Sweep pass"
            );
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use uuid::Uuid;

    use super::*;
    use crate::gateway::Gateway;
    use crate::ports::clock::FakeClock;
    use crate::ports::store::DriverStore;
    use crate::store::MemoryStore;
    use crate::types::entities::Driver;
    use crate::types::enums::VehicleType;
    use crate::types::primitives::{Amount, DriverId, GeoPoint};

    fn driver(id: &str) -> Driver {
        Driver {
            id: Uuid::new_v4(),
            driver_id: DriverId::new(id),
            name: id.into(),
            phone: format!("9{id}"),
            vehicle_type: VehicleType::Bike,
            vehicle_number: String::new(),
            wallet: Amount::saturating(500),
            status: DriverStatus::Live,
            working_hours_limit: 12,
            deduction_amount: Amount::saturating(100),
            remaining_working_seconds: 0,
            timer_active: false,
            warnings_issued: 0,
            extended_hours_purchased: false,
            last_location: None,
            push_token: None,
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn silent_driver_is_persisted_offline() {
        let clock = Arc::new(FakeClock::now_fake());
        let store = Arc::new(MemoryStore::new());
        store.seed_driver(driver("DRV001"));

        let gateway = Arc::new(Gateway::new());
        let presence = Arc::new(PresenceRegistry::new(
            clock.clone(),
            Duration::from_secs(60),
            Duration::from_secs(300),
            Duration::from_secs(1800),
        ));
        let (session, _rx) = gateway.register();
        presence.upsert(
            DriverId::new("DRV001"),
            session,
            GeoPoint::new(11.3, 77.7),
            VehicleType::Bike,
            DriverStatus::Live,
        );

        let sweeper = Sweeper::new(
            presence,
            Arc::new(ActiveRides::new()),
            Arc::new(DedupMap::new()),
            Arc::new(WalletLedger::new(store.clone(), gateway, clock.clone())),
            store.clone(),
            clock.clone(),
            Duration::from_secs(10_800),
            Duration::from_secs(60),
        );

        clock.advance_secs(61);
        sweeper.sweep_once().await.expect("sweep");

        let persisted = store
            .get_driver(&DriverId::new("DRV001"))
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(persisted.status, DriverStatus::Offline);
    }
}
