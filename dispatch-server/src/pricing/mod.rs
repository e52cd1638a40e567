//! Per-vehicle-type pricing cache.
//!
//! Holds the per-km rate table in memory, initialized from the store at
//! startup and replaced atomically on admin writes. Readers take a snapshot
//! so a concurrent update never shows a half-applied table.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{info, warn};

use crate::error::Result;
use crate::ports::store::PricingStore;
use crate::types::enums::VehicleType;
use crate::types::primitives::Amount;

// ═══════════════════════════════════════════════════════════════════════════════
// PRICING CACHE
// ═══════════════════════════════════════════════════════════════════════════════

/// Snapshot-replaced price table.
#[derive(Debug)]
pub struct PricingCache {
    table: RwLock<Arc<BTreeMap<VehicleType, i64>>>,
}

impl PricingCache {
    /// Create a cache holding the built-in defaults.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: RwLock::new(Arc::new(Self::default_table())),
        }
    }

    fn default_table() -> BTreeMap<VehicleType, i64> {
        VehicleType::all()
            .into_iter()
            .map(|vt| (vt, vt.default_rate_per_km()))
            .collect()
    }

    /// Initialize from the store, keeping defaults for missing or
    /// non-positive rows.
    ///
    /// # Errors
    ///
    /// Returns an error if the store read fails; the cache keeps serving
    /// defaults in that case.
    pub async fn load_from<S: PricingStore + ?Sized>(&self, store: &S) -> Result<()> {
        let stored = store.load_prices().await?;
        let mut table = Self::default_table();
        for (vehicle_type, rate) in stored {
            if rate > 0 {
                table.insert(vehicle_type, rate);
            } else {
                warn!(%vehicle_type, rate, "Ignoring non-positive stored rate");
            }
        }
        info!(?table, "Loaded ride prices");
        *self.table.write() = Arc::new(table);
        Ok(())
    }

    /// Replace one rate; the whole table snapshot is swapped.
    pub fn set_rate(&self, vehicle_type: VehicleType, rate_per_km: i64) {
        let mut table = (**self.table.read()).clone();
        table.insert(vehicle_type, rate_per_km);
        *self.table.write() = Arc::new(table);
    }

    /// Current table snapshot.
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<VehicleType, i64> {
        (**self.table.read()).clone()
    }

    /// The effective per-km rate for a vehicle type.
    ///
    /// Falls back to the built-in default when the cached rate is missing
    /// or non-positive.
    #[must_use]
    pub fn rate_per_km(&self, vehicle_type: VehicleType) -> i64 {
        let rate = self
            .table
            .read()
            .get(&vehicle_type)
            .copied()
            .unwrap_or_else(|| vehicle_type.default_rate_per_km());
        if rate > 0 {
            rate
        } else {
            vehicle_type.default_rate_per_km()
        }
    }

    /// Authoritative fare for a distance: `round(km * rate)`, never below 1
    /// for a positive distance.
    #[must_use]
    pub fn calculate_fare(&self, vehicle_type: VehicleType, distance_km: f64) -> Amount {
        let km = if distance_km.is_finite() && distance_km > 0.0 {
            distance_km
        } else {
            return Amount::ZERO;
        };
        #[allow(clippy::cast_possible_truncation)]
        let fare = (km * self.rate_per_km(vehicle_type) as f64).round() as i64;
        Amount::saturating(fare.max(1))
    }
}

impl Default for PricingCache {
    fn default() -> Self {
        Self::new()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
