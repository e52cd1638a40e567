//! Storage port traits for data persistence.
//!
//! These traits define the contract for persisting and retrieving domain
//! entities. Adapters implement them against concrete backends: PostgreSQL
//! for production, an in-memory map store for tests and store-less
//! development.
//!
//! Two rows are serialisation points and their mutating methods must be
//! atomic read-modify-writes in every adapter:
//!
//! - the **driver row** for wallet and working-hours mutations
//! - the **ride row** for lifecycle transitions (all CAS on current status)

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::types::entities::{
    Driver, HoursPatch, LocationSample, Place, Rejection, Ride, Transaction, User, WalletReceipt,
};
use crate::types::enums::{DriverStatus, RideStatus, TxMethod, VehicleType};
use crate::types::primitives::{Amount, DriverId, GeoPoint, RideId};

// ═══════════════════════════════════════════════════════════════════════════════
// DRIVER STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for driver persistence.
///
/// Wallet mutations pair the balance change with a ledger record in one
/// commit; a balance can never change without its transaction existing.
#[async_trait]
pub trait DriverStore: Send + Sync {
    /// Fetch a driver by external id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn get_driver(&self, id: &DriverId) -> Result<Option<Driver>>;

    /// Fetch a driver by phone number (auth bootstrap).
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn get_driver_by_phone(&self, phone: &str) -> Result<Option<Driver>>;

    /// Drivers eligible for a dispatch fan-out: dispatchable status, the
    /// requested vehicle type, and a non-empty push token.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn dispatchable_drivers(&self, vehicle_type: VehicleType) -> Result<Vec<Driver>>;

    /// Drivers whose countdown should be re-armed after a restart
    /// (`timer_active` and seconds remaining).
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn drivers_with_armed_timers(&self) -> Result<Vec<Driver>>;

    /// Persist a status change.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver is unknown or the store fails.
    async fn set_driver_status(&self, id: &DriverId, status: DriverStatus) -> Result<()>;

    /// Persist a push-token change.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver is unknown or the store fails.
    async fn set_push_token(&self, id: &DriverId, token: &str) -> Result<()>;

    /// Persist the last-known location.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver is unknown or the store fails.
    async fn set_driver_location(&self, id: &DriverId, location: GeoPoint) -> Result<()>;

    /// Apply a working-hours patch as one write.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver is unknown or the store fails.
    async fn update_hours(&self, id: &DriverId, patch: &HoursPatch) -> Result<()>;

    /// Atomically debit the wallet and write the paired ledger record.
    ///
    /// The balance check and decrement are one conditional write: two
    /// concurrent debits can never take the balance negative.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DomainError::InsufficientBalance`] when the
    /// balance does not cover `amount`, [`crate::error::DomainError::DriverNotFound`]
    /// for unknown drivers, or an infra error if the store fails.
    async fn debit_driver(
        &self,
        id: &DriverId,
        amount: Amount,
        method: TxMethod,
        description: &str,
        ride_id: Option<&RideId>,
        at: DateTime<Utc>,
    ) -> Result<WalletReceipt>;

    /// Atomically credit the wallet and write the paired ledger record.
    ///
    /// # Errors
    ///
    /// Returns an error if the driver is unknown or the store fails.
    async fn credit_driver(
        &self,
        id: &DriverId,
        amount: Amount,
        method: TxMethod,
        description: &str,
        ride_id: Option<&RideId>,
        at: DateTime<Utc>,
    ) -> Result<WalletReceipt>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// USER STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for passenger persistence.
///
/// Passenger wallet mutations honour the same non-negative invariant as
/// driver wallets but do not generate driver ledger records.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fetch a user by internal id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn get_user(&self, id: &Uuid) -> Result<Option<User>>;

    /// Fetch a user by external customer id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn get_user_by_customer_id(&self, customer_id: &str) -> Result<Option<User>>;

    /// Atomically debit the passenger wallet; returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DomainError::InsufficientBalance`] when the
    /// balance does not cover `amount`.
    async fn debit_user(&self, id: &Uuid, amount: Amount) -> Result<Amount>;

    /// Atomically credit the passenger wallet; returns the new balance.
    ///
    /// # Errors
    ///
    /// Returns an error if the user is unknown or the store fails.
    async fn credit_user(&self, id: &Uuid, amount: Amount) -> Result<Amount>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// RIDE STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Port for ride persistence.
///
/// Every transition is a compare-and-set on the current status; plain
/// read-then-write is not acceptable for any implementation.
#[async_trait]
pub trait RideStore: Send + Sync {
    /// Insert a new ride in `pending`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::DomainError::DuplicateRide`] when the raid id
    /// is already taken (fallback-id collisions retry at the caller).
    async fn insert_ride(&self, ride: &Ride) -> Result<()>;

    /// Fetch a ride by raid id.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn get_ride(&self, raid_id: &RideId) -> Result<Option<Ride>>;

    /// Acceptance CAS: `pending -> accepted` plus the winning driver, in one
    /// conditional write.
    ///
    /// Returns the updated ride on success, `None` when the ride was not in
    /// `pending` (lost race, cancelled, or already taken).
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn try_accept(
        &self,
        raid_id: &RideId,
        driver_id: &DriverId,
        driver_name: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<Ride>>;

    /// Generic transition CAS: move to `to` only when the observed status is
    /// in `from`. Returns whether the write happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn transition_ride(
        &self,
        raid_id: &RideId,
        from: &[RideStatus],
        to: RideStatus,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Completion CAS: record actuals and move to `completed` in one write.
    /// Returns whether the write happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    #[allow(clippy::too_many_arguments)]
    async fn complete_ride(
        &self,
        raid_id: &RideId,
        actual_distance_km: f64,
        actual_fare: Amount,
        actual_pickup: Option<&Place>,
        actual_drop: Option<&Place>,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    /// Append a driver's refusal to the ride row.
    ///
    /// # Errors
    ///
    /// Returns an error if the ride is unknown or the store fails.
    async fn add_rejection(&self, raid_id: &RideId, rejection: &Rejection) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER / LOCATION / COUNTER / PRICING STORES
// ═══════════════════════════════════════════════════════════════════════════════

/// Read side of the ledger (writes happen inside wallet mutations).
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Most recent transactions for a driver, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn transactions_for_driver(
        &self,
        id: &DriverId,
        limit: u32,
    ) -> Result<Vec<Transaction>>;
}

/// Append-only location history.
#[async_trait]
pub trait LocationStore: Send + Sync {
    /// Append one sample.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn append_location(&self, sample: &LocationSample) -> Result<()>;
}

/// Durable monotonic counters.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Atomically advance the ride sequence and return the new value.
    ///
    /// Recycles to 100000 after exceeding 999999.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable (callers fall back to a
    /// clock-derived id).
    async fn next_ride_sequence(&self) -> Result<u32>;
}

/// Per-vehicle-type pricing table.
#[async_trait]
pub trait PricingStore: Send + Sync {
    /// Load all configured per-km rates.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn load_prices(&self) -> Result<Vec<(VehicleType, i64)>>;

    /// Insert or update one rate.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    async fn upsert_price(&self, vehicle_type: VehicleType, rate_per_km: i64) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMBINED STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// The full persistence surface as one object-safe trait.
///
/// Services hold an `Arc<dyn Store>`; adapters implement the individual
/// traits and get this one for free.
pub trait Store:
    DriverStore + UserStore + RideStore + LedgerStore + LocationStore + CounterStore + PricingStore
{
}

impl<T> Store for T where
    T: DriverStore
        + UserStore
        + RideStore
        + LedgerStore
        + LocationStore
        + CounterStore
        + PricingStore
{
}
