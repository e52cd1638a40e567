//! In-memory store adapter.
//!
//! Backs the test suite and the `--memory-store` development mode, where
//! the server runs without a database and state lives for the process
//! lifetime only.
//!
//! Atomicity contract: each map sits behind its own mutex and every
//! mutating method does its read-validate-write inside one lock hold, so
//! the CAS semantics match the PostgreSQL adapter. No lock is ever held
//! across an await point.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use uuid::Uuid;

use crate::error::{DomainError, InfraError, Result};
use crate::ports::store::{
    CounterStore, DriverStore, LedgerStore, LocationStore, PricingStore, RideStore, UserStore,
};
use crate::types::entities::{
    Driver, HoursPatch, LocationSample, Place, Rejection, Ride, Transaction, User, WalletReceipt,
};
use crate::types::enums::{DriverStatus, RideStatus, TxKind, TxMethod, VehicleType};
use crate::types::primitives::{Amount, DriverId, GeoPoint, RideId};

// ═══════════════════════════════════════════════════════════════════════════════
// MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Map-backed store with the same conditional-write semantics as the
/// PostgreSQL adapter.
#[derive(Debug, Default)]
pub struct MemoryStore {
    drivers: Mutex<HashMap<DriverId, Driver>>,
    users: Mutex<HashMap<Uuid, User>>,
    rides: Mutex<HashMap<RideId, Ride>>,
    transactions: Mutex<Vec<Transaction>>,
    locations: Mutex<Vec<LocationSample>>,
    prices: Mutex<HashMap<VehicleType, i64>>,
    ride_sequence: Mutex<u32>,
    /// Test hook: make the next sequence fetch fail like an unreachable
    /// store, exercising the fallback ride-id path.
    counter_down: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a driver row.
    pub fn seed_driver(&self, driver: Driver) {
        self.drivers.lock().insert(driver.driver_id.clone(), driver);
    }

    /// Insert or replace a user row.
    pub fn seed_user(&self, user: User) {
        self.users.lock().insert(user.id, user);
    }

    /// Set the ride sequence counter (the next id is `value + 1`).
    pub fn set_ride_sequence(&self, value: u32) {
        *self.ride_sequence.lock() = value;
    }

    /// Simulate the sequence counter being unreachable.
    pub fn set_counter_down(&self, down: bool) {
        self.counter_down.store(down, Ordering::SeqCst);
    }

    /// Number of ledger records written so far.
    #[must_use]
    pub fn transaction_count(&self) -> usize {
        self.transactions.lock().len()
    }

    #[allow(clippy::too_many_arguments)]
    fn write_wallet_mutation(
        drivers: &mut HashMap<DriverId, Driver>,
        transactions: &mut Vec<Transaction>,
        id: &DriverId,
        amount: Amount,
        kind: TxKind,
        method: TxMethod,
        description: &str,
        ride_id: Option<&RideId>,
        at: DateTime<Utc>,
    ) -> Result<WalletReceipt> {
        let driver = drivers
            .get_mut(id)
            .ok_or_else(|| DomainError::DriverNotFound(id.clone()))?;

        let new_balance = match kind {
            TxKind::Debit => driver.wallet.checked_sub(amount).ok_or(
                DomainError::InsufficientBalance {
                    required: amount,
                    available: driver.wallet,
                },
            )?,
            TxKind::Credit => driver.wallet.saturating_add(amount),
        };

        driver.wallet = new_balance;
        driver.updated_at = at;

        let transaction = Transaction {
            id: Uuid::new_v4(),
            driver_id: id.clone(),
            amount,
            kind,
            method,
            description: description.to_string(),
            balance_after: new_balance,
            ride_id: ride_id.cloned(),
            created_at: at,
        };
        transactions.push(transaction.clone());

        Ok(WalletReceipt {
            balance_after: new_balance,
            transaction,
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DRIVER STORE
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl DriverStore for MemoryStore {
    async fn get_driver(&self, id: &DriverId) -> Result<Option<Driver>> {
        Ok(self.drivers.lock().get(id).cloned())
    }

    async fn get_driver_by_phone(&self, phone: &str) -> Result<Option<Driver>> {
        Ok(self
            .drivers
            .lock()
            .values()
            .find(|d| d.phone == phone)
            .cloned())
    }

    async fn dispatchable_drivers(&self, vehicle_type: VehicleType) -> Result<Vec<Driver>> {
        Ok(self
            .drivers
            .lock()
            .values()
            .filter(|d| {
                d.status.is_dispatchable()
                    && d.vehicle_type == vehicle_type
                    && d.push_token.as_deref().is_some_and(|t| !t.is_empty())
            })
            .cloned()
            .collect())
    }

    async fn drivers_with_armed_timers(&self) -> Result<Vec<Driver>> {
        Ok(self
            .drivers
            .lock()
            .values()
            .filter(|d| d.timer_active && d.remaining_working_seconds > 0)
            .cloned()
            .collect())
    }

    async fn set_driver_status(&self, id: &DriverId, status: DriverStatus) -> Result<()> {
        let mut drivers = self.drivers.lock();
        let driver = drivers
            .get_mut(id)
            .ok_or_else(|| DomainError::DriverNotFound(id.clone()))?;
        driver.status = status;
        Ok(())
    }

    async fn set_push_token(&self, id: &DriverId, token: &str) -> Result<()> {
        let mut drivers = self.drivers.lock();
        let driver = drivers
            .get_mut(id)
            .ok_or_else(|| DomainError::DriverNotFound(id.clone()))?;
        driver.push_token = Some(token.to_string());
        Ok(())
    }

    async fn set_driver_location(&self, id: &DriverId, location: GeoPoint) -> Result<()> {
        let mut drivers = self.drivers.lock();
        let driver = drivers
            .get_mut(id)
            .ok_or_else(|| DomainError::DriverNotFound(id.clone()))?;
        driver.last_location = Some(location);
        Ok(())
    }

    async fn update_hours(&self, id: &DriverId, patch: &HoursPatch) -> Result<()> {
        let mut drivers = self.drivers.lock();
        let driver = drivers
            .get_mut(id)
            .ok_or_else(|| DomainError::DriverNotFound(id.clone()))?;

        if let Some(remaining) = patch.remaining_working_seconds {
            driver.remaining_working_seconds = remaining;
        }
        if let Some(active) = patch.timer_active {
            driver.timer_active = active;
        }
        if let Some(warnings) = patch.warnings_issued {
            driver.warnings_issued = warnings;
        }
        if let Some(extended) = patch.extended_hours_purchased {
            driver.extended_hours_purchased = extended;
        }
        if let Some(status) = patch.status {
            driver.status = status;
        }
        Ok(())
    }

    async fn debit_driver(
        &self,
        id: &DriverId,
        amount: Amount,
        method: TxMethod,
        description: &str,
        ride_id: Option<&RideId>,
        at: DateTime<Utc>,
    ) -> Result<WalletReceipt> {
        let mut drivers = self.drivers.lock();
        let mut transactions = self.transactions.lock();
        Self::write_wallet_mutation(
            &mut drivers,
            &mut transactions,
            id,
            amount,
            TxKind::Debit,
            method,
            description,
            ride_id,
            at,
        )
    }

    async fn credit_driver(
        &self,
        id: &DriverId,
        amount: Amount,
        method: TxMethod,
        description: &str,
        ride_id: Option<&RideId>,
        at: DateTime<Utc>,
    ) -> Result<WalletReceipt> {
        let mut drivers = self.drivers.lock();
        let mut transactions = self.transactions.lock();
        Self::write_wallet_mutation(
            &mut drivers,
            &mut transactions,
            id,
            amount,
            TxKind::Credit,
            method,
            description,
            ride_id,
            at,
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// USER STORE
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, id: &Uuid) -> Result<Option<User>> {
        Ok(self.users.lock().get(id).cloned())
    }

    async fn get_user_by_customer_id(&self, customer_id: &str) -> Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .values()
            .find(|u| u.customer_id.as_str() == customer_id)
            .cloned())
    }

    async fn debit_user(&self, id: &Uuid, amount: Amount) -> Result<Amount> {
        let mut users = self.users.lock();
        let user = users
            .get_mut(id)
            .ok_or_else(|| DomainError::UserNotFound(id.to_string()))?;
        let new_balance =
            user.wallet
                .checked_sub(amount)
                .ok_or(DomainError::InsufficientBalance {
                    required: amount,
                    available: user.wallet,
                })?;
        user.wallet = new_balance;
        Ok(new_balance)
    }

    async fn credit_user(&self, id: &Uuid, amount: Amount) -> Result<Amount> {
        let mut users = self.users.lock();
        let user = users
            .get_mut(id)
            .ok_or_else(|| DomainError::UserNotFound(id.to_string()))?;
        user.wallet = user.wallet.saturating_add(amount);
        Ok(user.wallet)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RIDE STORE
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl RideStore for MemoryStore {
    async fn insert_ride(&self, ride: &Ride) -> Result<()> {
        let mut rides = self.rides.lock();
        if rides.contains_key(&ride.raid_id) {
            return Err(DomainError::DuplicateRide(ride.raid_id.clone()).into());
        }
        rides.insert(ride.raid_id.clone(), ride.clone());
        Ok(())
    }

    async fn get_ride(&self, raid_id: &RideId) -> Result<Option<Ride>> {
        Ok(self.rides.lock().get(raid_id).cloned())
    }

    async fn try_accept(
        &self,
        raid_id: &RideId,
        driver_id: &DriverId,
        driver_name: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<Ride>> {
        let mut rides = self.rides.lock();
        let Some(ride) = rides.get_mut(raid_id) else {
            return Ok(None);
        };
        if ride.status != RideStatus::Pending {
            return Ok(None);
        }
        ride.status = RideStatus::Accepted;
        ride.driver_id = Some(driver_id.clone());
        ride.driver_name = driver_name.map(str::to_string);
        ride.accepted_at = Some(at);
        Ok(Some(ride.clone()))
    }

    async fn transition_ride(
        &self,
        raid_id: &RideId,
        from: &[RideStatus],
        to: RideStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut rides = self.rides.lock();
        let Some(ride) = rides.get_mut(raid_id) else {
            return Ok(false);
        };
        if !from.contains(&ride.status) {
            return Ok(false);
        }
        ride.status = to;
        match to {
            RideStatus::Arrived => ride.arrived_at = Some(at),
            RideStatus::Started => ride.started_at = Some(at),
            RideStatus::Completed => ride.completed_at = Some(at),
            RideStatus::Cancelled => ride.cancelled_at = Some(at),
            RideStatus::Pending | RideStatus::Accepted => {}
        }
        Ok(true)
    }

    async fn complete_ride(
        &self,
        raid_id: &RideId,
        actual_distance_km: f64,
        actual_fare: Amount,
        actual_pickup: Option<&Place>,
        actual_drop: Option<&Place>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut rides = self.rides.lock();
        let Some(ride) = rides.get_mut(raid_id) else {
            return Ok(false);
        };
        if !RideStatus::completable_from().contains(&ride.status) {
            return Ok(false);
        }
        ride.status = RideStatus::Completed;
        ride.completed_at = Some(at);
        ride.actual_distance_km = Some(actual_distance_km);
        ride.actual_fare = Some(actual_fare);
        ride.actual_pickup = actual_pickup.cloned();
        ride.actual_drop = actual_drop.cloned();
        Ok(true)
    }

    async fn add_rejection(&self, raid_id: &RideId, rejection: &Rejection) -> Result<()> {
        let mut rides = self.rides.lock();
        let ride = rides
            .get_mut(raid_id)
            .ok_or_else(|| DomainError::RideNotFound(raid_id.clone()))?;
        ride.rejected_by.push(rejection.clone());
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER / LOCATION / COUNTER / PRICING
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn transactions_for_driver(
        &self,
        id: &DriverId,
        limit: u32,
    ) -> Result<Vec<Transaction>> {
        let mut matching: Vec<Transaction> = self
            .transactions
            .lock()
            .iter()
            .filter(|t| &t.driver_id == id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }
}

#[async_trait]
impl LocationStore for MemoryStore {
    async fn append_location(&self, sample: &LocationSample) -> Result<()> {
        self.locations.lock().push(sample.clone());
        Ok(())
    }
}

#[async_trait]
impl CounterStore for MemoryStore {
    async fn next_ride_sequence(&self) -> Result<u32> {
        if self.counter_down.load(Ordering::SeqCst) {
            return Err(InfraError::Timeout("sequence counter".into()).into());
        }
        let mut sequence = self.ride_sequence.lock();
        *sequence = if *sequence >= 999_999 {
            100_000
        } else {
            *sequence + 1
        };
        Ok(*sequence)
    }
}

#[async_trait]
impl PricingStore for MemoryStore {
    async fn load_prices(&self) -> Result<Vec<(VehicleType, i64)>> {
        Ok(self.prices.lock().iter().map(|(vt, r)| (*vt, *r)).collect())
    }

    async fn upsert_price(&self, vehicle_type: VehicleType, rate_per_km: i64) -> Result<()> {
        self.prices.lock().insert(vehicle_type, rate_per_km);
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    fn driver(id: &str, wallet: i64) -> Driver {
        Driver {
            id: Uuid::new_v4(),
            driver_id: DriverId::new(id),
            name: format!("Driver {id}"),
            phone: format!("90000{id}"),
            vehicle_type: VehicleType::Bike,
            vehicle_number: "TN 33 A 1234".into(),
            wallet: Amount::saturating(wallet),
            status: DriverStatus::Offline,
            working_hours_limit: 12,
            deduction_amount: Amount::saturating(100),
            remaining_working_seconds: 0,
            timer_active: false,
            warnings_issued: 0,
            extended_hours_purchased: false,
            last_location: None,
            push_token: Some("tok".into()),
            updated_at: Utc::now(),
        }
    }

    fn pending_ride(seq: u32) -> Ride {
        Ride {
            id: Uuid::new_v4(),
            raid_id: RideId::from_sequence(seq),
            user_id: Uuid::new_v4(),
            customer_id: "CUS0065".into(),
            user_name: "Meena".into(),
            user_phone: "9000000002".into(),
            vehicle_type: VehicleType::Bike,
            pickup: Place {
                lat: 11.3459,
                lng: 77.7216,
                address: "A".into(),
            },
            drop: Place {
                lat: 11.3099,
                lng: 77.7387,
                address: "B".into(),
            },
            distance_km: 5.4,
            fare: Amount::saturating(81),
            otp: crate::types::primitives::Otp::derive("CUS0065").expect("otp"),
            status: RideStatus::Pending,
            payment_method: crate::types::enums::PaymentMethod::Cash,
            driver_id: None,
            driver_name: None,
            rejected_by: vec![],
            actual_distance_km: None,
            actual_fare: None,
            actual_pickup: None,
            actual_drop: None,
            requested_at: Utc::now(),
            accepted_at: None,
            arrived_at: None,
            started_at: None,
            completed_at: None,
            cancelled_at: None,
        }
    }

    #[tokio::test]
    async fn debit_pairs_transaction_with_balance() {
        let store = MemoryStore::new();
        store.seed_driver(driver("DRV001", 500));

        let receipt = store
            .debit_driver(
                &DriverId::new("DRV001"),
                Amount::saturating(100),
                TxMethod::ShiftStartFee,
                "shift start",
                None,
                Utc::now(),
            )
            .await
            .expect("debit");

        assert_eq!(receipt.balance_after.get(), 400);
        assert_eq!(receipt.transaction.amount.get(), 100);
        assert_eq!(receipt.transaction.balance_after.get(), 400);
        assert_eq!(store.transaction_count(), 1);
    }

    #[tokio::test]
    async fn debit_beyond_balance_changes_nothing() {
        let store = MemoryStore::new();
        store.seed_driver(driver("DRV004", 50));

        let err = store
            .debit_driver(
                &DriverId::new("DRV004"),
                Amount::saturating(100),
                TxMethod::ShiftStartFee,
                "shift start",
                None,
                Utc::now(),
            )
            .await
            .expect_err("must fail");

        assert!(matches!(
            err,
            AppError::Domain(DomainError::InsufficientBalance { .. })
        ));
        assert_eq!(store.transaction_count(), 0);
        let unchanged = store
            .get_driver(&DriverId::new("DRV004"))
            .await
            .expect("read")
            .expect("exists");
        assert_eq!(unchanged.wallet.get(), 50);
    }

    #[tokio::test]
    async fn accept_cas_admits_exactly_one_driver() {
        let store = MemoryStore::new();
        store.insert_ride(&pending_ride(2)).await.expect("insert");
        let raid = RideId::from_sequence(2);

        let first = store
            .try_accept(&raid, &DriverId::new("DRV001"), Some("A"), Utc::now())
            .await
            .expect("cas");
        let second = store
            .try_accept(&raid, &DriverId::new("DRV002"), Some("B"), Utc::now())
            .await
            .expect("cas");

        assert!(first.is_some());
        assert!(second.is_none());
        let ride = store.get_ride(&raid).await.expect("read").expect("exists");
        assert_eq!(ride.driver_id, Some(DriverId::new("DRV001")));
    }

    #[tokio::test]
    async fn duplicate_raid_id_is_rejected() {
        let store = MemoryStore::new();
        store.insert_ride(&pending_ride(3)).await.expect("insert");
        let err = store.insert_ride(&pending_ride(3)).await.expect_err("dup");
        assert!(matches!(
            err,
            AppError::Domain(DomainError::DuplicateRide(_))
        ));
    }

    #[tokio::test]
    async fn sequence_recycles_after_max() {
        let store = MemoryStore::new();
        store.set_ride_sequence(999_999);
        assert_eq!(store.next_ride_sequence().await.expect("seq"), 100_000);
        assert_eq!(store.next_ride_sequence().await.expect("seq"), 100_001);
    }

    #[tokio::test]
    async fn completion_cas_only_applies_once() {
        let store = MemoryStore::new();
        store.insert_ride(&pending_ride(4)).await.expect("insert");
        let raid = RideId::from_sequence(4);
        store
            .try_accept(&raid, &DriverId::new("DRV001"), None, Utc::now())
            .await
            .expect("cas");

        let first = store
            .complete_ride(&raid, 5.4, Amount::saturating(81), None, None, Utc::now())
            .await
            .expect("complete");
        let second = store
            .complete_ride(&raid, 5.4, Amount::saturating(81), None, None, Utc::now())
            .await
            .expect("complete");

        assert!(first);
        assert!(!second, "second completion must lose the CAS");
    }

    #[tokio::test]
    async fn dispatchable_filter_requires_type_status_and_token() {
        let store = MemoryStore::new();

        let mut live_bike = driver("DRV001", 100);
        live_bike.status = DriverStatus::Live;
        store.seed_driver(live_bike);

        let mut live_taxi = driver("DRV002", 100);
        live_taxi.status = DriverStatus::Live;
        live_taxi.vehicle_type = VehicleType::Taxi;
        store.seed_driver(live_taxi);

        let mut tokenless = driver("DRV003", 100);
        tokenless.status = DriverStatus::Live;
        tokenless.push_token = None;
        store.seed_driver(tokenless);

        let mut offline = driver("DRV005", 100);
        offline.status = DriverStatus::Offline;
        store.seed_driver(offline);

        let found = store
            .dispatchable_drivers(VehicleType::Bike)
            .await
            .expect("query");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].driver_id, DriverId::new("DRV001"));
    }
}
