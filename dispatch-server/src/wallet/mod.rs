//! Monetary ledger service.
//!
//! Every wallet mutation goes through here: the store commits the balance
//! change and its paired transaction atomically, then the owner's realtime
//! room is told. An idempotency cache keyed by
//! `(driver, method, ride, minute-bucket)` absorbs retries after transient
//! store failures so a retried debit can never charge twice.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::gateway::{Gateway, Room};
use crate::ports::clock::Clock;
use crate::ports::store::{DriverStore, Store};
use crate::types::entities::WalletReceipt;
use crate::types::enums::{TxKind, TxMethod};
use crate::types::events::{OutboundEvent, WalletNotice};
use crate::types::primitives::{Amount, DriverId, RideId};

/// How long an idempotency entry outlives its minute bucket.
const IDEMPOTENCY_BUCKETS_KEPT: i64 = 2;

/// Backoff before the single retry of a transient store failure.
const RETRY_BACKOFF: Duration = Duration::from_millis(200);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct IdempotencyKey {
    driver: DriverId,
    kind: TxKind,
    method: TxMethod,
    ride: Option<RideId>,
    minute_bucket: i64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// WALLET LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Debit/credit front door with retry and notification duties.
pub struct WalletLedger {
    store: Arc<dyn Store>,
    gateway: Arc<Gateway>,
    clock: Arc<dyn Clock>,
    recent: DashMap<IdempotencyKey, WalletReceipt>,
}

impl std::fmt::Debug for WalletLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletLedger")
            .field("recent_entries", &self.recent.len())
            .finish_non_exhaustive()
    }
}

impl WalletLedger {
    /// Create the ledger service.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, gateway: Arc<Gateway>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            gateway,
            clock,
            recent: DashMap::new(),
        }
    }

    /// Debit a driver's wallet.
    ///
    /// # Errors
    ///
    /// Surfaces `INSUFFICIENT_BALANCE` and store failures; transient store
    /// failures are retried once with the idempotency cache guarding
    /// against double charges.
    #[instrument(skip(self, description), fields(driver_id = %driver_id, amount = %amount))]
    pub async fn debit(
        &self,
        driver_id: &DriverId,
        amount: Amount,
        method: TxMethod,
        description: &str,
        ride_id: Option<&RideId>,
    ) -> Result<WalletReceipt> {
        self.mutate(TxKind::Debit, driver_id, amount, method, description, ride_id)
            .await
    }

    /// Credit a driver's wallet.
    ///
    /// # Errors
    ///
    /// Surfaces store failures; transient ones are retried once.
    #[instrument(skip(self, description), fields(driver_id = %driver_id, amount = %amount))]
    pub async fn credit(
        &self,
        driver_id: &DriverId,
        amount: Amount,
        method: TxMethod,
        description: &str,
        ride_id: Option<&RideId>,
    ) -> Result<WalletReceipt> {
        self.mutate(TxKind::Credit, driver_id, amount, method, description, ride_id)
            .await
    }

    async fn mutate(
        &self,
        kind: TxKind,
        driver_id: &DriverId,
        amount: Amount,
        method: TxMethod,
        description: &str,
        ride_id: Option<&RideId>,
    ) -> Result<WalletReceipt> {
        let key = IdempotencyKey {
            driver: driver_id.clone(),
            kind,
            method,
            ride: ride_id.cloned(),
            minute_bucket: self.clock.now().timestamp() / 60,
        };

        if let Some(cached) = self.recent.get(&key) {
            info!(driver_id = %driver_id, ?method, "Replaying cached wallet mutation");
            return Ok(cached.clone());
        }

        let receipt = match self.commit(kind, driver_id, amount, method, description, ride_id).await
        {
            Ok(receipt) => receipt,
            Err(err) if err.is_retryable() => {
                warn!(driver_id = %driver_id, error = %err, "Wallet mutation failed, retrying once");
                tokio::time::sleep(RETRY_BACKOFF).await;
                self.commit(kind, driver_id, amount, method, description, ride_id)
                    .await?
            }
            Err(err) => return Err(err),
        };

        self.recent.insert(key, receipt.clone());

        self.gateway.emit_room(
            &Room::Driver(driver_id.clone()),
            &OutboundEvent::WalletUpdate(WalletNotice {
                driver_id: driver_id.clone(),
                balance: receipt.balance_after,
                amount,
                kind,
                method,
                description: description.to_string(),
            }),
            None,
        );

        Ok(receipt)
    }

    async fn commit(
        &self,
        kind: TxKind,
        driver_id: &DriverId,
        amount: Amount,
        method: TxMethod,
        description: &str,
        ride_id: Option<&RideId>,
    ) -> Result<WalletReceipt> {
        let at = self.clock.now();
        match kind {
            TxKind::Debit => {
                self.store
                    .debit_driver(driver_id, amount, method, description, ride_id, at)
                    .await
            }
            TxKind::Credit => {
                self.store
                    .credit_driver(driver_id, amount, method, description, ride_id, at)
                    .await
            }
        }
    }

    /// Drop idempotency entries whose minute bucket has aged out. Called by
    /// the periodic sweeper.
    pub fn sweep(&self) {
        let current_bucket = self.clock.now().timestamp() / 60;
        self.recent
            .retain(|key, _| key.minute_bucket > current_bucket - IDEMPOTENCY_BUCKETS_KEPT);
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
    use crate::error::{AppError, DomainError};
    use crate::ports::clock::FakeClock;
    use crate::store::MemoryStore;
    use crate::types::entities::Driver;
    use crate::types::enums::{DriverStatus, VehicleType};

    fn seeded(wallet: i64) -> (Arc<MemoryStore>, WalletLedger, Arc<FakeClock>) {
        let store = Arc::new(MemoryStore::new());
        store.seed_driver(Driver {
            id: Uuid::new_v4(),
            driver_id: DriverId::new("DRV001"),
            name: "Arun".into(),
            phone: "9000000001".into(),
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
            push_token: None,
            updated_at: Utc::now(),
        });
        let clock = Arc::new(FakeClock::now_fake());
        let ledger = WalletLedger::new(
            store.clone(),
            Arc::new(Gateway::new()),
            clock.clone(),
        );
        (store, ledger, clock)
    }

    #[tokio::test]
    async fn debit_writes_exactly_one_transaction() {
        let (store, ledger, _clock) = seeded(500);
        let receipt = ledger
            .debit(
                &DriverId::new("DRV001"),
                Amount::saturating(100),
                TxMethod::ShiftStartFee,
                "shift start",
                None,
            )
            .await
            .expect("debit");

        assert_eq!(receipt.balance_after.get(), 400);
        assert_eq!(store.transaction_count(), 1);
    }

    #[tokio::test]
    async fn same_minute_retry_replays_without_second_charge() {
        let (store, ledger, _clock) = seeded(500);
        let id = DriverId::new("DRV001");

        let first = ledger
            .debit(&id, Amount::saturating(100), TxMethod::ShiftStartFee, "shift start", None)
            .await
            .expect("debit");
        let second = ledger
            .debit(&id, Amount::saturating(100), TxMethod::ShiftStartFee, "shift start", None)
            .await
            .expect("replay");

        assert_eq!(first, second);
        assert_eq!(store.transaction_count(), 1, "no second ledger record");
    }

    #[tokio::test]
    async fn different_minute_is_a_fresh_mutation() {
        let (store, ledger, clock) = seeded(500);
        let id = DriverId::new("DRV001");

        ledger
            .debit(&id, Amount::saturating(100), TxMethod::ExtendedHoursAutoDebit, "auto", None)
            .await
            .expect("debit");
        clock.advance_secs(120);
        ledger
            .debit(&id, Amount::saturating(100), TxMethod::ExtendedHoursAutoDebit, "auto", None)
            .await
            .expect("debit");

        assert_eq!(store.transaction_count(), 2);
    }

    #[tokio::test]
    async fn insufficient_balance_is_not_cached() {
        let (store, ledger, _clock) = seeded(50);
        let id = DriverId::new("DRV001");

        let err = ledger
            .debit(&id, Amount::saturating(100), TxMethod::ShiftStartFee, "shift start", None)
            .await
            .expect_err("must fail");
        assert!(matches!(
            err,
            AppError::Domain(DomainError::InsufficientBalance { .. })
        ));
        assert_eq!(store.transaction_count(), 0);

        // Topping up and retrying in the same minute must work: failures
        // are never replayed from the cache.
        store
            .credit_driver(
                &id,
                Amount::saturating(100),
                TxMethod::AdminCredit,
                "top up",
                None,
                Utc::now(),
            )
            .await
            .expect("credit");
        ledger
            .debit(&id, Amount::saturating(100), TxMethod::ShiftStartFee, "shift start", None)
            .await
            .expect("debit succeeds after top-up");
    }

    #[tokio::test]
    async fn sweep_evicts_aged_buckets() {
        let (_store, ledger, clock) = seeded(500);
        ledger
            .debit(
                &DriverId::new("DRV001"),
                Amount::saturating(10),
                TxMethod::AdminDebit,
                "adjust",
                None,
            )
            .await
            .expect("debit");
        assert_eq!(ledger.recent.len(), 1);

        clock.advance_secs(60 * (IDEMPOTENCY_BUCKETS_KEPT as u64 + 1));
        ledger.sweep();
        assert!(ledger.recent.is_empty());
    }
}
