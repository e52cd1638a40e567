//! PostgreSQL implementation of the store ports using SQLx.
//!
//! # Atomicity
//!
//! The driver row is the serialisation point for wallet and working-hours
//! mutations: debits are a single conditional `UPDATE ... WHERE wallet >= $n`
//! paired with the ledger insert inside one transaction. Ride transitions
//! are conditional `UPDATE ... WHERE status IN (...)` writes, so the
//! acceptance race has exactly one winner without any advisory locking.
//!
//! # Timeouts
//!
//! Every operation runs under a five-second deadline. A timed-out operation
//! is reported as unavailable and leaves the state machine in its previous
//! committed state.

use std::future::Future;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use sqlx::{FromRow, Postgres, Transaction as PgTransaction};
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AppError, DomainError, InfraError, Result};
use crate::ports::store::{
    CounterStore, DriverStore, LedgerStore, LocationStore, PricingStore, RideStore, UserStore,
};
use crate::types::entities::{
    Driver, HoursPatch, LocationSample, Place, Rejection, Ride, Transaction, User, WalletReceipt,
};
use crate::types::enums::{
    DriverStatus, PaymentMethod, RideStatus, TxKind, TxMethod, VehicleType,
};
use crate::types::primitives::{Amount, CustomerId, DriverId, GeoPoint, Otp, RideId};

/// Caller-imposed deadline for any single store operation.
const STORE_TIMEOUT: Duration = Duration::from_secs(5);

// ═══════════════════════════════════════════════════════════════════════════════
// POSTGRES STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// PostgreSQL-based store implementation.
#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Create a new store with the given connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run pending migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if migrations fail.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| InfraError::Internal(format!("migration error: {e}")))?;
        Ok(())
    }

    /// Apply the store deadline to an operation.
    async fn timed<T, F>(label: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send,
    {
        match tokio::time::timeout(STORE_TIMEOUT, fut).await {
            Ok(result) => result,
            Err(_) => Err(InfraError::Timeout(label.into()).into()),
        }
    }
}

/// Map a unique-violation to the domain conflict it represents.
fn map_insert_error(err: sqlx::Error, raid_id: &RideId) -> AppError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            return DomainError::DuplicateRide(raid_id.clone()).into();
        }
    }
    InfraError::Database(err).into()
}

// ═══════════════════════════════════════════════════════════════════════════════
// DRIVER ROWS
// ═══════════════════════════════════════════════════════════════════════════════

/// Database row for drivers.
#[derive(Debug, FromRow)]
struct DriverRow {
    id: Uuid,
    driver_id: String,
    name: String,
    phone: String,
    vehicle_type: String,
    vehicle_number: String,
    wallet: i64,
    status: String,
    working_hours_limit: i16,
    deduction_amount: i64,
    remaining_working_seconds: i64,
    timer_active: bool,
    warnings_issued: i16,
    extended_hours_purchased: bool,
    last_lat: Option<f64>,
    last_lng: Option<f64>,
    push_token: Option<String>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<DriverRow> for Driver {
    type Error = AppError;

    fn try_from(row: DriverRow) -> std::result::Result<Self, Self::Error> {
        let last_location = match (row.last_lat, row.last_lng) {
            (Some(lat), Some(lng)) => Some(GeoPoint::new(lat, lng)),
            _ => None,
        };
        Ok(Driver {
            id: row.id,
            driver_id: DriverId::new(row.driver_id),
            name: row.name,
            phone: row.phone,
            vehicle_type: VehicleType::from_str(&row.vehicle_type)
                .map_err(|e| InfraError::Internal(format!("bad vehicle type in DB: {e}")))?,
            vehicle_number: row.vehicle_number,
            wallet: Amount::new(row.wallet)
                .map_err(|e| InfraError::Internal(format!("bad wallet in DB: {e}")))?,
            status: DriverStatus::from_str(&row.status)
                .map_err(|e| InfraError::Internal(format!("bad driver status in DB: {e}")))?,
            working_hours_limit: u8::try_from(row.working_hours_limit)
                .map_err(|_| InfraError::Internal("bad working hours limit in DB".into()))?,
            deduction_amount: Amount::new(row.deduction_amount)
                .map_err(|e| InfraError::Internal(format!("bad deduction amount in DB: {e}")))?,
            remaining_working_seconds: row.remaining_working_seconds,
            timer_active: row.timer_active,
            warnings_issued: u8::try_from(row.warnings_issued)
                .map_err(|_| InfraError::Internal("bad warning count in DB".into()))?,
            extended_hours_purchased: row.extended_hours_purchased,
            last_location,
            push_token: row.push_token,
            updated_at: row.updated_at,
        })
    }
}

const DRIVER_COLUMNS: &str = "id, driver_id, name, phone, vehicle_type, vehicle_number, wallet, \
     status, working_hours_limit, deduction_amount, remaining_working_seconds, timer_active, \
     warnings_issued, extended_hours_purchased, last_lat, last_lng, push_token, updated_at";

#[async_trait]
impl DriverStore for PostgresStore {
    #[instrument(skip(self), fields(driver_id = %id))]
    async fn get_driver(&self, id: &DriverId) -> Result<Option<Driver>> {
        let pool = self.pool.clone();
        let id = id.clone();
        Self::timed("get_driver", async move {
            let row = sqlx::query_as::<_, DriverRow>(&format!(
                "SELECT {DRIVER_COLUMNS} FROM drivers WHERE driver_id = $1"
            ))
            .bind(id.as_str())
            .fetch_optional(&pool)
            .await
            .map_err(InfraError::Database)?;
            row.map(Driver::try_from).transpose()
        })
        .await
    }

    #[instrument(skip(self, phone))]
    async fn get_driver_by_phone(&self, phone: &str) -> Result<Option<Driver>> {
        let pool = self.pool.clone();
        let phone = phone.to_string();
        Self::timed("get_driver_by_phone", async move {
            let row = sqlx::query_as::<_, DriverRow>(&format!(
                "SELECT {DRIVER_COLUMNS} FROM drivers WHERE phone = $1"
            ))
            .bind(&phone)
            .fetch_optional(&pool)
            .await
            .map_err(InfraError::Database)?;
            row.map(Driver::try_from).transpose()
        })
        .await
    }

    #[instrument(skip(self))]
    async fn dispatchable_drivers(&self, vehicle_type: VehicleType) -> Result<Vec<Driver>> {
        let pool = self.pool.clone();
        Self::timed("dispatchable_drivers", async move {
            // Legacy rows may still say 'online' / 'available'.
            let rows = sqlx::query_as::<_, DriverRow>(&format!(
                "SELECT {DRIVER_COLUMNS} FROM drivers \
                 WHERE vehicle_type = $1 \
                   AND status IN ('live', 'online', 'available') \
                   AND COALESCE(push_token, '') <> ''"
            ))
            .bind(vehicle_type.as_str())
            .fetch_all(&pool)
            .await
            .map_err(InfraError::Database)?;
            rows.into_iter().map(Driver::try_from).collect()
        })
        .await
    }

    #[instrument(skip(self))]
    async fn drivers_with_armed_timers(&self) -> Result<Vec<Driver>> {
        let pool = self.pool.clone();
        Self::timed("drivers_with_armed_timers", async move {
            let rows = sqlx::query_as::<_, DriverRow>(&format!(
                "SELECT {DRIVER_COLUMNS} FROM drivers \
                 WHERE timer_active = TRUE AND remaining_working_seconds > 0"
            ))
            .fetch_all(&pool)
            .await
            .map_err(InfraError::Database)?;
            rows.into_iter().map(Driver::try_from).collect()
        })
        .await
    }

    #[instrument(skip(self), fields(driver_id = %id))]
    async fn set_driver_status(&self, id: &DriverId, status: DriverStatus) -> Result<()> {
        let pool = self.pool.clone();
        let id = id.clone();
        Self::timed("set_driver_status", async move {
            let result = sqlx::query(
                "UPDATE drivers SET status = $2, updated_at = NOW() WHERE driver_id = $1",
            )
            .bind(id.as_str())
            .bind(status.as_str())
            .execute(&pool)
            .await
            .map_err(InfraError::Database)?;
            if result.rows_affected() == 0 {
                return Err(DomainError::DriverNotFound(id).into());
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, token), fields(driver_id = %id))]
    async fn set_push_token(&self, id: &DriverId, token: &str) -> Result<()> {
        let pool = self.pool.clone();
        let id = id.clone();
        let token = token.to_string();
        Self::timed("set_push_token", async move {
            let result = sqlx::query(
                "UPDATE drivers SET push_token = $2, updated_at = NOW() WHERE driver_id = $1",
            )
            .bind(id.as_str())
            .bind(&token)
            .execute(&pool)
            .await
            .map_err(InfraError::Database)?;
            if result.rows_affected() == 0 {
                return Err(DomainError::DriverNotFound(id).into());
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self), fields(driver_id = %id))]
    async fn set_driver_location(&self, id: &DriverId, location: GeoPoint) -> Result<()> {
        let pool = self.pool.clone();
        let id = id.clone();
        Self::timed("set_driver_location", async move {
            let result = sqlx::query(
                "UPDATE drivers SET last_lat = $2, last_lng = $3, updated_at = NOW() \
                 WHERE driver_id = $1",
            )
            .bind(id.as_str())
            .bind(location.lat)
            .bind(location.lng)
            .execute(&pool)
            .await
            .map_err(InfraError::Database)?;
            if result.rows_affected() == 0 {
                return Err(DomainError::DriverNotFound(id).into());
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, patch), fields(driver_id = %id))]
    async fn update_hours(&self, id: &DriverId, patch: &HoursPatch) -> Result<()> {
        let pool = self.pool.clone();
        let id = id.clone();
        let patch = patch.clone();
        Self::timed("update_hours", async move {
            let result = sqlx::query(
                "UPDATE drivers SET \
                     remaining_working_seconds = COALESCE($2, remaining_working_seconds), \
                     timer_active = COALESCE($3, timer_active), \
                     warnings_issued = COALESCE($4, warnings_issued), \
                     extended_hours_purchased = COALESCE($5, extended_hours_purchased), \
                     status = COALESCE($6, status), \
                     updated_at = NOW() \
                 WHERE driver_id = $1",
            )
            .bind(id.as_str())
            .bind(patch.remaining_working_seconds)
            .bind(patch.timer_active)
            .bind(patch.warnings_issued.map(i16::from))
            .bind(patch.extended_hours_purchased)
            .bind(patch.status.map(|s| s.as_str()))
            .execute(&pool)
            .await
            .map_err(InfraError::Database)?;
            if result.rows_affected() == 0 {
                return Err(DomainError::DriverNotFound(id).into());
            }
            Ok(())
        })
        .await
    }

    #[instrument(skip(self, description), fields(driver_id = %id, amount = %amount))]
    async fn debit_driver(
        &self,
        id: &DriverId,
        amount: Amount,
        method: TxMethod,
        description: &str,
        ride_id: Option<&RideId>,
        at: DateTime<Utc>,
    ) -> Result<WalletReceipt> {
        let pool = self.pool.clone();
        let id = id.clone();
        let description = description.to_string();
        let ride_id = ride_id.cloned();
        Self::timed("debit_driver", async move {
            let mut tx = pool.begin().await.map_err(InfraError::Database)?;

            let updated: Option<(i64,)> = sqlx::query_as(
                "UPDATE drivers SET wallet = wallet - $2, updated_at = $3 \
                 WHERE driver_id = $1 AND wallet >= $2 \
                 RETURNING wallet",
            )
            .bind(id.as_str())
            .bind(amount.get())
            .bind(at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(InfraError::Database)?;

            let Some((balance,)) = updated else {
                tx.rollback().await.map_err(InfraError::Database)?;
                // Distinguish "unknown driver" from "not enough money".
                let available: Option<(i64,)> =
                    sqlx::query_as("SELECT wallet FROM drivers WHERE driver_id = $1")
                        .bind(id.as_str())
                        .fetch_optional(&pool)
                        .await
                        .map_err(InfraError::Database)?;
                return match available {
                    Some((wallet,)) => Err(DomainError::InsufficientBalance {
                        required: amount,
                        available: Amount::saturating(wallet),
                    }
                    .into()),
                    None => Err(DomainError::DriverNotFound(id).into()),
                };
            };

            let balance_after = Amount::saturating(balance);
            let transaction = insert_transaction(
                &mut tx,
                &id,
                amount,
                TxKind::Debit,
                method,
                &description,
                balance_after,
                ride_id.as_ref(),
                at,
            )
            .await?;

            tx.commit().await.map_err(InfraError::Database)?;
            Ok(WalletReceipt {
                balance_after,
                transaction,
            })
        })
        .await
    }

    #[instrument(skip(self, description), fields(driver_id = %id, amount = %amount))]
    async fn credit_driver(
        &self,
        id: &DriverId,
        amount: Amount,
        method: TxMethod,
        description: &str,
        ride_id: Option<&RideId>,
        at: DateTime<Utc>,
    ) -> Result<WalletReceipt> {
        let pool = self.pool.clone();
        let id = id.clone();
        let description = description.to_string();
        let ride_id = ride_id.cloned();
        Self::timed("credit_driver", async move {
            let mut tx = pool.begin().await.map_err(InfraError::Database)?;

            let updated: Option<(i64,)> = sqlx::query_as(
                "UPDATE drivers SET wallet = wallet + $2, updated_at = $3 \
                 WHERE driver_id = $1 \
                 RETURNING wallet",
            )
            .bind(id.as_str())
            .bind(amount.get())
            .bind(at)
            .fetch_optional(&mut *tx)
            .await
            .map_err(InfraError::Database)?;

            let Some((balance,)) = updated else {
                tx.rollback().await.map_err(InfraError::Database)?;
                return Err(DomainError::DriverNotFound(id).into());
            };

            let balance_after = Amount::saturating(balance);
            let transaction = insert_transaction(
                &mut tx,
                &id,
                amount,
                TxKind::Credit,
                method,
                &description,
                balance_after,
                ride_id.as_ref(),
                at,
            )
            .await?;

            tx.commit().await.map_err(InfraError::Database)?;
            Ok(WalletReceipt {
                balance_after,
                transaction,
            })
        })
        .await
    }
}

/// Write one ledger row inside an open transaction.
#[allow(clippy::too_many_arguments)]
async fn insert_transaction(
    tx: &mut PgTransaction<'_, Postgres>,
    driver_id: &DriverId,
    amount: Amount,
    kind: TxKind,
    method: TxMethod,
    description: &str,
    balance_after: Amount,
    ride_id: Option<&RideId>,
    at: DateTime<Utc>,
) -> Result<Transaction> {
    let id = Uuid::new_v4();
    sqlx::query(
        "INSERT INTO transactions \
             (id, driver_id, amount, kind, method, description, balance_after, ride_id, created_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
    )
    .bind(id)
    .bind(driver_id.as_str())
    .bind(amount.get())
    .bind(kind.as_str())
    .bind(method.as_str())
    .bind(description)
    .bind(balance_after.get())
    .bind(ride_id.map(RideId::as_str))
    .bind(at)
    .execute(&mut **tx)
    .await
    .map_err(InfraError::Database)?;

    Ok(Transaction {
        id,
        driver_id: driver_id.clone(),
        amount,
        kind,
        method,
        description: description.to_string(),
        balance_after,
        ride_id: ride_id.cloned(),
        created_at: at,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// USER STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Database row for users.
#[derive(Debug, FromRow)]
struct UserRow {
    id: Uuid,
    customer_id: String,
    name: String,
    phone: String,
    wallet: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = AppError;

    fn try_from(row: UserRow) -> std::result::Result<Self, Self::Error> {
        Ok(User {
            id: row.id,
            customer_id: CustomerId::new(row.customer_id),
            name: row.name,
            phone: row.phone,
            wallet: Amount::new(row.wallet)
                .map_err(|e| InfraError::Internal(format!("bad wallet in DB: {e}")))?,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    #[instrument(skip(self))]
    async fn get_user(&self, id: &Uuid) -> Result<Option<User>> {
        let pool = self.pool.clone();
        let id = *id;
        Self::timed("get_user", async move {
            let row = sqlx::query_as::<_, UserRow>(
                "SELECT id, customer_id, name, phone, wallet, updated_at FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&pool)
            .await
            .map_err(InfraError::Database)?;
            row.map(User::try_from).transpose()
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_user_by_customer_id(&self, customer_id: &str) -> Result<Option<User>> {
        let pool = self.pool.clone();
        let customer_id = customer_id.to_string();
        Self::timed("get_user_by_customer_id", async move {
            let row = sqlx::query_as::<_, UserRow>(
                "SELECT id, customer_id, name, phone, wallet, updated_at FROM users \
                 WHERE customer_id = $1",
            )
            .bind(&customer_id)
            .fetch_optional(&pool)
            .await
            .map_err(InfraError::Database)?;
            row.map(User::try_from).transpose()
        })
        .await
    }

    #[instrument(skip(self), fields(amount = %amount))]
    async fn debit_user(&self, id: &Uuid, amount: Amount) -> Result<Amount> {
        let pool = self.pool.clone();
        let id = *id;
        Self::timed("debit_user", async move {
            let updated: Option<(i64,)> = sqlx::query_as(
                "UPDATE users SET wallet = wallet - $2, updated_at = NOW() \
                 WHERE id = $1 AND wallet >= $2 \
                 RETURNING wallet",
            )
            .bind(id)
            .bind(amount.get())
            .fetch_optional(&pool)
            .await
            .map_err(InfraError::Database)?;

            match updated {
                Some((balance,)) => Ok(Amount::saturating(balance)),
                None => {
                    let available: Option<(i64,)> =
                        sqlx::query_as("SELECT wallet FROM users WHERE id = $1")
                            .bind(id)
                            .fetch_optional(&pool)
                            .await
                            .map_err(InfraError::Database)?;
                    match available {
                        Some((wallet,)) => Err(DomainError::InsufficientBalance {
                            required: amount,
                            available: Amount::saturating(wallet),
                        }
                        .into()),
                        None => Err(DomainError::UserNotFound(id.to_string()).into()),
                    }
                }
            }
        })
        .await
    }

    #[instrument(skip(self), fields(amount = %amount))]
    async fn credit_user(&self, id: &Uuid, amount: Amount) -> Result<Amount> {
        let pool = self.pool.clone();
        let id = *id;
        Self::timed("credit_user", async move {
            let updated: Option<(i64,)> = sqlx::query_as(
                "UPDATE users SET wallet = wallet + $2, updated_at = NOW() \
                 WHERE id = $1 \
                 RETURNING wallet",
            )
            .bind(id)
            .bind(amount.get())
            .fetch_optional(&pool)
            .await
            .map_err(InfraError::Database)?;

            updated
                .map(|(balance,)| Amount::saturating(balance))
                .ok_or_else(|| DomainError::UserNotFound(id.to_string()).into())
        })
        .await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RIDE STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Database row for rides.
#[derive(Debug, FromRow)]
struct RideRow {
    id: Uuid,
    raid_id: String,
    user_id: Uuid,
    customer_id: String,
    user_name: String,
    user_phone: String,
    vehicle_type: String,
    pickup_lat: f64,
    pickup_lng: f64,
    pickup_address: String,
    drop_lat: f64,
    drop_lng: f64,
    drop_address: String,
    distance_km: f64,
    fare: i64,
    otp: String,
    status: String,
    payment_method: String,
    driver_id: Option<String>,
    driver_name: Option<String>,
    rejected_by: String,
    actual_distance_km: Option<f64>,
    actual_fare: Option<i64>,
    actual_pickup_lat: Option<f64>,
    actual_pickup_lng: Option<f64>,
    actual_pickup_address: Option<String>,
    actual_drop_lat: Option<f64>,
    actual_drop_lng: Option<f64>,
    actual_drop_address: Option<String>,
    requested_at: DateTime<Utc>,
    accepted_at: Option<DateTime<Utc>>,
    arrived_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    cancelled_at: Option<DateTime<Utc>>,
}

fn optional_place(
    lat: Option<f64>,
    lng: Option<f64>,
    address: Option<String>,
) -> Option<Place> {
    match (lat, lng) {
        (Some(lat), Some(lng)) => Some(Place {
            lat,
            lng,
            address: address.unwrap_or_default(),
        }),
        _ => None,
    }
}

impl TryFrom<RideRow> for Ride {
    type Error = AppError;

    fn try_from(row: RideRow) -> std::result::Result<Self, Self::Error> {
        let rejected_by: Vec<Rejection> = serde_json::from_str(&row.rejected_by)
            .map_err(|e| InfraError::Internal(format!("bad rejected_by in DB: {e}")))?;
        Ok(Ride {
            id: row.id,
            raid_id: RideId::from_str(&row.raid_id)
                .map_err(|e| InfraError::Internal(format!("bad raid id in DB: {e}")))?,
            user_id: row.user_id,
            customer_id: CustomerId::new(row.customer_id),
            user_name: row.user_name,
            user_phone: row.user_phone,
            vehicle_type: VehicleType::from_str(&row.vehicle_type)
                .map_err(|e| InfraError::Internal(format!("bad vehicle type in DB: {e}")))?,
            pickup: Place {
                lat: row.pickup_lat,
                lng: row.pickup_lng,
                address: row.pickup_address,
            },
            drop: Place {
                lat: row.drop_lat,
                lng: row.drop_lng,
                address: row.drop_address,
            },
            distance_km: row.distance_km,
            fare: Amount::new(row.fare)
                .map_err(|e| InfraError::Internal(format!("bad fare in DB: {e}")))?,
            otp: Otp::from(row.otp),
            status: RideStatus::from_str(&row.status)
                .map_err(|e| InfraError::Internal(format!("bad ride status in DB: {e}")))?,
            payment_method: PaymentMethod::from_str(&row.payment_method)
                .map_err(|e| InfraError::Internal(format!("bad payment method in DB: {e}")))?,
            driver_id: row.driver_id.map(DriverId::new),
            driver_name: row.driver_name,
            rejected_by,
            actual_distance_km: row.actual_distance_km,
            actual_fare: row.actual_fare.map(Amount::saturating),
            actual_pickup: optional_place(
                row.actual_pickup_lat,
                row.actual_pickup_lng,
                row.actual_pickup_address,
            ),
            actual_drop: optional_place(
                row.actual_drop_lat,
                row.actual_drop_lng,
                row.actual_drop_address,
            ),
            requested_at: row.requested_at,
            accepted_at: row.accepted_at,
            arrived_at: row.arrived_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

const RIDE_COLUMNS: &str = "id, raid_id, user_id, customer_id, user_name, user_phone, \
     vehicle_type, pickup_lat, pickup_lng, pickup_address, drop_lat, drop_lng, drop_address, \
     distance_km, fare, otp, status, payment_method, driver_id, driver_name, rejected_by, \
     actual_distance_km, actual_fare, actual_pickup_lat, actual_pickup_lng, \
     actual_pickup_address, actual_drop_lat, actual_drop_lng, actual_drop_address, \
     requested_at, accepted_at, arrived_at, started_at, completed_at, cancelled_at";

#[async_trait]
impl RideStore for PostgresStore {
    #[instrument(skip(self, ride), fields(raid_id = %ride.raid_id))]
    async fn insert_ride(&self, ride: &Ride) -> Result<()> {
        let pool = self.pool.clone();
        let ride = ride.clone();
        Self::timed("insert_ride", async move {
            let rejected_by = serde_json::to_string(&ride.rejected_by)
                .map_err(InfraError::Serialization)?;
            sqlx::query(
                "INSERT INTO rides (id, raid_id, user_id, customer_id, user_name, user_phone, \
                     vehicle_type, pickup_lat, pickup_lng, pickup_address, drop_lat, drop_lng, \
                     drop_address, distance_km, fare, otp, status, payment_method, rejected_by, \
                     requested_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
                     $17, $18, $19, $20)",
            )
            .bind(ride.id)
            .bind(ride.raid_id.as_str())
            .bind(ride.user_id)
            .bind(ride.customer_id.as_str())
            .bind(&ride.user_name)
            .bind(&ride.user_phone)
            .bind(ride.vehicle_type.as_str())
            .bind(ride.pickup.lat)
            .bind(ride.pickup.lng)
            .bind(&ride.pickup.address)
            .bind(ride.drop.lat)
            .bind(ride.drop.lng)
            .bind(&ride.drop.address)
            .bind(ride.distance_km)
            .bind(ride.fare.get())
            .bind(ride.otp.as_str())
            .bind(ride.status.as_str())
            .bind(ride.payment_method.as_str())
            .bind(&rejected_by)
            .bind(ride.requested_at)
            .execute(&pool)
            .await
            .map_err(|e| map_insert_error(e, &ride.raid_id))?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self), fields(raid_id = %raid_id))]
    async fn get_ride(&self, raid_id: &RideId) -> Result<Option<Ride>> {
        let pool = self.pool.clone();
        let raid_id = raid_id.clone();
        Self::timed("get_ride", async move {
            let row = sqlx::query_as::<_, RideRow>(&format!(
                "SELECT {RIDE_COLUMNS} FROM rides WHERE raid_id = $1"
            ))
            .bind(raid_id.as_str())
            .fetch_optional(&pool)
            .await
            .map_err(InfraError::Database)?;
            row.map(Ride::try_from).transpose()
        })
        .await
    }

    #[instrument(skip(self, driver_name), fields(raid_id = %raid_id, driver_id = %driver_id))]
    async fn try_accept(
        &self,
        raid_id: &RideId,
        driver_id: &DriverId,
        driver_name: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<Option<Ride>> {
        let pool = self.pool.clone();
        let raid_id = raid_id.clone();
        let driver_id = driver_id.clone();
        let driver_name = driver_name.map(str::to_string);
        Self::timed("try_accept", async move {
            // The CAS and the read-back happen in the same statement; losing
            // racers simply match zero rows.
            let row = sqlx::query_as::<_, RideRow>(&format!(
                "UPDATE rides SET status = 'accepted', driver_id = $2, driver_name = $3, \
                     accepted_at = $4 \
                 WHERE raid_id = $1 AND status = 'pending' \
                 RETURNING {RIDE_COLUMNS}"
            ))
            .bind(raid_id.as_str())
            .bind(driver_id.as_str())
            .bind(driver_name.as_deref())
            .bind(at)
            .fetch_optional(&pool)
            .await
            .map_err(InfraError::Database)?;
            row.map(Ride::try_from).transpose()
        })
        .await
    }

    #[instrument(skip(self, from), fields(raid_id = %raid_id, to = %to))]
    async fn transition_ride(
        &self,
        raid_id: &RideId,
        from: &[RideStatus],
        to: RideStatus,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let pool = self.pool.clone();
        let raid_id = raid_id.clone();
        let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();
        // Column names come from a fixed enum match, never from input.
        let stamp_column = match to {
            RideStatus::Accepted => "accepted_at",
            RideStatus::Arrived => "arrived_at",
            RideStatus::Started => "started_at",
            RideStatus::Completed => "completed_at",
            RideStatus::Cancelled => "cancelled_at",
            RideStatus::Pending => "requested_at",
        };
        Self::timed("transition_ride", async move {
            let result = sqlx::query(&format!(
                "UPDATE rides SET status = $2, {stamp_column} = $3 \
                 WHERE raid_id = $1 AND status = ANY($4)"
            ))
            .bind(raid_id.as_str())
            .bind(to.as_str())
            .bind(at)
            .bind(&from)
            .execute(&pool)
            .await
            .map_err(InfraError::Database)?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    #[instrument(skip(self, actual_pickup, actual_drop), fields(raid_id = %raid_id))]
    async fn complete_ride(
        &self,
        raid_id: &RideId,
        actual_distance_km: f64,
        actual_fare: Amount,
        actual_pickup: Option<&Place>,
        actual_drop: Option<&Place>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let pool = self.pool.clone();
        let raid_id = raid_id.clone();
        let actual_pickup = actual_pickup.cloned();
        let actual_drop = actual_drop.cloned();
        Self::timed("complete_ride", async move {
            let result = sqlx::query(
                "UPDATE rides SET status = 'completed', completed_at = $2, \
                     actual_distance_km = $3, actual_fare = $4, \
                     actual_pickup_lat = $5, actual_pickup_lng = $6, actual_pickup_address = $7, \
                     actual_drop_lat = $8, actual_drop_lng = $9, actual_drop_address = $10 \
                 WHERE raid_id = $1 AND status IN ('accepted', 'arrived', 'started')",
            )
            .bind(raid_id.as_str())
            .bind(at)
            .bind(actual_distance_km)
            .bind(actual_fare.get())
            .bind(actual_pickup.as_ref().map(|p| p.lat))
            .bind(actual_pickup.as_ref().map(|p| p.lng))
            .bind(actual_pickup.as_ref().map(|p| p.address.clone()))
            .bind(actual_drop.as_ref().map(|p| p.lat))
            .bind(actual_drop.as_ref().map(|p| p.lng))
            .bind(actual_drop.as_ref().map(|p| p.address.clone()))
            .execute(&pool)
            .await
            .map_err(InfraError::Database)?;
            Ok(result.rows_affected() > 0)
        })
        .await
    }

    #[instrument(skip(self, rejection), fields(raid_id = %raid_id))]
    async fn add_rejection(&self, raid_id: &RideId, rejection: &Rejection) -> Result<()> {
        let pool = self.pool.clone();
        let raid_id = raid_id.clone();
        let rejection = rejection.clone();
        Self::timed("add_rejection", async move {
            let entry =
                serde_json::to_string(&rejection).map_err(InfraError::Serialization)?;
            let result = sqlx::query(
                // rejected_by is a JSON array stored as text; append in place.
                "UPDATE rides SET rejected_by = \
                     (rejected_by::jsonb || $2::jsonb)::text \
                 WHERE raid_id = $1",
            )
            .bind(raid_id.as_str())
            .bind(format!("[{entry}]"))
            .execute(&pool)
            .await
            .map_err(InfraError::Database)?;
            if result.rows_affected() == 0 {
                return Err(DomainError::RideNotFound(raid_id).into());
            }
            Ok(())
        })
        .await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER STORE
// ═══════════════════════════════════════════════════════════════════════════════

/// Database row for ledger transactions.
#[derive(Debug, FromRow)]
struct TransactionRow {
    id: Uuid,
    driver_id: String,
    amount: i64,
    kind: String,
    method: String,
    description: String,
    balance_after: i64,
    ride_id: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = AppError;

    fn try_from(row: TransactionRow) -> std::result::Result<Self, Self::Error> {
        Ok(Transaction {
            id: row.id,
            driver_id: DriverId::new(row.driver_id),
            amount: Amount::new(row.amount)
                .map_err(|e| InfraError::Internal(format!("bad amount in DB: {e}")))?,
            kind: TxKind::from_str(&row.kind)
                .map_err(|e| InfraError::Internal(format!("bad tx kind in DB: {e}")))?,
            method: TxMethod::from_str(&row.method)
                .map_err(|e| InfraError::Internal(format!("bad tx method in DB: {e}")))?,
            description: row.description,
            balance_after: Amount::new(row.balance_after)
                .map_err(|e| InfraError::Internal(format!("bad balance in DB: {e}")))?,
            ride_id: row
                .ride_id
                .map(|r| RideId::from_str(&r))
                .transpose()
                .map_err(|e| InfraError::Internal(format!("bad ride id in DB: {e}")))?,
            created_at: row.created_at,
        })
    }
}

#[async_trait]
impl LedgerStore for PostgresStore {
    #[instrument(skip(self), fields(driver_id = %id))]
    async fn transactions_for_driver(
        &self,
        id: &DriverId,
        limit: u32,
    ) -> Result<Vec<Transaction>> {
        let pool = self.pool.clone();
        let id = id.clone();
        Self::timed("transactions_for_driver", async move {
            let rows = sqlx::query_as::<_, TransactionRow>(
                "SELECT id, driver_id, amount, kind, method, description, balance_after, \
                     ride_id, created_at \
                 FROM transactions WHERE driver_id = $1 \
                 ORDER BY created_at DESC LIMIT $2",
            )
            .bind(id.as_str())
            .bind(i64::from(limit))
            .fetch_all(&pool)
            .await
            .map_err(InfraError::Database)?;
            rows.into_iter().map(Transaction::try_from).collect()
        })
        .await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOCATION STORE
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl LocationStore for PostgresStore {
    #[instrument(skip(self, sample))]
    async fn append_location(&self, sample: &LocationSample) -> Result<()> {
        let pool = self.pool.clone();
        let sample = sample.clone();
        Self::timed("append_location", async move {
            sqlx::query(
                "INSERT INTO location_samples \
                     (id, subject, kind, lat, lng, ride_id, status, recorded_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(sample.id)
            .bind(&sample.subject)
            .bind(sample.kind.as_str())
            .bind(sample.lat)
            .bind(sample.lng)
            .bind(sample.ride_id.as_ref().map(RideId::as_str))
            .bind(sample.status.map(|s| s.as_str()))
            .bind(sample.recorded_at)
            .execute(&pool)
            .await
            .map_err(InfraError::Database)?;
            Ok(())
        })
        .await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COUNTER STORE
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl CounterStore for PostgresStore {
    #[instrument(skip(self))]
    async fn next_ride_sequence(&self) -> Result<u32> {
        let pool = self.pool.clone();
        Self::timed("next_ride_sequence", async move {
            let (sequence,): (i64,) = sqlx::query_as(
                "INSERT INTO sequence_counters (id, sequence) VALUES ('ride', 1) \
                 ON CONFLICT (id) DO UPDATE SET sequence = \
                     CASE WHEN sequence_counters.sequence >= 999999 THEN 100000 \
                          ELSE sequence_counters.sequence + 1 END \
                 RETURNING sequence",
            )
            .fetch_one(&pool)
            .await
            .map_err(InfraError::Database)?;
            u32::try_from(sequence)
                .map_err(|_| InfraError::Internal("sequence out of range".into()).into())
        })
        .await
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICING STORE
// ═══════════════════════════════════════════════════════════════════════════════

#[async_trait]
impl PricingStore for PostgresStore {
    #[instrument(skip(self))]
    async fn load_prices(&self) -> Result<Vec<(VehicleType, i64)>> {
        let pool = self.pool.clone();
        Self::timed("load_prices", async move {
            let rows: Vec<(String, i64)> =
                sqlx::query_as("SELECT vehicle_type, rate_per_km FROM ride_prices")
                    .fetch_all(&pool)
                    .await
                    .map_err(InfraError::Database)?;
            let mut prices = Vec::with_capacity(rows.len());
            for (vehicle_type, rate) in rows {
                let vt = VehicleType::from_str(&vehicle_type)
                    .map_err(|e| InfraError::Internal(format!("bad vehicle type in DB: {e}")))?;
                prices.push((vt, rate));
            }
            Ok(prices)
        })
        .await
    }

    #[instrument(skip(self))]
    async fn upsert_price(&self, vehicle_type: VehicleType, rate_per_km: i64) -> Result<()> {
        let pool = self.pool.clone();
        Self::timed("upsert_price", async move {
            sqlx::query(
                "INSERT INTO ride_prices (vehicle_type, rate_per_km) VALUES ($1, $2) \
                 ON CONFLICT (vehicle_type) DO UPDATE SET rate_per_km = EXCLUDED.rate_per_km",
            )
            .bind(vehicle_type.as_str())
            .bind(rate_per_km)
            .execute(&pool)
            .await
            .map_err(InfraError::Database)?;
            Ok(())
        })
        .await
    }
}
