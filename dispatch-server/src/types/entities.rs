//! Domain entities for database persistence.
//!
//! These structs represent the authoritative state of drivers, passengers,
//! rides and the monetary ledger. In-memory caches (presence, active rides)
//! hold value snapshots of these; the store owns the truth.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{
    DriverStatus, PaymentMethod, RideStatus, SubjectKind, TxKind, TxMethod, VehicleType,
};
use super::primitives::{Amount, CustomerId, DriverId, GeoPoint, Otp, RideId};

// ═══════════════════════════════════════════════════════════════════════════════
// DRIVER
// ═══════════════════════════════════════════════════════════════════════════════

/// A provisioned driver.
///
/// The `vehicle_type` is immutable after provisioning; no core path writes
/// it. The wallet is a non-negative balance mutated only through the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    /// Internal identifier.
    pub id: Uuid,
    /// Stable external identifier (`DRV001`).
    pub driver_id: DriverId,
    /// Display name.
    pub name: String,
    /// Contact phone number.
    pub phone: String,
    /// Vehicle category, fixed at provisioning.
    pub vehicle_type: VehicleType,
    /// Registration plate.
    pub vehicle_number: String,
    /// Current wallet balance.
    pub wallet: Amount,
    /// Availability state.
    pub status: DriverStatus,
    /// Shift length in hours (12 or 24).
    pub working_hours_limit: u8,
    /// Amount auto-debited when the timer expires.
    pub deduction_amount: Amount,
    /// Seconds left on the working-hours countdown.
    pub remaining_working_seconds: i64,
    /// Whether the countdown is currently armed.
    pub timer_active: bool,
    /// Warnings already issued this shift (0–3).
    pub warnings_issued: u8,
    /// Whether extended hours were bought (auto or manual) this shift.
    pub extended_hours_purchased: bool,
    /// Last reported position.
    pub last_location: Option<GeoPoint>,
    /// Push-notification token, if the device registered one.
    pub push_token: Option<String>,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

impl Driver {
    /// Full shift length in seconds.
    #[must_use]
    pub const fn working_seconds_limit(&self) -> i64 {
        self.working_hours_limit as i64 * 3600
    }

    /// Price of the add-half-time purchase for this driver's shift length.
    #[must_use]
    pub const fn half_time_price(&self) -> Amount {
        match self.working_hours_limit {
            24 => Amount::saturating(100),
            _ => Amount::saturating(50),
        }
    }

    /// Price of the add-full-time purchase for this driver's shift length.
    #[must_use]
    pub const fn full_time_price(&self) -> Amount {
        match self.working_hours_limit {
            24 => Amount::saturating(200),
            _ => Amount::saturating(100),
        }
    }

    /// Whether a go-online call should resume the previous shift instead of
    /// starting (and charging for) a new one.
    #[must_use]
    pub const fn is_resumable(&self) -> bool {
        !self.timer_active && self.remaining_working_seconds > 0
    }
}

/// Partial update of a driver's working-hours fields.
///
/// `None` leaves the column untouched; the store applies the patch as one
/// conditional write so timer state never tears.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoursPatch {
    /// New countdown remainder.
    pub remaining_working_seconds: Option<i64>,
    /// Arm or disarm the timer.
    pub timer_active: Option<bool>,
    /// Reset or bump the warning count.
    pub warnings_issued: Option<u8>,
    /// Record an extended-hours purchase.
    pub extended_hours_purchased: Option<bool>,
    /// Driver availability change riding along with the timer change.
    pub status: Option<DriverStatus>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// USER (PASSENGER)
// ═══════════════════════════════════════════════════════════════════════════════

/// A passenger account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Internal identifier; its string form names the user's private room.
    pub id: Uuid,
    /// Stable external identifier (`CUS0065`).
    pub customer_id: CustomerId,
    /// Display name.
    pub name: String,
    /// Contact phone number.
    pub phone: String,
    /// Passenger wallet balance.
    pub wallet: Amount,
    /// Last mutation time.
    pub updated_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RIDE
// ═══════════════════════════════════════════════════════════════════════════════

/// A pickup or drop point with its display address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Human-readable address.
    pub address: String,
}

impl Place {
    /// The coordinate part of the place.
    #[must_use]
    pub const fn point(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

/// A driver's refusal of an offered ride.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rejection {
    /// Who declined.
    pub driver_id: DriverId,
    /// Free-text reason, if the client sent one.
    pub reason: Option<String>,
    /// When the refusal was recorded.
    pub at: DateTime<Utc>,
}

/// A booking instance.
///
/// `vehicle_type`, `fare` and `otp` are fixed at creation. `driver_id` is
/// written exactly once, by the accept compare-and-set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    /// Internal identifier.
    pub id: Uuid,
    /// Human-readable identifier (`RID000001`).
    pub raid_id: RideId,
    /// Booking passenger.
    pub user_id: Uuid,
    /// Passenger's external id snapshot.
    pub customer_id: CustomerId,
    /// Passenger name snapshot.
    pub user_name: String,
    /// Passenger phone snapshot.
    pub user_phone: String,
    /// Requested vehicle category.
    pub vehicle_type: VehicleType,
    /// Pickup point.
    pub pickup: Place,
    /// Drop point.
    pub drop: Place,
    /// Client-estimated trip distance.
    pub distance_km: f64,
    /// Server-computed quoted fare.
    pub fare: Amount,
    /// Ride-start gate code.
    pub otp: Otp,
    /// Lifecycle state.
    pub status: RideStatus,
    /// Settlement method.
    pub payment_method: PaymentMethod,
    /// Winning driver, set by the accept CAS.
    pub driver_id: Option<DriverId>,
    /// Winning driver's display name.
    pub driver_name: Option<String>,
    /// Drivers who declined this ride.
    pub rejected_by: Vec<Rejection>,
    /// Distance actually driven, recorded at completion.
    pub actual_distance_km: Option<f64>,
    /// Authoritative recomputed fare, recorded at completion.
    pub actual_fare: Option<Amount>,
    /// Where the trip actually began.
    pub actual_pickup: Option<Place>,
    /// Where the trip actually ended.
    pub actual_drop: Option<Place>,
    /// Creation time.
    pub requested_at: DateTime<Utc>,
    /// Acceptance time.
    pub accepted_at: Option<DateTime<Utc>>,
    /// Pickup-arrival time.
    pub arrived_at: Option<DateTime<Utc>>,
    /// Trip-start time.
    pub started_at: Option<DateTime<Utc>>,
    /// Completion time.
    pub completed_at: Option<DateTime<Utc>>,
    /// Cancellation time.
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Ride {
    /// Whether the ride is still waiting for a driver.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self.status, RideStatus::Pending)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER TRANSACTION
// ═══════════════════════════════════════════════════════════════════════════════

/// Immutable ledger record paired with every driver wallet mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Internal identifier.
    pub id: Uuid,
    /// Wallet owner.
    pub driver_id: DriverId,
    /// Magnitude of the mutation (always positive).
    pub amount: Amount,
    /// Debit or credit.
    pub kind: TxKind,
    /// Business reason.
    pub method: TxMethod,
    /// Human-readable description.
    pub description: String,
    /// Wallet balance after this mutation committed.
    pub balance_after: Amount,
    /// Associated ride, when the mutation is ride-related.
    pub ride_id: Option<RideId>,
    /// When the mutation committed.
    pub created_at: DateTime<Utc>,
}

/// Result of an atomic wallet mutation: the new balance and its paired
/// ledger record.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletReceipt {
    /// Balance after the mutation.
    pub balance_after: Amount,
    /// The ledger record written in the same commit.
    pub transaction: Transaction,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOCATION SAMPLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Append-only position sample for a driver or an in-ride passenger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    /// Internal identifier.
    pub id: Uuid,
    /// External id of the subject (driver id or user internal id string).
    pub subject: String,
    /// Driver or user sample.
    pub kind: SubjectKind,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Associated ride, for passenger samples and on-ride driver samples.
    pub ride_id: Option<RideId>,
    /// Driver status at sample time (driver samples only).
    pub status: Option<DriverStatus>,
    /// When the sample was taken.
    pub recorded_at: DateTime<Utc>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TIMER SNAPSHOT
// ═══════════════════════════════════════════════════════════════════════════════

/// Point-in-time view of a driver's working-hours state, served by the
/// status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    /// Seconds left on the countdown.
    pub remaining_seconds: i64,
    /// Whether the countdown is running.
    pub timer_active: bool,
    /// Warnings issued so far this shift.
    pub warnings_issued: u8,
    /// Shift length in hours.
    pub working_hours_limit: u8,
    /// Whether extended hours were bought this shift.
    pub extended_hours_purchased: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_driver(limit: u8) -> Driver {
        Driver {
            id: Uuid::new_v4(),
            driver_id: DriverId::new("DRV001"),
            name: "Arun".into(),
            phone: "9000000001".into(),
            vehicle_type: VehicleType::Bike,
            vehicle_number: "TN 33 A 1234".into(),
            wallet: Amount::saturating(500),
            status: DriverStatus::Offline,
            working_hours_limit: limit,
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

    #[test]
    fn shift_length_in_seconds() {
        assert_eq!(sample_driver(12).working_seconds_limit(), 43_200);
        assert_eq!(sample_driver(24).working_seconds_limit(), 86_400);
    }

    #[test]
    fn extra_time_prices_scale_with_limit() {
        let d12 = sample_driver(12);
        assert_eq!(d12.half_time_price().get(), 50);
        assert_eq!(d12.full_time_price().get(), 100);

        let d24 = sample_driver(24);
        assert_eq!(d24.half_time_price().get(), 100);
        assert_eq!(d24.full_time_price().get(), 200);
    }

    #[test]
    fn resume_detection_is_a_field_pair() {
        let mut d = sample_driver(12);
        assert!(!d.is_resumable());

        d.remaining_working_seconds = 30_000;
        assert!(d.is_resumable());

        d.timer_active = true;
        assert!(!d.is_resumable(), "a running timer is not resumable");
    }

    #[test]
    fn place_point_round_trip() {
        let p = Place {
            lat: 11.3459,
            lng: 77.7216,
            address: "Perundurai Rd".into(),
        };
        assert!((p.point().lat - 11.3459).abs() < 1e-12);
        assert!((p.point().lng - 77.7216).abs() < 1e-12);
    }
}
