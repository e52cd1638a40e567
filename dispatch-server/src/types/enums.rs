//! Domain enumerations for the dispatch core.
//!
//! Each enum provides:
//! - Safe conversion from/to the wire strings used by the mobile clients
//! - JSON serialization via `serde`
//! - Domain-specific helper methods
//!
//! The store persists these as lowercase text; conversion happens at the
//! adapter boundary so legacy spellings (`online`, `available`) normalize
//! into the canonical variants on the way in.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// VEHICLE TYPE
// ═══════════════════════════════════════════════════════════════════════════════

/// Vehicle categories a driver can be provisioned with.
///
/// Immutable after provisioning: no core path ever rewrites a driver's
/// vehicle type, and dispatch filters on it strictly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    /// Two-wheeler.
    Bike,
    /// Car / cab.
    Taxi,
    /// Goods carrier.
    Port,
}

impl VehicleType {
    /// Canonical lowercase wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bike => "bike",
            Self::Taxi => "taxi",
            Self::Port => "port",
        }
    }

    /// Default per-km rate in currency units, used when the pricing table
    /// has no usable entry for this type.
    #[must_use]
    pub const fn default_rate_per_km(&self) -> i64 {
        match self {
            Self::Bike => 15,
            Self::Taxi => 40,
            Self::Port => 75,
        }
    }

    /// All vehicle types, in display order.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::Bike, Self::Taxi, Self::Port]
    }
}

impl fmt::Display for VehicleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an unknown vehicle type string is provided.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid vehicle type: {0}")]
pub struct InvalidVehicleType(pub String);

impl FromStr for VehicleType {
    type Err = InvalidVehicleType;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        // Clients are inconsistent about casing; normalize here.
        match value.trim().to_ascii_lowercase().as_str() {
            "bike" => Ok(Self::Bike),
            "taxi" => Ok(Self::Taxi),
            "port" => Ok(Self::Port),
            _ => Err(InvalidVehicleType(value.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DRIVER STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Driver availability state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DriverStatus {
    /// Not accepting rides; timer paused or never started.
    #[serde(rename = "offline")]
    Offline,
    /// Online and dispatchable.
    #[serde(rename = "live")]
    Live,
    /// Currently serving a ride.
    #[serde(rename = "onRide")]
    OnRide,
}

impl DriverStatus {
    /// Canonical wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Live => "live",
            Self::OnRide => "onRide",
        }
    }

    /// Whether a driver in this state can receive new ride offers.
    #[must_use]
    pub const fn is_dispatchable(&self) -> bool {
        matches!(self, Self::Live)
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an unknown driver status string is provided.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid driver status: {0}")]
pub struct InvalidDriverStatus(pub String);

impl FromStr for DriverStatus {
    type Err = InvalidDriverStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "offline" => Ok(Self::Offline),
            // Legacy rows carry "online" / "available"; both mean dispatchable.
            "live" | "online" | "available" => Ok(Self::Live),
            "onRide" | "onride" | "on_ride" => Ok(Self::OnRide),
            other => Err(InvalidDriverStatus(other.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RIDE STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Ride lifecycle states.
///
/// ```text
/// pending ──accept──▶ accepted ──arrived──▶ arrived ──start──▶ started
///   │                    │                     │                   │
///   └──cancel──▶ cancelled ◀───────────────────┘                   │
///                                                                  ▼
///                     accepted/arrived/started ──complete──▶ completed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RideStatus {
    /// Created, waiting for a driver to accept.
    Pending,
    /// A driver has won the acceptance race.
    Accepted,
    /// The driver has reached the pickup point.
    Arrived,
    /// The OTP checked out and the trip is underway.
    Started,
    /// Terminal: trip finished and billed.
    Completed,
    /// Terminal: abandoned before the trip started.
    Cancelled,
}

impl RideStatus {
    /// Canonical lowercase wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Accepted => "accepted",
            Self::Arrived => "arrived",
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the ride has reached a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Whether the state machine allows moving from `self` to `next`.
    ///
    /// Progression is strictly monotonic; completion is reachable from any
    /// post-acceptance state so a trip interrupted mid-ride can still be
    /// settled with the recorded distance.
    #[must_use]
    pub const fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Accepted | Self::Cancelled)
                | (Self::Accepted, Self::Arrived | Self::Completed | Self::Cancelled)
                | (Self::Arrived, Self::Started | Self::Completed | Self::Cancelled)
                | (Self::Started, Self::Completed)
        )
    }

    /// The set of states a completion may be applied from.
    #[must_use]
    pub const fn completable_from() -> [Self; 3] {
        [Self::Accepted, Self::Arrived, Self::Started]
    }
}

impl fmt::Display for RideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when an unknown ride status string is provided.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid ride status: {0}")]
pub struct InvalidRideStatus(pub String);

impl FromStr for RideStatus {
    type Err = InvalidRideStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "pending" => Ok(Self::Pending),
            "accepted" => Ok(Self::Accepted),
            "arrived" => Ok(Self::Arrived),
            "started" => Ok(Self::Started),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(InvalidRideStatus(other.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// PAYMENT METHOD
// ═══════════════════════════════════════════════════════════════════════════════

/// How the passenger settles the fare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Cash handed to the driver.
    #[default]
    Cash,
    /// Online payment collected outside the core.
    Online,
    /// Debited from the passenger wallet on completion.
    Wallet,
    /// Settled driver-to-driver (fleet arrangement).
    DriverTransfer,
}

impl PaymentMethod {
    /// Canonical snake_case wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Online => "online",
            Self::Wallet => "wallet",
            Self::DriverTransfer => "driver_transfer",
        }
    }
}

/// Error returned when an unknown payment method string is provided.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid payment method: {0}")]
pub struct InvalidPaymentMethod(pub String);

impl FromStr for PaymentMethod {
    type Err = InvalidPaymentMethod;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "cash" => Ok(Self::Cash),
            "online" => Ok(Self::Online),
            "wallet" => Ok(Self::Wallet),
            "driver_transfer" => Ok(Self::DriverTransfer),
            other => Err(InvalidPaymentMethod(other.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER ENUMS
// ═══════════════════════════════════════════════════════════════════════════════

/// Direction of a wallet mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    /// Money leaves the wallet.
    Debit,
    /// Money enters the wallet.
    Credit,
}

impl TxKind {
    /// Canonical wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Debit => "debit",
            Self::Credit => "credit",
        }
    }
}

/// Error returned when an unknown transaction kind string is provided.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transaction kind: {0}")]
pub struct InvalidTxKind(pub String);

impl FromStr for TxKind {
    type Err = InvalidTxKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "debit" => Ok(Self::Debit),
            "credit" => Ok(Self::Credit),
            other => Err(InvalidTxKind(other.to_string())),
        }
    }
}

/// Business reason attached to every ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxMethod {
    /// The fixed fee charged when a new shift starts.
    ShiftStartFee,
    /// Automatic deduction when the working-hours timer expires.
    ExtendedHoursAutoDebit,
    /// Driver-initiated purchase of extended hours.
    ExtendedHoursPurchase,
    /// Driver bought half the shift length extra.
    ExtraHalfTime,
    /// Driver bought the full shift length extra.
    ExtraFullTime,
    /// Fare credited on ride completion.
    RideFare,
    /// Manual credit from the admin console.
    AdminCredit,
    /// Manual debit from the admin console.
    AdminDebit,
}

impl TxMethod {
    /// Canonical snake_case wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ShiftStartFee => "shift_start_fee",
            Self::ExtendedHoursAutoDebit => "extended_hours_auto_debit",
            Self::ExtendedHoursPurchase => "extended_hours_purchase",
            Self::ExtraHalfTime => "extra_half_time",
            Self::ExtraFullTime => "extra_full_time",
            Self::RideFare => "ride_fare",
            Self::AdminCredit => "admin_credit",
            Self::AdminDebit => "admin_debit",
        }
    }
}

/// Error returned when an unknown transaction method string is provided.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transaction method: {0}")]
pub struct InvalidTxMethod(pub String);

impl FromStr for TxMethod {
    type Err = InvalidTxMethod;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "shift_start_fee" => Ok(Self::ShiftStartFee),
            "extended_hours_auto_debit" => Ok(Self::ExtendedHoursAutoDebit),
            "extended_hours_purchase" => Ok(Self::ExtendedHoursPurchase),
            "extra_half_time" => Ok(Self::ExtraHalfTime),
            "extra_full_time" => Ok(Self::ExtraFullTime),
            "ride_fare" => Ok(Self::RideFare),
            "admin_credit" => Ok(Self::AdminCredit),
            "admin_debit" => Ok(Self::AdminDebit),
            other => Err(InvalidTxMethod(other.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOCATION SUBJECT
// ═══════════════════════════════════════════════════════════════════════════════

/// Whose position a location sample records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    /// A driver's position report.
    Driver,
    /// A passenger's position report during an active ride.
    User,
}

impl SubjectKind {
    /// Canonical wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Driver => "driver",
            Self::User => "user",
        }
    }
}

/// Error returned when an unknown subject kind string is provided.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid subject kind: {0}")]
pub struct InvalidSubjectKind(pub String);

impl FromStr for SubjectKind {
    type Err = InvalidSubjectKind;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "driver" => Ok(Self::Driver),
            "user" => Ok(Self::User),
            other => Err(InvalidSubjectKind(other.to_string())),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vehicle_type_normalizes_case() {
        assert_eq!("Bike".parse::<VehicleType>(), Ok(VehicleType::Bike));
        assert_eq!(" TAXI ".parse::<VehicleType>(), Ok(VehicleType::Taxi));
        assert!("rickshaw".parse::<VehicleType>().is_err());
    }

    #[test]
    fn vehicle_type_default_rates() {
        assert_eq!(VehicleType::Bike.default_rate_per_km(), 15);
        assert_eq!(VehicleType::Taxi.default_rate_per_km(), 40);
        assert_eq!(VehicleType::Port.default_rate_per_km(), 75);
    }

    #[test]
    fn driver_status_accepts_legacy_spellings() {
        assert_eq!("online".parse::<DriverStatus>(), Ok(DriverStatus::Live));
        assert_eq!("available".parse::<DriverStatus>(), Ok(DriverStatus::Live));
        assert_eq!("onRide".parse::<DriverStatus>(), Ok(DriverStatus::OnRide));
        assert!("busy".parse::<DriverStatus>().is_err());
    }

    #[test]
    fn only_live_is_dispatchable() {
        assert!(DriverStatus::Live.is_dispatchable());
        assert!(!DriverStatus::Offline.is_dispatchable());
        assert!(!DriverStatus::OnRide.is_dispatchable());
    }

    #[test]
    fn ride_status_happy_path_transitions() {
        use RideStatus::{Accepted, Arrived, Completed, Pending, Started};

        assert!(Pending.can_transition_to(Accepted));
        assert!(Accepted.can_transition_to(Arrived));
        assert!(Arrived.can_transition_to(Started));
        assert!(Started.can_transition_to(Completed));
    }

    #[test]
    fn ride_status_rejects_regressions() {
        use RideStatus::{Accepted, Arrived, Cancelled, Completed, Pending, Started};

        assert!(!Accepted.can_transition_to(Pending));
        assert!(!Started.can_transition_to(Arrived));
        assert!(!Completed.can_transition_to(Started));
        assert!(!Cancelled.can_transition_to(Accepted));
        // No cancellation once the trip is underway.
        assert!(!Started.can_transition_to(Cancelled));
    }

    #[test]
    fn ride_status_terminal_states() {
        assert!(RideStatus::Completed.is_terminal());
        assert!(RideStatus::Cancelled.is_terminal());
        assert!(!RideStatus::Arrived.is_terminal());
    }

    #[test]
    fn payment_method_wire_names() {
        assert_eq!(PaymentMethod::DriverTransfer.as_str(), "driver_transfer");
        assert_eq!(
            "driver_transfer".parse::<PaymentMethod>(),
            Ok(PaymentMethod::DriverTransfer)
        );
    }

    #[test]
    fn tx_method_round_trips() {
        for method in [
            TxMethod::ShiftStartFee,
            TxMethod::ExtendedHoursAutoDebit,
            TxMethod::ExtendedHoursPurchase,
            TxMethod::ExtraHalfTime,
            TxMethod::ExtraFullTime,
            TxMethod::RideFare,
            TxMethod::AdminCredit,
            TxMethod::AdminDebit,
        ] {
            assert_eq!(method.as_str().parse::<TxMethod>(), Ok(method));
        }
    }

    #[test]
    fn serde_uses_wire_names() {
        let json = serde_json::to_string(&VehicleType::Bike).expect("serialize");
        assert_eq!(json, "\"bike\"");

        let json = serde_json::to_string(&DriverStatus::OnRide).expect("serialize");
        assert_eq!(json, "\"onRide\"");

        let json = serde_json::to_string(&TxMethod::ShiftStartFee).expect("serialize");
        assert_eq!(json, "\"shift_start_fee\"");
    }
}
