//! Invariant-carrying primitive types.
//!
//! These newtypes keep the domain honest: a [`RideId`] always has the
//! `RIDnnnnnn` shape, an [`Amount`] is never negative, an [`Otp`] is always
//! four digits. Constructors validate; everything downstream can trust the
//! value.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// RIDE ID
// ═══════════════════════════════════════════════════════════════════════════════

/// Human-readable ride identifier (`RID` + digits).
///
/// The normal form is `RID` plus a six-digit zero-padded sequence number.
/// When the sequence counter is unreachable, a longer fallback form is
/// minted from the clock; downstream uniqueness is still guarded by the
/// store's unique index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RideId(String);

impl RideId {
    /// Build the canonical id for a sequence number.
    #[must_use]
    pub fn from_sequence(sequence: u32) -> Self {
        Self(format!("RID{sequence:06}"))
    }

    /// Build a fallback id from the current unix-millis and three extra
    /// random digits. Used only when the sequence counter is unavailable;
    /// collisions are tolerated because ride inserts are unique-indexed.
    #[must_use]
    pub fn fallback(unix_millis: i64, salt: u16) -> Self {
        let millis = unix_millis.unsigned_abs() % 1_000_000;
        Self(format!("RID{millis:06}{:03}", salt % 1000))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RideId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Error returned when a string is not a ride id.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid ride id: {0}")]
pub struct InvalidRideId(pub String);

impl FromStr for RideId {
    type Err = InvalidRideId;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        let digits = value
            .strip_prefix("RID")
            .ok_or_else(|| InvalidRideId(value.to_string()))?;
        if digits.len() >= 6 && digits.bytes().all(|b| b.is_ascii_digit()) {
            Ok(Self(value.to_string()))
        } else {
            Err(InvalidRideId(value.to_string()))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DRIVER / CUSTOMER IDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Stable external driver identifier (e.g. `DRV001`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DriverId(String);

impl DriverId {
    /// Wrap a raw identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DriverId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Stable external customer identifier (e.g. `CUS0065`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(String);

impl CustomerId {
    /// Wrap a raw identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CustomerId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AMOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// Non-negative integer currency amount.
///
/// Wallet balances, fares and ledger amounts are whole currency units; the
/// type refuses negative values at construction so balance invariants only
/// need to be enforced at the mutation sites.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Amount(i64);

impl Amount {
    /// Zero amount.
    pub const ZERO: Self = Self(0);

    /// Validate and wrap a raw value.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidAmount`] if the value is negative.
    pub const fn new(value: i64) -> Result<Self, InvalidAmount> {
        if value >= 0 {
            Ok(Self(value))
        } else {
            Err(InvalidAmount(value))
        }
    }

    /// Wrap a known-non-negative value, clamping anything below zero.
    #[must_use]
    pub const fn saturating(value: i64) -> Self {
        if value >= 0 { Self(value) } else { Self(0) }
    }

    /// The raw value.
    #[must_use]
    pub const fn get(&self) -> i64 {
        self.0
    }

    /// Whether the amount is zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checked subtraction; `None` when the result would go negative.
    #[must_use]
    pub const fn checked_sub(&self, other: Self) -> Option<Self> {
        if self.0 >= other.0 {
            Some(Self(self.0 - other.0))
        } else {
            None
        }
    }

    /// Saturating addition.
    #[must_use]
    pub const fn saturating_add(&self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when a negative amount is provided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid amount: {0}")]
pub struct InvalidAmount(pub i64);

// ═══════════════════════════════════════════════════════════════════════════════
// GEO POINT
// ═══════════════════════════════════════════════════════════════════════════════

/// A WGS-84 coordinate pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
}

impl GeoPoint {
    /// Build a point.
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance to `other` in kilometres (haversine).
    ///
    /// Good enough for nearby-driver radius checks; dispatch never needs
    /// survey-grade accuracy.
    #[must_use]
    pub fn distance_km_to(&self, other: &Self) -> f64 {
        const EARTH_RADIUS_KM: f64 = 6371.0;

        let lat1 = self.lat.to_radians();
        let lat2 = other.lat.to_radians();
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
        2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// OTP
// ═══════════════════════════════════════════════════════════════════════════════

/// Four-digit one-time code gating ride start.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Otp(String);

impl Otp {
    /// Derive the OTP from a customer id: the last four characters when the
    /// id is long enough, otherwise `None` (caller falls back to random).
    #[must_use]
    pub fn derive(customer_id: &str) -> Option<Self> {
        let id = customer_id.trim();
        if id.len() >= 4 {
            Some(Self(id[id.len() - 4..].to_string()))
        } else {
            None
        }
    }

    /// A uniformly random four-digit OTP.
    #[must_use]
    pub fn random() -> Self {
        let n: u16 = rand::random_range(0..10_000);
        Self(format!("{n:04}"))
    }

    /// Constant-shape comparison against a client-submitted code.
    #[must_use]
    pub fn matches(&self, submitted: &str) -> bool {
        self.0 == submitted.trim()
    }

    /// The code as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Otp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for Otp {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ride_id_canonical_form() {
        assert_eq!(RideId::from_sequence(1).as_str(), "RID000001");
        assert_eq!(RideId::from_sequence(999_999).as_str(), "RID999999");
    }

    #[test]
    fn ride_id_fallback_shape() {
        let id = RideId::fallback(1_722_500_000_123, 42);
        assert!(id.as_str().starts_with("RID"));
        // RID + last six millis digits + three salt digits.
        assert_eq!(id.as_str().len(), 3 + 6 + 3);
        assert!(id.as_str()[3..].bytes().all(|b| b.is_ascii_digit()));
    }

    #[test]
    fn ride_id_parse() {
        assert!("RID000123".parse::<RideId>().is_ok());
        assert!("RID000123456".parse::<RideId>().is_ok());
        assert!("XID000123".parse::<RideId>().is_err());
        assert!("RID12".parse::<RideId>().is_err());
        assert!("RID00012a".parse::<RideId>().is_err());
    }

    #[test]
    fn amount_rejects_negative() {
        assert!(Amount::new(0).is_ok());
        assert!(Amount::new(500).is_ok());
        assert_eq!(Amount::new(-1), Err(InvalidAmount(-1)));
    }

    #[test]
    fn amount_checked_sub() {
        let a = Amount::new(100).expect("valid");
        let b = Amount::new(30).expect("valid");
        assert_eq!(a.checked_sub(b), Some(Amount::new(70).expect("valid")));
        assert_eq!(b.checked_sub(a), None);
    }

    #[test]
    fn geo_distance_zero_for_same_point() {
        let p = GeoPoint::new(11.3459, 77.7216);
        assert!(p.distance_km_to(&p) < 1e-9);
    }

    #[test]
    fn geo_distance_sane_for_nearby_points() {
        // Two points in the same city, a handful of km apart.
        let a = GeoPoint::new(11.3459, 77.7216);
        let b = GeoPoint::new(11.3099, 77.7387);
        let d = a.distance_km_to(&b);
        assert!(d > 2.0 && d < 10.0, "unexpected distance: {d}");
    }

    #[test]
    fn otp_derivation_from_customer_id() {
        assert_eq!(Otp::derive("CUS0065").map(|o| o.to_string()), Some("0065".into()));
        assert_eq!(Otp::derive("42"), None);
        assert_eq!(Otp::derive("   "), None);
    }

    #[test]
    fn otp_random_is_four_digits() {
        for _ in 0..32 {
            let otp = Otp::random();
            assert_eq!(otp.as_str().len(), 4);
            assert!(otp.as_str().bytes().all(|b| b.is_ascii_digit()));
        }
    }

    #[test]
    fn otp_matches_trims_input() {
        let otp = Otp::derive("CUS0065").expect("derivable");
        assert!(otp.matches("0065"));
        assert!(otp.matches(" 0065 "));
        assert!(!otp.matches("6500"));
    }
}
