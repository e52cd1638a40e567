//! Realtime channel protocol: inbound and outbound event types.
//!
//! The wire format is a JSON frame. Inbound:
//!
//! ```json
//! { "event": "bookRide", "data": { ... }, "ack": 7 }
//! ```
//!
//! Outbound frames carry `event` + `data`; acknowledgements echo the `ack`
//! id with a `{ success, message, ... }` body.
//!
//! The inbound dispatcher is a closed tagged union: unknown event names are
//! rejected at deserialization, before any handler runs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use uuid::Uuid;

use super::enums::{DriverStatus, PaymentMethod, RideStatus, TxKind, TxMethod, VehicleType};
use super::primitives::{Amount, DriverId, RideId};

// ═══════════════════════════════════════════════════════════════════════════════
// INBOUND FRAME
// ═══════════════════════════════════════════════════════════════════════════════

/// One decoded inbound message.
#[derive(Debug, Clone)]
pub struct InboundFrame {
    /// The event and its payload.
    pub event: InboundEvent,
    /// Acknowledgement id, echoed back in the reply when present.
    pub ack: Option<u64>,
}

impl<'de> Deserialize<'de> for InboundFrame {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mut value = Value::deserialize(deserializer)?;
        let ack = value.get("ack").and_then(Value::as_u64);
        if let Some(map) = value.as_object_mut() {
            map.remove("ack");
        }
        let event = InboundEvent::deserialize(value).map_err(serde::de::Error::custom)?;
        Ok(Self { event, ack })
    }
}

/// Every event a client may send, tagged by name.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum InboundEvent {
    /// Bind this connection to a passenger identity.
    #[serde(rename = "registerUser")]
    RegisterUser(RegisterUserPayload),
    /// Bind this connection to a driver identity and join the dispatch room.
    #[serde(rename = "registerDriver")]
    RegisterDriver(RegisterDriverPayload),
    /// Start or resume a shift.
    #[serde(rename = "driverGoOnline")]
    DriverGoOnline(DriverIdPayload),
    /// Pause the shift and go offline.
    #[serde(rename = "driverOffline")]
    DriverOffline(DriverIdPayload),
    /// Position report from a driver.
    #[serde(rename = "driverLocationUpdate")]
    DriverLocationUpdate(DriverLocationPayload),
    /// Keep-alive without a position change.
    #[serde(rename = "driverHeartbeat")]
    DriverHeartbeat(DriverIdPayload),
    /// Query online drivers within a radius.
    #[serde(rename = "requestDriverLocations")]
    RequestDriverLocations(NearbyQueryPayload),
    /// Legacy alias of `requestDriverLocations`.
    #[serde(rename = "requestNearbyDrivers")]
    RequestNearbyDrivers(NearbyQueryPayload),
    /// Ask for the current per-km price table.
    #[serde(rename = "getCurrentPrices")]
    GetCurrentPrices,
    /// Create a ride and fan it out to eligible drivers.
    #[serde(rename = "bookRide")]
    BookRide(BookRidePayload),
    /// Claim a pending ride.
    #[serde(rename = "acceptRide")]
    AcceptRide(AcceptRidePayload),
    /// Decline an offered ride.
    #[serde(rename = "rejectRide")]
    RejectRide(RejectRidePayload),
    /// Submit the passenger's OTP to start the trip.
    #[serde(rename = "otpVerified")]
    OtpVerified(OtpPayload),
    /// Trip-start report; requires the OTP like `otpVerified`.
    #[serde(rename = "driverStartedRide")]
    DriverStartedRide(OtpPayload),
    /// Trip-end report with the actual distance driven.
    #[serde(rename = "driverCompletedRide")]
    DriverCompletedRide(CompleteRidePayload),
    /// Passenger position report during an active ride.
    #[serde(rename = "userLocationUpdate")]
    UserLocationUpdate(UserLocationPayload),
    /// Refresh the driver's push-notification token.
    #[serde(rename = "updateFCMToken")]
    UpdateFcmToken(UpdateFcmTokenPayload),
    /// Re-query a ride's OTP.
    #[serde(rename = "requestRideOTP")]
    RequestRideOtp(RideIdPayload),
}

impl InboundEvent {
    /// The wire name, for logging.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::RegisterUser(_) => "registerUser",
            Self::RegisterDriver(_) => "registerDriver",
            Self::DriverGoOnline(_) => "driverGoOnline",
            Self::DriverOffline(_) => "driverOffline",
            Self::DriverLocationUpdate(_) => "driverLocationUpdate",
            Self::DriverHeartbeat(_) => "driverHeartbeat",
            Self::RequestDriverLocations(_) => "requestDriverLocations",
            Self::RequestNearbyDrivers(_) => "requestNearbyDrivers",
            Self::GetCurrentPrices => "getCurrentPrices",
            Self::BookRide(_) => "bookRide",
            Self::AcceptRide(_) => "acceptRide",
            Self::RejectRide(_) => "rejectRide",
            Self::OtpVerified(_) => "otpVerified",
            Self::DriverStartedRide(_) => "driverStartedRide",
            Self::DriverCompletedRide(_) => "driverCompletedRide",
            Self::UserLocationUpdate(_) => "userLocationUpdate",
            Self::UpdateFcmToken(_) => "updateFCMToken",
            Self::RequestRideOtp(_) => "requestRideOTP",
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// INBOUND PAYLOADS
// ═══════════════════════════════════════════════════════════════════════════════

/// `registerUser` payload; either identifier form is accepted.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterUserPayload {
    /// Internal user id, when the client has it.
    pub user_id: Option<Uuid>,
    /// External customer id (`CUS0065`).
    pub customer_id: Option<String>,
}

/// `registerDriver` payload.
///
/// The vehicle type here is a hint only: the server re-reads the
/// authoritative value from the driver record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterDriverPayload {
    /// External driver id.
    pub driver_id: DriverId,
    /// Current latitude.
    pub lat: f64,
    /// Current longitude.
    pub lng: f64,
    /// Client-cached vehicle type; ignored.
    #[serde(default)]
    pub vehicle_type: Option<String>,
}

/// Payload carrying only a driver id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverIdPayload {
    /// External driver id.
    pub driver_id: DriverId,
}

/// Payload carrying only a ride id.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RideIdPayload {
    /// Human-readable ride id.
    pub ride_id: RideId,
}

/// `driverLocationUpdate` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocationPayload {
    /// External driver id.
    pub driver_id: DriverId,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
    /// Status change riding along with the sample.
    #[serde(default)]
    pub status: Option<DriverStatus>,
}

/// `requestDriverLocations` / `requestNearbyDrivers` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NearbyQueryPayload {
    /// Query centre latitude.
    pub lat: f64,
    /// Query centre longitude.
    pub lng: f64,
    /// Radius in kilometres; a server default applies when absent.
    #[serde(default)]
    pub radius: Option<f64>,
    /// Restrict to one vehicle type.
    #[serde(default)]
    pub vehicle_type: Option<VehicleType>,
}

/// A pickup or drop point as the client sends it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacePayload {
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Display address.
    #[serde(default)]
    pub address: String,
}

/// `bookRide` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookRidePayload {
    /// Internal user id.
    pub user: Option<Uuid>,
    /// External customer id; resolved to the internal id when `user` is
    /// absent.
    pub customer_id: Option<String>,
    /// Passenger display name snapshot.
    #[serde(default)]
    pub user_name: String,
    /// Passenger phone snapshot.
    #[serde(default)]
    pub user_mobile: String,
    /// Pickup point.
    pub pickup: PlacePayload,
    /// Drop point.
    pub drop: PlacePayload,
    /// Requested vehicle type (any casing).
    pub vehicle_type: String,
    /// Client-estimated distance in km.
    pub distance: f64,
    /// Client-estimated travel time in minutes; informational.
    #[serde(default)]
    pub travel_time: Option<f64>,
    /// Whether a return trip was requested; informational.
    #[serde(default)]
    pub want_return: bool,
    /// Settlement method; defaults to cash.
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

/// `acceptRide` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptRidePayload {
    /// Claimed ride.
    pub ride_id: RideId,
    /// Claiming driver.
    pub driver_id: DriverId,
    /// Driver display name.
    #[serde(default)]
    pub driver_name: Option<String>,
    /// Driver latitude at accept time.
    #[serde(default)]
    pub driver_lat: Option<f64>,
    /// Driver longitude at accept time.
    #[serde(default)]
    pub driver_lng: Option<f64>,
    /// Client-cached vehicle type; ignored.
    #[serde(default)]
    pub vehicle_type: Option<String>,
}

/// `rejectRide` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectRidePayload {
    /// Declined ride.
    pub ride_id: RideId,
    /// Declining driver.
    pub driver_id: DriverId,
    /// Optional free-text reason.
    #[serde(default)]
    pub reason: Option<String>,
}

/// `otpVerified` / `driverStartedRide` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpPayload {
    /// Ride being started.
    pub ride_id: RideId,
    /// Reporting driver.
    pub driver_id: DriverId,
    /// The code the passenger read out.
    pub otp: String,
}

/// `driverCompletedRide` payload.
///
/// The client-supplied `fare` is untrusted and ignored; the server
/// recomputes it from the actual distance.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteRidePayload {
    /// Completed ride.
    pub ride_id: RideId,
    /// Reporting driver.
    pub driver_id: DriverId,
    /// Distance actually driven in km.
    pub distance: f64,
    /// Client-computed fare; ignored.
    #[serde(default)]
    pub fare: Option<f64>,
    /// Where the trip actually began.
    #[serde(default)]
    pub actual_pickup: Option<PlacePayload>,
    /// Where the trip actually ended.
    #[serde(default)]
    pub actual_drop: Option<PlacePayload>,
}

/// `userLocationUpdate` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserLocationPayload {
    /// Internal user id or external customer id.
    pub user_id: String,
    /// Active ride.
    pub ride_id: RideId,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

/// `updateFCMToken` payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateFcmTokenPayload {
    /// External driver id.
    pub driver_id: DriverId,
    /// New push token.
    pub fcm_token: String,
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTBOUND EVENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// One driver's position as broadcast to observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriverLocation {
    /// External driver id.
    pub driver_id: DriverId,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Vehicle category.
    pub vehicle_type: VehicleType,
    /// Availability state.
    pub status: DriverStatus,
}

/// `newRideRequest` payload offered to eligible drivers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideOffer {
    /// Human-readable ride id.
    pub ride_id: RideId,
    /// Passenger name snapshot.
    pub user_name: String,
    /// Passenger phone snapshot.
    pub user_mobile: String,
    /// Pickup point.
    pub pickup: PlacePayload,
    /// Drop point.
    pub drop: PlacePayload,
    /// Requested vehicle type.
    pub vehicle_type: VehicleType,
    /// Estimated distance in km.
    pub distance_km: f64,
    /// Quoted fare.
    pub fare: Amount,
    /// Settlement method.
    pub payment_method: PaymentMethod,
}

/// `rideAccepted` payload sent to the passenger.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RideAcceptedNotice {
    /// Human-readable ride id.
    pub ride_id: RideId,
    /// Winning driver.
    pub driver_id: DriverId,
    /// Winning driver's display name.
    pub driver_name: String,
    /// Driver's registration plate.
    pub vehicle_number: String,
    /// Driver latitude at accept time.
    pub driver_lat: Option<f64>,
    /// Driver longitude at accept time.
    pub driver_lng: Option<f64>,
    /// Quoted fare.
    pub fare: Amount,
}

/// `walletUpdate` payload sent to the wallet owner.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletNotice {
    /// Wallet owner.
    pub driver_id: DriverId,
    /// Balance after the mutation.
    pub balance: Amount,
    /// Magnitude of the mutation.
    pub amount: Amount,
    /// Debit or credit.
    pub kind: TxKind,
    /// Business reason.
    pub method: TxMethod,
    /// Human-readable description.
    pub description: String,
}

/// `billAlert` payload; the passenger's bill modal is keyed off this.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillNotice {
    /// Completed ride.
    pub ride_id: RideId,
    /// Authoritative fare.
    pub fare: Amount,
    /// Distance actually driven in km.
    pub distance_km: f64,
    /// Settlement method.
    pub payment_method: PaymentMethod,
}

/// `workingHoursWarning` payload.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoursWarningNotice {
    /// Warned driver.
    pub driver_id: DriverId,
    /// Which warning this is (1–3).
    pub warning: u8,
    /// Seconds left on the countdown.
    pub remaining_seconds: i64,
    /// Display message.
    pub message: String,
}

/// Every event the server may emit, tagged by name.
///
/// The completion sequence depends on the exact shapes here: `RideCompleted`
/// intentionally carries no `status` field, and `RideStatusUpdate` follows
/// it separately.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundEvent {
    /// Price table on connect.
    CurrentPrices(BTreeMap<VehicleType, i64>),
    /// Price table after an admin change.
    PriceUpdate(BTreeMap<VehicleType, i64>),
    /// Periodic bulk position broadcast.
    DriverLocationsUpdate(Vec<DriverLocation>),
    /// Single-driver position delta.
    DriverLiveLocationUpdate(DriverLocation),
    /// In-ride passenger position, forwarded to the assigned driver.
    UserLiveLocationUpdate {
        /// Internal user id string.
        user_id: String,
        /// Active ride.
        ride_id: RideId,
        /// Latitude in degrees.
        latitude: f64,
        /// Longitude in degrees.
        longitude: f64,
    },
    /// Ride offer fanned out to `drivers_<vehicleType>`.
    NewRideRequest(RideOffer),
    /// Acceptance confirmation to the passenger.
    RideAccepted(RideAcceptedNotice),
    /// Losing drivers are told the offer is gone.
    RideAlreadyAccepted {
        /// The claimed ride.
        ride_id: RideId,
    },
    /// Informational refusal notice to the passenger.
    DriverRejectedRide {
        /// The declined ride.
        ride_id: RideId,
        /// Declining driver.
        driver_id: DriverId,
        /// Free-text reason.
        reason: Option<String>,
    },
    /// OTP check passed; trip is starting.
    OtpVerified {
        /// The started ride.
        ride_id: RideId,
    },
    /// Lifecycle state change notice.
    RideStatusUpdate {
        /// The ride.
        ride_id: RideId,
        /// New state.
        status: RideStatus,
    },
    /// Bill surfaced to the passenger before any terminal signal.
    BillAlert(BillNotice),
    /// Completion notice; deliberately carries no `status` field so the
    /// client stays on the bill modal.
    RideCompleted {
        /// The completed ride.
        ride_id: RideId,
        /// Authoritative fare.
        fare: Amount,
        /// Distance actually driven in km.
        distance_km: f64,
    },
    /// Wallet mutation notice to its owner.
    WalletUpdate(WalletNotice),
    /// Working-hours threshold warning.
    WorkingHoursWarning(HoursWarningNotice),
    /// Timer expired with an unpayable extension; driver forced offline.
    AutoStop {
        /// Stopped driver.
        driver_id: DriverId,
        /// Display message.
        message: String,
    },
}

impl OutboundEvent {
    /// The wire name.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CurrentPrices(_) => "currentPrices",
            Self::PriceUpdate(_) => "priceUpdate",
            Self::DriverLocationsUpdate(_) => "driverLocationsUpdate",
            Self::DriverLiveLocationUpdate(_) => "driverLiveLocationUpdate",
            Self::UserLiveLocationUpdate { .. } => "userLiveLocationUpdate",
            Self::NewRideRequest(_) => "newRideRequest",
            Self::RideAccepted(_) => "rideAccepted",
            Self::RideAlreadyAccepted { .. } => "rideAlreadyAccepted",
            Self::DriverRejectedRide { .. } => "driverRejectedRide",
            Self::OtpVerified { .. } => "otpVerified",
            Self::RideStatusUpdate { .. } => "rideStatusUpdate",
            Self::BillAlert(_) => "billAlert",
            Self::RideCompleted { .. } => "rideCompleted",
            Self::WalletUpdate(_) => "walletUpdate",
            Self::WorkingHoursWarning(_) => "workingHoursWarning",
            Self::AutoStop { .. } => "autoStop",
        }
    }

    /// The `data` part of the frame.
    ///
    /// Serialization of these payloads cannot fail; a failure would be a
    /// programming error, so it degrades to `null` rather than panicking.
    #[must_use]
    pub fn data(&self) -> Value {
        let result = match self {
            Self::CurrentPrices(prices) | Self::PriceUpdate(prices) => {
                serde_json::to_value(price_table(prices))
            }
            Self::DriverLocationsUpdate(drivers) => {
                serde_json::to_value(drivers).map(|list| json!({ "drivers": list }))
            }
            Self::DriverLiveLocationUpdate(driver) => serde_json::to_value(driver),
            Self::UserLiveLocationUpdate {
                user_id,
                ride_id,
                latitude,
                longitude,
            } => Ok(json!({
                "userId": user_id,
                "rideId": ride_id,
                "latitude": latitude,
                "longitude": longitude,
            })),
            Self::NewRideRequest(offer) => serde_json::to_value(offer),
            Self::RideAccepted(notice) => serde_json::to_value(notice),
            Self::RideAlreadyAccepted { ride_id } => Ok(json!({ "rideId": ride_id })),
            Self::DriverRejectedRide {
                ride_id,
                driver_id,
                reason,
            } => Ok(json!({
                "rideId": ride_id,
                "driverId": driver_id,
                "reason": reason,
            })),
            Self::OtpVerified { ride_id } => Ok(json!({ "rideId": ride_id })),
            Self::RideStatusUpdate { ride_id, status } => Ok(json!({
                "rideId": ride_id,
                "status": status,
            })),
            Self::BillAlert(notice) => serde_json::to_value(notice),
            Self::RideCompleted {
                ride_id,
                fare,
                distance_km,
            } => Ok(json!({
                "rideId": ride_id,
                "fare": fare,
                "distanceKm": distance_km,
            })),
            Self::WalletUpdate(notice) => serde_json::to_value(notice),
            Self::WorkingHoursWarning(notice) => serde_json::to_value(notice),
            Self::AutoStop { driver_id, message } => Ok(json!({
                "driverId": driver_id,
                "message": message,
            })),
        };
        result.unwrap_or(Value::Null)
    }

    /// The complete wire frame.
    #[must_use]
    pub fn frame(&self) -> Value {
        json!({ "event": self.name(), "data": self.data() })
    }
}

fn price_table(prices: &BTreeMap<VehicleType, i64>) -> BTreeMap<&'static str, i64> {
    prices.iter().map(|(vt, rate)| (vt.as_str(), *rate)).collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frame_decodes_book_ride() {
        let raw = json!({
            "event": "bookRide",
            "ack": 3,
            "data": {
                "customerId": "CUS0065",
                "userName": "Meena",
                "userMobile": "9000000002",
                "pickup": { "lat": 11.3459, "lng": 77.7216, "address": "A" },
                "drop": { "lat": 11.3099, "lng": 77.7387, "address": "B" },
                "vehicleType": "Bike",
                "distance": 5.4
            }
        });

        let frame: InboundFrame = serde_json::from_value(raw).expect("decode");
        assert_eq!(frame.ack, Some(3));
        match frame.event {
            InboundEvent::BookRide(payload) => {
                assert_eq!(payload.customer_id.as_deref(), Some("CUS0065"));
                assert_eq!(payload.vehicle_type, "Bike");
                assert!(!payload.want_return);
                assert_eq!(payload.payment_method, PaymentMethod::Cash);
            }
            other => panic!("wrong variant: {}", other.name()),
        }
    }

    #[test]
    fn inbound_frame_decodes_payloadless_event() {
        let raw = json!({ "event": "getCurrentPrices" });
        let frame: InboundFrame = serde_json::from_value(raw).expect("decode");
        assert!(matches!(frame.event, InboundEvent::GetCurrentPrices));
        assert_eq!(frame.ack, None);
    }

    #[test]
    fn unknown_event_name_is_rejected() {
        let raw = json!({ "event": "formatHardDrive", "data": {} });
        assert!(serde_json::from_value::<InboundFrame>(raw).is_err());
    }

    #[test]
    fn ride_completed_frame_has_no_status_field() {
        let event = OutboundEvent::RideCompleted {
            ride_id: RideId::from_sequence(1),
            fare: Amount::saturating(81),
            distance_km: 5.4,
        };

        let frame = event.frame();
        assert_eq!(frame["event"], "rideCompleted");
        assert!(
            frame["data"].get("status").is_none(),
            "rideCompleted must not carry a terminal status"
        );
    }

    #[test]
    fn ride_status_update_carries_status() {
        let event = OutboundEvent::RideStatusUpdate {
            ride_id: RideId::from_sequence(1),
            status: RideStatus::Completed,
        };
        assert_eq!(event.frame()["data"]["status"], "completed");
    }

    #[test]
    fn price_frames_use_lowercase_keys() {
        let mut prices = BTreeMap::new();
        prices.insert(VehicleType::Bike, 15);
        prices.insert(VehicleType::Taxi, 40);

        let frame = OutboundEvent::CurrentPrices(prices).frame();
        assert_eq!(frame["data"]["bike"], 15);
        assert_eq!(frame["data"]["taxi"], 40);
    }
}
