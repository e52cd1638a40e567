//! Dispatch engine: booking pipeline, duplicate suppression, fan-out and
//! acceptance arbitration.
//!
//! The fan-out is strictly vehicle-type-filtered: offers go to the
//! `drivers_<vehicleType>` room and to push tokens of matching drivers,
//! never to a global room. Acceptance is a store-level compare-and-set, so
//! two drivers racing for one ride resolve to exactly one winner without
//! reading before writing.

pub mod active;

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use push_relay::{PushMessage, PushSender};

use crate::error::{DomainError, Result};
use crate::gateway::{Gateway, Room, SessionId};
use crate::ports::clock::Clock;
use crate::ports::store::{DriverStore, RideStore, Store, UserStore};
use crate::presence::PresenceRegistry;
use crate::pricing::PricingCache;
use crate::rides::ids::RideIdService;
use crate::types::entities::{Place, Rejection, Ride};
use crate::types::enums::{DriverStatus, RideStatus, VehicleType};
use crate::types::events::{
    AcceptRidePayload, BookRidePayload, OutboundEvent, PlacePayload, RejectRidePayload,
    RideAcceptedNotice, RideOffer,
};
use crate::types::primitives::{Amount, Otp, RideId};

pub use active::{ActiveRides, DedupMap};

/// How many insert attempts a fallback-id collision is given.
const INSERT_ATTEMPTS: u32 = 3;

// ═══════════════════════════════════════════════════════════════════════════════
// OUTCOME
// ═══════════════════════════════════════════════════════════════════════════════

/// What a booking call returns to the passenger.
#[derive(Debug, Clone, PartialEq)]
pub struct BookOutcome {
    /// Human-readable ride id.
    pub raid_id: RideId,
    /// Internal ride id.
    pub ride_id: Uuid,
    /// Ride-start gate code.
    pub otp: Otp,
    /// Quoted fare.
    pub fare: Amount,
    /// Requested vehicle type.
    pub vehicle_type: VehicleType,
    /// Push targets found for the fan-out.
    pub drivers_found: usize,
    /// Whether this was a suppressed duplicate submission.
    pub already_sent: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISPATCH ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Matching front door: validates bookings, mints rides, fans them out and
/// arbitrates acceptance.
pub struct DispatchEngine {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    pricing: Arc<PricingCache>,
    gateway: Arc<Gateway>,
    push: Arc<dyn PushSender>,
    presence: Arc<PresenceRegistry>,
    ids: RideIdService,
    active: Arc<ActiveRides>,
    dedup: Arc<DedupMap>,
    dedup_window: Duration,
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("active_rides", &self.active.len())
            .finish_non_exhaustive()
    }
}

impl DispatchEngine {
    /// Wire up the engine.
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        pricing: Arc<PricingCache>,
        gateway: Arc<Gateway>,
        push: Arc<dyn PushSender>,
        presence: Arc<PresenceRegistry>,
        active: Arc<ActiveRides>,
        dedup: Arc<DedupMap>,
        dedup_window: Duration,
    ) -> Self {
        let ids = RideIdService::new(store.clone(), clock.clone());
        Self {
            store,
            clock,
            pricing,
            gateway,
            push,
            presence,
            ids,
            active,
            dedup,
            dedup_window,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BOOKING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Create a ride and fan it out to eligible drivers.
    ///
    /// A resubmission of the same booking within the dedup window returns
    /// the original raid id with `already_sent` set and performs no second
    /// fan-out.
    ///
    /// # Errors
    ///
    /// `INVALID_INPUT` for malformed fields, `NOT_FOUND` for an unknown
    /// passenger, plus store failures.
    #[instrument(skip(self, payload), fields(vehicle_type = %payload.vehicle_type))]
    pub async fn book_ride(&self, payload: BookRidePayload) -> Result<BookOutcome> {
        let vehicle_type: VehicleType = payload
            .vehicle_type
            .parse()
            .map_err(|e| DomainError::InvalidInput(format!("vehicleType: {e}")))?;
        if !payload.distance.is_finite() || payload.distance < 0.0 {
            return Err(DomainError::InvalidInput("distance must be >= 0".into()).into());
        }

        // Resolve the passenger to an internal id.
        let (user_id, customer_id, user_name, user_phone) =
            self.resolve_passenger(&payload).await?;

        let fingerprint = booking_fingerprint(&user_id, vehicle_type, &payload.pickup, &payload.drop);
        let now_mono = self.clock.monotonic();

        // A client retry inside the window gets the original id back and no
        // second fan-out.
        if let Some(raid_id) = self.dedup.recent(&fingerprint, now_mono, self.dedup_window) {
            if let Some(ride) = self.active.get(&raid_id) {
                metrics::counter!("dispatch_dedup_suppressed").increment(1);
                info!(raid_id = %raid_id, "Suppressed duplicate booking");
                return Ok(BookOutcome {
                    raid_id,
                    ride_id: ride.id,
                    otp: ride.otp,
                    fare: ride.fare,
                    vehicle_type,
                    drivers_found: 0,
                    already_sent: true,
                });
            }
        }

        let fare = self.pricing.calculate_fare(vehicle_type, payload.distance);
        let otp = Otp::derive(customer_id.as_str()).unwrap_or_else(Otp::random);

        let ride = self
            .persist_ride(
                &payload,
                vehicle_type,
                user_id,
                &customer_id,
                &user_name,
                &user_phone,
                fare,
                otp,
            )
            .await?;

        self.active.insert(ride.clone(), now_mono);
        self.dedup.record(fingerprint, ride.raid_id.clone(), now_mono);

        let drivers_found = self.fan_out(&ride).await;

        Ok(BookOutcome {
            raid_id: ride.raid_id.clone(),
            ride_id: ride.id,
            otp: ride.otp,
            fare: ride.fare,
            vehicle_type,
            drivers_found,
            already_sent: false,
        })
    }

    async fn resolve_passenger(
        &self,
        payload: &BookRidePayload,
    ) -> Result<(Uuid, String, String, String)> {
        if let Some(user_id) = payload.user {
            let customer_id = payload.customer_id.clone().unwrap_or_default();
            return Ok((
                user_id,
                customer_id,
                payload.user_name.clone(),
                payload.user_mobile.clone(),
            ));
        }
        let customer_id = payload
            .customer_id
            .as_deref()
            .ok_or_else(|| DomainError::InvalidInput("user or customerId required".into()))?;
        let user = self
            .store
            .get_user_by_customer_id(customer_id)
            .await?
            .ok_or_else(|| DomainError::UserNotFound(customer_id.to_string()))?;
        let name = if payload.user_name.is_empty() {
            user.name.clone()
        } else {
            payload.user_name.clone()
        };
        let phone = if payload.user_mobile.is_empty() {
            user.phone.clone()
        } else {
            payload.user_mobile.clone()
        };
        Ok((user.id, user.customer_id.as_str().to_string(), name, phone))
    }

    #[allow(clippy::too_many_arguments)]
    async fn persist_ride(
        &self,
        payload: &BookRidePayload,
        vehicle_type: VehicleType,
        user_id: Uuid,
        customer_id: &str,
        user_name: &str,
        user_phone: &str,
        fare: Amount,
        otp: Otp,
    ) -> Result<Ride> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let ride = Ride {
                id: Uuid::new_v4(),
                raid_id: self.ids.next().await,
                user_id,
                customer_id: customer_id.into(),
                user_name: user_name.to_string(),
                user_phone: user_phone.to_string(),
                vehicle_type,
                pickup: place_from(&payload.pickup),
                drop: place_from(&payload.drop),
                distance_km: payload.distance,
                fare,
                otp: otp.clone(),
                status: RideStatus::Pending,
                payment_method: payload.payment_method,
                driver_id: None,
                driver_name: None,
                rejected_by: vec![],
                actual_distance_km: None,
                actual_fare: None,
                actual_pickup: None,
                actual_drop: None,
                requested_at: self.clock.now(),
                accepted_at: None,
                arrived_at: None,
                started_at: None,
                completed_at: None,
                cancelled_at: None,
            };
            match self.store.insert_ride(&ride).await {
                Ok(()) => return Ok(ride),
                Err(err) if attempt < INSERT_ATTEMPTS && is_duplicate(&err) => {
                    warn!(raid_id = %ride.raid_id, "Ride id collision, retrying with a fresh id");
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Emit the offer to the vehicle-type room and push to matching
    /// drivers. Returns the number of push targets found.
    async fn fan_out(&self, ride: &Ride) -> usize {
        let offer = RideOffer {
            ride_id: ride.raid_id.clone(),
            user_name: ride.user_name.clone(),
            user_mobile: ride.user_phone.clone(),
            pickup: payload_from(&ride.pickup),
            drop: payload_from(&ride.drop),
            vehicle_type: ride.vehicle_type,
            distance_km: ride.distance_km,
            fare: ride.fare,
            payment_method: ride.payment_method,
        };
        self.gateway.emit_room(
            &Room::Drivers(ride.vehicle_type),
            &OutboundEvent::NewRideRequest(offer),
            None,
        );

        let targets = match self.store.dispatchable_drivers(ride.vehicle_type).await {
            Ok(drivers) => drivers,
            Err(err) => {
                warn!(error = %err, "Push target query failed, realtime fan-out already sent");
                return 0;
            }
        };

        let found = targets.len();
        for driver in targets {
            let Some(token) = driver.push_token else {
                continue;
            };
            let push = self.push.clone();
            let message = PushMessage::new(
                token,
                "New ride request",
                format!("{} • {:.1} km • ₹{}", ride.vehicle_type, ride.distance_km, ride.fare),
            )
            .with_data(json!({
                "event": "newRideRequest",
                "rideId": ride.raid_id,
            }));
            // Fire-and-forget: the outcome never blocks dispatch.
            tokio::spawn(async move {
                if let Err(err) = push.send(&message).await {
                    metrics::counter!("push_send_failures").increment(1);
                    warn!(error = %err, "Push delivery failed");
                }
            });
        }
        found
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCEPTANCE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Claim a pending ride for a driver.
    ///
    /// Serialised per raid id by the store's compare-and-set; the losing
    /// caller gets `RIDE_TAKEN`.
    ///
    /// # Errors
    ///
    /// `RIDE_TAKEN` on a lost race, `NOT_FOUND` for an unknown ride, plus
    /// store failures.
    #[instrument(skip(self, payload), fields(ride_id = %payload.ride_id, driver_id = %payload.driver_id))]
    pub async fn accept_ride(
        &self,
        payload: AcceptRidePayload,
        winner_session: Option<SessionId>,
    ) -> Result<Ride> {
        let driver = self
            .store
            .get_driver(&payload.driver_id)
            .await?
            .ok_or_else(|| DomainError::DriverNotFound(payload.driver_id.clone()))?;

        let driver_name = payload
            .driver_name
            .clone()
            .unwrap_or_else(|| driver.name.clone());

        let Some(ride) = self
            .store
            .try_accept(
                &payload.ride_id,
                &payload.driver_id,
                Some(&driver_name),
                self.clock.now(),
            )
            .await?
        else {
            // Distinguish "never existed" from "someone beat you to it".
            return match self.store.get_ride(&payload.ride_id).await? {
                Some(_) => Err(DomainError::RideTaken(payload.ride_id).into()),
                None => Err(DomainError::RideNotFound(payload.ride_id).into()),
            };
        };

        self.store
            .set_driver_status(&payload.driver_id, DriverStatus::OnRide)
            .await?;
        self.presence
            .mark_status(&payload.driver_id, DriverStatus::OnRide);
        self.active.refresh(ride.clone());

        info!(raid_id = %ride.raid_id, driver_id = %payload.driver_id, "Ride accepted");

        self.gateway.emit_room(
            &Room::User(ride.user_id.to_string()),
            &OutboundEvent::RideAccepted(RideAcceptedNotice {
                ride_id: ride.raid_id.clone(),
                driver_id: payload.driver_id.clone(),
                driver_name,
                vehicle_number: driver.vehicle_number,
                driver_lat: payload.driver_lat,
                driver_lng: payload.driver_lng,
                fare: ride.fare,
            }),
            None,
        );
        self.gateway.emit_room(
            &Room::Drivers(ride.vehicle_type),
            &OutboundEvent::RideAlreadyAccepted {
                ride_id: ride.raid_id.clone(),
            },
            winner_session,
        );

        Ok(ride)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REJECTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Record a driver's refusal. Not a lifecycle transition: the ride
    /// stays dispatchable to everyone else.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` for an unknown ride, plus store failures.
    #[instrument(skip(self, payload), fields(ride_id = %payload.ride_id, driver_id = %payload.driver_id))]
    pub async fn reject_ride(&self, payload: RejectRidePayload) -> Result<()> {
        let rejection = Rejection {
            driver_id: payload.driver_id.clone(),
            reason: payload.reason.clone(),
            at: self.clock.now(),
        };

        self.active.record_rejection(&payload.ride_id, rejection.clone());
        self.store.add_rejection(&payload.ride_id, &rejection).await?;

        if let Some(ride) = self.active.get(&payload.ride_id) {
            self.gateway.emit_room(
                &Room::User(ride.user_id.to_string()),
                &OutboundEvent::DriverRejectedRide {
                    ride_id: payload.ride_id,
                    driver_id: payload.driver_id,
                    reason: payload.reason,
                },
                None,
            );
        }
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn booking_fingerprint(
    user_id: &Uuid,
    vehicle_type: VehicleType,
    pickup: &PlacePayload,
    drop: &PlacePayload,
) -> String {
    format!(
        "{user_id}|{vehicle_type}|{:.5},{:.5}|{:.5},{:.5}",
        pickup.lat, pickup.lng, drop.lat, drop.lng
    )
}

fn place_from(payload: &PlacePayload) -> Place {
    Place {
        lat: payload.lat,
        lng: payload.lng,
        address: payload.address.clone(),
    }
}

fn payload_from(place: &Place) -> PlacePayload {
    PlacePayload {
        lat: place.lat,
        lng: place.lng,
        address: place.address.clone(),
    }
}

fn is_duplicate(err: &crate::error::AppError) -> bool {
    matches!(
        err,
        crate::error::AppError::Domain(DomainError::DuplicateRide(_))
    )
}
