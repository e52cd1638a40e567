//! Inbound event router for the realtime channel.
//!
//! One decoded [`InboundEvent`] comes in, the matching service call runs,
//! and an acknowledgement body goes back. Unknown event names never reach
//! this point — deserialization already rejected them.
//!
//! Acknowledgements always carry `success` and, on failure, a
//! human-readable `message`; event-specific fields ride alongside.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::app::App;
use crate::error::{AppError, DomainError, Result};
use crate::gateway::{Identity, Room, SessionId};
use crate::ports::store::{DriverStore, LocationStore, RideStore, UserStore};
use crate::types::entities::LocationSample;
use crate::types::enums::{DriverStatus, SubjectKind};
use crate::types::events::{
    DriverIdPayload, DriverLocation, DriverLocationPayload, InboundEvent, NearbyQueryPayload,
    OtpPayload, OutboundEvent, RegisterDriverPayload, RegisterUserPayload, RideIdPayload,
    UpdateFcmTokenPayload, UserLocationPayload,
};
use crate::types::primitives::{GeoPoint, RideId};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT ROUTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Dispatches inbound realtime events to the core services.
#[derive(Debug, Clone)]
pub struct EventRouter {
    app: Arc<App>,
}

impl EventRouter {
    /// Create a router over the assembled core.
    #[must_use]
    pub const fn new(app: Arc<App>) -> Self {
        Self { app }
    }

    /// Handle one event and produce its acknowledgement body.
    ///
    /// Failures are folded into `{ success: false, message }`; they never
    /// tear down the connection.
    #[instrument(skip(self, event), fields(session = %session, event = event.name()))]
    pub async fn handle(&self, session: SessionId, event: InboundEvent) -> Value {
        let result = match event {
            InboundEvent::RegisterUser(payload) => self.register_user(session, payload).await,
            InboundEvent::RegisterDriver(payload) => self.register_driver(session, payload).await,
            InboundEvent::DriverGoOnline(payload) => self.driver_go_online(payload).await,
            InboundEvent::DriverOffline(payload) => self.driver_offline(payload).await,
            InboundEvent::DriverLocationUpdate(payload) => self.driver_location(payload).await,
            InboundEvent::DriverHeartbeat(payload) => self.driver_heartbeat(&payload),
            InboundEvent::RequestDriverLocations(payload)
            | InboundEvent::RequestNearbyDrivers(payload) => self.nearby_drivers(&payload),
            InboundEvent::GetCurrentPrices => self.current_prices(session),
            InboundEvent::BookRide(payload) => self.book_ride(payload).await,
            InboundEvent::AcceptRide(payload) => self.accept_ride(session, payload).await,
            InboundEvent::RejectRide(payload) => self.reject_ride(payload).await,
            InboundEvent::OtpVerified(payload) | InboundEvent::DriverStartedRide(payload) => {
                self.start_ride(payload).await
            }
            InboundEvent::DriverCompletedRide(payload) => self.complete_ride(payload).await,
            InboundEvent::UserLocationUpdate(payload) => self.user_location(payload).await,
            InboundEvent::UpdateFcmToken(payload) => self.update_fcm_token(payload).await,
            InboundEvent::RequestRideOtp(payload) => self.ride_otp(payload).await,
        };

        match result {
            Ok(ack) => ack,
            Err(err) => {
                if matches!(err, AppError::Infra(_)) {
                    warn!(error = %err, "Handler failed");
                }
                json!({ "success": false, "message": err.ack_message() })
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REGISTRATION
    // ═══════════════════════════════════════════════════════════════════════════

    async fn register_user(
        &self,
        session: SessionId,
        payload: RegisterUserPayload,
    ) -> Result<Value> {
        let user = if let Some(id) = payload.user_id {
            self.app
                .store
                .get_user(&id)
                .await?
                .ok_or_else(|| DomainError::UserNotFound(id.to_string()))?
        } else if let Some(customer_id) = payload.customer_id.as_deref() {
            self.app
                .store
                .get_user_by_customer_id(customer_id)
                .await?
                .ok_or_else(|| DomainError::UserNotFound(customer_id.to_string()))?
        } else {
            return Err(
                DomainError::InvalidInput("userId or customerId required".into()).into(),
            );
        };

        self.app.gateway.bind_identity(session, Identity::User(user.id));
        self.app.gateway.join(session, &Room::User(user.id.to_string()));

        Ok(json!({
            "success": true,
            "userId": user.id,
            "customerId": user.customer_id,
        }))
    }

    /// Driver registration re-reads the vehicle type from the store; the
    /// client's cached value is never trusted for room placement.
    async fn register_driver(
        &self,
        session: SessionId,
        payload: RegisterDriverPayload,
    ) -> Result<Value> {
        let driver = self
            .app
            .store
            .get_driver(&payload.driver_id)
            .await?
            .ok_or_else(|| DomainError::DriverNotFound(payload.driver_id.clone()))?;

        let location = GeoPoint::new(payload.lat, payload.lng);

        self.app
            .gateway
            .bind_identity(session, Identity::Driver(driver.driver_id.clone()));
        self.app
            .gateway
            .join(session, &Room::Drivers(driver.vehicle_type));
        self.app
            .gateway
            .join(session, &Room::Driver(driver.driver_id.clone()));

        self.app.presence.upsert(
            driver.driver_id.clone(),
            session,
            location,
            driver.vehicle_type,
            DriverStatus::Live,
        );

        self.app
            .store
            .set_driver_status(&driver.driver_id, DriverStatus::Live)
            .await?;
        self.app
            .store
            .set_driver_location(&driver.driver_id, location)
            .await?;
        self.record_sample(
            driver.driver_id.as_str(),
            SubjectKind::Driver,
            location,
            None,
            Some(DriverStatus::Live),
        )
        .await;

        self.app.gateway.emit_all(&OutboundEvent::DriverLiveLocationUpdate(
            DriverLocation {
                driver_id: driver.driver_id.clone(),
                lat: location.lat,
                lng: location.lng,
                vehicle_type: driver.vehicle_type,
                status: DriverStatus::Live,
            },
        ));

        Ok(json!({
            "success": true,
            "driverId": driver.driver_id,
            "vehicleType": driver.vehicle_type,
        }))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SHIFT LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════

    async fn driver_go_online(&self, payload: DriverIdPayload) -> Result<Value> {
        let outcome = self.app.hours.start(&payload.driver_id).await?;
        Ok(json!({
            "success": true,
            "amountDeducted": outcome.amount_deducted,
            "remainingSeconds": outcome.remaining_seconds,
            "resumed": outcome.resumed,
        }))
    }

    async fn driver_offline(&self, payload: DriverIdPayload) -> Result<Value> {
        let remaining = self.app.hours.stop(&payload.driver_id).await?;
        Ok(json!({ "success": true, "remainingSeconds": remaining }))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LOCATION
    // ═══════════════════════════════════════════════════════════════════════════

    async fn driver_location(&self, payload: DriverLocationPayload) -> Result<Value> {
        let location = GeoPoint::new(payload.latitude, payload.longitude);
        self.app
            .presence
            .update_location(&payload.driver_id, location, payload.status);
        self.app
            .store
            .set_driver_location(&payload.driver_id, location)
            .await?;
        self.record_sample(
            payload.driver_id.as_str(),
            SubjectKind::Driver,
            location,
            None,
            payload.status,
        )
        .await;

        if let Some(entry) = self.app.presence.get(&payload.driver_id) {
            self.app
                .gateway
                .emit_all(&OutboundEvent::DriverLiveLocationUpdate(DriverLocation {
                    driver_id: payload.driver_id.clone(),
                    lat: location.lat,
                    lng: location.lng,
                    vehicle_type: entry.vehicle_type,
                    status: entry.status,
                }));
        }
        Ok(json!({ "success": true }))
    }

    fn driver_heartbeat(&self, payload: &DriverIdPayload) -> Result<Value> {
        self.app.presence.touch(&payload.driver_id);
        Ok(json!({ "success": true }))
    }

    fn nearby_drivers(&self, payload: &NearbyQueryPayload) -> Result<Value> {
        let radius = payload
            .radius
            .unwrap_or(self.app.settings.presence.nearby_radius_km);
        let drivers = self.app.presence.nearby(
            GeoPoint::new(payload.lat, payload.lng),
            radius,
            payload.vehicle_type,
        );
        Ok(json!({ "success": true, "drivers": drivers }))
    }

    async fn user_location(&self, payload: UserLocationPayload) -> Result<Value> {
        // The client may send either the internal id or a customer id.
        let user_id = if let Ok(id) = payload.user_id.parse::<Uuid>() {
            id
        } else {
            self.app
                .store
                .get_user_by_customer_id(&payload.user_id)
                .await?
                .ok_or_else(|| DomainError::UserNotFound(payload.user_id.clone()))?
                .id
        };

        let location = GeoPoint::new(payload.latitude, payload.longitude);
        self.record_sample(
            &user_id.to_string(),
            SubjectKind::User,
            location,
            Some(&payload.ride_id),
            None,
        )
        .await;
        self.app
            .presence
            .track_user(&user_id.to_string(), payload.ride_id.clone());

        // Forward to the assigned driver; persisted but not forwarded when
        // no driver has accepted yet.
        let ride = match self.app.active.get(&payload.ride_id) {
            Some(ride) => Some(ride),
            None => self.app.store.get_ride(&payload.ride_id).await?,
        };
        if let Some(driver_id) = ride.and_then(|r| r.driver_id) {
            self.app.gateway.emit_room(
                &Room::Driver(driver_id),
                &OutboundEvent::UserLiveLocationUpdate {
                    user_id: user_id.to_string(),
                    ride_id: payload.ride_id,
                    latitude: payload.latitude,
                    longitude: payload.longitude,
                },
                None,
            );
        }
        Ok(json!({ "success": true }))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PRICING
    // ═══════════════════════════════════════════════════════════════════════════

    fn current_prices(&self, session: SessionId) -> Result<Value> {
        let prices = self.app.pricing.snapshot();
        self.app
            .gateway
            .emit_to(session, &OutboundEvent::CurrentPrices(prices.clone()));
        let table: serde_json::Map<String, Value> = prices
            .iter()
            .map(|(vt, rate)| (vt.as_str().to_string(), json!(rate)))
            .collect();
        Ok(json!({ "success": true, "prices": table }))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RIDE FLOW
    // ═══════════════════════════════════════════════════════════════════════════

    async fn book_ride(&self, payload: crate::types::events::BookRidePayload) -> Result<Value> {
        let outcome = self.app.dispatch.book_ride(payload).await?;
        Ok(json!({
            "success": true,
            "rideId": outcome.raid_id,
            "id": outcome.ride_id,
            "otp": outcome.otp,
            "fare": outcome.fare,
            "vehicleType": outcome.vehicle_type,
            "driversFound": outcome.drivers_found,
            "alreadySent": outcome.already_sent,
        }))
    }

    async fn accept_ride(
        &self,
        session: SessionId,
        payload: crate::types::events::AcceptRidePayload,
    ) -> Result<Value> {
        let ride = self
            .app
            .dispatch
            .accept_ride(payload, Some(session))
            .await?;
        Ok(json!({
            "success": true,
            "rideId": ride.raid_id,
            "userName": ride.user_name,
            "userMobile": ride.user_phone,
            "pickup": ride.pickup,
            "drop": ride.drop,
            "fare": ride.fare,
            "paymentMethod": ride.payment_method,
        }))
    }

    async fn reject_ride(
        &self,
        payload: crate::types::events::RejectRidePayload,
    ) -> Result<Value> {
        self.app.dispatch.reject_ride(payload).await?;
        Ok(json!({ "success": true }))
    }

    async fn start_ride(&self, payload: OtpPayload) -> Result<Value> {
        let ride = self
            .app
            .rides
            .start(&payload.ride_id, &payload.driver_id, &payload.otp)
            .await?;
        Ok(json!({ "success": true, "rideId": ride.raid_id, "status": ride.status }))
    }

    async fn complete_ride(
        &self,
        payload: crate::types::events::CompleteRidePayload,
    ) -> Result<Value> {
        let outcome = self.app.rides.complete(payload).await?;
        Ok(json!({
            "success": true,
            "rideId": outcome.raid_id,
            "fare": outcome.fare,
            "newWalletBalance": outcome.new_wallet_balance,
        }))
    }

    async fn ride_otp(&self, payload: RideIdPayload) -> Result<Value> {
        let ride = self.app.rides.get_ride(&payload.ride_id).await?;
        Ok(json!({ "success": true, "rideId": ride.raid_id, "otp": ride.otp }))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TOKENS & SAMPLES
    // ═══════════════════════════════════════════════════════════════════════════

    async fn update_fcm_token(&self, payload: UpdateFcmTokenPayload) -> Result<Value> {
        self.app
            .store
            .set_push_token(&payload.driver_id, &payload.fcm_token)
            .await?;
        Ok(json!({ "success": true }))
    }

    /// Location history is best-effort: a failed append is logged, never
    /// surfaced.
    async fn record_sample(
        &self,
        subject: &str,
        kind: SubjectKind,
        location: GeoPoint,
        ride_id: Option<&RideId>,
        status: Option<DriverStatus>,
    ) {
        let sample = LocationSample {
            id: Uuid::new_v4(),
            subject: subject.to_string(),
            kind,
            lat: location.lat,
            lng: location.lng,
            ride_id: ride_id.cloned(),
            status,
            recorded_at: self.app.clock.now(),
        };
        if let Err(err) = self.app.store.append_location(&sample).await {
            warn!(subject, error = %err, "Location sample append failed");
        }
    }
}
