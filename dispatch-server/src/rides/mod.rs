//! Ride lifecycle service.
//!
//! Owns the authoritative transitions after acceptance: arrival, the
//! OTP-gated start, cancellation, and the completion protocol. Every
//! transition is a store-level compare-and-set; the completion side-effect
//! order is part of the product contract:
//!
//! 1. persist `completed` with the actuals
//! 2. credit the driver wallet (paired ledger record)
//! 3. debit the passenger wallet when they paid by wallet
//! 4. `billAlert` to the passenger
//! 5. `rideCompleted` (no terminal status field)
//! 6. `rideStatusUpdate { completed }`
//! 7. driver back to `live`, active-ride entry dropped
//!
//! The passenger's bill modal depends on 4 preceding 5; per-session FIFO in
//! the gateway preserves the order on the wire.

pub mod ids;

use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::dispatch::ActiveRides;
use crate::error::{DomainError, Result};
use crate::gateway::{Gateway, Room};
use crate::ports::clock::Clock;
use crate::ports::store::{DriverStore, RideStore, Store, UserStore};
use crate::presence::PresenceRegistry;
use crate::pricing::PricingCache;
use crate::types::entities::{Place, Ride};
use crate::types::enums::{DriverStatus, PaymentMethod, RideStatus, TxMethod};
use crate::types::events::{BillNotice, CompleteRidePayload, OutboundEvent, PlacePayload};
use crate::types::primitives::{Amount, DriverId, RideId};
use crate::wallet::WalletLedger;

// ═══════════════════════════════════════════════════════════════════════════════
// OUTCOME
// ═══════════════════════════════════════════════════════════════════════════════

/// What a completion returns to the reporting driver.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionOutcome {
    /// The completed ride id.
    pub raid_id: RideId,
    /// Authoritative recomputed fare.
    pub fare: Amount,
    /// Driver wallet balance after the fare credit.
    pub new_wallet_balance: Amount,
}

// ═══════════════════════════════════════════════════════════════════════════════
// RIDE SERVICE
// ═══════════════════════════════════════════════════════════════════════════════

/// Authoritative lifecycle transitions for accepted rides.
pub struct RideService {
    store: Arc<dyn Store>,
    clock: Arc<dyn Clock>,
    pricing: Arc<PricingCache>,
    gateway: Arc<Gateway>,
    wallet: Arc<WalletLedger>,
    presence: Arc<PresenceRegistry>,
    active: Arc<ActiveRides>,
}

impl std::fmt::Debug for RideService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RideService").finish_non_exhaustive()
    }
}

impl RideService {
    /// Wire up the service.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        clock: Arc<dyn Clock>,
        pricing: Arc<PricingCache>,
        gateway: Arc<Gateway>,
        wallet: Arc<WalletLedger>,
        presence: Arc<PresenceRegistry>,
        active: Arc<ActiveRides>,
    ) -> Self {
        Self {
            store,
            clock,
            pricing,
            gateway,
            wallet,
            presence,
            active,
        }
    }

    /// Load a ride or fail with `NOT_FOUND`.
    ///
    /// # Errors
    ///
    /// `NOT_FOUND` plus store failures.
    pub async fn get_ride(&self, raid_id: &RideId) -> Result<Ride> {
        self.store
            .get_ride(raid_id)
            .await?
            .ok_or_else(|| DomainError::RideNotFound(raid_id.clone()).into())
    }

    /// Mark the driver as arrived at the pickup point.
    ///
    /// # Errors
    ///
    /// `CONFLICT`-style transition failure when the ride is not `accepted`.
    #[instrument(skip(self), fields(raid_id = %raid_id))]
    pub async fn arrived(&self, raid_id: &RideId) -> Result<()> {
        let moved = self
            .store
            .transition_ride(
                raid_id,
                &[RideStatus::Accepted],
                RideStatus::Arrived,
                self.clock.now(),
            )
            .await?;
        if !moved {
            let ride = self.get_ride(raid_id).await?;
            return Err(DomainError::InvalidTransition {
                from: ride.status.to_string(),
                to: RideStatus::Arrived.to_string(),
            }
            .into());
        }

        let ride = self.get_ride(raid_id).await?;
        self.active.refresh(ride.clone());
        self.notify_status(&ride, RideStatus::Arrived);
        Ok(())
    }

    /// OTP-gated trip start.
    ///
    /// The realtime surface has no separate arrival report, so a start from
    /// `accepted` is admitted as well as from `arrived`; the progression
    /// stays monotonic either way.
    ///
    /// # Errors
    ///
    /// `INVALID_OTP` on a code mismatch (no state change), transition
    /// failure when the ride is already started or terminal.
    #[instrument(skip(self, submitted_otp), fields(raid_id = %raid_id, driver_id = %driver_id))]
    pub async fn start(
        &self,
        raid_id: &RideId,
        driver_id: &DriverId,
        submitted_otp: &str,
    ) -> Result<Ride> {
        let ride = self.get_ride(raid_id).await?;

        if ride.driver_id.as_ref() != Some(driver_id) {
            return Err(DomainError::Unauthorized.into());
        }
        if !ride.otp.matches(submitted_otp) {
            return Err(DomainError::InvalidOtp(raid_id.clone()).into());
        }

        let moved = self
            .store
            .transition_ride(
                raid_id,
                &[RideStatus::Accepted, RideStatus::Arrived],
                RideStatus::Started,
                self.clock.now(),
            )
            .await?;
        if !moved {
            return Err(DomainError::InvalidTransition {
                from: ride.status.to_string(),
                to: RideStatus::Started.to_string(),
            }
            .into());
        }

        let ride = self.get_ride(raid_id).await?;
        self.active.refresh(ride.clone());

        let user_room = Room::User(ride.user_id.to_string());
        self.gateway.emit_room(
            &user_room,
            &OutboundEvent::OtpVerified {
                ride_id: raid_id.clone(),
            },
            None,
        );
        self.notify_status(&ride, RideStatus::Started);

        info!(raid_id = %raid_id, "Ride started");
        Ok(ride)
    }

    /// Run the completion protocol.
    ///
    /// The client-supplied fare is ignored; the fare is recomputed from the
    /// reported actual distance via the pricing cache.
    ///
    /// # Errors
    ///
    /// Transition failure when the ride has no driver or is already
    /// terminal; wallet failures abort before any emission.
    #[instrument(skip(self, payload), fields(raid_id = %payload.ride_id, driver_id = %payload.driver_id))]
    pub async fn complete(&self, payload: CompleteRidePayload) -> Result<CompletionOutcome> {
        let raid_id = payload.ride_id.clone();
        let ride = self.get_ride(&raid_id).await?;

        let Some(assigned) = ride.driver_id.clone() else {
            return Err(DomainError::InvalidTransition {
                from: ride.status.to_string(),
                to: RideStatus::Completed.to_string(),
            }
            .into());
        };
        if assigned != payload.driver_id {
            return Err(DomainError::Unauthorized.into());
        }

        let actual_distance = if payload.distance.is_finite() && payload.distance > 0.0 {
            payload.distance
        } else {
            ride.distance_km
        };
        let fare = self.pricing.calculate_fare(ride.vehicle_type, actual_distance);

        // 1. Persist the terminal state with the actuals. The CAS makes a
        //    concurrent duplicate completion lose here, before any money
        //    moves or any event is emitted.
        let moved = self
            .store
            .complete_ride(
                &raid_id,
                actual_distance,
                fare,
                payload.actual_pickup.as_ref().map(place_from).as_ref(),
                payload.actual_drop.as_ref().map(place_from).as_ref(),
                self.clock.now(),
            )
            .await?;
        if !moved {
            return Err(DomainError::InvalidTransition {
                from: ride.status.to_string(),
                to: RideStatus::Completed.to_string(),
            }
            .into());
        }

        // 2. Credit the driver.
        let receipt = self
            .wallet
            .credit(
                &assigned,
                fare,
                TxMethod::RideFare,
                &format!("Fare for ride {raid_id}"),
                Some(&raid_id),
            )
            .await?;

        // 3. Wallet-paying passengers are debited the same amount.
        if ride.payment_method == PaymentMethod::Wallet {
            if let Err(err) = self.store.debit_user(&ride.user_id, fare).await {
                // The ride still completes; settlement falls back to cash
                // collection and the shortfall is logged for reconciliation.
                warn!(raid_id = %raid_id, error = %err, "Passenger wallet debit failed");
            }
        }

        // 4–6. Bill first, then the status-free completion notice, then the
        // terminal status. Per-session FIFO keeps this order on the wire.
        let user_room = Room::User(ride.user_id.to_string());
        self.gateway.emit_room(
            &user_room,
            &OutboundEvent::BillAlert(BillNotice {
                ride_id: raid_id.clone(),
                fare,
                distance_km: actual_distance,
                payment_method: ride.payment_method,
            }),
            None,
        );
        self.gateway.emit_room(
            &user_room,
            &OutboundEvent::RideCompleted {
                ride_id: raid_id.clone(),
                fare,
                distance_km: actual_distance,
            },
            None,
        );
        self.gateway.emit_room(
            &user_room,
            &OutboundEvent::RideStatusUpdate {
                ride_id: raid_id.clone(),
                status: RideStatus::Completed,
            },
            None,
        );

        // 7. Driver is dispatchable again; drop the in-memory mirror.
        self.store
            .set_driver_status(&assigned, DriverStatus::Live)
            .await?;
        self.presence.mark_status(&assigned, DriverStatus::Live);
        self.active.remove(&raid_id);

        info!(raid_id = %raid_id, fare = %fare, "Ride completed");

        Ok(CompletionOutcome {
            raid_id,
            fare,
            new_wallet_balance: receipt.balance_after,
        })
    }

    /// Cancel a ride.
    ///
    /// Before the trip starts this is a plain transition to `cancelled`.
    /// Once the trip is underway there is nothing to abandon: the ride is
    /// settled through the completion protocol with the recorded distance,
    /// so the driver is paid for the kilometres already driven.
    ///
    /// # Errors
    ///
    /// Transition failure from terminal states.
    #[instrument(skip(self), fields(raid_id = %raid_id))]
    pub async fn cancel(&self, raid_id: &RideId) -> Result<()> {
        let moved = self
            .store
            .transition_ride(
                raid_id,
                &[RideStatus::Pending, RideStatus::Accepted, RideStatus::Arrived],
                RideStatus::Cancelled,
                self.clock.now(),
            )
            .await?;
        if !moved {
            let ride = self.get_ride(raid_id).await?;
            if ride.status == RideStatus::Started {
                if let Some(driver_id) = ride.driver_id.clone() {
                    info!(raid_id = %raid_id, "Cancel on a started ride, settling as completion");
                    self.complete(CompleteRidePayload {
                        ride_id: raid_id.clone(),
                        driver_id,
                        distance: ride.actual_distance_km.unwrap_or(ride.distance_km),
                        fare: None,
                        actual_pickup: None,
                        actual_drop: None,
                    })
                    .await?;
                    return Ok(());
                }
            }
            return Err(DomainError::InvalidTransition {
                from: ride.status.to_string(),
                to: RideStatus::Cancelled.to_string(),
            }
            .into());
        }

        let ride = self.get_ride(raid_id).await?;
        self.notify_status(&ride, RideStatus::Cancelled);

        // An assigned driver goes back on dispatch.
        if let Some(driver_id) = &ride.driver_id {
            self.store
                .set_driver_status(driver_id, DriverStatus::Live)
                .await?;
            self.presence.mark_status(driver_id, DriverStatus::Live);
        }
        self.active.remove(raid_id);
        Ok(())
    }

    fn notify_status(&self, ride: &Ride, status: RideStatus) {
        let event = OutboundEvent::RideStatusUpdate {
            ride_id: ride.raid_id.clone(),
            status,
        };
        self.gateway
            .emit_room(&Room::User(ride.user_id.to_string()), &event, None);
        if let Some(driver_id) = &ride.driver_id {
            self.gateway
                .emit_room(&Room::Driver(driver_id.clone()), &event, None);
        }
    }
}

fn place_from(payload: &PlacePayload) -> Place {
    Place {
        lat: payload.lat,
        lng: payload.lng,
        address: payload.address.clone(),
    }
}
