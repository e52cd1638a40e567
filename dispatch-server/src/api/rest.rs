//! REST surface: auth bootstrap, reads, admin writes and the completion
//! fallback.
//!
//! Every handler goes through the same services as the realtime channel,
//! so `simple-complete` runs the identical completion protocol (same
//! side-effect order, same events). Reads bypass caches except pricing.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::instrument;
use uuid::Uuid;

use crate::app::App;
use crate::error::{ApiError, DomainError};
use crate::ports::store::{DriverStore, LedgerStore, PricingStore, UserStore};
use crate::types::entities::User;
use crate::types::enums::{DriverStatus, TxMethod, VehicleType};
use crate::types::events::{BookRidePayload, CompleteRidePayload, OutboundEvent};
use crate::types::primitives::{Amount, DriverId, RideId};

type ApiResult = Result<Json<Value>, ApiError>;

// ═══════════════════════════════════════════════════════════════════════════════
// ROUTER
// ═══════════════════════════════════════════════════════════════════════════════

/// Build the full REST router.
pub fn router(app: Arc<App>) -> Router {
    let public = Router::new()
        .route("/auth/request-driver-otp", post(request_driver_otp))
        .route("/auth/get-complete-driver-info", post(complete_driver_info));

    let protected = Router::new()
        .route("/drivers/:driver_id", get(get_driver))
        .route("/drivers/:driver_id/status", patch(set_driver_status))
        .route("/drivers/:driver_id/transactions", get(driver_transactions))
        .route("/drivers/fcm-token", post(set_fcm_token))
        .route("/drivers/working-hours/start", post(hours_start))
        .route("/drivers/working-hours/stop", post(hours_stop))
        .route("/drivers/working-hours/pause", post(hours_pause))
        .route("/drivers/working-hours/resume", post(hours_resume))
        .route("/drivers/working-hours/extend", post(hours_extend))
        .route("/drivers/working-hours/add-half-time", post(hours_add_half))
        .route("/drivers/working-hours/add-full-time", post(hours_add_full))
        .route(
            "/drivers/working-hours/status/:driver_id",
            get(hours_status),
        )
        .route("/rides/book-ride-enhanced", post(book_ride))
        .route("/rides/arrived", post(ride_arrived))
        .route("/rides/start", post(ride_start))
        .route("/rides/cancel", post(ride_cancel))
        .route("/rides/simple-complete", post(ride_simple_complete))
        .route("/rides/:ride_id", get(get_ride))
        .route("/admin/ride-prices", get(get_prices).post(set_price))
        .route("/admin/direct-wallet/:driver_id", post(direct_wallet))
        .route("/wallet/balance", get(wallet_balance))
        .route("/wallet/add-money", post(wallet_add_money))
        .route("/wallet/payment", post(wallet_payment))
        .route("/wallet/withdraw", post(wallet_withdraw))
        .route("/wallet/credit-ride", post(wallet_credit_ride))
        .layer(middleware::from_fn_with_state(app.clone(), require_bearer));

    public.merge(protected).with_state(app)
}

/// Bearer-token gate for everything past the auth bootstrap.
async fn require_bearer(
    State(app): State<Arc<App>>,
    headers: HeaderMap,
    request: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let token = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));
    match token {
        Some(token) if app.tokens.verify(token, app.clock.as_ref()).is_ok() => {
            next.run(request).await
        }
        _ => StatusCode::UNAUTHORIZED.into_response(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// AUTH BOOTSTRAP
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PhoneBody {
    phone_number: String,
}

/// Phone-OTP delivery itself is external; this endpoint confirms the phone
/// belongs to a provisioned driver so the app can proceed to verification.
#[instrument(skip(app, body))]
async fn request_driver_otp(
    State(app): State<Arc<App>>,
    Json(body): Json<PhoneBody>,
) -> ApiResult {
    let driver = app
        .store
        .get_driver_by_phone(&body.phone_number)
        .await
        .map_err(ApiError::App)?
        .ok_or_else(|| DomainError::DriverNotFound(DriverId::new(body.phone_number.clone())))?;
    Ok(Json(json!({ "success": true, "driverId": driver.driver_id })))
}

/// Called after the external verifier asserted the phone; mints the
/// session token.
#[instrument(skip(app, body))]
async fn complete_driver_info(
    State(app): State<Arc<App>>,
    Json(body): Json<PhoneBody>,
) -> ApiResult {
    let driver = app
        .store
        .get_driver_by_phone(&body.phone_number)
        .await
        .map_err(ApiError::App)?
        .ok_or_else(|| DomainError::DriverNotFound(DriverId::new(body.phone_number.clone())))?;
    let token = app
        .tokens
        .issue(driver.driver_id.as_str(), app.clock.as_ref());
    Ok(Json(json!({ "success": true, "token": token, "driver": driver })))
}

// ═══════════════════════════════════════════════════════════════════════════════
// DRIVERS
// ═══════════════════════════════════════════════════════════════════════════════

async fn get_driver(State(app): State<Arc<App>>, Path(driver_id): Path<String>) -> ApiResult {
    let id = DriverId::new(driver_id);
    let driver = app
        .store
        .get_driver(&id)
        .await
        .map_err(ApiError::App)?
        .ok_or(DomainError::DriverNotFound(id))?;
    Ok(Json(json!({ "success": true, "driver": driver })))
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

async fn set_driver_status(
    State(app): State<Arc<App>>,
    Path(driver_id): Path<String>,
    Json(body): Json<StatusBody>,
) -> ApiResult {
    let status: DriverStatus = body
        .status
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("status: {e}")))?;
    let id = DriverId::new(driver_id);
    app.store
        .set_driver_status(&id, status)
        .await
        .map_err(ApiError::App)?;
    app.presence.mark_status(&id, status);
    Ok(Json(json!({ "success": true, "status": status })))
}

async fn driver_transactions(
    State(app): State<Arc<App>>,
    Path(driver_id): Path<String>,
) -> ApiResult {
    let id = DriverId::new(driver_id);
    let transactions = app
        .store
        .transactions_for_driver(&id, 50)
        .await
        .map_err(ApiError::App)?;
    Ok(Json(json!({ "success": true, "transactions": transactions })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FcmTokenBody {
    driver_id: DriverId,
    fcm_token: String,
}

async fn set_fcm_token(State(app): State<Arc<App>>, Json(body): Json<FcmTokenBody>) -> ApiResult {
    app.store
        .set_push_token(&body.driver_id, &body.fcm_token)
        .await
        .map_err(ApiError::App)?;
    Ok(Json(json!({ "success": true })))
}

// ═══════════════════════════════════════════════════════════════════════════════
// WORKING HOURS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HoursBody {
    driver_id: DriverId,
    #[serde(default)]
    additional_hours: Option<u32>,
}

async fn hours_start(State(app): State<Arc<App>>, Json(body): Json<HoursBody>) -> ApiResult {
    let outcome = app.hours.start(&body.driver_id).await.map_err(ApiError::App)?;
    Ok(Json(json!({
        "success": true,
        "amountDeducted": outcome.amount_deducted,
        "remainingSeconds": outcome.remaining_seconds,
        "resumed": outcome.resumed,
    })))
}

async fn hours_stop(State(app): State<Arc<App>>, Json(body): Json<HoursBody>) -> ApiResult {
    let remaining = app.hours.stop(&body.driver_id).await.map_err(ApiError::App)?;
    Ok(Json(json!({ "success": true, "remainingSeconds": remaining })))
}

async fn hours_pause(State(app): State<Arc<App>>, Json(body): Json<HoursBody>) -> ApiResult {
    let remaining = app.hours.pause(&body.driver_id).await.map_err(ApiError::App)?;
    Ok(Json(json!({ "success": true, "remainingSeconds": remaining })))
}

async fn hours_resume(State(app): State<Arc<App>>, Json(body): Json<HoursBody>) -> ApiResult {
    let outcome = app.hours.resume(&body.driver_id).await.map_err(ApiError::App)?;
    Ok(Json(json!({
        "success": true,
        "remainingSeconds": outcome.remaining_seconds,
        "resumed": outcome.resumed,
    })))
}

async fn hours_extend(State(app): State<Arc<App>>, Json(body): Json<HoursBody>) -> ApiResult {
    let hours = body.additional_hours.unwrap_or(12);
    let remaining = app
        .hours
        .extend(&body.driver_id, hours)
        .await
        .map_err(ApiError::App)?;
    Ok(Json(json!({ "success": true, "remainingSeconds": remaining })))
}

async fn hours_add_half(State(app): State<Arc<App>>, Json(body): Json<HoursBody>) -> ApiResult {
    let remaining = app
        .hours
        .add_half_time(&body.driver_id)
        .await
        .map_err(ApiError::App)?;
    Ok(Json(json!({ "success": true, "remainingSeconds": remaining })))
}

async fn hours_add_full(State(app): State<Arc<App>>, Json(body): Json<HoursBody>) -> ApiResult {
    let remaining = app
        .hours
        .add_full_time(&body.driver_id)
        .await
        .map_err(ApiError::App)?;
    Ok(Json(json!({ "success": true, "remainingSeconds": remaining })))
}

async fn hours_status(State(app): State<Arc<App>>, Path(driver_id): Path<String>) -> ApiResult {
    let snapshot = app
        .hours
        .status(&DriverId::new(driver_id))
        .await
        .map_err(ApiError::App)?;
    Ok(Json(json!({ "success": true, "workingHours": snapshot })))
}

// ═══════════════════════════════════════════════════════════════════════════════
// RIDES
// ═══════════════════════════════════════════════════════════════════════════════

async fn book_ride(State(app): State<Arc<App>>, Json(body): Json<BookRidePayload>) -> ApiResult {
    let outcome = app.dispatch.book_ride(body).await.map_err(ApiError::App)?;
    Ok(Json(json!({
        "success": true,
        "rideId": outcome.raid_id,
        "id": outcome.ride_id,
        "otp": outcome.otp,
        "fare": outcome.fare,
        "vehicleType": outcome.vehicle_type,
        "driversFound": outcome.drivers_found,
        "alreadySent": outcome.already_sent,
    })))
}

async fn get_ride(State(app): State<Arc<App>>, Path(ride_id): Path<String>) -> ApiResult {
    let raid_id: RideId = ride_id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("rideId: {e}")))?;
    let ride = app.rides.get_ride(&raid_id).await.map_err(ApiError::App)?;
    // Populate the passenger fields from the user record where available.
    let user: Option<User> = app
        .store
        .get_user(&ride.user_id)
        .await
        .map_err(ApiError::App)?;
    Ok(Json(json!({ "success": true, "ride": ride, "user": user })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RideIdBody {
    ride_id: RideId,
}

async fn ride_arrived(State(app): State<Arc<App>>, Json(body): Json<RideIdBody>) -> ApiResult {
    app.rides.arrived(&body.ride_id).await.map_err(ApiError::App)?;
    Ok(Json(json!({ "success": true, "status": "arrived" })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartBody {
    ride_id: RideId,
    driver_id: DriverId,
    otp: String,
}

async fn ride_start(State(app): State<Arc<App>>, Json(body): Json<StartBody>) -> ApiResult {
    let ride = app
        .rides
        .start(&body.ride_id, &body.driver_id, &body.otp)
        .await
        .map_err(ApiError::App)?;
    Ok(Json(json!({ "success": true, "status": ride.status })))
}

async fn ride_cancel(State(app): State<Arc<App>>, Json(body): Json<RideIdBody>) -> ApiResult {
    app.rides.cancel(&body.ride_id).await.map_err(ApiError::App)?;
    Ok(Json(json!({ "success": true, "status": "cancelled" })))
}

/// Completion fallback for clients that lost the realtime channel; runs
/// the identical protocol.
async fn ride_simple_complete(
    State(app): State<Arc<App>>,
    Json(body): Json<CompleteRidePayload>,
) -> ApiResult {
    let outcome = app.rides.complete(body).await.map_err(ApiError::App)?;
    Ok(Json(json!({
        "success": true,
        "rideId": outcome.raid_id,
        "fare": outcome.fare,
        "newWalletBalance": outcome.new_wallet_balance,
    })))
}

// ═══════════════════════════════════════════════════════════════════════════════
// ADMIN
// ═══════════════════════════════════════════════════════════════════════════════

async fn get_prices(State(app): State<Arc<App>>) -> ApiResult {
    let table: serde_json::Map<String, Value> = app
        .pricing
        .snapshot()
        .iter()
        .map(|(vt, rate)| (vt.as_str().to_string(), json!(rate)))
        .collect();
    Ok(Json(json!({ "success": true, "prices": table })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PriceBody {
    vehicle_type: String,
    price: i64,
}

async fn set_price(State(app): State<Arc<App>>, Json(body): Json<PriceBody>) -> ApiResult {
    let vehicle_type: VehicleType = body
        .vehicle_type
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("vehicleType: {e}")))?;
    if body.price <= 0 {
        return Err(ApiError::BadRequest("price must be positive".into()));
    }

    app.store
        .upsert_price(vehicle_type, body.price)
        .await
        .map_err(ApiError::App)?;
    app.pricing.set_rate(vehicle_type, body.price);
    app.gateway
        .emit_all(&OutboundEvent::PriceUpdate(app.pricing.snapshot()));

    Ok(Json(json!({ "success": true, "vehicleType": vehicle_type, "price": body.price })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DirectWalletBody {
    amount: i64,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    description: Option<String>,
}

async fn direct_wallet(
    State(app): State<Arc<App>>,
    Path(driver_id): Path<String>,
    Json(body): Json<DirectWalletBody>,
) -> ApiResult {
    let id = DriverId::new(driver_id);
    let amount = Amount::new(body.amount)
        .map_err(|e| ApiError::BadRequest(format!("amount: {e}")))?;
    let description = body
        .description
        .unwrap_or_else(|| "Admin adjustment".to_string());

    let receipt = match body.kind.as_str() {
        "credit" => app
            .wallet
            .credit(&id, amount, TxMethod::AdminCredit, &description, None)
            .await
            .map_err(ApiError::App)?,
        "debit" => app
            .wallet
            .debit(&id, amount, TxMethod::AdminDebit, &description, None)
            .await
            .map_err(ApiError::App)?,
        other => return Err(ApiError::BadRequest(format!("type: unknown kind {other}"))),
    };

    Ok(Json(json!({
        "success": true,
        "newBalance": receipt.balance_after,
        "transactionId": receipt.transaction.id,
    })))
}

// ═══════════════════════════════════════════════════════════════════════════════
// PASSENGER WALLET
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletQueryBody {
    user_id: Option<Uuid>,
    customer_id: Option<String>,
    #[serde(default)]
    amount: Option<i64>,
}

async fn resolve_user(app: &App, body: &WalletQueryBody) -> Result<User, ApiError> {
    if let Some(id) = body.user_id {
        return app
            .store
            .get_user(&id)
            .await
            .map_err(ApiError::App)?
            .ok_or_else(|| DomainError::UserNotFound(id.to_string()).into());
    }
    if let Some(customer_id) = body.customer_id.as_deref() {
        return app
            .store
            .get_user_by_customer_id(customer_id)
            .await
            .map_err(ApiError::App)?
            .ok_or_else(|| DomainError::UserNotFound(customer_id.to_string()).into());
    }
    Err(ApiError::BadRequest("userId or customerId required".into()))
}

fn required_amount(body: &WalletQueryBody) -> Result<Amount, ApiError> {
    body.amount
        .ok_or_else(|| ApiError::BadRequest("amount required".into()))
        .and_then(|a| Amount::new(a).map_err(|e| ApiError::BadRequest(format!("amount: {e}"))))
}

async fn wallet_balance(
    State(app): State<Arc<App>>,
    Query(body): Query<WalletQueryBody>,
) -> ApiResult {
    let user = resolve_user(&app, &body).await?;
    Ok(Json(json!({ "success": true, "balance": user.wallet })))
}

async fn wallet_add_money(
    State(app): State<Arc<App>>,
    Json(body): Json<WalletQueryBody>,
) -> ApiResult {
    let user = resolve_user(&app, &body).await?;
    let amount = required_amount(&body)?;

    let balance = app
        .store
        .credit_user(&user.id, amount)
        .await
        .map_err(ApiError::App)?;

    Ok(Json(json!({ "success": true, "balance": balance })))
}

/// Pay out of the passenger wallet (fails closed on insufficient funds).
async fn wallet_payment(
    State(app): State<Arc<App>>,
    Json(body): Json<WalletQueryBody>,
) -> ApiResult {
    let user = resolve_user(&app, &body).await?;
    let amount = required_amount(&body)?;

    let balance = app
        .store
        .debit_user(&user.id, amount)
        .await
        .map_err(ApiError::App)?;

    Ok(Json(json!({ "success": true, "balance": balance })))
}

/// Withdraw wallet funds back to the passenger; same ledger rules as a
/// payment.
async fn wallet_withdraw(
    State(app): State<Arc<App>>,
    Json(body): Json<WalletQueryBody>,
) -> ApiResult {
    wallet_payment(State(app), Json(body)).await
}

/// Refund a ride fare into the passenger wallet.
async fn wallet_credit_ride(
    State(app): State<Arc<App>>,
    Json(body): Json<WalletQueryBody>,
) -> ApiResult {
    let user = resolve_user(&app, &body).await?;
    let amount = required_amount(&body)?;

    let balance = app
        .store
        .credit_user(&user.id, amount)
        .await
        .map_err(ApiError::App)?;

    Ok(Json(json!({ "success": true, "balance": balance })))
}
