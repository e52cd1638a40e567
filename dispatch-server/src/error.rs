//! Layered error types for the dispatch core.
//!
//! - [`DomainError`] - Business rule violations (ride taken, bad OTP, …)
//! - [`InfraError`] - Infrastructure failures (database, timeouts)
//! - [`AppError`] - Application-level errors combining domain and infra
//! - [`ApiError`] - HTTP errors with status codes
//!
//! # Error Philosophy
//!
//! - Domain errors are recoverable and surfaced verbatim to callers, both
//!   over REST and in realtime acknowledgements
//! - Infrastructure errors are logged; their details are hidden from users
//! - Push-delivery failures never become errors at all: push is advisory
//!   and the realtime channel is the primary delivery

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

use crate::types::primitives::{Amount, DriverId, RideId};

// ═══════════════════════════════════════════════════════════════════════════════
// DOMAIN ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Domain-level errors representing business rule violations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DomainError {
    /// A required field is missing or malformed.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Driver not found.
    #[error("driver not found: {0}")]
    DriverNotFound(DriverId),

    /// User not found.
    #[error("user not found: {0}")]
    UserNotFound(String),

    /// Ride not found.
    #[error("ride not found: {0}")]
    RideNotFound(RideId),

    /// The acceptance CAS lost: the ride is no longer pending.
    #[error("ride {0} is not available")]
    RideTaken(RideId),

    /// A ride with this id already exists.
    #[error("duplicate ride id: {0}")]
    DuplicateRide(RideId),

    /// The requested lifecycle transition is not allowed.
    #[error("invalid ride transition: {from} -> {to}")]
    InvalidTransition {
        /// Observed state.
        from: String,
        /// Attempted state.
        to: String,
    },

    /// The submitted OTP does not match the ride's.
    #[error("invalid OTP for ride {0}")]
    InvalidOtp(RideId),

    /// A debit was attempted beyond the available balance.
    #[error("insufficient wallet balance: required {required}, available {available}")]
    InsufficientBalance {
        /// Amount the operation needs.
        required: Amount,
        /// Amount actually available.
        available: Amount,
    },

    /// No or bad credentials.
    #[error("unauthenticated")]
    Unauthenticated,

    /// Credentials do not permit this operation.
    #[error("unauthorized")]
    Unauthorized,
}

// ═══════════════════════════════════════════════════════════════════════════════
// INFRASTRUCTURE ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Infrastructure-level errors from external systems.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum InfraError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// JSON serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A store operation exceeded its deadline.
    #[error("operation timed out: {0}")]
    Timeout(String),

    /// Configuration file error.
    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Anything else that should never surface as-is.
    #[error("internal error: {0}")]
    Internal(String),
}

// ═══════════════════════════════════════════════════════════════════════════════
// APPLICATION ERRORS
// ═══════════════════════════════════════════════════════════════════════════════

/// Application-level error combining domain and infrastructure errors.
///
/// This is the primary error type used throughout the service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppError {
    /// Domain rule violation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Infrastructure failure.
    #[error(transparent)]
    Infra(#[from] InfraError),

    /// Invalid configuration detected at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Startup wiring failure.
    #[error("initialization error: {0}")]
    Initialization(String),
}

impl AppError {
    /// Whether a retry might succeed (transient infrastructure failure).
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Infra(InfraError::Database(_) | InfraError::Timeout(_))
        )
    }

    /// The user-facing message for realtime acknowledgements.
    ///
    /// Domain errors speak for themselves; everything else collapses into a
    /// generic message so infrastructure details never leak to clients.
    #[must_use]
    pub fn ack_message(&self) -> String {
        match self {
            Self::Domain(DomainError::InsufficientBalance { required, .. }) => {
                format!("Insufficient wallet balance. Minimum \u{20b9}{required} required")
            }
            Self::Domain(domain) => domain.to_string(),
            Self::Infra(_) | Self::Config(_) | Self::Initialization(_) => {
                "Something went wrong, please retry".to_string()
            }
        }
    }
}

/// Type alias for application Results.
pub type Result<T> = std::result::Result<T, AppError>;

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        Self::Infra(InfraError::Database(err))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// API ERRORS (HTTP-specific)
// ═══════════════════════════════════════════════════════════════════════════════

/// API-level errors converted to HTTP responses via [`IntoResponse`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    /// Wrapped application error.
    #[error(transparent)]
    App(#[from] AppError),

    /// Request shape is wrong before it ever reaches the domain.
    #[error("invalid request: {0}")]
    BadRequest(String),
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self::App(AppError::Domain(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            Self::App(AppError::Domain(
                DomainError::DriverNotFound(_)
                | DomainError::UserNotFound(_)
                | DomainError::RideNotFound(_),
            )) => (StatusCode::NOT_FOUND, "NOT_FOUND", self.to_string()),

            Self::App(AppError::Domain(DomainError::InvalidInput(_))) | Self::BadRequest(_) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", self.to_string())
            }

            Self::App(AppError::Domain(
                DomainError::RideTaken(_) | DomainError::DuplicateRide(_),
            )) => (StatusCode::CONFLICT, "CONFLICT", self.to_string()),

            Self::App(AppError::Domain(
                DomainError::InvalidTransition { .. }
                | DomainError::InvalidOtp(_)
                | DomainError::InsufficientBalance { .. },
            )) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "DOMAIN_RULE",
                self.to_string(),
            ),

            Self::App(AppError::Domain(DomainError::Unauthenticated)) => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHENTICATED",
                self.to_string(),
            ),

            Self::App(AppError::Domain(DomainError::Unauthorized)) => {
                (StatusCode::FORBIDDEN, "UNAUTHORIZED", self.to_string())
            }

            // Infrastructure and internal errors: log but don't expose details
            Self::App(
                AppError::Infra(_) | AppError::Config(_) | AppError::Initialization(_),
            ) => {
                tracing::error!(error = ?self, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "Internal error".into(),
                )
            }
        };

        (
            status,
            Json(json!({
                "success": false,
                "error": {
                    "code": code,
                    "message": message
                }
            })),
        )
            .into_response()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_error_display() {
        let err = DomainError::RideTaken(RideId::from_sequence(2));
        assert!(err.to_string().contains("RID000002"));
    }

    #[test]
    fn app_error_from_domain() {
        let app: AppError = DomainError::Unauthenticated.into();
        assert!(matches!(app, AppError::Domain(DomainError::Unauthenticated)));
    }

    #[test]
    fn insufficient_balance_ack_message() {
        let app: AppError = DomainError::InsufficientBalance {
            required: Amount::saturating(100),
            available: Amount::saturating(50),
        }
        .into();
        let message = app.ack_message();
        assert!(message.contains("100"), "unexpected message: {message}");
        assert!(message.contains("Insufficient wallet balance"));
    }

    #[test]
    fn infra_errors_do_not_leak_details() {
        let app: AppError = InfraError::Internal("pool exploded".into()).into();
        assert!(!app.ack_message().contains("pool"));
    }

    #[test]
    fn retryable_classification() {
        let timeout: AppError = InfraError::Timeout("driver read".into()).into();
        assert!(timeout.is_retryable());

        let taken: AppError = DomainError::RideTaken(RideId::from_sequence(9)).into();
        assert!(!taken.is_retryable());
    }
}
