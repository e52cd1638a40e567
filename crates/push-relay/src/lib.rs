//! Best-effort push notification delivery for the Rideway backend.
//!
//! Push is an outbound sink, never a dependency: the realtime channel is
//! the primary delivery and dispatch proceeds identically whether a push
//! lands, fails or is disabled. Accordingly every sender here is cheap to
//! call, carries a short deadline, and reports failures as values the
//! caller logs and counts.
//!
//! # Senders
//!
//! - [`FcmClient`] - HTTP delivery to an FCM-compatible endpoint
//! - [`NoopSender`] - used when no provider credential is configured
//! - [`CapturingSender`] - test double recording every message

pub mod error;
mod fcm;
mod mock;
mod types;

use async_trait::async_trait;

pub use error::{PushError, Result};
pub use fcm::FcmClient;
pub use mock::{CapturingSender, NoopSender};
pub use types::PushMessage;

/// Port for push delivery.
#[async_trait]
pub trait PushSender: Send + Sync {
    /// Deliver one message.
    ///
    /// # Errors
    ///
    /// Returns a [`PushError`] the caller treats as advisory.
    async fn send(&self, message: &PushMessage) -> Result<()>;
}
