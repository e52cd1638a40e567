//! Error type for push delivery.

use thiserror::Error;

/// Push delivery failure.
///
/// Push is best-effort everywhere in the backend: these errors are logged
/// and counted by callers, never propagated into state transitions.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PushError {
    /// Transport-level failure reaching the provider.
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("provider rejected the message: status {0}")]
    Rejected(u16),

    /// The send did not finish within its deadline.
    #[error("push send timed out")]
    Timeout,
}

/// Result alias for push operations.
pub type Result<T> = std::result::Result<T, PushError>;
