//! Session token signing and verification.
//!
//! Tokens bind a subject id (driver or user) and an expiry under an
//! HMAC-SHA256 signature: `subject.expiry.hex(sig)`. Phone-OTP identity
//! proofing happens outside the core; the auth bootstrap endpoints mint a
//! token for whatever phone number the external verifier asserted.

use ring::hmac;

use crate::error::{DomainError, Result};
use crate::ports::clock::Clock;

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN SIGNER
// ═══════════════════════════════════════════════════════════════════════════════

/// Issues and verifies bearer tokens.
pub struct TokenSigner {
    key: hmac::Key,
    ttl_secs: u64,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenSigner")
            .field("ttl_secs", &self.ttl_secs)
            .finish_non_exhaustive()
    }
}

impl TokenSigner {
    /// Create a signer from the configured secret.
    #[must_use]
    pub fn new(secret: &str, ttl_secs: u64) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret.as_bytes()),
            ttl_secs,
        }
    }

    /// Issue a token for a subject.
    #[must_use]
    pub fn issue(&self, subject: &str, clock: &dyn Clock) -> String {
        let expiry = clock.now().timestamp() + i64::try_from(self.ttl_secs).unwrap_or(i64::MAX);
        let payload = format!("{subject}.{expiry}");
        let tag = hmac::sign(&self.key, payload.as_bytes());
        format!("{payload}.{}", hex::encode(tag.as_ref()))
    }

    /// Verify a token and return its subject.
    ///
    /// # Errors
    ///
    /// `UNAUTHENTICATED` for malformed, forged or expired tokens.
    pub fn verify(&self, token: &str, clock: &dyn Clock) -> Result<String> {
        let mut parts = token.rsplitn(2, '.');
        let (Some(signature), Some(payload)) = (parts.next(), parts.next()) else {
            return Err(DomainError::Unauthenticated.into());
        };
        let signature = hex::decode(signature).map_err(|_| DomainError::Unauthenticated)?;
        hmac::verify(&self.key, payload.as_bytes(), &signature)
            .map_err(|_| DomainError::Unauthenticated)?;

        let mut fields = payload.rsplitn(2, '.');
        let (Some(expiry), Some(subject)) = (fields.next(), fields.next()) else {
            return Err(DomainError::Unauthenticated.into());
        };
        let expiry: i64 = expiry.parse().map_err(|_| DomainError::Unauthenticated)?;
        if clock.now().timestamp() > expiry {
            return Err(DomainError::Unauthenticated.into());
        }
        Ok(subject.to_string())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::ports::clock::FakeClock;

    #[test]
    fn round_trip() {
        let signer = TokenSigner::new("secret", 3600);
        let clock = FakeClock::now_fake();
        let token = signer.issue("DRV001", &clock);
        assert_eq!(signer.verify(&token, &clock).expect("valid"), "DRV001");
    }

    #[test]
    fn subject_may_contain_dots() {
        let signer = TokenSigner::new("secret", 3600);
        let clock = FakeClock::now_fake();
        let token = signer.issue("user.with.dots", &clock);
        assert_eq!(
            signer.verify(&token, &clock).expect("valid"),
            "user.with.dots"
        );
    }

    #[test]
    fn forged_signature_is_rejected() {
        let signer = TokenSigner::new("secret", 3600);
        let other = TokenSigner::new("different-secret", 3600);
        let clock = FakeClock::now_fake();

        let token = other.issue("DRV001", &clock);
        assert!(signer.verify(&token, &clock).is_err());
    }

    #[test]
    fn tampered_subject_is_rejected() {
        let signer = TokenSigner::new("secret", 3600);
        let clock = FakeClock::now_fake();
        let token = signer.issue("DRV001", &clock);
        let tampered = token.replacen("DRV001", "DRV999", 1);
        assert!(signer.verify(&tampered, &clock).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let signer = TokenSigner::new("secret", 60);
        let clock = FakeClock::now_fake();
        let token = signer.issue("DRV001", &clock);

        clock.advance(Duration::from_secs(120));
        assert!(signer.verify(&token, &clock).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let signer = TokenSigner::new("secret", 3600);
        let clock = FakeClock::now_fake();
        assert!(signer.verify("", &clock).is_err());
        assert!(signer.verify("no-dots-here", &clock).is_err());
        assert!(signer.verify("a.b.nothex", &clock).is_err());
    }
}
