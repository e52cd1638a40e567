//! Test doubles for push delivery.

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::error::{PushError, Result};
use crate::types::PushMessage;
use crate::PushSender;

// ═══════════════════════════════════════════════════════════════════════════════
// NOOP SENDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Sender used when no provider credential is configured: every send
/// succeeds and does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopSender;

#[async_trait]
impl PushSender for NoopSender {
    async fn send(&self, _message: &PushMessage) -> Result<()> {
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CAPTURING SENDER
// ═══════════════════════════════════════════════════════════════════════════════

/// Sender that records every message, for assertions in tests.
#[derive(Debug, Default)]
pub struct CapturingSender {
    sent: Mutex<Vec<PushMessage>>,
    fail: Mutex<bool>,
}

impl CapturingSender {
    /// Create an empty capture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent sends fail, to exercise degraded-push paths.
    pub fn set_failing(&self, failing: bool) {
        *self.fail.lock() = failing;
    }

    /// Messages sent so far.
    #[must_use]
    pub fn sent(&self) -> Vec<PushMessage> {
        self.sent.lock().clone()
    }

    /// Number of messages sent so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.sent.lock().len()
    }
}

#[async_trait]
impl PushSender for CapturingSender {
    async fn send(&self, message: &PushMessage) -> Result<()> {
        if *self.fail.lock() {
            return Err(PushError::Rejected(503));
        }
        self.sent.lock().push(message.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn capture_records_messages_in_order() {
        let sender = CapturingSender::new();
        sender
            .send(&PushMessage::new("a", "first", ""))
            .await
            .expect("send");
        sender
            .send(&PushMessage::new("b", "second", ""))
            .await
            .expect("send");

        let sent = sender.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].title, "first");
        assert_eq!(sent[1].title, "second");
    }

    #[tokio::test]
    async fn failing_mode_rejects() {
        let sender = CapturingSender::new();
        sender.set_failing(true);
        assert!(sender.send(&PushMessage::new("a", "t", "b")).await.is_err());
        assert_eq!(sender.count(), 0);
    }
}
