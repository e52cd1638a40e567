//! FCM-style HTTP push client.
//!
//! Speaks the legacy HTTP delivery shape: a POST with a server-key
//! `Authorization` header. Every send carries a short deadline; the caller
//! treats any failure as advisory.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, instrument};

use crate::error::{PushError, Result};
use crate::types::{FcmNotification, FcmRequest, PushMessage};
use crate::PushSender;

/// Default per-send deadline.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3);

// ═══════════════════════════════════════════════════════════════════════════════
// FCM CLIENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Push client for an FCM-compatible endpoint.
///
/// # Thread Safety
///
/// The client is `Send + Sync`; the inner `reqwest::Client` is designed for
/// concurrent use and can be shared across tasks.
#[derive(Debug, Clone)]
pub struct FcmClient {
    http: reqwest::Client,
    endpoint: String,
    server_key: String,
    timeout: Duration,
}

impl FcmClient {
    /// Create a client with the default three-second deadline.
    #[must_use]
    pub fn new(endpoint: impl Into<String>, server_key: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into(),
            server_key: server_key.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Override the per-send deadline.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl PushSender for FcmClient {
    #[instrument(skip(self, message), fields(title = %message.title))]
    async fn send(&self, message: &PushMessage) -> Result<()> {
        let request = FcmRequest {
            to: &message.token,
            notification: FcmNotification {
                title: &message.title,
                body: &message.body,
            },
            data: &message.data,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PushError::Timeout
                } else {
                    PushError::Transport(e)
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), "Push delivered");
            Ok(())
        } else {
            Err(PushError::Rejected(status.as_u16()))
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    #[tokio::test]
    async fn sends_server_key_and_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/fcm/send"))
            .and(header("Authorization", "key=secret"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = FcmClient::new(format!("{}/fcm/send", server.uri()), "secret");
        let message = PushMessage::new("device-token", "New ride request", "bike, 5.4 km")
            .with_data(json!({ "rideId": "RID000001" }));

        client.send(&message).await.expect("send");

        let requests = server.received_requests().await.expect("requests");
        let body: serde_json::Value =
            serde_json::from_slice(&requests[0].body).expect("json body");
        assert_eq!(body["to"], "device-token");
        assert_eq!(body["notification"]["title"], "New ride request");
        assert_eq!(body["data"]["rideId"], "RID000001");
    }

    #[tokio::test]
    async fn non_success_status_is_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = FcmClient::new(server.uri(), "bad-key");
        let err = client
            .send(&PushMessage::new("tok", "t", "b"))
            .await
            .expect_err("must fail");
        assert!(matches!(err, PushError::Rejected(401)));
    }

    #[tokio::test]
    async fn slow_provider_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client =
            FcmClient::new(server.uri(), "key").with_timeout(Duration::from_millis(50));
        let err = client
            .send(&PushMessage::new("tok", "t", "b"))
            .await
            .expect_err("must time out");
        assert!(matches!(err, PushError::Timeout | PushError::Transport(_)));
    }
}
