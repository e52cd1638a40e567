//! Wire types for push delivery.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One notification addressed to a device token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    /// Device registration token.
    pub token: String,
    /// Notification title.
    pub title: String,
    /// Notification body text.
    pub body: String,
    /// Opaque payload handed to the app (event name, ride id, …).
    #[serde(default)]
    pub data: Value,
}

impl PushMessage {
    /// Build a message with an empty data payload.
    #[must_use]
    pub fn new(token: impl Into<String>, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            title: title.into(),
            body: body.into(),
            data: Value::Null,
        }
    }

    /// Attach a data payload.
    #[must_use]
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// Request body in the legacy FCM HTTP shape.
#[derive(Debug, Serialize)]
pub(crate) struct FcmRequest<'a> {
    pub to: &'a str,
    pub notification: FcmNotification<'a>,
    #[serde(skip_serializing_if = "is_null_ref")]
    pub data: &'a Value,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_null_ref(value: &&Value) -> bool {
    value.is_null()
}

/// Notification block of an FCM request.
#[derive(Debug, Serialize)]
pub(crate) struct FcmNotification<'a> {
    pub title: &'a str,
    pub body: &'a str,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_builder_round_trip() {
        let msg = PushMessage::new("tok", "New ride", "5.4 km away")
            .with_data(json!({ "rideId": "RID000001" }));
        assert_eq!(msg.token, "tok");
        assert_eq!(msg.data["rideId"], "RID000001");
    }

    #[test]
    fn request_omits_null_data() {
        let msg = PushMessage::new("tok", "t", "b");
        let request = FcmRequest {
            to: &msg.token,
            notification: FcmNotification {
                title: &msg.title,
                body: &msg.body,
            },
            data: &msg.data,
        };
        let value = serde_json::to_value(&request).expect("serialize");
        assert!(value.get("data").is_none());
        assert_eq!(value["notification"]["title"], "t");
    }
}
