//! WebSocket endpoint for the realtime channel.
//!
//! Each connection gets a gateway session with a bounded outbound queue.
//! The send half drains that queue (preserving per-session order); the
//! receive half decodes frames, runs the event router and answers any
//! acknowledgement ids. Handlers run to completion even if the peer
//! disconnects mid-call; side effects are idempotent by CAS and dedup.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::app::App;
use crate::gateway::router::EventRouter;
use crate::types::events::{InboundFrame, OutboundEvent};

/// Handshake query parameters.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Bearer token minted by the auth bootstrap.
    token: Option<String>,
}

/// `GET /ws` upgrade handler.
pub async fn ws_handler(
    State(app): State<Arc<App>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    // The handshake asserts identity; per-event payloads still carry the
    // ids they act on.
    let subject = match query.token.as_deref() {
        Some(token) => match app.tokens.verify(token, app.clock.as_ref()) {
            Ok(subject) => subject,
            Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
        },
        None => return StatusCode::UNAUTHORIZED.into_response(),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, app, subject))
}

async fn handle_socket(socket: WebSocket, app: Arc<App>, subject: String) {
    let (session, mut outbound) = app.gateway.register();
    info!(session = %session, subject, "Realtime session opened");

    let (mut sink, mut stream) = socket.split();
    let router = EventRouter::new(app.clone());

    // Price table greets every connection.
    app.gateway
        .emit_to(session, &OutboundEvent::CurrentPrices(app.pricing.snapshot()));

    let send_task = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            let text = frame.to_string();
            if sink.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    while let Some(message) = stream.next().await {
        let text = match message {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => continue,
        };

        let frame: InboundFrame = match serde_json::from_str(&text) {
            Ok(frame) => frame,
            Err(err) => {
                debug!(session = %session, error = %err, "Rejected malformed frame");
                continue;
            }
        };

        let ack_id = frame.ack;
        let ack_body = router.handle(session, frame.event).await;

        if let Some(ack) = ack_id {
            let reply = json!({ "ack": ack, "data": ack_body });
            // The ack rides the same ordered queue as server-initiated
            // events.
            if !app.gateway.send_raw(session, reply) {
                warn!(session = %session, "Ack dropped, session queue closed");
            }
        }
    }

    send_task.abort();
    app.gateway.unregister(session);
    info!(session = %session, "Realtime session closed");
}
