//! Inbound webhook handling
//!
//! Receives webhooks over HTTP, verifies them, and hands the parsed payload
//! to the dispatcher. Whatever the dispatcher replies is sent back verbatim.

use crate::{signature::WebhookVerifier, WebhookError};
use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use taskbot_core::{Dispatcher, Reply, API_VERSION};
use tracing::{debug, info, warn};

/// Shared state for webhook routes
pub struct InboundWebhookState {
    dispatcher: Arc<Dispatcher>,
    verifier: Option<WebhookVerifier>,
}

impl InboundWebhookState {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self {
            dispatcher,
            verifier: None,
        }
    }

    /// Require a valid signature on every request.
    pub fn with_verifier(mut self, verifier: WebhookVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), WebhookError> {
        let Some(verifier) = &self.verifier else {
            return Ok(());
        };

        let header = verifier.header_name();
        let signature = headers
            .get(header)
            .ok_or_else(|| WebhookError::MissingSignature(header.to_string()))?
            .to_str()
            .map_err(|_| {
                WebhookError::SignatureVerificationFailed("Invalid signature header".to_string())
            })?;

        verifier.verify(body, signature)
    }
}

/// Create Axum router for inbound webhooks
pub fn create_webhook_router(state: Arc<InboundWebhookState>, path: &str) -> Router {
    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };

    Router::new()
        .route(&path, post(handle_webhook))
        .route("/health", get(health))
        .with_state(state)
}

/// Handle incoming webhook request
async fn handle_webhook(
    State(state): State<Arc<InboundWebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Err(e) = state.verify(&headers, &body) {
        warn!(error = %e, "Webhook signature verification failed");
        return e.into_response();
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(p) => p,
        Err(e) => {
            warn!(error = %e, "Failed to parse webhook payload");
            return WebhookError::InvalidPayload(e.to_string()).into_response();
        }
    };

    let event = payload
        .get("event")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    info!(event = %event, bytes = body.len(), "Received inbound webhook");

    let reply = state.dispatcher.dispatch(payload).await;
    debug!(event = %event, status = %reply.status, "Webhook dispatched");

    reply_response(reply)
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

/// Turn a dispatch reply into the HTTP response sent upstream.
pub fn reply_response(reply: Reply) -> Response {
    (reply.status, Json(reply.body)).into_response()
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            WebhookError::MissingSignature(_) | WebhookError::SignatureVerificationFailed(_) => {
                (StatusCode::UNAUTHORIZED, "Invalid signature")
            }
            WebhookError::InvalidPayload(_) => (StatusCode::BAD_REQUEST, "Invalid JSON payload"),
        };

        let body = json!({
            "version": API_VERSION,
            "webhook": { "status": "failed", "message": message },
        });
        (status, Json(body)).into_response()
    }
}
