//! Inbound webhook transport for taskbot
//!
//! This crate puts a [`taskbot_core::Dispatcher`] behind HTTP:
//! - An axum router accepting signed JSON webhooks
//! - HMAC-SHA256 signature generation and verification
//! - Conversion of a dispatch [`taskbot_core::Reply`] into an HTTP response
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use taskbot_core::Dispatcher;
//! use taskbot_webhook::{create_webhook_router, InboundWebhookState, WebhookVerifier};
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.on_command("memorize", memorize);
//!
//! let state = InboundWebhookState::new(Arc::new(dispatcher))
//!     .with_verifier(WebhookVerifier::new("secret"));
//! let app = create_webhook_router(Arc::new(state), "/webhooks");
//! ```

pub mod signature;
pub mod inbound;

pub use signature::*;
pub use inbound::*;

use thiserror::Error;

/// Webhook errors
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("Missing signature header: {0}")]
    MissingSignature(String),

    #[error("Signature verification failed: {0}")]
    SignatureVerificationFailed(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

pub type Result<T> = std::result::Result<T, WebhookError>;
