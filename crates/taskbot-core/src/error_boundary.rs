//! Per-listener error containment.
//!
//! Every listener invocation is wrapped individually. Returned errors and
//! panics are converted into a [`HandlerError`] and handed to the single
//! [`ErrorHandler`] installed on the dispatcher; nothing escapes to the
//! transport. The error handler itself is not guarded: a panic inside it
//! propagates.

use crate::bot::Bot;
use crate::listener::Listener;
use async_trait::async_trait;
use futures::FutureExt;
use http::StatusCode;
use serde_json::json;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use thiserror::Error;
use tracing::error;

/// Message sent to the upstream service when a handler fails.
pub const GENERIC_FAILURE_MESSAGE: &str = "An internal error occurred while handling this webhook";

/// A failure inside a registered handler.
#[derive(Error, Debug)]
pub enum HandlerError {
    #[error("Listener '{listener}' failed: {error:#}")]
    Failed {
        listener: String,
        error: anyhow::Error,
    },

    #[error("Listener '{listener}' panicked: {message}")]
    Panicked { listener: String, message: String },
}

impl HandlerError {
    pub fn listener(&self) -> &str {
        match self {
            Self::Failed { listener, .. } | Self::Panicked { listener, .. } => listener,
        }
    }
}

/// Receives every handler failure.
///
/// Implemented for any `Fn(HandlerError, Bot) -> impl Future<Output = ()>`.
/// A custom handler may call `bot.webhook.respond(..)` itself.
#[async_trait]
pub trait ErrorHandler: Send + Sync {
    async fn handle_error(&self, error: HandlerError, bot: Bot);
}

#[async_trait]
impl<F, Fut> ErrorHandler for F
where
    F: Fn(HandlerError, Bot) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    async fn handle_error(&self, error: HandlerError, bot: Bot) {
        (self)(error, bot).await
    }
}

/// Logs the failure, sets a 500 status and answers with a generic message.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultErrorHandler;

#[async_trait]
impl ErrorHandler for DefaultErrorHandler {
    async fn handle_error(&self, error: HandlerError, bot: Bot) {
        error!(
            listener = %error.listener(),
            event = %bot.event(),
            error = %error,
            "Webhook handler failed"
        );

        bot.webhook.set_status(StatusCode::INTERNAL_SERVER_ERROR);
        bot.webhook.respond(json!({
            "webhook": {
                "status": "failed",
                "message": GENERIC_FAILURE_MESSAGE,
            }
        }));
    }
}

/// Run one listener, routing any failure to `error_handler`.
///
/// Returns `true` when the handler completed without error.
pub(crate) async fn run_guarded(listener: &Listener, bot: Bot, error_handler: &dyn ErrorHandler) -> bool {
    let outcome = AssertUnwindSafe(listener.handler().handle(bot.clone()))
        .catch_unwind()
        .await;

    let failure = match outcome {
        Ok(Ok(())) => return true,
        Ok(Err(error)) => HandlerError::Failed {
            listener: listener.name().to_string(),
            error,
        },
        Err(panic) => HandlerError::Panicked {
            listener: listener.name().to_string(),
            message: panic_message(panic.as_ref()),
        },
    };

    error_handler.handle_error(failure, bot).await;
    false
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
