//! Event dispatch and response accumulation for task webhooks.
//!
//! A [`Dispatcher`] holds developer-registered listeners. Each inbound
//! webhook becomes an [`Envelope`]; matching listeners receive a [`Bot`]
//! handle and layer partial updates onto one outgoing JSON document, which
//! the dispatcher turns into a [`Reply`].
//!
//! ```rust,ignore
//! use taskbot_core::{Bot, Dispatcher, HandlerResult};
//! use serde_json::json;
//!
//! async fn memorize(bot: Bot) -> HandlerResult {
//!     bot.webhook.set_trigger_time("1day");
//!     bot.webhook.respond(json!({"webhook": {"status": "success"}}));
//!     Ok(())
//! }
//!
//! let mut dispatcher = Dispatcher::new();
//! dispatcher.on_command("memorize", memorize);
//!
//! let reply = dispatcher.dispatch(payload).await;
//! ```

pub mod bot;
pub mod config;
pub mod dispatcher;
pub mod envelope;
pub mod error;
pub mod error_boundary;
mod helpers;
pub mod json_path;
pub mod listener;
pub mod trigger;

pub use bot::Bot;
pub use config::{BotConfig, ServerConfig, TaskbotConfig, WebhookConfig};
pub use dispatcher::{DispatchConfig, DispatchOutcome, DispatchPhase, Dispatcher};
pub use envelope::{Envelope, Reply, ResponseState, API_VERSION};
pub use error::{CoreError, Result};
pub use error_boundary::{DefaultErrorHandler, ErrorHandler, HandlerError, GENERIC_FAILURE_MESSAGE};
pub use listener::{Handler, HandlerResult, Listener, Registry};
pub use trigger::{SearchTerm, TriggerCondition};
