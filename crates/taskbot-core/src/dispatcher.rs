//! Webhook dispatch.
//!
//! For each inbound webhook the dispatcher moves through
//! `received -> multi-fire -> single-fire -> responded | unhandled`:
//!
//! 1. Every matching multi-fire listener runs. They are joined on the
//!    current task, so they interleave at `.await` points but never run in
//!    parallel. Dispatch waits for all of them, failures included.
//! 2. If any multi-fire listener matched, the accumulated response is sent
//!    (unless a listener already called `respond`) and dispatch ends.
//! 3. Otherwise the first matching single-fire listener, in registration
//!    order, runs alone. Later matches are never invoked.
//! 4. If nothing matched, the fallback answers with an "unhandled"
//!    acknowledgement.
//!
//! There are no timeouts: a slow handler delays the reply indefinitely.

use crate::bot::Bot;
use crate::envelope::{Envelope, Reply, API_VERSION};
use crate::error::{CoreError, Result};
use crate::error_boundary::{run_guarded, DefaultErrorHandler, ErrorHandler};
use crate::listener::{Handler, HandlerResult, Listener, Registry};
use crate::trigger::{self, SearchTerm, TriggerCondition};
use futures::future::join_all;
use serde_json::{json, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Namespace used for bot-level events when none is configured.
pub const DEFAULT_NAMESPACE: &str = "mailbot";

/// Dispatcher settings.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Prefix of bot-level events such as `<namespace>.settings_viewed`.
    pub namespace: String,
    /// Value of `version` in every response.
    pub api_version: String,
    /// Log when a listener replaces a value written by a different listener.
    pub warn_on_conflicts: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            api_version: API_VERSION.to_string(),
            warn_on_conflicts: false,
        }
    }
}

impl DispatchConfig {
    /// Default settings under a different namespace.
    pub fn with_namespace(namespace: &str) -> Result<Self> {
        let config = Self {
            namespace: namespace.to_string(),
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn with_conflict_warnings(mut self, enabled: bool) -> Self {
        self.warn_on_conflicts = enabled;
        self
    }

    pub fn validate(&self) -> Result<()> {
        let namespace = self.namespace.as_str();
        if namespace.is_empty() {
            return Err(CoreError::InvalidNamespace("namespace must not be empty".to_string()));
        }
        if namespace.contains(|c: char| c == '.' || c.is_whitespace()) {
            return Err(CoreError::InvalidNamespace(format!(
                "'{namespace}' must not contain dots or whitespace"
            )));
        }
        Ok(())
    }
}

/// Where dispatch currently is for one webhook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchPhase {
    Received,
    MultiFire,
    SingleFire,
    Responded,
    Unhandled,
}

impl fmt::Display for DispatchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Received => "received",
            Self::MultiFire => "multi_fire",
            Self::SingleFire => "single_fire",
            Self::Responded => "responded",
            Self::Unhandled => "unhandled",
        };
        f.write_str(name)
    }
}

/// How a dispatch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A listener (or the error handler) called `respond`.
    Responded,
    /// Listeners ran without responding; the accumulated document was sent.
    AutoReturned,
    /// No listener matched; the fallback answered.
    Unhandled,
}

/// Routes inbound webhooks to registered listeners.
///
/// Built once at startup with `&mut self` registration calls, then shared
/// behind an `Arc` with the transport.
pub struct Dispatcher {
    registry: Registry,
    error_handler: Arc<dyn ErrorHandler>,
    config: DispatchConfig,
    namespace: Arc<str>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::build(DispatchConfig::default())
    }

    /// Create a dispatcher with the default error handler and fallback.
    ///
    /// Fails when the namespace is empty or malformed, since every
    /// bot-level trigger is derived from it.
    pub fn with_config(config: DispatchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: DispatchConfig) -> Self {
        let mut registry = Registry::new();
        registry.set_fallback(
            Listener::new(TriggerCondition::predicate(|_| true), unhandled_webhook).with_name("fallback"),
        );

        Self {
            registry,
            error_handler: Arc::new(DefaultErrorHandler),
            namespace: Arc::from(config.namespace.as_str()),
            config,
        }
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Register a prepared listener.
    pub fn listen(&mut self, listener: Listener) -> &mut Self {
        debug!(
            listener = listener.name(),
            multi_fire = listener.is_multi_fire(),
            "Registering listener"
        );
        self.registry.add(listener);
        self
    }

    /// Single-fire listener: only the first match per webhook runs, and it is
    /// expected to call `respond`.
    pub fn on(&mut self, trigger: impl Into<TriggerCondition>, handler: impl Handler + 'static) -> &mut Self {
        self.listen(Listener::new(trigger, handler))
    }

    /// Multi-fire listener: every match runs and the accumulated response is
    /// sent once all of them finish.
    pub fn on_multi(&mut self, trigger: impl Into<TriggerCondition>, handler: impl Handler + 'static) -> &mut Self {
        self.listen(Listener::new(trigger, handler).multi_fire(true))
    }

    /// `task.created` for a command, e.g. `memorize` for `memorize@x.domain`.
    pub fn on_command(&mut self, term: impl Into<SearchTerm>, handler: impl Handler + 'static) -> &mut Self {
        let term = term.into();
        let name = format!("on_command({term})");
        self.listen(Listener::new(trigger::command(term), handler).with_name(name))
    }

    /// `task.triggered` for a command.
    pub fn on_trigger(&mut self, term: impl Into<SearchTerm>, handler: impl Handler + 'static) -> &mut Self {
        let term = term.into();
        let name = format!("on_trigger({term})");
        self.listen(Listener::new(trigger::triggered(term), handler).with_name(name))
    }

    /// `task.viewed` for a command.
    pub fn on_task_viewed(&mut self, term: impl Into<SearchTerm>, handler: impl Handler + 'static) -> &mut Self {
        let term = term.into();
        let name = format!("on_task_viewed({term})");
        self.listen(Listener::new(trigger::task_viewed(term), handler).with_name(name))
    }

    /// `task.action_received` for an action.
    pub fn on_action(&mut self, term: impl Into<SearchTerm>, handler: impl Handler + 'static) -> &mut Self {
        let term = term.into();
        let name = format!("on_action({term})");
        self.listen(Listener::new(trigger::action(term), handler).with_name(name))
    }

    /// `<namespace>.event_received` for a payload type.
    pub fn on_event(&mut self, term: impl Into<SearchTerm>, handler: impl Handler + 'static) -> &mut Self {
        let term = term.into();
        let name = format!("on_event({term})");
        let condition = trigger::event_type(&self.config.namespace, term);
        self.listen(Listener::new(condition, handler).with_name(name))
    }

    /// Multi-fire on `<namespace>.settings_viewed`, so several handlers can
    /// each contribute part of the settings page.
    pub fn on_settings_viewed(&mut self, handler: impl Handler + 'static) -> &mut Self {
        let event = format!("{}.settings_viewed", self.config.namespace);
        self.on_multi(event, handler)
    }

    /// Multi-fire on `<namespace>.settings_pre_save` and
    /// `<namespace>.settings_onsubmit`.
    pub fn on_settings_submit(&mut self, handler: impl Handler + 'static) -> &mut Self {
        let pre_save = format!("{}.settings_pre_save", self.config.namespace);
        let on_submit = format!("{}.settings_onsubmit", self.config.namespace);
        let condition = TriggerCondition::predicate(move |request| {
            let event = trigger::event_name(request);
            event == pre_save || event == on_submit
        });
        self.listen(
            Listener::new(condition, handler)
                .with_name("on_settings_submit")
                .multi_fire(true),
        )
    }

    /// Replace the error handler. There is exactly one per dispatcher.
    pub fn set_error_handler(&mut self, handler: impl ErrorHandler + 'static) -> &mut Self {
        self.error_handler = Arc::new(handler);
        self
    }

    /// Replace the catch-all run when no single-fire listener matches.
    pub fn set_fallback(&mut self, handler: impl Handler + 'static) -> &mut Self {
        self.registry.set_fallback(
            Listener::new(TriggerCondition::predicate(|_| true), handler).with_name("fallback"),
        );
        self
    }

    /// Dispatch one inbound payload and return what should be sent back.
    pub async fn dispatch(&self, payload: Value) -> Reply {
        let envelope = self.envelope(payload);
        self.run(&envelope).await;
        envelope.finish()
    }

    /// Build the envelope for a payload using this dispatcher's settings.
    pub fn envelope(&self, payload: Value) -> Envelope {
        Envelope::with_version(payload, &self.config.api_version)
            .with_conflict_warnings(self.config.warn_on_conflicts)
    }

    /// Run all phases against an existing envelope.
    pub async fn run(&self, envelope: &Envelope) -> DispatchOutcome {
        let event = envelope.event().to_string();
        let request = envelope.request();
        debug!(event = %event, phase = %DispatchPhase::Received, "Dispatching webhook");

        let multi_fire: Vec<&Listener> = self.registry.matching_multi_fire(request).collect();
        if !multi_fire.is_empty() {
            debug!(
                event = %event,
                phase = %DispatchPhase::MultiFire,
                listeners = multi_fire.len(),
                "Running multi-fire listeners"
            );
            join_all(multi_fire.iter().map(|listener| self.invoke(listener, envelope))).await;

            return self.complete(envelope, &event);
        }

        if let Some(listener) = self.registry.first_single_fire(request) {
            debug!(
                event = %event,
                phase = %DispatchPhase::SingleFire,
                listener = listener.name(),
                "Running single-fire listener"
            );
            self.invoke(listener, envelope).await;

            if !envelope.is_responded() {
                warn!(
                    event = %event,
                    listener = listener.name(),
                    "Single-fire listener finished without responding, sending accumulated response"
                );
            }
            return self.complete(envelope, &event);
        }

        if let Some(fallback) = self.registry.fallback_for(request) {
            self.invoke(fallback, envelope).await;
        }
        envelope.finish();
        info!(event = %event, phase = %DispatchPhase::Unhandled, "Webhook not handled");
        DispatchOutcome::Unhandled
    }

    fn complete(&self, envelope: &Envelope, event: &str) -> DispatchOutcome {
        if envelope.is_responded() {
            info!(event = %event, phase = %DispatchPhase::Responded, "Webhook handled");
            return DispatchOutcome::Responded;
        }

        envelope.finish();
        info!(
            event = %event,
            phase = %DispatchPhase::Responded,
            auto_returned = true,
            "Webhook handled"
        );
        DispatchOutcome::AutoReturned
    }

    async fn invoke(&self, listener: &Listener, envelope: &Envelope) {
        let bot = Bot::new(
            envelope.for_listener(listener.name_handle()),
            listener.name_handle(),
            self.namespace.clone(),
        );
        debug!(listener = listener.name(), event = %bot.event(), "Invoking listener");

        run_guarded(listener, bot, self.error_handler.as_ref()).await;
    }
}

/// Default catch-all: acknowledge the webhook without doing anything.
async fn unhandled_webhook(bot: Bot) -> HandlerResult {
    let message = format!("Webhook received but not handled: {}", bot.event());
    bot.webhook.respond(json!({
        "webhook": {
            "status": "success",
            "message": message,
        }
    }));
    Ok(())
}
