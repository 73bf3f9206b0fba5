//! Handle passed to every listener and to the error handler.

use crate::envelope::Envelope;
use std::sync::Arc;

/// What a handler sees for one webhook: the shared envelope plus the name
/// of the listener it is running as.
#[derive(Debug, Clone)]
pub struct Bot {
    /// Inbound payload and the outgoing response being built.
    pub webhook: Envelope,
    listener: Arc<str>,
    namespace: Arc<str>,
}

impl Bot {
    pub(crate) fn new(webhook: Envelope, listener: Arc<str>, namespace: Arc<str>) -> Self {
        Self {
            webhook,
            listener,
            namespace,
        }
    }

    /// Name of the listener currently running.
    pub fn listener(&self) -> &str {
        &self.listener
    }

    /// Namespace of bot-level events, e.g. `mailbot` in `mailbot.settings_viewed`.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn event(&self) -> &str {
        self.webhook.event()
    }
}
