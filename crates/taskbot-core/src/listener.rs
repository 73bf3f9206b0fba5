//! Listener registration and lookup.

use crate::bot::Bot;
use crate::trigger::TriggerCondition;
use async_trait::async_trait;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

/// Result returned by handlers. Any error is routed to the error handler.
pub type HandlerResult = anyhow::Result<()>;

/// A webhook handler.
///
/// Implemented for any `Fn(Bot) -> impl Future<Output = HandlerResult>`, so
/// most handlers are plain async closures.
#[async_trait]
pub trait Handler: Send + Sync {
    async fn handle(&self, bot: Bot) -> HandlerResult;
}

#[async_trait]
impl<F, Fut> Handler for F
where
    F: Fn(Bot) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    async fn handle(&self, bot: Bot) -> HandlerResult {
        (self)(bot).await
    }
}

/// A handler paired with the condition that selects it.
#[derive(Clone)]
pub struct Listener {
    name: Arc<str>,
    condition: TriggerCondition,
    handler: Arc<dyn Handler>,
    multi_fire: bool,
}

impl Listener {
    /// Create a single-fire listener named after its trigger.
    pub fn new(condition: impl Into<TriggerCondition>, handler: impl Handler + 'static) -> Self {
        let condition = condition.into();
        Self {
            name: Arc::from(condition.to_string()),
            condition,
            handler: Arc::new(handler),
            multi_fire: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Arc::from(name.into());
        self
    }

    pub fn multi_fire(mut self, multi_fire: bool) -> Self {
        self.multi_fire = multi_fire;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn name_handle(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn condition(&self) -> &TriggerCondition {
        &self.condition
    }

    pub fn is_multi_fire(&self) -> bool {
        self.multi_fire
    }

    pub fn matches(&self, request: &Value) -> bool {
        self.condition.matches(request)
    }

    pub(crate) fn handler(&self) -> &dyn Handler {
        self.handler.as_ref()
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("name", &self.name)
            .field("condition", &self.condition)
            .field("multi_fire", &self.multi_fire)
            .finish()
    }
}

/// Append-only store of listeners.
///
/// Iteration order is registration order. Listeners are never deduplicated:
/// registering the same trigger twice keeps both, and for single-fire
/// listeners only the earlier one can ever run.
#[derive(Clone, Default)]
pub struct Registry {
    single_fire: Vec<Listener>,
    multi_fire: Vec<Listener>,
    fallback: Option<Listener>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, listener: Listener) {
        if listener.is_multi_fire() {
            self.multi_fire.push(listener);
        } else {
            self.single_fire.push(listener);
        }
    }

    /// Set the catch-all consulted after every single-fire listener.
    pub fn set_fallback(&mut self, listener: Listener) {
        self.fallback = Some(listener);
    }

    /// Every multi-fire listener whose condition matches.
    pub fn matching_multi_fire<'a>(
        &'a self,
        request: &'a Value,
    ) -> impl Iterator<Item = &'a Listener> + 'a {
        self.multi_fire.iter().filter(move |l| l.matches(request))
    }

    /// The earliest registered single-fire listener whose condition matches.
    pub fn first_single_fire(&self, request: &Value) -> Option<&Listener> {
        self.single_fire.iter().find(|l| l.matches(request))
    }

    /// The fallback, if one is set and it matches.
    pub fn fallback_for(&self, request: &Value) -> Option<&Listener> {
        self.fallback.as_ref().filter(|l| l.matches(request))
    }

    pub fn single_fire(&self) -> &[Listener] {
        &self.single_fire
    }

    pub fn multi_fire(&self) -> &[Listener] {
        &self.multi_fire
    }

    pub fn len(&self) -> usize {
        self.single_fire.len() + self.multi_fire.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("single_fire", &self.single_fire)
            .field("multi_fire", &self.multi_fire)
            .field("fallback", &self.fallback.as_ref().map(Listener::name))
            .finish()
    }
}
