//! Trigger conditions deciding whether a listener applies to a webhook.

use crate::error::{CoreError, Result};
use crate::json_path::get_path;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

pub const TASK_CREATED: &str = "task.created";
pub const TASK_TRIGGERED: &str = "task.triggered";
pub const TASK_VIEWED: &str = "task.viewed";
pub const TASK_ACTION_RECEIVED: &str = "task.action_received";

/// Predicate over the raw inbound payload.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

/// Condition matched against each inbound webhook.
#[derive(Clone)]
pub enum TriggerCondition {
    /// Exact equality with the payload's `event`.
    Literal(String),
    /// Regular expression tested against the payload's `event`.
    Pattern(Regex),
    /// Arbitrary test over the whole payload.
    Predicate(Predicate),
}

impl TriggerCondition {
    /// Compile a regex condition. An invalid pattern is rejected here rather
    /// than at dispatch time.
    pub fn pattern(pattern: &str) -> Result<Self> {
        Regex::new(pattern)
            .map(Self::Pattern)
            .map_err(|source| CoreError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    /// Check the condition against an inbound payload.
    pub fn matches(&self, request: &Value) -> bool {
        match self {
            Self::Literal(name) => event_name(request) == name,
            Self::Pattern(regex) => regex.is_match(event_name(request)),
            Self::Predicate(predicate) => predicate(request),
        }
    }
}

impl fmt::Debug for TriggerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(name) => f.debug_tuple("Literal").field(name).finish(),
            Self::Pattern(regex) => f.debug_tuple("Pattern").field(&regex.as_str()).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl fmt::Display for TriggerCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(name) => f.write_str(name),
            Self::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
            Self::Predicate(_) => f.write_str("<predicate>"),
        }
    }
}

impl From<&str> for TriggerCondition {
    fn from(name: &str) -> Self {
        Self::Literal(name.to_string())
    }
}

impl From<String> for TriggerCondition {
    fn from(name: String) -> Self {
        Self::Literal(name)
    }
}

impl From<Regex> for TriggerCondition {
    fn from(regex: Regex) -> Self {
        Self::Pattern(regex)
    }
}

/// Second-stage matcher for scoped triggers such as commands and actions.
#[derive(Debug, Clone)]
pub enum SearchTerm {
    Exact(String),
    Pattern(Regex),
}

impl SearchTerm {
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            Self::Exact(term) => candidate == term,
            Self::Pattern(regex) => regex.is_match(candidate),
        }
    }
}

impl fmt::Display for SearchTerm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(term) => f.write_str(term),
            Self::Pattern(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

impl From<&str> for SearchTerm {
    fn from(term: &str) -> Self {
        Self::Exact(term.to_string())
    }
}

impl From<String> for SearchTerm {
    fn from(term: String) -> Self {
        Self::Exact(term)
    }
}

impl From<Regex> for SearchTerm {
    fn from(regex: Regex) -> Self {
        Self::Pattern(regex)
    }
}

/// The payload's `event` field, or `""` when absent.
pub fn event_name(request: &Value) -> &str {
    request.get("event").and_then(Value::as_str).unwrap_or_default()
}

/// Strip the `@domain` suffix from a routing address.
///
/// `"memorize@x.domain"` becomes `"memorize"`; an address without `@` is
/// returned unchanged.
pub fn command_name(address: &str) -> &str {
    address.split('@').next().unwrap_or(address)
}

/// `task.created` whose command matches `term`.
pub fn command(term: impl Into<SearchTerm>) -> TriggerCondition {
    scoped(TASK_CREATED.to_string(), "task.command", true, term.into())
}

/// `task.triggered` whose command matches `term`.
pub fn triggered(term: impl Into<SearchTerm>) -> TriggerCondition {
    scoped(TASK_TRIGGERED.to_string(), "task.command", true, term.into())
}

/// `task.viewed` whose command matches `term`.
pub fn task_viewed(term: impl Into<SearchTerm>) -> TriggerCondition {
    scoped(TASK_VIEWED.to_string(), "task.command", true, term.into())
}

/// `task.action_received` whose `action.format` matches `term`.
pub fn action(term: impl Into<SearchTerm>) -> TriggerCondition {
    scoped(TASK_ACTION_RECEIVED.to_string(), "action.format", true, term.into())
}

/// `<namespace>.event_received` whose `payload.type` matches `term`.
pub fn event_type(namespace: &str, term: impl Into<SearchTerm>) -> TriggerCondition {
    scoped(format!("{namespace}.event_received"), "payload.type", false, term.into())
}

fn scoped(event: String, field: &'static str, strip_domain: bool, term: SearchTerm) -> TriggerCondition {
    TriggerCondition::predicate(move |request| {
        if event_name(request) != event {
            return false;
        }

        get_path(request, field)
            .and_then(Value::as_str)
            .map(|value| {
                let value = if strip_domain { command_name(value) } else { value };
                term.matches(value)
            })
            .unwrap_or(false)
    })
}
