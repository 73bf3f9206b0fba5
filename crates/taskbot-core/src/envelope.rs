//! Webhook envelope: the inbound payload paired with the outgoing response.
//!
//! An [`Envelope`] is created once per inbound webhook and handed (as cheap
//! clones) to every listener that fires for it. All listeners read and write
//! the same outgoing JSON document.
//!
//! # Concurrency
//!
//! Each `get`/`set` takes a short lock and releases it before returning; the
//! lock is never held across an `.await`. A single call is therefore atomic,
//! but a read followed by a write inside a handler is not: another
//! multi-fire handler may write between them. Writes to different keys
//! compose through shallow merging. Writes to the same key race and the last
//! one to run wins. Enable conflict warnings on the dispatcher to have such
//! overwrites logged: a replacing write warns when another listener wrote
//! the same path or anything below it. Adding a new key under an object
//! another listener wrote is not a conflict.

use crate::json_path::{get_path, is_mergeable, set_path, shallow_merge};
use http::StatusCode;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Version stamped on every outgoing response.
pub const API_VERSION: &str = "1";

/// Reserved root for per-task stored data.
pub const TASK_DATA_ROOT: &str = "task.stored_data";

/// Reserved root for bot-wide stored data.
pub const MAILBOT_DATA_ROOT: &str = "mailbot.stored_data";

/// The document sent back to the upstream service for one webhook.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Value,
}

impl Reply {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    pub fn ok(body: Value) -> Self {
        Self::new(StatusCode::OK, body)
    }
}

/// Whether the outgoing response has been finalized.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseState {
    /// Handlers may still add to the response.
    Pending,
    /// The response was finalized; this is exactly what gets sent.
    Responded(Reply),
}

struct EnvelopeState {
    response: Value,
    status: StatusCode,
    state: ResponseState,
    /// Stored-data roots already seeded from the request.
    seeded: HashSet<String>,
    /// Last listener to write each path, kept only for conflict warnings.
    writers: HashMap<String, Arc<str>>,
    warn_on_conflicts: bool,
}

/// Shared request/response state for one webhook invocation.
#[derive(Clone)]
pub struct Envelope {
    request: Arc<Value>,
    version: Arc<str>,
    inner: Arc<Mutex<EnvelopeState>>,
    /// Name of the listener this handle was given to.
    writer: Option<Arc<str>>,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Envelope")
            .field("event", &self.event())
            .field("writer", &self.writer)
            .finish_non_exhaustive()
    }
}

impl Envelope {
    /// Create an envelope for an inbound payload using [`API_VERSION`].
    pub fn new(request: Value) -> Self {
        Self::with_version(request, API_VERSION)
    }

    /// Create an envelope stamping a custom API version.
    pub fn with_version(request: Value, version: &str) -> Self {
        Self {
            request: Arc::new(request),
            version: Arc::from(version),
            inner: Arc::new(Mutex::new(EnvelopeState {
                response: json!({ "version": version }),
                status: StatusCode::OK,
                state: ResponseState::Pending,
                seeded: HashSet::new(),
                writers: HashMap::new(),
                warn_on_conflicts: false,
            })),
            writer: None,
        }
    }

    /// Log when one listener replaces a value another listener wrote.
    pub fn with_conflict_warnings(self, enabled: bool) -> Self {
        self.inner.lock().warn_on_conflicts = enabled;
        self
    }

    /// A handle that attributes writes to the named listener.
    pub(crate) fn for_listener(&self, name: Arc<str>) -> Self {
        Self {
            writer: Some(name),
            ..self.clone()
        }
    }

    /// The inbound payload.
    pub fn request(&self) -> &Value {
        &self.request
    }

    /// The `event` field of the inbound payload, or `""` when absent.
    pub fn event(&self) -> &str {
        self.request
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Snapshot of the outgoing document as it currently stands.
    pub fn response(&self) -> Value {
        self.inner.lock().response.clone()
    }

    pub fn status(&self) -> StatusCode {
        self.inner.lock().status
    }

    /// Set the HTTP status used when the response is sent.
    pub fn set_status(&self, status: StatusCode) {
        self.inner.lock().status = status;
    }

    /// Read a value, preferring what handlers have written over the request.
    ///
    /// When both the outgoing and the incoming values are objects, the result
    /// is their shallow merge with outgoing keys winning. Otherwise a written
    /// value wins whenever the path was written at all, including falsy
    /// values such as `0`, `""`, `false` or `null`.
    pub fn get(&self, path: &str) -> Option<Value> {
        let state = self.inner.lock();
        resolve(&self.request, &state.response, path)
    }

    /// [`Envelope::get`] with a fallback for missing paths.
    pub fn get_or(&self, path: &str, default: impl Into<Value>) -> Value {
        self.get(path).unwrap_or_else(|| default.into())
    }

    /// Write a value, shallow-merging it into an existing object.
    pub fn set(&self, path: &str, value: impl Into<Value>) {
        self.write(path, value.into(), true);
    }

    /// Write a value, discarding whatever was at `path`.
    pub fn replace(&self, path: &str, value: impl Into<Value>) {
        self.write(path, value.into(), false);
    }

    /// Write `value` at `path` on the outgoing document.
    ///
    /// With `merge` set and both the current value (as seen by `get`) and
    /// `value` being objects, the result is `{...current, ...value}`. In
    /// every other case the value at `path` is replaced. Arrays are never
    /// concatenated.
    pub fn write(&self, path: &str, value: Value, merge: bool) {
        let mut state = self.inner.lock();
        self.write_locked(&mut state, path, value, merge);
    }

    fn write_locked(&self, state: &mut EnvelopeState, path: &str, value: Value, merge: bool) {
        if matches!(state.state, ResponseState::Responded(_)) {
            debug!(path, "Write after response was sent has no effect on the reply");
        }

        let merged = if merge {
            match resolve(&self.request, &state.response, path) {
                Some(current) if is_mergeable(&current) && is_mergeable(&value) => {
                    Some(shallow_merge(&current, &value))
                }
                _ => None,
            }
        } else {
            None
        };

        let replaced = merged.is_none();
        self.track_writer(state, path, replaced);
        set_path(&mut state.response, path, merged.unwrap_or(value));
    }

    fn track_writer(&self, state: &mut EnvelopeState, path: &str, replaced: bool) {
        let Some(writer) = &self.writer else {
            return;
        };

        if replaced {
            if state.warn_on_conflicts {
                // A replacing write destroys the value at `path` and everything below it.
                let clobbered = state
                    .writers
                    .iter()
                    .find(|(written, previous)| *previous != writer && is_within(written, path));
                if let Some((written, previous)) = clobbered {
                    warn!(
                        path,
                        overwritten = %written,
                        previous = %previous,
                        listener = %writer,
                        "Listener overwrote a value written by another listener"
                    );
                }
            }
            state.writers.retain(|written, _| !is_within(written, path));
        }

        state.writers.insert(path.to_string(), writer.clone());
    }

    /// Read per-task stored data. An empty key returns the whole object.
    pub fn get_task_data(&self, key: &str) -> Option<Value> {
        self.get(&join_path(TASK_DATA_ROOT, key))
    }

    /// Merge `data` into the task's stored data.
    pub fn set_task_data(&self, data: impl Into<Value>) {
        self.set_stored_data(TASK_DATA_ROOT, data.into());
    }

    /// Read bot-wide stored data. An empty key returns the whole object.
    pub fn get_mailbot_data(&self, key: &str) -> Option<Value> {
        self.get(&join_path(MAILBOT_DATA_ROOT, key))
    }

    /// Merge `data` into the bot's stored data.
    pub fn set_mailbot_data(&self, data: impl Into<Value>) {
        self.set_stored_data(MAILBOT_DATA_ROOT, data.into());
    }

    /// The first write under a stored-data root copies the incoming object
    /// forward so partial writes merge against the original state. This
    /// happens at most once per root.
    fn set_stored_data(&self, root: &str, data: Value) {
        let mut state = self.inner.lock();

        if state.seeded.insert(root.to_string()) {
            if let Some(original) = resolve(&self.request, &state.response, root) {
                set_path(&mut state.response, root, original);
            }
        }

        self.write_locked(&mut state, root, data, true);
    }

    /// Merge `partial` into the outgoing document and finalize it.
    ///
    /// Only the first call has any effect; later calls are logged and
    /// ignored so a webhook is never answered twice.
    pub fn respond(&self, partial: impl Into<Value>) {
        let partial = partial.into();
        let mut state = self.inner.lock();

        if matches!(state.state, ResponseState::Responded(_)) {
            warn!(event = %self.event(), "Response already sent, ignoring repeated respond()");
            return;
        }

        match &partial {
            Value::Object(_) => state.response = shallow_merge(&state.response, &partial),
            Value::Null => {}
            other => warn!(value = %other, "respond() expects an object, ignoring payload"),
        }

        let reply = Reply::new(state.status, state.response.clone());
        state.state = ResponseState::Responded(reply);
        debug!(event = %self.event(), "Response finalized");
    }

    /// Finalize with whatever has accumulated, unless already finalized.
    pub(crate) fn finish(&self) -> Reply {
        let mut state = self.inner.lock();
        match &state.state {
            ResponseState::Responded(reply) => reply.clone(),
            ResponseState::Pending => {
                let reply = Reply::new(state.status, state.response.clone());
                state.state = ResponseState::Responded(reply.clone());
                reply
            }
        }
    }

    pub fn response_state(&self) -> ResponseState {
        self.inner.lock().state.clone()
    }

    pub fn is_responded(&self) -> bool {
        matches!(self.inner.lock().state, ResponseState::Responded(_))
    }

    /// True while nothing beyond `{ version }` has been written.
    pub fn is_unhandled(&self) -> bool {
        self.inner.lock().response == json!({ "version": &*self.version })
    }
}

/// Resolve `path` against pending output first, then the original request.
fn resolve(request: &Value, response: &Value, path: &str) -> Option<Value> {
    match (get_path(response, path), get_path(request, path)) {
        (Some(pending), Some(original)) if is_mergeable(pending) && is_mergeable(original) => {
            Some(shallow_merge(original, pending))
        }
        (Some(pending), _) => Some(pending.clone()),
        (None, Some(original)) => Some(original.clone()),
        (None, None) => None,
    }
}

/// True when `path` is `root` itself or lies below it.
fn is_within(path: &str, root: &str) -> bool {
    root.is_empty()
        || path == root
        || path
            .strip_prefix(root)
            .is_some_and(|rest| rest.starts_with('.'))
}

fn join_path(root: &str, key: &str) -> String {
    if key.is_empty() {
        root.to_string()
    } else {
        format!("{root}.{key}")
    }
}
