//! Task-level conveniences layered on the envelope's `get`/`set`.

use crate::envelope::Envelope;
use crate::trigger::command_name;
use serde_json::Value;

impl Envelope {
    /// The bare command of the task, without its `@domain` suffix.
    pub fn command(&self) -> Option<String> {
        self.get("task.command")
            .as_ref()
            .and_then(Value::as_str)
            .map(|address| command_name(address).to_string())
    }

    /// Schedule the next `task.triggered` webhook, e.g. `"1day"` or a timestamp.
    pub fn set_trigger_time(&self, when: impl Into<Value>) {
        self.set("task.trigger_time", when);
    }

    pub fn complete_task(&self) {
        self.set("task.completed", true);
    }

    pub fn discard_task(&self) {
        self.set("task.discarded", true);
    }

    /// The email the task was created from, with any pending edits applied.
    pub fn get_reference_email(&self) -> Option<Value> {
        self.get("task.reference_email")
    }

    /// Merge `partial` into the task's reference email.
    pub fn set_reference_email(&self, partial: impl Into<Value>) {
        self.set("task.reference_email", partial);
    }

    /// Queue an outgoing email.
    ///
    /// Reads the pending `send_messages` list, appends and writes it back.
    /// Two concurrent listeners appending between each other's read and
    /// write can lose a message; see the module docs on [`Envelope`].
    pub fn add_email(&self, message: impl Into<Value>) {
        let mut messages = match self.get("send_messages") {
            Some(Value::Array(messages)) => messages,
            _ => Vec::new(),
        };
        messages.push(message.into());
        self.replace("send_messages", Value::Array(messages));
    }
}
