use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use super::GENERIC_ERROR_MSG;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum EventType {
    Progress,
    Complete,
    Error,
}

impl EventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::Progress => "progress",
            EventType::Complete => "complete",
            EventType::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, EventType::Progress)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProgressEvent {
    pub event_type: EventType,
    pub payload: Value,
}

impl ProgressEvent {
    pub fn progress(step: &str, message: &str) -> Self {
        Self {
            event_type: EventType::Progress,
            payload: json!({ "step": step, "message": message }),
        }
    }

    /// Progress event with one extra field, e.g. the table or platform being processed.
    pub fn progress_for(step: &str, message: &str, key: &str, value: &str) -> Self {
        let mut event = Self::progress(step, message);
        if let Value::Object(fields) = &mut event.payload {
            fields.insert(String::from(key), Value::from(value));
        }

        event
    }

    pub fn complete(message: &str) -> Self {
        Self {
            event_type: EventType::Complete,
            payload: json!({ "message": message }),
        }
    }

    pub fn error(error: &str) -> Self {
        Self {
            event_type: EventType::Error,
            payload: json!({ "error": error }),
        }
    }

    pub fn step(&self) -> Option<&str> {
        self.payload.get("step").and_then(Value::as_str)
    }
}

impl fmt::Display for ProgressEvent {
    /// Server-sent event framing: `event: <type>\ndata: <json>\n\n`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "event: {}\ndata: {}\n\n",
            self.event_type.as_str(),
            self.payload
        )
    }
}

/// Sending half of a run's event stream. Delivery is best-effort: once the client goes away,
/// events are dropped and the run carries on. The channel is closed by [`finish`], which
/// consumes it; a channel dropped without finishing emits a final error event.
///
/// [`finish`]: ProgressChannel::finish
pub struct ProgressChannel {
    sender: Option<mpsc::UnboundedSender<ProgressEvent>>,
    disconnected: AtomicBool,
}

pub fn channel() -> (ProgressChannel, mpsc::UnboundedReceiver<ProgressEvent>) {
    let (sender, receiver) = mpsc::unbounded_channel();

    let channel = ProgressChannel {
        sender: Some(sender),
        disconnected: AtomicBool::new(false),
    };

    (channel, receiver)
}

impl ProgressChannel {
    pub fn emit(&self, event: ProgressEvent) {
        let Some(sender) = &self.sender else {
            return;
        };

        if sender.send(event).is_err() && !self.disconnected.swap(true, Ordering::Relaxed) {
            log::info!("Progress stream receiver is gone; continuing without client updates");
        }
    }

    pub fn finish(mut self, event: ProgressEvent) {
        debug_assert!(event.event_type.is_terminal());
        self.emit(event);
        self.sender = None;
    }
}

impl Drop for ProgressChannel {
    fn drop(&mut self) {
        if self.sender.is_some() {
            log::error!("Progress channel dropped before the run finished");
            self.emit(ProgressEvent::error(GENERIC_ERROR_MSG));
            self.sender = None;
        }
    }
}
