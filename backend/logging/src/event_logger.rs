//! Protocol Event Logger
//!
//! One structured record per protocol transition, emitted under the
//! `protocol_events` target so it can be filtered or shipped separately.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::redact::redact_sensitive_data;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    RegistrationAttempt {
        attempt: u32,
    },
    RegistrationFailed {
        attempt: u32,
        reason: String,
    },
    Registered {
        attempts: u32,
        already_known: bool,
    },
    MessageRejected {
        message_id: String,
        reason: String,
    },
    MessageSkipped {
        message_id: String,
        subject: String,
    },
    BatchAborted {
        message_id: String,
        subject: String,
    },
    NoMatchingOperation {
        message_id: String,
        selector: Option<String>,
    },
    ReplyPosted {
        instruction_id: String,
    },
    ReplyFailed {
        instruction_id: String,
        reason: String,
    },
    Acknowledged {
        message_id: String,
    },
    AckFailed {
        message_id: String,
        reason: String,
    },
}

impl ProtocolEvent {
    fn redact(&mut self) {
        match self {
            ProtocolEvent::RegistrationFailed { reason, .. }
            | ProtocolEvent::MessageRejected { reason, .. }
            | ProtocolEvent::ReplyFailed { reason, .. }
            | ProtocolEvent::AckFailed { reason, .. } => {
                *reason = redact_sensitive_data(reason);
            }
            ProtocolEvent::NoMatchingOperation {
                selector: Some(selector),
                ..
            } => {
                *selector = redact_sensitive_data(selector);
            }
            _ => {}
        }
    }
}

#[derive(Debug, Serialize)]
pub struct EventLogEntry {
    pub client_id: String,
    pub timestamp: DateTime<Utc>,
    pub event: ProtocolEvent,
}

impl EventLogEntry {
    pub fn new(client_id: &str, mut event: ProtocolEvent) -> Self {
        event.redact();
        Self {
            client_id: client_id.into(),
            timestamp: Utc::now(),
            event,
        }
    }
}

pub struct EventLogger;

impl EventLogger {
    /// Logs a protocol transition, redacting any free-text fields first.
    pub fn log_event(client_id: &str, event: ProtocolEvent) {
        let entry = EventLogEntry::new(client_id, event);
        let record = serde_json::to_string(&entry).unwrap_or_else(|_| format!("{entry:?}"));
        info!(target: "protocol_events", event = %record, "Protocol event");
    }
}
