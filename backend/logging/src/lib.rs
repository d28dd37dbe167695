//! Structured logging for the tether agent.
//!
//! Handles subscriber setup (console plus optional rolling NDJSON file),
//! protocol event records, and redaction of key material and tokens.

pub mod event_logger;
pub mod logger;
pub mod redact;

pub use event_logger::{EventLogEntry, EventLogger, ProtocolEvent};
pub use logger::init_logger;
pub use redact::redact_sensitive_data;
