//! Network operations the protocol needs: register, fetch the inbox, post a
//! message, post an acknowledgment.
//!
//! Each call is a single request with no retry. Failures come back as
//! values; nothing here panics or propagates a network error upward.

pub mod http;

use async_trait::async_trait;
use tether_core::{ClientRegistration, Message, OutboundMessage, TransportError};

pub use http::HttpTransport;

/// Result of announcing this agent to the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Accepted,
    /// The server already knows this client id (HTTP 409).
    AlreadyRegistered,
    Rejected(TransportError),
}

impl RegistrationOutcome {
    /// Both acceptance and a conflict let the agent proceed.
    pub fn is_registered(&self) -> bool {
        matches!(
            self,
            RegistrationOutcome::Accepted | RegistrationOutcome::AlreadyRegistered
        )
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn register(&self, registration: &ClientRegistration) -> RegistrationOutcome;

    /// Pending messages for `client_id`. Any failure reads as an empty inbox.
    async fn fetch_inbox(&self, client_id: &str) -> Vec<Message>;

    async fn post_message(&self, message: &OutboundMessage) -> Result<(), TransportError>;

    async fn post_ack(&self, message_id: &str) -> Result<(), TransportError>;
}
