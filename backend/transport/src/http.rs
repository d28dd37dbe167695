use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use serde_json::Value;
use tether_core::{
    BodyEncoding, ClientRegistration, Message, OutboundMessage, TransportError,
};
use tracing::{debug, warn};

use crate::{RegistrationOutcome, Transport};

const CLIENTS_PATH: &str = "/v1/clients";
const MESSAGES_PATH: &str = "/v1/messages";
const ACK_PATH: &str = "/v1/messages/ack";

/// Longest response body echoed into the logs.
const LOGGED_BODY_LIMIT: usize = 512;

#[derive(Serialize)]
struct AckRequest<'a> {
    id: &'a str,
}

/// [`Transport`] over the coordinating server's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    base_url: String,
    client: Client,
    encoding: BodyEncoding,
}

impl HttpTransport {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        encoding: BodyEncoding,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Network(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
            encoding,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> RequestBuilder {
        let request = self.client.post(self.url(path));
        match self.encoding {
            BodyEncoding::Json => request.json(body),
            BodyEncoding::Form => request.form(body),
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, TransportError> {
        request
            .send()
            .await
            .map_err(|e| TransportError::Network(e.to_string()))
    }

    /// Map any non-200 answer to [`TransportError::Status`], logging its body.
    async fn expect_ok(response: Response, what: &str) -> Result<Response, TransportError> {
        let status = response.status();
        if status == StatusCode::OK {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        debug!(
            status = status.as_u16(),
            body = %truncate(&body, LOGGED_BODY_LIMIT),
            "[Transport] {} answered with a failure status",
            what
        );
        Err(TransportError::Status(status.as_u16()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn register(&self, registration: &ClientRegistration) -> RegistrationOutcome {
        let response = match self.send(self.post(CLIENTS_PATH, registration)).await {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, remote = %self.base_url, "[Transport] Registration request failed");
                return RegistrationOutcome::Rejected(e);
            }
        };

        if response.status() == StatusCode::CONFLICT {
            return RegistrationOutcome::AlreadyRegistered;
        }
        match Self::expect_ok(response, "registration").await {
            Ok(_) => RegistrationOutcome::Accepted,
            Err(e) => RegistrationOutcome::Rejected(e),
        }
    }

    async fn fetch_inbox(&self, client_id: &str) -> Vec<Message> {
        let request = self
            .client
            .get(self.url(MESSAGES_PATH))
            .query(&[("clientId", client_id), ("status", "SENT")]);

        let response = match self.send(request).await {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "[Transport] Unable to reach the remote to read the inbox");
                return Vec::new();
            }
        };
        let response = match Self::expect_ok(response, "inbox fetch").await {
            Ok(r) => r,
            Err(_) => return Vec::new(),
        };

        let raw: Vec<Value> = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "[Transport] Inbox body is not a JSON array");
                return Vec::new();
            }
        };

        raw.into_iter()
            .filter_map(|value| match serde_json::from_value::<Message>(value) {
                Ok(msg) => Some(msg),
                Err(e) => {
                    warn!(error = %e, "[Transport] Skipping unparseable inbox entry");
                    None
                }
            })
            .collect()
    }

    async fn post_message(&self, message: &OutboundMessage) -> Result<(), TransportError> {
        let response = self.send(self.post(MESSAGES_PATH, message)).await?;
        Self::expect_ok(response, "message post").await.map(|_| ())
    }

    async fn post_ack(&self, message_id: &str) -> Result<(), TransportError> {
        let response = self
            .send(self.post(ACK_PATH, &AckRequest { id: message_id }))
            .await?;
        Self::expect_ok(response, "acknowledgment").await.map(|_| ())
    }
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
