use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Subject of an operator instruction addressed to this agent.
pub const SUBJECT_INSTRUCTION: &str = "instruction";
/// Subject of the agent's reply to an instruction.
pub const SUBJECT_SHELL_OUTPUT: &str = "shell-output";

/// The verified payload of a message's `content` token.
pub type Claims = Value;

/// Delivery state of a message on the coordinating server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MessageStatus {
    #[default]
    Sent,
    Acked,
}

/// A message as stored by the coordinating server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(deserialize_with = "de_opaque_id")]
    pub id: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    pub subject: String,
    /// Signed token; untrusted until verified.
    pub content: String,
    #[serde(default)]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub status: MessageStatus,
}

impl Message {
    pub fn is_instruction(&self) -> bool {
        self.subject == SUBJECT_INSTRUCTION
    }
}

/// A message the agent posts to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub from: Option<String>,
    pub to: Option<String>,
    pub subject: String,
    pub content: String,
    pub reply_to: Option<String>,
}

impl OutboundMessage {
    /// Reply to `instruction_id`, sent back to whoever polls the server.
    pub fn reply(client_id: &str, instruction_id: &str, token: String) -> Self {
        Self {
            from: Some(client_id.to_string()),
            to: None,
            subject: SUBJECT_SHELL_OUTPUT.to_string(),
            content: token,
            reply_to: Some(instruction_id.to_string()),
        }
    }
}

/// Liveness advertised while registering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ClientStatus {
    Alive,
}

/// Body of the registration request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientRegistration {
    pub id: String,
    pub public_key: String,
    pub status: ClientStatus,
}

/// The command-carrying view of a verified instruction's claims.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Instruction {
    /// Operation selector; `None` when absent or not a string.
    pub shell: Option<String>,
}

impl Instruction {
    pub fn from_claims(claims: &Claims) -> Self {
        let shell = claims
            .get("shell")
            .and_then(Value::as_str)
            .map(str::to_string);
        Self { shell }
    }
}

/// Servers differ on whether ids are strings or integers; keep them opaque.
fn de_opaque_id<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got: {other}"
        ))),
    }
}
