//! Envelope and Message Types
//!
//! Defines the `{type, data}` envelope and the typed payloads carried by it.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{ProtocolError, ProtocolResult};

/// Type key of the client's authentication request
pub const AUTHENTICATE_TYPE: &str = "authenticate";

/// Default type key of the server's authentication response
pub const DEFAULT_AUTH_MESSAGE_TYPE: &str = "auth";

/// Default type key of server-pushed notifications
pub const DEFAULT_NOTIFICATION_MESSAGE_TYPE: &str = "notification";

/// The two-field wire envelope used in both directions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Discriminator selecting the payload schema
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    /// Create an envelope from an already-built JSON payload
    pub fn new(kind: impl Into<String>, data: Value) -> Self {
        Self {
            kind: kind.into(),
            data,
        }
    }

    /// Create an envelope by serializing a typed payload
    pub fn with_payload<T: Serialize>(kind: impl Into<String>, payload: &T) -> ProtocolResult<Self> {
        let data = serde_json::to_value(payload).map_err(ProtocolError::Serialization)?;
        Ok(Self::new(kind, data))
    }

    /// Deserialize the payload into `T`
    pub fn payload<T: DeserializeOwned>(&self) -> ProtocolResult<T> {
        T::deserialize(&self.data).map_err(|source| ProtocolError::InvalidPayload {
            kind: self.kind.clone(),
            source,
        })
    }
}

/// Payload of the client's `authenticate` message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthenticateRequest {
    pub token: String,
}

impl AuthenticateRequest {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    /// Wrap the request in its envelope
    pub fn into_envelope(self) -> ProtocolResult<Envelope> {
        Envelope::with_payload(AUTHENTICATE_TYPE, &self)
    }
}

/// Payload of the server's authentication response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    /// Whether the token was accepted
    pub result: bool,
    /// Account the token belongs to (empty on failure)
    #[serde(default)]
    pub account_id: String,
    /// Session expiry in unix seconds (0 on failure)
    #[serde(default, deserialize_with = "unix_seconds")]
    pub expires: i64,
}

/// Accept any JSON number as unix seconds, flooring fractions
fn unix_seconds<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let seconds = f64::deserialize(deserializer)?;
    if !seconds.is_finite() {
        return Err(serde::de::Error::custom("expires is not a finite number"));
    }
    Ok(seconds.floor() as i64)
}

impl AuthResponse {
    /// True when the response carries everything an authenticated session needs
    pub fn is_complete(&self) -> bool {
        !self.account_id.is_empty() && self.expires > 0
    }
}

/// Payload of a server-pushed notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Current unread count
    pub count: u64,
    /// Server timestamp, when provided
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

/// Type keys that select the built-in payload schemas
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolConfig {
    /// Type key of authentication responses
    pub auth_message_type: String,
    /// Type key of notifications
    pub notification_message_type: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            auth_message_type: DEFAULT_AUTH_MESSAGE_TYPE.to_string(),
            notification_message_type: DEFAULT_NOTIFICATION_MESSAGE_TYPE.to_string(),
        }
    }
}

impl ProtocolConfig {
    /// Interpret a decoded envelope according to the configured type keys
    pub fn classify(&self, envelope: &Envelope) -> ProtocolResult<Inbound> {
        if envelope.kind == self.auth_message_type {
            envelope.payload().map(Inbound::Auth)
        } else if envelope.kind == self.notification_message_type {
            envelope.payload().map(Inbound::Notification)
        } else {
            Ok(Inbound::Custom(envelope.clone()))
        }
    }
}

/// A server message after classification
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Auth(AuthResponse),
    Notification(Notification),
    /// Server-defined type without a built-in schema
    Custom(Envelope),
}

/// Decode a text frame into an envelope
pub fn decode(text: &str) -> ProtocolResult<Envelope> {
    serde_json::from_str(text).map_err(ProtocolError::MalformedEnvelope)
}

/// Encode any serializable payload as a text frame
pub fn encode<T: Serialize + ?Sized>(payload: &T) -> ProtocolResult<String> {
    serde_json::to_string(payload).map_err(ProtocolError::Serialization)
}
