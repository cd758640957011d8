//! Event Types
//!
//! Events dispatched to subscribers. Transport-level events (`Open`, `Close`,
//! `Error`), the generic `Message` event and the local `AuthTimeout` event use
//! fixed names; server messages are keyed by their own `type` string, with
//! the configured auth and notification keys mapped to typed variants.

use std::fmt;

use super::error::ClientError;
use crate::protocol::{AuthResponse, Envelope, Notification, ProtocolConfig};

/// Name under which transport-open events are registered
pub const OPEN_EVENT: &str = "open";
/// Name under which transport-close events are registered
pub const CLOSE_EVENT: &str = "close";
/// Name under which error events are registered
pub const ERROR_EVENT: &str = "error";
/// Name under which every decoded envelope is registered
pub const MESSAGE_EVENT: &str = "message";
/// Name under which authentication timeouts are registered
pub const AUTH_TIMEOUT_EVENT: &str = "auth_timeout";

/// Key of the subscriber registry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKind {
    Open,
    Close,
    Error,
    Message,
    AuthTimeout,
    /// Server message with the configured auth-response type
    AuthResult,
    /// Server message with the configured notification type
    Notification,
    /// Any other server-defined message type
    Custom(String),
}

impl EventKind {
    /// Resolve an event name the way the wire protocol names it
    ///
    /// Local names win over server type keys; the configured auth and
    /// notification keys map to their typed kinds and every other name is a
    /// custom server type.
    pub fn resolve(name: &str, protocol: &ProtocolConfig) -> Self {
        match name {
            OPEN_EVENT => EventKind::Open,
            CLOSE_EVENT => EventKind::Close,
            ERROR_EVENT => EventKind::Error,
            MESSAGE_EVENT => EventKind::Message,
            AUTH_TIMEOUT_EVENT => EventKind::AuthTimeout,
            _ if name == protocol.auth_message_type => EventKind::AuthResult,
            _ if name == protocol.notification_message_type => EventKind::Notification,
            _ => EventKind::Custom(name.to_string()),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Open => f.write_str(OPEN_EVENT),
            EventKind::Close => f.write_str(CLOSE_EVENT),
            EventKind::Error => f.write_str(ERROR_EVENT),
            EventKind::Message => f.write_str(MESSAGE_EVENT),
            EventKind::AuthTimeout => f.write_str(AUTH_TIMEOUT_EVENT),
            EventKind::AuthResult => f.write_str("auth_result"),
            EventKind::Notification => f.write_str("notification"),
            EventKind::Custom(name) => f.write_str(name),
        }
    }
}

/// Details of a closed transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    /// Close code from the peer's close frame, if one was received
    pub code: Option<u16>,
    /// Close reason from the peer's close frame
    pub reason: String,
    /// True when this client tore the transport down
    pub initiated_locally: bool,
}

impl CloseInfo {
    pub(crate) fn local() -> Self {
        Self {
            code: None,
            reason: String::new(),
            initiated_locally: true,
        }
    }

    pub(crate) fn remote(frame: Option<(u16, String)>) -> Self {
        let (code, reason) = match frame {
            Some((code, reason)) => (Some(code), reason),
            None => (None, String::new()),
        };
        Self {
            code,
            reason,
            initiated_locally: false,
        }
    }
}

/// An event delivered to subscribers
#[derive(Debug)]
pub enum Event {
    /// Transport opened
    Open,
    /// Transport closed
    Close(CloseInfo),
    /// Transport or protocol failure
    Error(ClientError),
    /// Any decoded envelope, dispatched before its typed event
    Message(Envelope),
    /// No successful authentication within the timeout
    AuthTimeout,
    /// Authentication response, successful or not
    AuthResult(AuthResponse),
    /// Notification push
    Notification(Notification),
    /// Server-defined message without a built-in schema
    Custom(Envelope),
}

impl Event {
    /// Registry key this event is dispatched under
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Open => EventKind::Open,
            Event::Close(_) => EventKind::Close,
            Event::Error(_) => EventKind::Error,
            Event::Message(_) => EventKind::Message,
            Event::AuthTimeout => EventKind::AuthTimeout,
            Event::AuthResult(_) => EventKind::AuthResult,
            Event::Notification(_) => EventKind::Notification,
            Event::Custom(envelope) => EventKind::Custom(envelope.kind.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_local_names() {
        let protocol = ProtocolConfig::default();
        assert_eq!(EventKind::resolve("open", &protocol), EventKind::Open);
        assert_eq!(EventKind::resolve("close", &protocol), EventKind::Close);
        assert_eq!(EventKind::resolve("error", &protocol), EventKind::Error);
        assert_eq!(EventKind::resolve("message", &protocol), EventKind::Message);
        assert_eq!(
            EventKind::resolve("auth_timeout", &protocol),
            EventKind::AuthTimeout
        );
    }

    #[test]
    fn test_resolve_server_types() {
        let protocol = ProtocolConfig {
            auth_message_type: "session".to_string(),
            notification_message_type: "unread".to_string(),
        };
        assert_eq!(EventKind::resolve("session", &protocol), EventKind::AuthResult);
        assert_eq!(EventKind::resolve("unread", &protocol), EventKind::Notification);
        assert_eq!(
            EventKind::resolve("notification", &protocol),
            EventKind::Custom("notification".to_string())
        );
    }

    #[test]
    fn test_custom_event_kind_uses_type() {
        let event = Event::Custom(Envelope::new("profile_updated", json!({"id": 1})));
        assert_eq!(event.kind(), EventKind::Custom("profile_updated".to_string()));
        assert_eq!(event.kind().to_string(), "profile_updated");
    }

    #[test]
    fn test_close_info_remote() {
        let info = CloseInfo::remote(Some((1001, "going away".to_string())));
        assert_eq!(info.code, Some(1001));
        assert!(!info.initiated_locally);

        let info = CloseInfo::remote(None);
        assert_eq!(info.code, None);
        assert!(info.reason.is_empty());
    }
}
