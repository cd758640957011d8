//! Protocol error types

use thiserror::Error;

/// Errors raised while decoding or interpreting a frame
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Frame is not a JSON `{type, data}` envelope
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),

    /// Envelope type is known but its payload does not match the schema
    #[error("Invalid payload for '{kind}': {source}")]
    InvalidPayload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// Server reported success without an account id or expiry
    #[error("Authentication response missing account id or expiry")]
    IncompleteAuthentication,

    /// Outbound payload could not be serialized
    #[error("Serialization error: {0}")]
    Serialization(#[source] serde_json::Error),
}

/// Result type alias for protocol operations
pub type ProtocolResult<T> = Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ProtocolError::IncompleteAuthentication;
        assert_eq!(
            err.to_string(),
            "Authentication response missing account id or expiry"
        );

        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = ProtocolError::InvalidPayload {
            kind: "notification".to_string(),
            source,
        };
        assert!(err.to_string().starts_with("Invalid payload for 'notification'"));
    }
}
