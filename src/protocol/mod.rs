//! Wire Protocol
//!
//! Every frame exchanged with the notification server is a JSON
//! `{ "type": ..., "data": ... }` envelope. The payload schema is keyed by
//! `type`; the type keys for authentication responses and notifications are
//! injected through [`ProtocolConfig`] rather than hard-coded.
//!
//! ## Messages
//!
//! - `authenticate` (client → server): `{ token }`
//! - auth response (server → client): `{ result, accountId, expires }`
//! - notification (server → client): `{ count, timestamp? }`
//!
//! Anything else is passed through untouched as [`Inbound::Custom`].

mod error;
mod messages;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    decode, encode, AuthResponse, AuthenticateRequest, Envelope, Inbound, Notification,
    ProtocolConfig, AUTHENTICATE_TYPE, DEFAULT_AUTH_MESSAGE_TYPE,
    DEFAULT_NOTIFICATION_MESSAGE_TYPE,
};
