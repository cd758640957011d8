//! Notification Client
//!
//! Keeps one WebSocket connection to the notification service alive,
//! authenticates it with the stored token and fans server messages out to
//! subscribers.
//!
//! ## Usage
//!
//! ```ignore
//! use console_notify::client::{callback, ClientConfig, ConnectionManager, EventKind, Event};
//!
//! let manager = ConnectionManager::websocket(ClientConfig::new("wss://console.example/ws"), tokens);
//! manager.on(EventKind::Notification, callback(|event| {
//!     if let Event::Notification(n) = event {
//!         println!("{} unread", n.count);
//!     }
//! }));
//! manager.connect();
//! ```

mod error;
mod events;
mod manager;
mod registry;
mod state;
mod transport;

pub use error::{ClientError, TransportError};
pub use events::{
    CloseInfo, Event, EventKind, AUTH_TIMEOUT_EVENT, CLOSE_EVENT, ERROR_EVENT, MESSAGE_EVENT,
    OPEN_EVENT,
};
pub use manager::{
    ClientConfig, ConnectionManager, TimerPolicy, DEFAULT_AUTH_TIMEOUT, DEFAULT_RECONNECT_DELAY,
};
pub use registry::{callback, Callback, SubscriberRegistry};
pub use state::{ConnectionStatus, SessionState};
pub use transport::{Connector, Transport, WsConnector, WsTransport};
