//! # Console Notify
//!
//! Real-time notification client for the admin console. Keeps a single
//! WebSocket connection to the notification service, authenticates it with
//! the signed-in user's token and delivers server pushes to subscribers.
//!
//! ## Features
//!
//! - **Single connection**: one live transport, reopened automatically after a fixed delay
//! - **In-band authentication**: token sent on open, session routed by `accountId`
//! - **Typed events**: `Open`, `Close`, `Error`, `Message`, `AuthTimeout` and server message types
//! - **Unread badge**: latest unread count as a watchable value
//!
//! ## Modules
//!
//! - [`client`]: Connection manager, events and subscriber registry
//! - [`protocol`]: JSON envelope and message payloads
//! - [`token`]: Token sources
//! - [`badge`]: Unread-count subscriber
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use console_notify::client::{ClientConfig, ConnectionManager};
//! use console_notify::token::MemoryTokenStore;
//! use console_notify::badge::UnreadBadge;
//!
//! #[tokio::main]
//! async fn main() {
//!     let tokens = Arc::new(MemoryTokenStore::with_token("signed-in-user-token"));
//!     let manager = ConnectionManager::websocket(ClientConfig::new("ws://localhost:8080/ws"), tokens);
//!
//!     let mut badge = UnreadBadge::attach(&manager);
//!     manager.connect();
//!
//!     loop {
//!         let state = badge.changed().await;
//!         println!("{} unread", state.count);
//!     }
//! }
//! ```

pub mod badge;
pub mod client;
pub mod config;
pub mod protocol;
pub mod token;

// Re-export top-level types for convenience
pub use client::{
    callback, Callback, ClientConfig, ClientError, CloseInfo, ConnectionManager,
    ConnectionStatus, Event, EventKind, SessionState, TimerPolicy, TransportError,
};

pub use protocol::{AuthResponse, Envelope, Notification, ProtocolConfig, ProtocolError};

pub use token::{FileTokenStore, MemoryTokenStore, TokenError, TokenStore};

pub use badge::{BadgeState, UnreadBadge};

pub use config::{Config, ConfigError, LoggingConfig};
