//! Session State
//!
//! Snapshot of the manager's connection and authentication state, published
//! to observers after every change.

use crate::protocol::AuthResponse;

/// Lifecycle of the current transport
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Open,
}

/// Connection and authentication state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub connection: ConnectionStatus,
    pub is_authenticated: bool,
    /// Empty when unauthenticated
    pub account_id: String,
    /// Unix seconds; 0 when unauthenticated
    pub expires: i64,
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            connection: ConnectionStatus::Disconnected,
            is_authenticated: false,
            account_id: String::new(),
            expires: 0,
        }
    }
}

impl SessionState {
    /// Authenticated with a known account, so the endpoint can carry it
    pub fn has_session(&self) -> bool {
        self.is_authenticated && !self.account_id.is_empty()
    }

    /// Whether an `authenticate` request is due at `now` (unix seconds)
    pub fn needs_authentication(&self, now: i64) -> bool {
        !self.is_authenticated || now - self.expires > 0
    }

    /// Apply a complete, successful authentication response
    pub(crate) fn authenticate(&mut self, response: &AuthResponse) {
        self.is_authenticated = true;
        self.account_id = response.account_id.clone();
        self.expires = response.expires;
    }

    /// Forget the session
    pub(crate) fn reset(&mut self) {
        self.is_authenticated = false;
        self.account_id.clear();
        self.expires = 0;
    }
}
