//! Connection Manager
//!
//! Owns the notification socket: at most one live transport, an
//! authentication handshake carried over the socket itself, expiry checks,
//! automatic reconnects and event fan-out to subscribers.
//!
//! ## Model
//!
//! [`ConnectionManager`] is a cheap cloneable handle. All state lives in a
//! single driver task that processes commands, transport events and timer
//! expiries one at a time from one channel, so every handler runs to
//! completion without locking the session. Each transport runs in its own
//! task and reports back tagged with a generation number; frames from a
//! superseded transport are ignored.
//!
//! ## Lifecycle
//!
//! ```text
//! Disconnected -> Connecting -> Open (unauthenticated) -> Open (authenticated)
//!      ^                                                         |
//!      +------------- close, reconnect after fixed delay --------+
//! ```
//!
//! A successful authentication response immediately tears the transport down
//! and reopens it with `?accountId=<id>` so the server can route the session.
//! Do not hold on to assumptions about "the current transport" across an
//! authentication response.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::AbortHandle;
use uuid::Uuid;

use super::error::{ClientError, TransportError};
use super::events::{CloseInfo, Event, EventKind};
use super::registry::{Callback, SubscriberRegistry};
use super::state::{ConnectionStatus, SessionState};
use super::transport::{Connector, WsConnector};
use crate::protocol::{
    self, AuthResponse, AuthenticateRequest, Inbound, ProtocolConfig, ProtocolError,
};
use crate::token::TokenStore;

/// Time allowed for an authentication response
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Delay between a transport closing and the next connect attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// What happens to pending timers when the client is closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerPolicy {
    /// Timers always fire. A `close()` is followed by a reconnect once the
    /// delay elapses, and an auth-timeout check still runs after a
    /// successful authentication.
    #[default]
    FireAndForget,
    /// `close()` cancels pending timers, successful authentication cancels
    /// the auth-timeout check, and locally closed transports are not
    /// reconnected.
    Cancellable,
}

/// Configuration for the connection manager
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base WebSocket URL
    pub endpoint: String,
    /// Message type keys
    pub protocol: ProtocolConfig,
    /// Time allowed for an authentication response
    pub auth_timeout: Duration,
    /// Fixed delay before reconnecting after a close
    pub reconnect_delay: Duration,
    pub timer_policy: TimerPolicy,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "ws://localhost:8080/ws".to_string(),
            protocol: ProtocolConfig::default(),
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            timer_policy: TimerPolicy::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Default::default()
        }
    }

    /// Endpoint for the next connection
    ///
    /// Carries `accountId` once a session is established; the token is never
    /// placed in the URL.
    pub fn endpoint_for(&self, session: &SessionState) -> String {
        if !session.has_session() {
            return self.endpoint.clone();
        }

        let separator = if self.endpoint.contains('?') { '&' } else { '?' };
        format!(
            "{}{}accountId={}",
            self.endpoint,
            separator,
            urlencoding::encode(&session.account_id)
        )
    }
}

/// Requests from handles to the driver
#[derive(Debug)]
enum Command {
    Connect,
    Send(String),
    Close,
    Reconnect,
    Shutdown,
}

/// Everything the driver reacts to
#[derive(Debug)]
enum Input {
    Command(Command),
    Opened { generation: u64 },
    Frame { generation: u64, text: String },
    Failed { generation: u64, error: TransportError },
    Closed { generation: u64, info: CloseInfo },
    AuthTimeoutElapsed { timer: u64 },
    ReconnectDue { timer: u64 },
}

/// Handle to the notification connection
///
/// Clones share one connection. The driver task stops when the last clone is
/// dropped or [`shutdown`](Self::shutdown) is called.
#[derive(Clone)]
pub struct ConnectionManager {
    shared: Arc<Shared>,
}

struct Shared {
    inputs: mpsc::UnboundedSender<Input>,
    registry: Arc<SubscriberRegistry>,
    state: watch::Receiver<SessionState>,
    protocol: ProtocolConfig,
}

impl Drop for Shared {
    fn drop(&mut self) {
        let _ = self.inputs.send(Input::Command(Command::Shutdown));
    }
}

impl ConnectionManager {
    /// Create a manager and start its driver task
    ///
    /// Must be called from within a Tokio runtime. No connection is opened
    /// until [`connect`](Self::connect) is called.
    pub fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        tokens: Arc<dyn TokenStore>,
    ) -> Self {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::default());
        let registry = Arc::new(SubscriberRegistry::new());

        let protocol = config.protocol.clone();
        let driver = Driver {
            config,
            connector,
            tokens,
            registry: Arc::clone(&registry),
            state_tx,
            inputs: inputs_tx.clone(),
            session: SessionState::default(),
            socket: None,
            next_generation: 0,
            timers: Timers::default(),
        };
        tokio::spawn(driver.run(inputs_rx));

        Self {
            shared: Arc::new(Shared {
                inputs: inputs_tx,
                registry,
                state: state_rx,
                protocol,
            }),
        }
    }

    /// Create a manager that connects over WebSocket
    pub fn websocket(config: ClientConfig, tokens: Arc<dyn TokenStore>) -> Self {
        Self::new(config, Arc::new(WsConnector::new()), tokens)
    }

    /// Open the connection unless one is already open or opening
    pub fn connect(&self) {
        self.command(Command::Connect);
    }

    /// Serialize `payload` as JSON and write it to the open transport
    ///
    /// Best effort and at most once: when no transport is open the payload is
    /// dropped silently.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) {
        match protocol::encode(payload) {
            Ok(text) => self.command(Command::Send(text)),
            Err(e) => tracing::warn!(error = %e, "Dropping unserializable payload"),
        }
    }

    /// Close the transport; the session is kept
    pub fn close(&self) {
        self.command(Command::Close);
    }

    /// Tear down and reopen the transport
    ///
    /// When the token store is empty the session is cleared first, so the
    /// new connection carries no identity.
    pub fn reconnect(&self) {
        self.command(Command::Reconnect);
    }

    /// Stop the driver task and close the transport
    pub fn shutdown(&self) {
        self.command(Command::Shutdown);
    }

    /// Register `callback` for `kind`
    pub fn on(&self, kind: EventKind, callback: Callback) {
        self.shared.registry.on(kind, callback);
    }

    /// Remove every registration of `callback` for `kind`
    pub fn off(&self, kind: &EventKind, callback: &Callback) -> usize {
        self.shared.registry.off(kind, callback)
    }

    /// Register by event name: `open`, `close`, `error`, `message`,
    /// `auth_timeout`, or a server message type
    pub fn on_named(&self, name: &str, callback: Callback) {
        self.on(self.event_kind(name), callback);
    }

    pub fn off_named(&self, name: &str, callback: &Callback) -> usize {
        self.off(&self.event_kind(name), callback)
    }

    /// Resolve an event name against this manager's protocol keys
    pub fn event_kind(&self, name: &str) -> EventKind {
        EventKind::resolve(name, &self.shared.protocol)
    }

    /// Latest published state
    pub fn state(&self) -> SessionState {
        self.shared.state.borrow().clone()
    }

    /// Receiver notified on every state change
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.shared.state.clone()
    }

    pub fn is_open(&self) -> bool {
        self.shared.state.borrow().connection == ConnectionStatus::Open
    }

    pub fn registry(&self) -> &Arc<SubscriberRegistry> {
        &self.shared.registry
    }

    fn command(&self, command: Command) {
        if self.shared.inputs.send(Input::Command(command)).is_err() {
            tracing::debug!("Connection manager stopped, command ignored");
        }
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("state", &*self.shared.state.borrow())
            .finish()
    }
}

/// The live transport as seen by the driver
struct Socket {
    generation: u64,
    connection_id: Uuid,
    open: bool,
    outbound: mpsc::UnboundedSender<String>,
}

/// Timers that can still be cancelled (tracked only under
/// [`TimerPolicy::Cancellable`])
#[derive(Default)]
struct Timers {
    next_id: u64,
    auth: HashMap<u64, AbortHandle>,
    reconnect: HashMap<u64, AbortHandle>,
}

impl Timers {
    fn next(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn cancel_auth(&mut self) {
        for (_, handle) in self.auth.drain() {
            handle.abort();
        }
    }

    fn cancel_all(&mut self) {
        self.cancel_auth();
        for (_, handle) in self.reconnect.drain() {
            handle.abort();
        }
    }
}

struct Driver {
    config: ClientConfig,
    connector: Arc<dyn Connector>,
    tokens: Arc<dyn TokenStore>,
    registry: Arc<SubscriberRegistry>,
    state_tx: watch::Sender<SessionState>,
    inputs: mpsc::UnboundedSender<Input>,
    session: SessionState,
    socket: Option<Socket>,
    next_generation: u64,
    timers: Timers,
}

impl Driver {
    async fn run(mut self, mut inputs: mpsc::UnboundedReceiver<Input>) {
        tracing::debug!(endpoint = %self.config.endpoint, "Connection manager started");

        while let Some(input) = inputs.recv().await {
            match input {
                Input::Command(Command::Connect) => self.connect(),
                Input::Command(Command::Send(text)) => self.send(text),
                Input::Command(Command::Close) => self.close(),
                Input::Command(Command::Reconnect) => self.reconnect(),
                Input::Command(Command::Shutdown) => break,
                Input::Opened { generation } => self.on_open(generation),
                Input::Frame { generation, text } => self.on_frame(generation, &text),
                Input::Failed { generation, error } => self.on_error(generation, error),
                Input::Closed { generation, info } => self.on_close(generation, info),
                Input::AuthTimeoutElapsed { timer } => self.on_auth_timeout(timer),
                Input::ReconnectDue { timer } => self.on_reconnect_due(timer),
            }
        }

        self.timers.cancel_all();
        self.close_socket();
        tracing::debug!("Connection manager stopped");
    }

    // ----- operations -----

    fn connect(&mut self) {
        if let Some(socket) = &self.socket {
            tracing::debug!(
                connection_id = %socket.connection_id,
                open = socket.open,
                "Transport already active, connect ignored"
            );
            return;
        }

        let endpoint = self.config.endpoint_for(&self.session);
        self.next_generation += 1;
        let generation = self.next_generation;
        let connection_id = Uuid::new_v4();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        tracing::info!(
            connection_id = %connection_id,
            endpoint = %endpoint,
            "Connecting"
        );

        tokio::spawn(run_transport(
            generation,
            connection_id,
            endpoint,
            Arc::clone(&self.connector),
            outbound_rx,
            self.inputs.clone(),
        ));

        self.socket = Some(Socket {
            generation,
            connection_id,
            open: false,
            outbound: outbound_tx,
        });
        self.session.connection = ConnectionStatus::Connecting;
        self.publish();
    }

    fn send(&mut self, text: String) {
        match &self.socket {
            Some(socket) if socket.open => {
                // A dead transport task reports its own close
                let _ = socket.outbound.send(text);
            }
            _ => tracing::debug!("Transport not open, message dropped"),
        }
    }

    fn close(&mut self) {
        tracing::info!("Closing connection");
        if self.config.timer_policy == TimerPolicy::Cancellable {
            self.timers.cancel_all();
        }
        self.close_socket();
    }

    fn reconnect(&mut self) {
        tracing::info!("Reconnecting");
        self.close_socket();

        if self.token().is_none() {
            tracing::info!("No token available, clearing session");
            self.session.reset();
            self.publish();
        }

        self.connect();
    }

    /// Drop the local handle; the transport task closes the connection and
    /// reports `Closed`
    fn close_socket(&mut self) {
        if let Some(socket) = self.socket.take() {
            tracing::debug!(connection_id = %socket.connection_id, "Closing transport");
            self.session.connection = ConnectionStatus::Disconnected;
            self.publish();
        }
    }

    // ----- transport events -----

    fn on_open(&mut self, generation: u64) {
        let Some(socket) = self.current_socket(generation) else {
            tracing::debug!(generation, "Open from superseded transport ignored");
            return;
        };
        socket.open = true;
        tracing::info!(connection_id = %socket.connection_id, "Connection open");

        self.session.connection = ConnectionStatus::Open;
        self.publish();
        self.registry.dispatch(&Event::Open);

        self.authenticate_if_needed();
    }

    fn on_frame(&mut self, generation: u64, text: &str) {
        if self.current_socket(generation).is_none() {
            tracing::debug!(generation, "Frame from superseded transport ignored");
            return;
        }

        let envelope = match protocol::decode(text) {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping malformed frame");
                self.dispatch_error(e.into());
                return;
            }
        };

        tracing::trace!(kind = %envelope.kind, "Frame received");
        let inbound = self.config.protocol.classify(&envelope);
        self.registry.dispatch(&Event::Message(envelope));

        match inbound {
            Ok(Inbound::Auth(response)) => self.on_auth_response(response),
            Ok(Inbound::Notification(notification)) => {
                tracing::debug!(count = notification.count, "Notification received");
                self.registry.dispatch(&Event::Notification(notification));
            }
            Ok(Inbound::Custom(envelope)) => {
                self.registry.dispatch(&Event::Custom(envelope));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Dropping invalid payload");
                self.dispatch_error(e.into());
            }
        }
    }

    fn on_error(&mut self, generation: u64, error: TransportError) {
        tracing::warn!(generation, error = %error, "Transport error");
        self.dispatch_error(error.into());
    }

    fn on_close(&mut self, generation: u64, info: CloseInfo) {
        if self.current_socket(generation).is_some() {
            self.socket = None;
            self.session.connection = ConnectionStatus::Disconnected;
            self.publish();
        }

        tracing::info!(
            generation,
            code = ?info.code,
            reason = %info.reason,
            local = info.initiated_locally,
            "Connection closed"
        );

        let initiated_locally = info.initiated_locally;
        self.registry.dispatch(&Event::Close(info));

        if initiated_locally && self.config.timer_policy == TimerPolicy::Cancellable {
            tracing::debug!("Locally closed, not scheduling reconnect");
            return;
        }
        self.schedule_reconnect();
    }

    // ----- authentication -----

    fn authenticate_if_needed(&mut self) {
        let now = Utc::now().timestamp();
        if !self.session.needs_authentication(now) {
            tracing::debug!(account_id = %self.session.account_id, "Session still valid");
            return;
        }

        let Some(token) = self.token() else {
            tracing::debug!("No token available, staying unauthenticated");
            return;
        };

        let text = match AuthenticateRequest::new(token)
            .into_envelope()
            .and_then(|envelope| protocol::encode(&envelope))
        {
            Ok(text) => text,
            Err(e) => {
                self.dispatch_error(e.into());
                return;
            }
        };

        tracing::debug!("Sending authenticate request");
        self.send(text);
        self.arm_auth_timeout();
    }

    fn on_auth_response(&mut self, response: AuthResponse) {
        let accepted = response.result && response.is_complete();

        if accepted {
            self.session.authenticate(&response);
            tracing::info!(
                account_id = %response.account_id,
                expires = response.expires,
                "Authenticated"
            );
            if self.config.timer_policy == TimerPolicy::Cancellable {
                self.timers.cancel_auth();
            }
        } else {
            if response.result {
                self.dispatch_error(ProtocolError::IncompleteAuthentication.into());
            }
            tracing::warn!("Authentication rejected");
            self.session.is_authenticated = false;
            self.publish();
        }
        self.registry.dispatch(&Event::AuthResult(response));

        if accepted {
            // Reopen on the identified endpoint. State is published by the
            // close, never as authenticated on the old transport.
            self.reconnect();
        }
    }

    // ----- timers -----

    fn arm_auth_timeout(&mut self) {
        let timer = self.timers.next();
        let handle = self.spawn_timer(self.config.auth_timeout, Input::AuthTimeoutElapsed { timer });
        if self.config.timer_policy == TimerPolicy::Cancellable {
            self.timers.auth.insert(timer, handle);
        }
    }

    fn on_auth_timeout(&mut self, timer: u64) {
        if self.config.timer_policy == TimerPolicy::Cancellable
            && self.timers.auth.remove(&timer).is_none()
        {
            return;
        }

        if self.session.is_authenticated {
            tracing::trace!("Auth timeout check passed");
            return;
        }

        tracing::warn!(
            timeout_ms = self.config.auth_timeout.as_millis() as u64,
            "Authentication timed out"
        );
        self.registry.dispatch(&Event::AuthTimeout);
    }

    fn schedule_reconnect(&mut self) {
        let timer = self.timers.next();
        tracing::debug!(
            delay_ms = self.config.reconnect_delay.as_millis() as u64,
            "Scheduling reconnect"
        );
        let handle = self.spawn_timer(self.config.reconnect_delay, Input::ReconnectDue { timer });
        if self.config.timer_policy == TimerPolicy::Cancellable {
            self.timers.reconnect.insert(timer, handle);
        }
    }

    fn on_reconnect_due(&mut self, timer: u64) {
        if self.config.timer_policy == TimerPolicy::Cancellable
            && self.timers.reconnect.remove(&timer).is_none()
        {
            return;
        }
        tracing::debug!("Reconnect delay elapsed");
        self.connect();
    }

    fn spawn_timer(&self, delay: Duration, input: Input) -> AbortHandle {
        let inputs = self.inputs.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = inputs.send(input);
        })
        .abort_handle()
    }

    // ----- helpers -----

    /// Current token; an empty one counts as absent
    fn token(&self) -> Option<String> {
        self.tokens
            .token()
            .filter(|token| !token.trim().is_empty())
    }

    fn current_socket(&mut self, generation: u64) -> Option<&mut Socket> {
        self.socket
            .as_mut()
            .filter(|socket| socket.generation == generation)
    }

    fn dispatch_error(&self, error: ClientError) {
        self.registry.dispatch(&Event::Error(error));
    }

    fn publish(&self) {
        self.state_tx.send_replace(self.session.clone());
    }
}

/// Drive one transport until it closes
///
/// Reports `Opened`, every text frame, errors and exactly one `Closed` back
/// to the driver. Dropping the outbound sender closes the transport.
async fn run_transport(
    generation: u64,
    connection_id: Uuid,
    endpoint: String,
    connector: Arc<dyn Connector>,
    mut outbound: mpsc::UnboundedReceiver<String>,
    inputs: mpsc::UnboundedSender<Input>,
) {
    let connected = tokio::select! {
        result = connector.connect(&endpoint) => result,
        _ = outbound_closed(&mut outbound) => {
            tracing::debug!(connection_id = %connection_id, "Closed while connecting");
            let _ = inputs.send(Input::Closed { generation, info: CloseInfo::local() });
            return;
        }
    };

    let mut transport = match connected {
        Ok(transport) => transport,
        Err(error) => {
            tracing::warn!(connection_id = %connection_id, error = %error, "Connection failed");
            let _ = inputs.send(Input::Failed { generation, error });
            let _ = inputs.send(Input::Closed {
                generation,
                info: CloseInfo::remote(None),
            });
            return;
        }
    };

    if inputs.send(Input::Opened { generation }).is_err() {
        let _ = transport.close().await;
        return;
    }

    loop {
        tokio::select! {
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(error) = transport.send(text).await {
                        let _ = inputs.send(Input::Failed { generation, error });
                        let _ = transport.close().await;
                        let _ = inputs.send(Input::Closed {
                            generation,
                            info: CloseInfo::remote(None),
                        });
                        break;
                    }
                }
                None => {
                    if let Err(e) = transport.close().await {
                        tracing::debug!(connection_id = %connection_id, error = %e, "Close failed");
                    }
                    let _ = inputs.send(Input::Closed { generation, info: CloseInfo::local() });
                    break;
                }
            },
            incoming = transport.recv() => match incoming {
                Some(Ok(text)) => {
                    let _ = inputs.send(Input::Frame { generation, text });
                }
                Some(Err(error)) => {
                    let _ = inputs.send(Input::Failed { generation, error });
                    let _ = transport.close().await;
                    let _ = inputs.send(Input::Closed {
                        generation,
                        info: CloseInfo::remote(transport.close_frame()),
                    });
                    break;
                }
                None => {
                    let _ = inputs.send(Input::Closed {
                        generation,
                        info: CloseInfo::remote(transport.close_frame()),
                    });
                    break;
                }
            },
        }
    }

    tracing::debug!(connection_id = %connection_id, "Transport task finished");
}

/// Resolves once the driver has dropped the outbound sender
async fn outbound_closed(outbound: &mut mpsc::UnboundedReceiver<String>) {
    while outbound.recv().await.is_some() {}
}
