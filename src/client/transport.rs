//! Transport Abstraction
//!
//! The connection manager talks to the network through [`Connector`] and
//! [`Transport`] so the state machine can be driven by a scripted transport
//! in tests. [`WsConnector`] is the production implementation on top of
//! `tokio-tungstenite`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use super::error::TransportError;

/// An open, text-framed connection
#[async_trait]
pub trait Transport: Send {
    /// Write one text frame
    async fn send(&mut self, text: String) -> Result<(), TransportError>;

    /// Read the next text frame; `None` once the peer has closed
    async fn recv(&mut self) -> Option<Result<String, TransportError>>;

    /// Close the connection
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Close code and reason sent by the peer, if any
    fn close_frame(&self) -> Option<(u16, String)> {
        None
    }
}

/// Opens transports to an endpoint
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, TransportError>;
}

/// WebSocket connector backed by `tokio-tungstenite`
#[derive(Debug, Clone, Default)]
pub struct WsConnector;

impl WsConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, TransportError> {
        let request = endpoint
            .into_client_request()
            .map_err(|e| TransportError::InvalidEndpoint {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let (stream, response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        tracing::debug!(status = %response.status(), "WebSocket handshake complete");

        Ok(Box::new(WsTransport {
            stream,
            close_frame: None,
        }))
    }
}

/// A WebSocket connection carrying JSON text frames
pub struct WsTransport {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    close_frame: Option<(u16, String)>,
}

#[async_trait]
impl Transport for WsTransport {
    async fn send(&mut self, text: String) -> Result<(), TransportError> {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::Send(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes.to_vec()) {
                    Ok(text) => return Some(Ok(text)),
                    Err(_) => {
                        tracing::debug!(len = bytes.len(), "Ignoring non-UTF-8 binary frame");
                    }
                },
                Ok(Message::Close(frame)) => {
                    self.close_frame = frame.map(|f| (u16::from(f.code), f.reason.to_string()));
                    return None;
                }
                // Ping/pong are answered by tungstenite itself
                Ok(_) => {}
                Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                    return None;
                }
                Err(e) => return Some(Err(TransportError::Receive(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.stream.close(None).await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(TransportError::Send(e.to_string())),
        }
    }

    fn close_frame(&self) -> Option<(u16, String)> {
        self.close_frame.clone()
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted in-memory transport for driving the manager in tests.

    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    /// Test-side handle to one opened transport
    #[derive(Clone)]
    pub(crate) struct MockPeer {
        inbound: mpsc::UnboundedSender<Option<String>>,
        sent: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    impl MockPeer {
        /// Deliver a text frame to the client
        pub(crate) fn push(&self, text: impl Into<String>) {
            let _ = self.inbound.send(Some(text.into()));
        }

        /// Simulate the server closing the connection
        pub(crate) fn hang_up(&self) {
            let _ = self.inbound.send(None);
        }

        /// Frames written by the client
        pub(crate) fn sent(&self) -> Vec<String> {
            self.sent.lock().unwrap().clone()
        }

        /// Whether the client closed this transport
        pub(crate) fn is_closed(&self) -> bool {
            self.closed.load(Ordering::SeqCst)
        }
    }

    struct MockTransport {
        inbound: mpsc::UnboundedReceiver<Option<String>>,
        sent: Arc<Mutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, text: String) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push(text);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String, TransportError>> {
            match self.inbound.recv().await {
                Some(Some(text)) => Some(Ok(text)),
                Some(None) => None,
                // Test dropped every peer handle; keep the connection alive
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockState {
        endpoints: Vec<String>,
        peers: Vec<MockPeer>,
        failures_left: usize,
    }

    /// Connector that records every attempt and hands out [`MockPeer`]s
    #[derive(Default)]
    pub(crate) struct MockConnector {
        state: Mutex<MockState>,
    }

    impl MockConnector {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Make the next `count` connection attempts fail
        pub(crate) fn fail_next(&self, count: usize) {
            self.state.lock().unwrap().failures_left = count;
        }

        /// Endpoints of every connection attempt, in order
        pub(crate) fn endpoints(&self) -> Vec<String> {
            self.state.lock().unwrap().endpoints.clone()
        }

        /// Number of connection attempts
        pub(crate) fn attempts(&self) -> usize {
            self.state.lock().unwrap().endpoints.len()
        }

        /// Peer of the `index`-th successful connection
        pub(crate) fn peer(&self, index: usize) -> MockPeer {
            self.state.lock().unwrap().peers[index].clone()
        }

        /// Number of successful connections
        pub(crate) fn peer_count(&self) -> usize {
            self.state.lock().unwrap().peers.len()
        }
    }

    #[async_trait]
    impl Connector for MockConnector {
        async fn connect(&self, endpoint: &str) -> Result<Box<dyn Transport>, TransportError> {
            let mut state = self.state.lock().unwrap();
            state.endpoints.push(endpoint.to_string());

            if state.failures_left > 0 {
                state.failures_left -= 1;
                return Err(TransportError::Connect("connection refused".to_string()));
            }

            let (tx, rx) = mpsc::unbounded_channel();
            let sent = Arc::new(Mutex::new(Vec::new()));
            let closed = Arc::new(AtomicBool::new(false));

            state.peers.push(MockPeer {
                inbound: tx,
                sent: Arc::clone(&sent),
                closed: Arc::clone(&closed),
            });

            Ok(Box::new(MockTransport {
                inbound: rx,
                sent,
                closed,
            }))
        }
    }
}
