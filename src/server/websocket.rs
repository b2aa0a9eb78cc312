//! WebSocket server implementation
//!
//! Listens on a TCP port, upgrades requests for the echo endpoint and spawns
//! one independent task per connection. Connection tasks share nothing but the
//! read-only upgrade policy.

use std::future::Future;
use std::net::{Ipv6Addr, SocketAddr};
use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Error as WsError;
use tokio_tungstenite::{accept_hdr_async_with_config, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::handler::EchoSession;
use super::handshake::check_request;
use super::preflight::{read_request_head, write_status, Preflight};
use super::protocol::ECHO_PATH;
use super::rewind::Rewind;
use crate::config::UpgradePolicy;

/// Default port to listen on
pub const DEFAULT_PORT: u16 = 5000;

/// Default bind address (all interfaces)
pub const DEFAULT_BIND: &str = "0.0.0.0";

/// Upgraded connection, reading the buffered request head first
type EchoStream = WebSocketStream<Rewind<TcpStream>>;

/// Errors raised by the listener
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read listener address: {0}")]
    LocalAddr(#[from] std::io::Error),
}

/// Configuration for the echo server listener
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind: String,
    /// Port to listen on
    pub port: u16,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(bind: String, port: u16) -> Self {
        Self { bind, port }
    }

    /// Get the socket address to bind to. IPv6 literals are bracketed.
    pub fn socket_addr(&self) -> String {
        if self.bind.parse::<Ipv6Addr>().is_ok() {
            format!("[{}]:{}", self.bind, self.port)
        } else {
            format!("{}:{}", self.bind, self.port)
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BIND.to_string(), DEFAULT_PORT)
    }
}

/// Echo server bound to a listening socket
pub struct EchoServer {
    listener: TcpListener,
    policy: Arc<UpgradePolicy>,
}

impl EchoServer {
    /// Bind the listening socket
    pub async fn bind(config: &ServerConfig, policy: UpgradePolicy) -> Result<Self, ServerError> {
        let addr = config.socket_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        Ok(Self {
            listener,
            policy: Arc::new(policy),
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> Result<SocketAddr, ServerError> {
        Ok(self.listener.local_addr()?)
    }

    /// Serve connections until `shutdown` resolves.
    ///
    /// Only the accept loop stops; connections already being served are not
    /// drained and end with the process.
    pub async fn run_until<F>(self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        match self.local_addr() {
            Ok(addr) => info!("Echo server listening on ws://{}{}", addr, ECHO_PATH),
            Err(e) => warn!("Echo server listening on unknown address: {}", e),
        }

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let policy = Arc::clone(&self.policy);
                            tokio::spawn(handle_connection(stream, peer_addr, policy));
                        }
                        Err(e) => {
                            error!("Failed to accept connection: {}", e);
                        }
                    }
                }
                _ = &mut shutdown => {
                    info!("Shutdown signal received, no longer accepting connections");
                    break;
                }
            }
        }
    }
}

/// Handle a single connection from request head to close
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    policy: Arc<UpgradePolicy>,
) {
    debug!("New connection from {}", peer_addr);

    let mut head = Vec::new();
    match read_request_head(&mut stream, &mut head).await {
        Ok(Preflight::Upgrade) => {}
        Ok(Preflight::Respond(status)) => {
            warn!("Answered request from {} with {}", peer_addr, status);
            if let Err(e) = write_status(&mut stream, status).await {
                debug!("Failed to send {} to {}: {}", status, peer_addr, e);
            }
            return;
        }
        Err(e) => {
            warn!("Upgrade error from {}: {}", peer_addr, e);
            return;
        }
    }

    let ws_stream = match upgrade(Rewind::new(head, stream), peer_addr, &policy).await {
        Ok(ws_stream) => ws_stream,
        Err(e) => {
            warn!("Upgrade error from {}: {}", peer_addr, e);
            return;
        }
    };
    info!("Connection from {} upgraded", peer_addr);

    let mut session = EchoSession::new(ws_stream, peer_addr);
    let end = session.run().await;
    debug!("Connection from {} is {:?}", peer_addr, session.state());

    info!(
        "Connection from {} closed after {} echoed messages: {}",
        peer_addr,
        session.echoed(),
        end
    );
}

/// Perform the upgrade handshake, rejecting unknown paths and origins
async fn upgrade(
    stream: Rewind<TcpStream>,
    peer_addr: SocketAddr,
    policy: &UpgradePolicy,
) -> Result<EchoStream, WsError> {
    let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        match check_request(request, &policy.origins) {
            Ok(()) => Ok(response),
            Err(rejection) => {
                warn!("Rejected upgrade from {}: {}", peer_addr, rejection);
                Err(rejection.into_response())
            }
        }
    };

    let config = Some(policy.websocket_config());
    accept_hdr_async_with_config(stream, callback, config).await
}
