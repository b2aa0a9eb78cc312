//! Echo session
//!
//! Runs the read/echo loop for one upgraded connection. Every text or binary
//! message is written back unchanged before the next one is read. Any read or
//! write failure ends the session; nothing is retried.

use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::{protocol::CloseFrame, Error as WsError, Message};
use tracing::{debug, error, info, warn};

use super::protocol::{payload_preview, Inbound};

/// Upper bound on flushing the close handshake once the loop has ended
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Lifecycle of a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Closed,
}

/// Why a session ended
#[derive(Debug)]
pub enum SessionEnd {
    /// The peer sent a close frame
    PeerClosed(Option<CloseFrame<'static>>),
    /// The stream finished without yielding a close frame
    StreamEnded,
    /// Reading failed (protocol, IO or reset without close)
    ReadFailed(WsError),
    /// Echoing a message back failed
    WriteFailed(WsError),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::PeerClosed(Some(frame)) => {
                write!(f, "closed by peer ({}: {})", frame.code, frame.reason)
            }
            SessionEnd::PeerClosed(None) => write!(f, "closed by peer"),
            SessionEnd::StreamEnded => write!(f, "stream ended"),
            SessionEnd::ReadFailed(e) => write!(f, "read failed: {}", e),
            SessionEnd::WriteFailed(e) => write!(f, "write failed: {}", e),
        }
    }
}

/// Echo loop over a single WebSocket connection
///
/// Generic over the message stream so it can run over TCP or in-memory pipes.
pub struct EchoSession<S> {
    stream: S,
    peer_addr: SocketAddr,
    state: ConnectionState,
    echoed: u64,
}

impl<S> EchoSession<S>
where
    S: Stream<Item = Result<Message, WsError>> + Sink<Message, Error = WsError> + Unpin,
{
    /// Wrap an upgraded connection
    pub fn new(stream: S, peer_addr: SocketAddr) -> Self {
        Self {
            stream,
            peer_addr,
            state: ConnectionState::Connected,
            echoed: 0,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Number of messages echoed so far
    pub fn echoed(&self) -> u64 {
        self.echoed
    }

    /// Echo messages until the connection closes or fails.
    ///
    /// The session is `Closed` when this returns, whatever the cause.
    pub async fn run(&mut self) -> SessionEnd {
        if self.state == ConnectionState::Closed {
            return SessionEnd::StreamEnded;
        }

        let end = self.echo_loop().await;
        self.close().await;
        end
    }

    async fn echo_loop(&mut self) -> SessionEnd {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    warn!("Read error from {}: {}", self.peer_addr, e);
                    return SessionEnd::ReadFailed(e);
                }
                None => {
                    info!("Connection closed by {}", self.peer_addr);
                    return SessionEnd::StreamEnded;
                }
            };

            match Inbound::from(msg) {
                Inbound::Data(kind, msg) => {
                    info!(
                        "Received {} message from {}: {}",
                        kind,
                        self.peer_addr,
                        payload_preview(&msg)
                    );

                    if let Err(e) = self.stream.send(msg).await {
                        error!("Write error to {}: {}", self.peer_addr, e);
                        return SessionEnd::WriteFailed(e);
                    }
                    self.echoed += 1;
                }
                Inbound::Control => {
                    // Pongs are queued by tungstenite and flushed on the next read
                }
                Inbound::Close(frame) => {
                    info!("Client {} requested close", self.peer_addr);
                    return SessionEnd::PeerClosed(frame);
                }
            }
        }
    }

    async fn close(&mut self) {
        self.state = ConnectionState::Closed;

        let close = tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, self.stream.close());
        match close.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Close handshake with {} failed: {}", self.peer_addr, e),
            Err(_) => debug!("Close handshake with {} timed out", self.peer_addr),
        }
    }
}
