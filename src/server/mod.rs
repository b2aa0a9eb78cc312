//! WebSocket server module
//!
//! Accepts connections on the echo endpoint, answers non-upgrade requests
//! with a plain HTTP status, gates the upgrade handshake and runs one echo
//! session per connection.

mod handler;
mod handshake;
mod preflight;
mod protocol;
mod rewind;
mod websocket;

pub use websocket::*;
