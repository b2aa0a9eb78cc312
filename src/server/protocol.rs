//! Message classification
//!
//! Sorts incoming WebSocket messages into data frames that are echoed back,
//! control frames answered by the WebSocket library, and the peer's close
//! request.

use std::fmt;

use tokio_tungstenite::tungstenite::{protocol::CloseFrame, Message};

/// Path of the echo endpoint
pub const ECHO_PATH: &str = "/api/v1/ws";

/// Type tag of a data frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Text,
    Binary,
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameKind::Text => write!(f, "text"),
            FrameKind::Binary => write!(f, "binary"),
        }
    }
}

/// An incoming message, classified for the echo loop
#[derive(Debug)]
pub enum Inbound {
    /// Text or binary payload to send back unchanged
    Data(FrameKind, Message),
    /// Ping, pong or raw frame; never echoed
    Control,
    /// The peer started the close handshake
    Close(Option<CloseFrame<'static>>),
}

impl From<Message> for Inbound {
    fn from(msg: Message) -> Self {
        match msg {
            Message::Text(text) => Inbound::Data(FrameKind::Text, Message::Text(text)),
            Message::Binary(data) => Inbound::Data(FrameKind::Binary, Message::Binary(data)),
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => Inbound::Control,
            Message::Close(frame) => Inbound::Close(frame),
        }
    }
}

/// Render a data payload for the log. Binary data is shown as lossy UTF-8.
pub fn payload_preview(msg: &Message) -> String {
    match msg {
        Message::Text(text) => text.clone(),
        Message::Binary(data) => String::from_utf8_lossy(data).into_owned(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

    #[test]
    fn test_text_is_data() {
        match Inbound::from(Message::Text("hello".to_string())) {
            Inbound::Data(kind, msg) => {
                assert_eq!(kind, FrameKind::Text);
                assert_eq!(msg, Message::Text("hello".to_string()));
            }
            other => panic!("Expected data, got {:?}", other),
        }
    }

    #[test]
    fn test_binary_is_data() {
        match Inbound::from(Message::Binary(vec![0x01, 0x02, 0x03])) {
            Inbound::Data(kind, msg) => {
                assert_eq!(kind, FrameKind::Binary);
                assert_eq!(msg, Message::Binary(vec![0x01, 0x02, 0x03]));
            }
            other => panic!("Expected data, got {:?}", other),
        }
    }

    #[test]
    fn test_ping_and_pong_are_control() {
        assert!(matches!(Inbound::from(Message::Ping(vec![1])), Inbound::Control));
        assert!(matches!(Inbound::from(Message::Pong(vec![1])), Inbound::Control));
    }

    #[test]
    fn test_close_keeps_frame() {
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "bye".into(),
        };
        match Inbound::from(Message::Close(Some(frame))) {
            Inbound::Close(Some(frame)) => {
                assert_eq!(frame.code, CloseCode::Normal);
                assert_eq!(frame.reason, "bye");
            }
            other => panic!("Expected close, got {:?}", other),
        }
    }

    #[test]
    fn test_payload_preview() {
        assert_eq!(payload_preview(&Message::Text("hi".to_string())), "hi");
        assert_eq!(payload_preview(&Message::Binary(b"raw".to_vec())), "raw");
        assert_eq!(
            payload_preview(&Message::Binary(vec![0xff, b'a'])),
            "\u{fffd}a"
        );
    }

    #[test]
    fn test_frame_kind_display() {
        assert_eq!(FrameKind::Text.to_string(), "text");
        assert_eq!(FrameKind::Binary.to_string(), "binary");
    }
}
