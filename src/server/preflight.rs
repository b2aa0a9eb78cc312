//! Request preflight
//!
//! Reads the HTTP request head before the WebSocket handshake. Requests for
//! other paths, and requests that are not valid upgrade requests, are answered
//! with a plain HTTP status and never reach the handshake.

use std::io;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_tungstenite::tungstenite::http::StatusCode;

use super::protocol::ECHO_PATH;

/// Largest request head read before answering 431
pub const MAX_HEAD_SIZE: usize = 8 * 1024;

const MAX_HEADERS: usize = 64;
const READ_CHUNK_SIZE: usize = 1024;

/// What to do with a connection once its request head is known
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preflight {
    /// Hand the connection to the WebSocket handshake
    Upgrade,
    /// Answer with this status and close
    Respond(StatusCode),
}

/// Classify a buffered request head. `None` means more bytes are needed.
pub fn classify_head(head: &[u8]) -> Option<Preflight> {
    let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
    let mut request = httparse::Request::new(&mut headers);

    let status = match request.parse(head) {
        Ok(httparse::Status::Partial) => return None,
        Ok(httparse::Status::Complete(_)) => upgrade_status(&request),
        Err(httparse::Error::TooManyHeaders) => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
        Err(_) => Some(StatusCode::BAD_REQUEST),
    };

    Some(status.map_or(Preflight::Upgrade, Preflight::Respond))
}

/// Status to answer with, or `None` when the request may be upgraded
fn upgrade_status(request: &httparse::Request<'_, '_>) -> Option<StatusCode> {
    let path = request.path.unwrap_or_default();
    let path = path.split_once('?').map_or(path, |(path, _)| path);
    if path != ECHO_PATH {
        return Some(StatusCode::NOT_FOUND);
    }

    let headers = &*request.headers;
    let upgrade_requested = has_token(headers, "connection", "upgrade")
        && has_token(headers, "upgrade", "websocket");
    if !upgrade_requested {
        return Some(StatusCode::BAD_REQUEST);
    }
    if request.method != Some("GET") {
        return Some(StatusCode::METHOD_NOT_ALLOWED);
    }
    if request.version != Some(1)
        || !has_token(headers, "sec-websocket-version", "13")
        || header(headers, "sec-websocket-key").is_none()
    {
        return Some(StatusCode::BAD_REQUEST);
    }

    None
}

fn header<'h>(headers: &'h [httparse::Header<'_>], name: &str) -> Option<&'h [u8]> {
    headers
        .iter()
        .find(|h| h.name.eq_ignore_ascii_case(name))
        .map(|h| h.value)
}

fn has_token(headers: &[httparse::Header<'_>], name: &str, token: &str) -> bool {
    headers
        .iter()
        .filter(|h| h.name.eq_ignore_ascii_case(name))
        .filter_map(|h| std::str::from_utf8(h.value).ok())
        .flat_map(|value| value.split(','))
        .any(|t| t.trim().eq_ignore_ascii_case(token))
}

/// Read from `stream` into `head` until the request head can be classified.
///
/// Bytes read stay in `head` so they can be replayed to the handshake.
pub async fn read_request_head<S>(stream: &mut S, head: &mut Vec<u8>) -> io::Result<Preflight>
where
    S: AsyncRead + Unpin,
{
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed before the request head was complete",
            ));
        }
        head.extend_from_slice(&chunk[..n]);

        if let Some(preflight) = classify_head(head) {
            return Ok(preflight);
        }
        if head.len() >= MAX_HEAD_SIZE {
            return Ok(Preflight::Respond(
                StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE,
            ));
        }
    }
}

/// Plain HTTP response carrying only a status line and its reason as body
pub fn status_response(status: StatusCode) -> Vec<u8> {
    let reason = status.canonical_reason().unwrap_or_default();
    let body = format!("{}\n", reason);

    let mut response = format!("HTTP/1.1 {} {}\r\n", status.as_u16(), reason);
    if status == StatusCode::METHOD_NOT_ALLOWED {
        response.push_str("Allow: GET\r\n");
    }
    response.push_str("Content-Type: text/plain; charset=utf-8\r\n");
    response.push_str(&format!("Content-Length: {}\r\n", body.len()));
    response.push_str("Connection: close\r\n\r\n");
    response.push_str(&body);
    response.into_bytes()
}

/// Send a status response and shut the write side down
pub async fn write_status<S>(stream: &mut S, status: StatusCode) -> io::Result<()>
where
    S: AsyncWrite + Unpin,
{
    stream.write_all(&status_response(status)).await?;
    stream.shutdown().await
}
