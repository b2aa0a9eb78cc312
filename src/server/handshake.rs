//! Handshake gating
//!
//! Checks the request path and `Origin` header before a connection is
//! upgraded. Rejected requests get a plain HTTP error response.

use thiserror::Error;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request};
use tokio_tungstenite::tungstenite::http::{header::ORIGIN, StatusCode};

use super::protocol::ECHO_PATH;
use crate::config::OriginPolicy;

/// Why an upgrade request was refused
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("no endpoint at {0}")]
    UnknownPath(String),

    #[error("origin {0:?} is not allowed")]
    OriginNotAllowed(String),
}

impl Rejection {
    /// HTTP status sent back for this rejection
    pub fn status(&self) -> StatusCode {
        match self {
            Rejection::UnknownPath(_) => StatusCode::NOT_FOUND,
            Rejection::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
        }
    }

    /// Build the handshake error response
    pub fn into_response(self) -> ErrorResponse {
        let status = self.status();
        let body = status.canonical_reason().map(str::to_string);
        let mut response = ErrorResponse::new(body);
        *response.status_mut() = status;
        response
    }
}

/// Decide whether an upgrade request may proceed
pub fn check_request(request: &Request, origins: &OriginPolicy) -> Result<(), Rejection> {
    let path = request.uri().path();
    if path != ECHO_PATH {
        return Err(Rejection::UnknownPath(path.to_string()));
    }

    let origin = request
        .headers()
        .get(ORIGIN)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned());

    if !origins.allows(origin.as_deref()) {
        return Err(Rejection::OriginNotAllowed(origin.unwrap_or_default()));
    }

    Ok(())
}
