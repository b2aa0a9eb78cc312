//! Upgrade policy
//!
//! Handshake settings applied to every incoming connection. Built once at
//! startup and shared read-only between connection tasks.

use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

/// Default WebSocket write buffer size in bytes
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 1024;

/// Which `Origin` headers are accepted during the upgrade handshake
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OriginPolicy {
    /// Accept every origin (no cross-origin restriction)
    #[default]
    AllowAny,
    /// Accept only the listed origins, stored normalized
    AllowList(Vec<String>),
}

impl OriginPolicy {
    /// Build a policy from configured origins; an empty list allows any origin
    pub fn from_origins<I, S>(origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let origins: Vec<String> = origins
            .into_iter()
            .map(|origin| normalize_origin(origin.as_ref()))
            .filter(|origin| !origin.is_empty())
            .collect();

        if origins.is_empty() {
            Self::AllowAny
        } else {
            Self::AllowList(origins)
        }
    }

    /// Whether a request carrying `origin` may be upgraded.
    ///
    /// Requests without an `Origin` header come from non-browser clients and
    /// are always allowed.
    pub fn allows(&self, origin: Option<&str>) -> bool {
        match (self, origin) {
            (Self::AllowAny, _) | (_, None) => true,
            (Self::AllowList(allowed), Some(origin)) => {
                let origin = normalize_origin(origin);
                allowed.iter().any(|a| *a == origin)
            }
        }
    }

    /// True when no cross-origin restriction is enforced
    pub fn is_permissive(&self) -> bool {
        matches!(self, Self::AllowAny)
    }
}

fn normalize_origin(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

/// Settings for the upgrade handshake and the resulting WebSocket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradePolicy {
    /// Bytes buffered before a write reaches the socket
    pub write_buffer_size: usize,
    /// Origin check
    pub origins: OriginPolicy,
}

impl Default for UpgradePolicy {
    fn default() -> Self {
        Self {
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            origins: OriginPolicy::AllowAny,
        }
    }
}

impl UpgradePolicy {
    /// Set the write buffer size
    pub fn with_write_buffer_size(mut self, size: usize) -> Self {
        self.write_buffer_size = size;
        self
    }

    /// Set the origin policy
    pub fn with_origins(mut self, origins: OriginPolicy) -> Self {
        self.origins = origins;
        self
    }

    /// WebSocket settings for an accepted connection
    pub fn websocket_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.write_buffer_size = self.write_buffer_size;
        config
    }
}
