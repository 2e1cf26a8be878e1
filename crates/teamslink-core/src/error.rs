// ── Core error types ──
//
// Client-facing errors from teamslink-core. Consumers never match on
// tungstenite or serde errors directly: the `From<teamslink_api::Error>`
// impl translates transport-layer errors into these variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot connect to meeting application at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Connection closed by meeting application: {reason}")]
    ConnectionClosed { reason: String },

    #[error("Client is already running; call disconnect() first")]
    AlreadyRunning,

    #[error("Client is not connected; call connect() first")]
    NotConnected,

    #[error("Gave up after {attempts} failed connection attempts")]
    RetriesExhausted { attempts: u32 },

    // ── Command errors ───────────────────────────────────────────────
    #[error("Outbound queue is full ({capacity} commands waiting)")]
    QueueFull { capacity: usize },

    #[error("Command channel closed")]
    ChannelClosed,

    #[error("Command {} rejected: {response}", request_label(.request_id))]
    Rejected {
        request_id: Option<u64>,
        response: String,
    },

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Protocol error: {message}")]
    Protocol { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

fn request_label(request_id: &Option<u64>) -> String {
    request_id.map_or_else(|| "?".to_owned(), |id| id.to_string())
}

impl CoreError {
    /// Returns `true` if the supervisor will retry past this error.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::ConnectionFailed { .. } | Self::ConnectionClosed { .. } | Self::QueueFull { .. }
        )
    }
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<teamslink_api::Error> for CoreError {
    fn from(err: teamslink_api::Error) -> Self {
        match err {
            teamslink_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid endpoint URL: {e}"),
            },
            teamslink_api::Error::WebSocketConnect(reason) => CoreError::ConnectionFailed {
                url: String::new(),
                reason,
            },
            teamslink_api::Error::Deserialization { message, body: _ } => CoreError::Protocol {
                message: format!("Malformed inbound frame: {message}"),
            },
            teamslink_api::Error::Serialization(e) => CoreError::Protocol {
                message: format!("Unable to encode command: {e}"),
            },
        }
    }
}
