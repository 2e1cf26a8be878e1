use thiserror::Error;

/// Top-level error type for the `teamslink-api` crate.
///
/// Covers endpoint construction, the WebSocket handshake and JSON
/// framing. Failures on an open socket end the connection and are
/// reported as a [`Termination`](crate::Termination) instead.
/// `teamslink-core` maps these into client-facing diagnostics.
#[derive(Debug, Error)]
pub enum Error {
    // ── Endpoint ────────────────────────────────────────────────────
    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection could not be established.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    // ── Data ────────────────────────────────────────────────────────
    /// Inbound JSON could not be decoded, with the raw frame for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },

    /// Outbound command could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::WebSocketConnect(_))
    }
}
