//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use teamslink_config::ConfigError;
use teamslink_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    #[allow(dead_code)]
    pub const SUCCESS: i32 = 0;
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const REJECTED: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to Teams on port {port}")]
    #[diagnostic(
        code(teamslink::connection_failed),
        help(
            "Check that the Teams desktop client is running and that\n\
             Settings > Privacy > Third-party app API is enabled.\n\
             Port: {port} (override with --port)"
        )
    )]
    ConnectionFailed {
        port: u16,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // ── Pairing ──────────────────────────────────────────────────────
    #[error("Teams did not issue a pairing token within {seconds}s")]
    #[diagnostic(
        code(teamslink::not_paired),
        help(
            "Join a meeting, run `teamslink pair`, and choose Allow on the\n\
             pairing prompt that Teams shows."
        )
    )]
    NotPaired { seconds: u64 },

    // ── Commands ─────────────────────────────────────────────────────
    #[error("Teams rejected {action}: {response}")]
    #[diagnostic(
        code(teamslink::rejected),
        help("Most actions only work during a meeting, and only once paired.")
    )]
    Rejected { action: String, response: String },

    #[error("Outbound queue is full ({capacity} commands waiting)")]
    #[diagnostic(
        code(teamslink::queue_full),
        help("Raise --send-timeout or connection.queue_capacity.")
    )]
    QueueFull { capacity: usize },

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {seconds}s waiting for {waiting_for}")]
    #[diagnostic(
        code(teamslink::timeout),
        help("Increase the wait with --timeout or check that Teams is responsive.")
    )]
    Timeout { seconds: u64, waiting_for: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(teamslink::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration file already exists at {path}")]
    #[diagnostic(
        code(teamslink::config_exists),
        help("Pass --force to overwrite it.")
    )]
    ConfigExists { path: String },

    #[error(transparent)]
    #[diagnostic(
        code(teamslink::config),
        help("Inspect the resolved settings with: teamslink config show")
    )]
    Config(#[from] ConfigError),

    // ── Core ─────────────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(code(teamslink::client))]
    Client(CoreError),

    // ── IO / Serialization ────────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Unable to render JSON: {0}")]
    #[diagnostic(code(teamslink::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::NotPaired { .. } => exit_code::AUTH,
            Self::Rejected { .. } => exit_code::REJECTED,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::ConfigExists { .. } => exit_code::USAGE,
            Self::QueueFull { .. }
            | Self::Config(_)
            | Self::Client(_)
            | Self::Io(_)
            | Self::Json(_) => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::QueueFull { capacity } => CliError::QueueFull { capacity },
            CoreError::Rejected {
                request_id,
                response,
            } => CliError::Rejected {
                action: request_id.map_or_else(|| "command".into(), |id| format!("request {id}")),
                response,
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            other => CliError::Client(other),
        }
    }
}
