//! Shared configuration for the teamslink CLI and other embedders.
//!
//! TOML config file, pairing token resolution (env + keyring + plaintext),
//! and translation to `teamslink_core::ClientConfig`. The CLI layers its
//! flag overrides on top.

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use teamslink_core::{
    ClientConfig, DeviceIdentity, OverflowPolicy, QueueConfig, ReconnectConfig, ReconnectStrategy,
};

/// Service name under which the pairing token is stored in the system keyring.
pub const KEYRING_SERVICE: &str = "teamslink";
const KEYRING_USER: &str = "pairing-token";

/// Environment variable consulted first for the pairing token.
pub const TOKEN_ENV: &str = "TEAMSLINK_TOKEN";
const ENV_PREFIX: &str = "TEAMSLINK_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// How this client introduces itself to the meeting application.
    #[serde(default)]
    pub identity: Identity,

    #[serde(default)]
    pub connection: Connection,

    /// Pairing token (plaintext; prefer the keyring or `TEAMSLINK_TOKEN`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Identity {
    pub manufacturer: String,
    pub device: String,
    pub app: String,
    pub app_version: String,
}

impl Default for Identity {
    fn default() -> Self {
        let DeviceIdentity {
            manufacturer,
            device,
            app,
            app_version,
        } = DeviceIdentity::default();
        Self {
            manufacturer,
            device,
            app,
            app_version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Connection {
    /// Local API port; `0` means 8124.
    pub port: u16,

    pub auto_reconnect: bool,

    /// Delay between attempts (or the initial delay when
    /// `max_reconnect_delay_ms` is set).
    pub reconnect_delay_ms: u64,

    /// Switches to exponential backoff capped at this value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_reconnect_delay_ms: Option<u64>,

    /// Consecutive failed attempts before giving up; unset retries forever.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,

    /// Commands buffered while disconnected.
    pub queue_capacity: usize,

    /// How long a command waits for queue space; `0` rejects immediately.
    pub send_timeout_ms: u64,
}

impl Default for Connection {
    fn default() -> Self {
        let queue = QueueConfig::default();
        Self {
            port: teamslink_core::DEFAULT_PORT,
            auto_reconnect: true,
            reconnect_delay_ms: millis(teamslink_core::config::DEFAULT_RECONNECT_DELAY),
            max_reconnect_delay_ms: None,
            max_retries: None,
            queue_capacity: queue.outbound_capacity,
            send_timeout_ms: millis(teamslink_core::config::DEFAULT_SEND_TIMEOUT),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl Config {
    /// Build a `ClientConfig` with `token` as the pairing token.
    pub fn to_client_config(&self, token: Option<SecretString>) -> Result<ClientConfig, ConfigError> {
        let conn = &self.connection;

        if conn.queue_capacity == 0 {
            return Err(ConfigError::Validation {
                field: "connection.queue_capacity".into(),
                reason: "must be at least 1".into(),
            });
        }

        let initial = Duration::from_millis(conn.reconnect_delay_ms);
        let strategy = match conn.max_reconnect_delay_ms {
            None => ReconnectStrategy::Fixed { delay: initial },
            Some(max) if max >= conn.reconnect_delay_ms => ReconnectStrategy::Exponential {
                initial_delay: initial,
                max_delay: Duration::from_millis(max),
            },
            Some(max) => {
                return Err(ConfigError::Validation {
                    field: "connection.max_reconnect_delay_ms".into(),
                    reason: format!(
                        "{max} is below reconnect_delay_ms ({})",
                        conn.reconnect_delay_ms
                    ),
                });
            }
        };

        let overflow = match conn.send_timeout_ms {
            0 => OverflowPolicy::Reject,
            ms => OverflowPolicy::Block {
                timeout: Some(Duration::from_millis(ms)),
            },
        };

        Ok(ClientConfig {
            identity: DeviceIdentity {
                manufacturer: self.identity.manufacturer.clone(),
                device: self.identity.device.clone(),
                app: self.identity.app.clone(),
                app_version: self.identity.app_version.clone(),
            },
            port: conn.port,
            token,
            auto_reconnect: conn.auto_reconnect,
            reconnect: ReconnectConfig {
                strategy,
                max_retries: conn.max_retries,
            },
            queue: QueueConfig {
                outbound_capacity: conn.queue_capacity,
                overflow,
                ..QueueConfig::default()
            },
            ..ClientConfig::default()
        })
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "teamslink", "teamslink").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("teamslink");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from `path` (missing file is fine) layered under `TEAMSLINK_*` env.
///
/// Nested keys use a double underscore: `TEAMSLINK_CONNECTION__PORT=9000`.
/// `TEAMSLINK_TOKEN` is left to [`resolve_token`].
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).ignore(&["token"]).split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if anything goes wrong.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_default()
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path();
    save_config_to(cfg, &path)?;
    Ok(path)
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

/// Where a resolved token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    Env,
    Keyring,
    ConfigFile,
}

/// Resolve the pairing token: `TEAMSLINK_TOKEN` → keyring → plaintext config.
///
/// `None` is not an error: the meeting application issues a token on
/// first connect once the user allows pairing.
pub fn resolve_token(cfg: &Config) -> Option<(SecretString, TokenSource)> {
    // 1. Env var
    if let Ok(token) = std::env::var(TOKEN_ENV) {
        if !token.is_empty() {
            return Some((SecretString::from(token), TokenSource::Env));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER) {
        if let Ok(token) = entry.get_password() {
            return Some((SecretString::from(token), TokenSource::Keyring));
        }
    }

    // 3. Plaintext in config
    cfg.token
        .as_ref()
        .filter(|t| !t.is_empty())
        .map(|t| (SecretString::from(t.clone()), TokenSource::ConfigFile))
}

/// Save a pairing token in the system keyring.
pub fn store_token(token: &str) -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    entry.set_password(token)?;
    Ok(())
}

/// Remove the stored pairing token. A missing entry is not an error.
pub fn forget_token() -> Result<(), ConfigError> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_USER)?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ── Tests ───────────────────────────────────────────────────────────
