//! CLI flag overrides on top of `teamslink_config`.
//!
//! Core never sees these types -- it receives a pre-built `ClientConfig`.

use std::time::Duration;

use secrecy::SecretString;

use teamslink_config::{Config, TokenSource, resolve_token};
use teamslink_core::{ClientConfig, OverflowPolicy};

use crate::cli::GlobalOpts;
use crate::error::CliError;

pub use teamslink_config::{config_path, load_config};

/// How a one-shot command reaches Teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Send, await the reply, exit. Give up after a few failed attempts.
    OneShot,
    /// Stay connected and keep retrying.
    LongLived,
}

/// Failed attempts a one-shot command tolerates before reporting.
const ONE_SHOT_RETRIES: u32 = 2;

/// Build a `ClientConfig` from the config file plus CLI overrides.
pub fn build_client_config(global: &GlobalOpts, mode: Mode) -> Result<ClientConfig, CliError> {
    let cfg = load_config()?;
    let token = resolve_cli_token(global, &cfg);
    let mut client = cfg.to_client_config(token)?;
    apply_overrides(&mut client, global, mode);
    Ok(client)
}

/// `--token` flag → env → keyring → plaintext config.
fn resolve_cli_token(global: &GlobalOpts, cfg: &Config) -> Option<SecretString> {
    if let Some(token) = global.token.as_ref().filter(|t| !t.is_empty()) {
        tracing::debug!("using pairing token from --token");
        return Some(SecretString::from(token.clone()));
    }

    match resolve_token(cfg) {
        Some((token, source)) => {
            tracing::debug!(?source, "using stored pairing token");
            if source == TokenSource::ConfigFile {
                tracing::info!("pairing token read from plaintext config; consider `teamslink pair`");
            }
            Some(token)
        }
        None => {
            tracing::debug!("no pairing token; Teams will ask to pair");
            None
        }
    }
}

fn apply_overrides(client: &mut ClientConfig, global: &GlobalOpts, mode: Mode) {
    if let Some(port) = global.port {
        client.port = port;
    }

    if let Some(seconds) = global.send_timeout {
        client.queue.overflow = match seconds {
            0 => OverflowPolicy::Reject,
            s => OverflowPolicy::Block {
                timeout: Some(Duration::from_secs(s)),
            },
        };
    }

    // The CLI handles Ctrl-C itself so it can disconnect cleanly.
    client.handle_os_signals = false;

    if mode == Mode::OneShot {
        let limit = client
            .reconnect
            .max_retries
            .map_or(ONE_SHOT_RETRIES, |n| n.min(ONE_SHOT_RETRIES));
        client.reconnect.max_retries = Some(limit);
    }
}
