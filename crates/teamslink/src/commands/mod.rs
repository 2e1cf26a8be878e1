//! Command dispatch: bridges CLI args -> core client calls -> output formatting.

pub mod actions;
pub mod config_cmd;
pub mod pair;
pub mod state;
pub mod watch;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::{self, error::RecvError};

use teamslink_core::{Client, ClientEvent, ConnectionState, CoreError};

use crate::cli::{Command, GlobalOpts};
use crate::config::{self, Mode};
use crate::error::CliError;

/// Dispatch a connection-bound command to the appropriate handler.
pub async fn dispatch(cmd: &Command, global: &GlobalOpts) -> Result<(), CliError> {
    match cmd {
        Command::State => state::handle(global).await,
        Command::Watch => watch::handle(global).await,
        Command::Pair(args) => pair::handle(args, global).await,
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Ok(()),
        action => actions::handle(action, global).await,
    }
}

// ── Session ─────────────────────────────────────────────────────────

/// A connected client plus the event stream subscribed before connecting.
pub struct Session {
    pub client: Client,
    pub events: broadcast::Receiver<ClientEvent>,
    pub timeout: Duration,
    last_error: Arc<Mutex<Option<String>>>,
}

impl Session {
    /// Connect and wait until the handshake completes or the client gives up.
    pub async fn open(global: &GlobalOpts, mode: Mode) -> Result<Self, CliError> {
        let config = config::build_client_config(global, mode)?;
        let client = Client::new(config);
        let port = client.port();

        let last_error = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&last_error);
        client.set_error_callback(move |err: &CoreError| {
            tracing::debug!(error = %err, "client error");
            if let Ok(mut slot) = sink.lock() {
                *slot = Some(err.to_string());
            }
        });

        let events = client.subscribe();
        client.connect()?;

        let session = Self {
            client,
            events,
            timeout: Duration::from_secs(global.timeout),
            last_error,
        };

        let mut states = session.client.watch_connection();
        let reached = tokio::time::timeout(
            session.timeout,
            states.wait_for(|s| matches!(s, ConnectionState::Connected | ConnectionState::Failed)),
        )
        .await
        .map(|r| r.map(|s| *s));

        match reached {
            Ok(Ok(ConnectionState::Connected)) => {
                tracing::debug!(port, "connected");
                Ok(session)
            }
            Ok(_) => {
                let reason = session.last_error();
                session.close().await;
                Err(CliError::ConnectionFailed {
                    port,
                    source: reason
                        .unwrap_or_else(|| "connection gave up".into())
                        .into(),
                })
            }
            Err(_) => {
                let reason = session.last_error();
                session.close().await;
                match reason {
                    Some(reason) => Err(CliError::ConnectionFailed {
                        port,
                        source: reason.into(),
                    }),
                    None => Err(CliError::Timeout {
                        seconds: global.timeout,
                        waiting_for: "connection".into(),
                    }),
                }
            }
        }
    }

    fn last_error(&self) -> Option<String> {
        self.last_error.lock().ok().and_then(|slot| slot.clone())
    }

    /// Next event, skipping over any the receiver lagged past.
    pub async fn next_event(&mut self) -> Result<ClientEvent, CliError> {
        loop {
            match self.events.recv().await {
                Ok(event) => return Ok(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event stream lagged");
                }
                Err(RecvError::Closed) => return Err(CoreError::ChannelClosed.into()),
            }
        }
    }

    /// Wait up to the session timeout for the first event `pick` accepts.
    pub async fn wait_for_event<T>(
        &mut self,
        waiting_for: &str,
        mut pick: impl FnMut(ClientEvent) -> Option<T>,
    ) -> Result<T, CliError> {
        let timeout = self.timeout;
        let found = tokio::time::timeout(timeout, async {
            loop {
                if let Some(found) = pick(self.next_event().await?) {
                    return Ok::<_, CliError>(found);
                }
            }
        })
        .await;

        found.unwrap_or_else(|_| {
            Err(CliError::Timeout {
                seconds: timeout.as_secs(),
                waiting_for: waiting_for.into(),
            })
        })
    }

    /// Stop the client and wait for its tasks to finish.
    pub async fn close(self) {
        let outcome = self.client.disconnect_and_wait().await;
        tracing::debug!(?outcome, "session closed");
    }
}
