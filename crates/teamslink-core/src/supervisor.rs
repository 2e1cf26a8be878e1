// ── Supervisor ──
//
// Repeatedly opens and runs a connection, sleeping the configured backoff
// between attempts, until the session is cancelled, auto-reconnect is
// switched off (an OS shutdown signal does this too), or the retry limit
// is reached.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use teamslink_api::endpoint::redacted;
use teamslink_api::{Connection, Termination};

use crate::client::{ClientEvent, ClientInner, ConnectionState};
use crate::error::CoreError;

pub(crate) async fn supervise(inner: Arc<ClientInner>, cancel: CancellationToken) {
    // A previous session may still be tearing down; its connection ends
    // free up once it has.
    let mut ends = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        guard = Arc::clone(&inner.connection_ends).lock_owned() => guard,
    };

    let reconnect = &inner.config.reconnect;
    let mut failures: u32 = 0;
    let mut attempt: u32 = 0;

    let final_state = loop {
        if attempt == 0 {
            inner.set_state(ConnectionState::Connecting);
        }

        let url = match inner.endpoint() {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "Unable to build endpoint URL");
                inner.report_error(&e);
                break ConnectionState::Failed;
            }
        };

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => break ConnectionState::Disconnected,
            opened = Connection::open(&url) => opened,
        };

        match opened {
            Ok(connection) => {
                failures = 0;
                inner.set_state(ConnectionState::Connected);
                inner.broadcast(ClientEvent::Connected);

                let reason = connection
                    .with_signal_handling(inner.config.handle_os_signals)
                    .run(&mut ends, &cancel)
                    .await;

                inner.set_state(ConnectionState::Disconnected);
                inner.broadcast(ClientEvent::Disconnected {
                    reason: reason.to_string(),
                });

                if let Some(state) = settle(&inner, reason, &cancel) {
                    break state;
                }
            }
            Err(e) => {
                failures = failures.saturating_add(1);
                tracing::warn!(error = %e, failures, "Unable to connect");
                inner.report_error(&CoreError::ConnectionFailed {
                    url: redacted(&url),
                    reason: e.to_string(),
                });

                if reconnect.max_retries.is_some_and(|max| failures > max) {
                    tracing::error!(attempts = failures, "Giving up on reconnecting");
                    inner.report_error(&CoreError::RetriesExhausted { attempts: failures });
                    break ConnectionState::Failed;
                }
            }
        }

        if !inner.auto_reconnect.get() {
            tracing::info!("Auto-reconnect disabled, supervisor stopping");
            break ConnectionState::Disconnected;
        }

        attempt = attempt.saturating_add(1);
        inner.set_state(ConnectionState::Reconnecting { attempt });
        let delay = reconnect.delay_for(failures.saturating_sub(1));
        tracing::debug!(
            attempt,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "Reconnecting after delay"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => break ConnectionState::Disconnected,
            () = tokio::time::sleep(delay) => {}
        }
    };

    inner.set_state(final_state);
    tracing::info!(state = ?final_state, "Supervisor stopped");
}

/// Handle the end of a live connection. `Some` stops the supervisor.
///
/// A shutdown signal switches auto-reconnect off, so the flag keeps
/// describing what the supervisor will do next.
fn settle(
    inner: &ClientInner,
    reason: Termination,
    cancel: &CancellationToken,
) -> Option<ConnectionState> {
    match reason {
        Termination::Cancelled if cancel.is_cancelled() => Some(ConnectionState::Disconnected),
        Termination::Signal => {
            tracing::info!("Shutdown signal received, disabling auto-reconnect");
            inner.auto_reconnect.replace(false);
            Some(ConnectionState::Disconnected)
        }
        Termination::ReadFailed(reason) => {
            inner.report_error(&CoreError::ConnectionClosed { reason });
            None
        }
        Termination::Cancelled | Termination::PeerClosed => None,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::ClientConfig;

    #[test]
    fn signal_switches_auto_reconnect_off() {
        let inner = ClientInner::new(ClientConfig::default());
        assert!(inner.auto_reconnect.get());

        let next = settle(&inner, Termination::Signal, &CancellationToken::new());

        assert_eq!(next, Some(ConnectionState::Disconnected));
        assert!(!inner.auto_reconnect.get());
    }

    #[test]
    fn read_failure_is_reported_and_retried() {
        let inner = ClientInner::new(ClientConfig::default());
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        inner.set_error_callback(move |e| sink.lock().unwrap().push(e.to_string()));

        let next = settle(
            &inner,
            Termination::ReadFailed("connection reset".into()),
            &CancellationToken::new(),
        );

        assert_eq!(next, None);
        assert!(inner.auto_reconnect.get());
        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("connection reset"), "{errors:?}");
    }

    #[test]
    fn peer_close_retries_but_cancellation_stops() {
        let inner = ClientInner::new(ClientConfig::default());
        let cancel = CancellationToken::new();
        assert_eq!(settle(&inner, Termination::PeerClosed, &cancel), None);
        assert_eq!(settle(&inner, Termination::Cancelled, &cancel), None);

        cancel.cancel();
        assert_eq!(
            settle(&inner, Termination::Cancelled, &cancel),
            Some(ConnectionState::Disconnected)
        );
    }
}
