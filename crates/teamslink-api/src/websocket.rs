//! Single-connection lifecycle for the device API WebSocket.
//!
//! A [`Connection`] owns one physical socket. [`Connection::run`] splits it
//! into a reader task (socket → inbound queue) and a writer (outbound queue
//! → socket) and returns once the first terminal condition fires:
//!
//! - an OS interrupt / terminate signal (when signal handling is enabled),
//! - cancellation of the parent token,
//! - the reader observing a close frame, end of stream, or transport error.
//!
//! The socket is always closed before `run` returns. Retrying is the
//! caller's job; nothing here reconnects.
//!
//! # Example
//!
//! ```rust,ignore
//! use teamslink_api::{channel, endpoint, websocket};
//! use tokio_util::sync::CancellationToken;
//!
//! let (mut client, mut conn) = channel::duplex(32, 64);
//! let url = endpoint::endpoint_url(&Default::default(), 0, None)?;
//! let cancel = CancellationToken::new();
//!
//! tokio::spawn(async move {
//!     while let Some(frame) = client.frames.recv().await {
//!         println!("{frame:?}");
//!     }
//! });
//!
//! let reason = websocket::run_connection(&url, &mut conn, &cancel, true).await?;
//! println!("connection ended: {reason}");
//! ```

use std::time::Duration;

use futures_util::stream::SplitStream;
use futures_util::{Sink, SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::channel::{ConnectionEnds, InboundFrame};
use crate::endpoint::redacted;
use crate::error::Error;
use crate::protocol::{InboundMessage, OutboundMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsSource = SplitStream<WsStream>;

const OPEN_TIMEOUT: Duration = Duration::from_secs(10);
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

// ── Termination ──────────────────────────────────────────────────────

/// Why a connection ended. Only the first reason is reported.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Termination {
    /// SIGINT / SIGTERM observed.
    Signal,
    /// The parent token was cancelled.
    Cancelled,
    /// Close frame received or the stream ended.
    PeerClosed,
    /// Transport-level read error.
    ReadFailed(String),
}

impl std::fmt::Display for Termination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Signal => f.write_str("received OS shutdown signal"),
            Self::Cancelled => f.write_str("cancelled"),
            Self::PeerClosed => f.write_str("closed by peer"),
            Self::ReadFailed(e) => write!(f, "read failed: {e}"),
        }
    }
}

// ── Connection ───────────────────────────────────────────────────────

/// An open WebSocket to the meeting application.
pub struct Connection {
    stream: WsStream,
    handle_signals: bool,
}

impl Connection {
    /// Perform the WebSocket handshake. No retry on failure.
    pub async fn open(url: &Url) -> Result<Self, Error> {
        tracing::info!(endpoint = %redacted(url), "Connecting to WebSocket");

        let (stream, _response) =
            tokio::time::timeout(OPEN_TIMEOUT, tokio_tungstenite::connect_async(url.as_str()))
                .await
                .map_err(|_| {
                    Error::WebSocketConnect(format!(
                        "handshake timed out after {}s",
                        OPEN_TIMEOUT.as_secs()
                    ))
                })?
                .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        tracing::info!("WebSocket connected");

        Ok(Self {
            stream,
            handle_signals: true,
        })
    }

    /// Whether SIGINT / SIGTERM end the connection. Default: `true`.
    pub fn with_signal_handling(mut self, enabled: bool) -> Self {
        self.handle_signals = enabled;
        self
    }

    /// Pump frames in both directions until the first terminal condition.
    pub async fn run(self, ends: &mut ConnectionEnds, parent: &CancellationToken) -> Termination {
        let local = parent.child_token();
        let (mut sink, source) = self.stream.split();
        let mut reader = tokio::spawn(read_loop(source, ends.frames.clone()));
        let mut reader_done = false;

        let reason = {
            let writer = write_loop(&mut sink, &mut ends.commands, &local);
            tokio::pin!(writer);
            let mut writer_done = false;

            let reason = tokio::select! {
                biased;
                () = shutdown_signal(self.handle_signals) => Termination::Signal,
                () = parent.cancelled() => Termination::Cancelled,
                joined = &mut reader => {
                    reader_done = true;
                    joined.unwrap_or_else(|e| Termination::ReadFailed(e.to_string()))
                }
                () = &mut writer => {
                    writer_done = true;
                    Termination::Cancelled
                }
            };
            tracing::info!(reason = %reason, "WebSocket loop terminating");

            local.cancel();
            if !writer_done {
                writer.await;
            }
            reason
        };

        match tokio::time::timeout(CLOSE_TIMEOUT, sink.close()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!(error = %e, "WebSocket close failed"),
            Err(_) => tracing::debug!("WebSocket close timed out"),
        }
        if !reader_done {
            reader.abort();
            let _ = reader.await;
        }

        tracing::debug!("Leaving WebSocket loop");
        reason
    }
}

/// Open one connection and run it to completion.
pub async fn run_connection(
    url: &Url,
    ends: &mut ConnectionEnds,
    cancel: &CancellationToken,
    handle_signals: bool,
) -> Result<Termination, Error> {
    let connection = Connection::open(url).await?;
    Ok(connection
        .with_signal_handling(handle_signals)
        .run(ends, cancel)
        .await)
}

// ── Reader ───────────────────────────────────────────────────────────

async fn read_loop(mut source: WsSource, frames: mpsc::Sender<InboundFrame>) -> Termination {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                let decoded = InboundMessage::decode(text.as_str());
                if let Err(ref e) = decoded {
                    tracing::warn!(error = %e, "Unable to decode inbound frame");
                }
                if frames.send(decoded).await.is_err() {
                    tracing::debug!("Inbound queue closed, stopping reader");
                    return Termination::Cancelled;
                }
            }
            Ok(Message::Ping(_)) => {
                // tungstenite queues the pong itself
                tracing::trace!("WebSocket ping");
            }
            Ok(Message::Close(frame)) => {
                if let Some(ref cf) = frame {
                    tracing::info!(
                        code = %cf.code,
                        reason = %cf.reason,
                        "WebSocket close frame received"
                    );
                } else {
                    tracing::info!("WebSocket close frame received (no payload)");
                }
                return Termination::PeerClosed;
            }
            Ok(_) => {
                // Binary, Pong, Frame -- ignore
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unable to read frame, disconnecting");
                return Termination::ReadFailed(e.to_string());
            }
        }
    }

    tracing::info!("WebSocket stream ended");
    Termination::PeerClosed
}

// ── Writer ───────────────────────────────────────────────────────────

/// Drain the command queue into `sink` until `cancel` fires. A send in
/// progress is abandoned on cancellation or after [`SEND_TIMEOUT`].
async fn write_loop<S>(
    sink: &mut S,
    commands: &mut mpsc::Receiver<OutboundMessage>,
    cancel: &CancellationToken,
) where
    S: Sink<Message> + Unpin + Send,
    S::Error: std::fmt::Display,
{
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                tracing::debug!("Leaving write loop due to cancellation");
                return;
            }
            next = commands.recv() => {
                let Some(command) = next else {
                    tracing::debug!("Command queue closed, writer idle until cancelled");
                    cancel.cancelled().await;
                    return;
                };
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        tracing::debug!(
                            request_id = command.request_id,
                            "Send abandoned due to cancellation"
                        );
                        return;
                    }
                    sent = tokio::time::timeout(SEND_TIMEOUT, send_command(sink, &command)) => {
                        if sent.is_err() {
                            tracing::warn!(
                                request_id = command.request_id,
                                "Timed out sending command, dropping it"
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Encode and send one command. Failures drop the command.
async fn send_command<S>(sink: &mut S, command: &OutboundMessage)
where
    S: Sink<Message> + Unpin + Send,
    S::Error: std::fmt::Display,
{
    let json = match command.to_json() {
        Ok(json) => json,
        Err(e) => {
            tracing::warn!(error = %e, request_id = command.request_id, "Error encoding command");
            return;
        }
    };

    if let Err(e) = sink.send(Message::text(json)).await {
        tracing::warn!(error = %e, request_id = command.request_id, "Error sending command");
        return;
    }

    tracing::info!(
        request_id = command.request_id,
        action = %command.action,
        "Sent command"
    );
}

// ── OS signals ───────────────────────────────────────────────────────

async fn shutdown_signal(enabled: bool) {
    if !enabled {
        return std::future::pending().await;
    }

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    () = ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Unable to install SIGTERM handler");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

/// Resolves on Ctrl-C; never resolves if the handler can't be installed.
async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Unable to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}

// ── Tests ────────────────────────────────────────────────────────────
