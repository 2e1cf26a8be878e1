// Client lifecycle tests against an in-process WebSocket server.
#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

use teamslink_core::{
    Client, ClientConfig, ClientEvent, ConnectionState, CoreError, DisconnectOutcome,
    ReconnectConfig, ReconnectStrategy,
};

const WAIT: Duration = Duration::from_secs(5);

// ── Helpers ─────────────────────────────────────────────────────────

fn config(port: u16) -> ClientConfig {
    ClientConfig {
        port,
        handle_os_signals: false,
        reconnect: ReconnectConfig {
            strategy: ReconnectStrategy::Fixed {
                delay: Duration::from_millis(50),
            },
            max_retries: None,
        },
        ..ClientConfig::default()
    }
}

async fn listen() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// A port with nothing listening on it.
async fn dead_port() -> u16 {
    let (listener, port) = listen().await;
    drop(listener);
    port
}

/// Accept one WebSocket and report the request URI it was opened with.
async fn accept(listener: &TcpListener) -> (WebSocketStream<TcpStream>, String) {
    let (tcp, _) = tokio::time::timeout(WAIT, listener.accept())
        .await
        .unwrap()
        .unwrap();
    let mut uri = String::new();
    let ws = tokio_tungstenite::accept_hdr_async(
        tcp,
        |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            uri = request.uri().to_string();
            Ok(response)
        },
    )
    .await
    .unwrap();
    (ws, uri)
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        let frame = tokio::time::timeout(WAIT, ws.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        if let Message::Text(text) = frame {
            return text.as_str().to_owned();
        }
    }
}

async fn wait_for_state(client: &Client, wanted: ConnectionState) {
    let mut rx = client.watch_connection();
    tokio::time::timeout(WAIT, rx.wait_for(|state| *state == wanted))
        .await
        .unwrap()
        .unwrap();
}

// ── Tests ───────────────────────────────────────────────────────────

#[tokio::test]
async fn first_command_carries_request_id_two() {
    let (listener, port) = listen().await;
    let client = Client::new(config(port));
    client.connect().unwrap();

    let (mut ws, uri) = accept(&listener).await;
    assert!(uri.starts_with("/?protocol-version=2.0.0&manufacturer="));
    assert!(!uri.contains("token="));

    assert_eq!(client.toggle_mute().await.unwrap(), 2);
    assert_eq!(
        next_text(&mut ws).await,
        r#"{"action":"toggle-mute","requestId":2}"#
    );

    client.react_applause().await.unwrap();
    assert_eq!(
        next_text(&mut ws).await,
        r#"{"action":"send-reaction","parameters":{"type":"applause"},"requestId":3}"#
    );

    assert_eq!(client.disconnect_and_wait().await, DisconnectOutcome::Disconnected);
}

#[tokio::test]
async fn meeting_update_is_reflected_in_accessors() {
    let (listener, port) = listen().await;
    let client = Client::new(config(port));
    let mut events = client.subscribe();
    client.connect().unwrap();

    let (mut ws, _) = accept(&listener).await;
    wait_for_state(&client, ConnectionState::Connected).await;
    assert!(client.is_connected());
    assert!(!client.is_muted());

    ws.send(Message::text(
        r#"{"meetingUpdate":{"meetingState":{"isMuted":true,"isInMeeting":true},"meetingPermissions":{"canToggleMute":true}}}"#,
    ))
    .await
    .unwrap();

    let snapshot = loop {
        let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
        if let ClientEvent::MeetingUpdated(snapshot) = event {
            break snapshot;
        }
    };
    assert!(snapshot.state().is_muted);
    assert!(client.is_muted());
    assert!(client.is_in_meeting());
    assert!(client.can_toggle_mute());
    assert!(!client.can_leave());

    client.disconnect_and_wait().await;
}

#[tokio::test]
async fn wait_for_update_returns_next_update() {
    let (listener, port) = listen().await;
    let client = Client::new(config(port));
    client.connect().unwrap();

    let (mut ws, _) = accept(&listener).await;
    let waiter = {
        let client = client.clone();
        tokio::spawn(async move { client.wait_for_update().await })
    };

    client.refresh().await.unwrap();
    assert_eq!(
        next_text(&mut ws).await,
        r#"{"action":"query-state","requestId":2}"#
    );
    ws.send(Message::text(
        r#"{"meetingUpdate":{"meetingState":{"isVideoOn":true}}}"#,
    ))
    .await
    .unwrap();

    let snapshot = tokio::time::timeout(WAIT, waiter)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert!(snapshot.state().is_video_on);
    assert_eq!(snapshot.sequence, 1);

    client.disconnect_and_wait().await;
}

#[tokio::test]
async fn reconnects_after_peer_drop_with_refreshed_token() {
    let (listener, port) = listen().await;
    let mut config = config(port);
    config.token = Some("old-token".to_owned().into());
    let client = Client::new(config);
    client.connect().unwrap();

    let (mut first, uri) = accept(&listener).await;
    assert!(uri.ends_with("&token=old-token"));
    first
        .send(Message::text(r#"{"tokenRefresh":"new-token"}"#))
        .await
        .unwrap();
    // Let the router store it before the socket goes away.
    tokio::time::sleep(Duration::from_millis(50)).await;
    first.close(None).await.ok();
    drop(first);

    let (_second, uri) = accept(&listener).await;
    assert!(uri.ends_with("&token=new-token"), "{uri}");
    assert_eq!(client.token().as_deref(), Some("new-token"));

    client.disconnect_and_wait().await;
}

#[tokio::test]
async fn queued_commands_are_written_after_reconnect() {
    let (listener, port) = listen().await;
    let client = Client::new(config(port));

    // Queued before any connection exists.
    client.toggle_video().await.unwrap();
    client.leave().await.unwrap();
    client.connect().unwrap();

    let (mut ws, _) = accept(&listener).await;
    assert_eq!(
        next_text(&mut ws).await,
        r#"{"action":"toggle-video","requestId":2}"#
    );
    assert_eq!(
        next_text(&mut ws).await,
        r#"{"action":"leave-call","requestId":3}"#
    );

    client.disconnect_and_wait().await;
}

#[tokio::test]
async fn no_reconnect_after_disconnect() {
    let (listener, port) = listen().await;
    let client = Client::new(config(port));
    client.connect().unwrap();

    let (_ws, _) = accept(&listener).await;
    wait_for_state(&client, ConnectionState::Connected).await;

    assert_eq!(client.disconnect_and_wait().await, DisconnectOutcome::Disconnected);
    assert_eq!(client.connection_state(), ConnectionState::Disconnected);
    assert!(!client.is_connected());

    let again = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
    assert!(again.is_err(), "client reconnected after disconnect");
}

#[tokio::test]
async fn connect_twice_is_rejected() {
    let (_listener, port) = listen().await;
    let client = Client::new(config(port));

    client.connect().unwrap();
    assert!(matches!(client.connect(), Err(CoreError::AlreadyRunning)));

    assert_eq!(client.disconnect(), DisconnectOutcome::Disconnected);
    assert_eq!(client.disconnect(), DisconnectOutcome::AlreadyDisconnected);

    // A stopped client can be started again.
    client.connect().unwrap();
    assert_eq!(client.disconnect_and_wait().await, DisconnectOutcome::Disconnected);
}

#[tokio::test]
async fn retry_limit_stops_supervisor() {
    let mut config = config(dead_port().await);
    config.reconnect.max_retries = Some(2);
    let client = Client::new(config);

    let errors = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&errors);
    client.set_error_callback(move |e| {
        let label = match e {
            CoreError::ConnectionFailed { .. } => "failed",
            CoreError::RetriesExhausted { .. } => "exhausted",
            _ => "other",
        };
        sink.lock().unwrap().push(label);
    });

    client.connect().unwrap();
    wait_for_state(&client, ConnectionState::Failed).await;

    assert_eq!(
        *errors.lock().unwrap(),
        vec!["failed", "failed", "failed", "exhausted"]
    );
    // Let the supervisor task finish after publishing its final state.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(client.disconnect(), DisconnectOutcome::AlreadyDisconnected);
}

#[tokio::test]
async fn disabled_auto_reconnect_runs_once() {
    let (listener, port) = listen().await;
    let mut config = config(port);
    config.auto_reconnect = false;
    let client = Client::new(config);
    client.connect().unwrap();

    let (mut ws, _) = accept(&listener).await;
    ws.close(None).await.ok();
    drop(ws);

    wait_for_state(&client, ConnectionState::Disconnected).await;
    let again = tokio::time::timeout(Duration::from_millis(300), listener.accept()).await;
    assert!(again.is_err());
    assert_eq!(client.disconnect(), DisconnectOutcome::AlreadyDisconnected);
}

#[tokio::test]
async fn rejected_command_reaches_error_callback() {
    let (listener, port) = listen().await;
    let client = Client::new(config(port));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client.set_error_callback(move |e| {
        let _ = tx.send(e.to_string());
    });
    client.connect().unwrap();

    let (mut ws, _) = accept(&listener).await;
    ws.send(Message::text(r#"{"requestId":2,"response":"Permission denied"}"#))
        .await
        .unwrap();

    let message = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert_eq!(message, "Command 2 rejected: Permission denied");

    client.disconnect_and_wait().await;
}

#[tokio::test]
async fn dropped_socket_is_reported_and_retried() {
    let (listener, port) = listen().await;
    let client = Client::new(config(port));
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    client.set_error_callback(move |e| {
        let _ = tx.send((matches!(e, CoreError::ConnectionClosed { .. }), e.to_string()));
    });
    let mut events = client.subscribe();
    client.connect().unwrap();

    let (ws, _) = accept(&listener).await;
    wait_for_state(&client, ConnectionState::Connected).await;
    // No close frame: the TCP stream just goes away.
    drop(ws.into_inner());

    let (closed, message) = tokio::time::timeout(WAIT, rx.recv()).await.unwrap().unwrap();
    assert!(closed, "unexpected error: {message}");

    let reason = loop {
        let event = tokio::time::timeout(WAIT, events.recv()).await.unwrap().unwrap();
        if let ClientEvent::Disconnected { reason } = event {
            break reason;
        }
    };
    assert!(reason.starts_with("read failed"), "{reason}");

    // One 50 ms retry interval, plus slack for a loaded machine.
    let (tcp, _) = tokio::time::timeout(Duration::from_secs(1), listener.accept())
        .await
        .unwrap()
        .unwrap();
    drop(tcp);

    client.disconnect_and_wait().await;
}
