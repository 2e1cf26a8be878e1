// ── Client handle ──
//
// Full lifecycle management for the device API connection: background
// supervision, inbound routing, the state cache, and the command facade.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{Mutex, broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use url::Url;

use teamslink_api::{
    Action, ConnectionEnds, InboundFrame, MeetingUpdate, Modifier, Reaction, UiPanel, duplex,
    effective_port, endpoint_url,
};

use crate::command::CommandFacade;
use crate::config::ClientConfig;
use crate::error::CoreError;
use crate::router::router_task;
use crate::state::{Guarded, Snapshot, StateCache, flag_accessors, meeting_flags};
use crate::supervisor::supervise;

const EVENT_CHANNEL_SIZE: usize = 256;

pub type EventCallback = Arc<dyn Fn(MeetingUpdate) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&CoreError) + Send + Sync>;

// ── ConnectionState ──────────────────────────────────────────────────

/// Connection state observable by consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    /// Retry limit reached; `connect()` starts over.
    Failed,
}

// ── ClientEvent ──────────────────────────────────────────────────────

/// Broadcast to every [`Client::subscribe`] receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Connected,
    Disconnected { reason: String },
    /// A new pairing token was stored. The value is available via [`Client::token`].
    TokenRefreshed,
    Acknowledged {
        request_id: Option<u64>,
        response: String,
    },
    MeetingUpdated(Snapshot),
}

/// Result of [`Client::disconnect`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectOutcome {
    /// A live session was stopped.
    Disconnected,
    /// The session had already ended, by an earlier `disconnect()` or on its own.
    AlreadyDisconnected,
    /// `connect()` was never called.
    NotRunning,
}

// ── Session bookkeeping ──────────────────────────────────────────────

struct Session {
    cancel: CancellationToken,
    supervisor: JoinHandle<()>,
    router: JoinHandle<()>,
}

impl Session {
    fn is_live(&self) -> bool {
        !self.cancel.is_cancelled() && !self.supervisor.is_finished()
    }
}

#[derive(Default)]
enum SessionSlot {
    #[default]
    Idle,
    Running(Session),
    Stopped,
}

// ── Shared internals ─────────────────────────────────────────────────

pub(crate) struct ClientInner {
    pub(crate) config: ClientConfig,
    pub(crate) token: Guarded<Option<SecretString>>,
    pub(crate) auto_reconnect: Guarded<bool>,
    pub(crate) state: StateCache,
    pub(crate) commands: CommandFacade,
    pub(crate) connection_ends: Arc<Mutex<ConnectionEnds>>,
    pub(crate) inbound: Arc<Mutex<mpsc::Receiver<InboundFrame>>>,
    pub(crate) connection_state: watch::Sender<ConnectionState>,
    pub(crate) updates: watch::Sender<Snapshot>,
    pub(crate) events: broadcast::Sender<ClientEvent>,
    event_callback: Guarded<Option<EventCallback>>,
    error_callback: Guarded<Option<ErrorCallback>>,
    session: Guarded<SessionSlot>,
}

impl ClientInner {
    pub(crate) fn new(config: ClientConfig) -> Self {
        let (client_ends, connection_ends) = duplex(
            config.queue.outbound_capacity,
            config.queue.inbound_capacity,
        );
        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (updates, _) = watch::channel(Snapshot::default());
        let (events, _) = broadcast::channel(EVENT_CHANNEL_SIZE);

        Self {
            token: Guarded::new(config.token.clone()),
            auto_reconnect: Guarded::new(config.auto_reconnect),
            state: StateCache::new(),
            commands: CommandFacade::new(client_ends.commands, config.queue.overflow),
            connection_ends: Arc::new(Mutex::new(connection_ends)),
            inbound: Arc::new(Mutex::new(client_ends.frames)),
            connection_state,
            updates,
            events,
            event_callback: Guarded::default(),
            error_callback: Guarded::default(),
            session: Guarded::default(),
            config,
        }
    }

    /// Endpoint for the next attempt, carrying the current token.
    pub(crate) fn endpoint(&self) -> Result<Url, CoreError> {
        let token = self
            .token
            .read(|token| token.as_ref().map(|t| t.expose_secret().to_owned()));
        Ok(endpoint_url(
            &self.config.identity,
            self.config.port,
            token.as_deref(),
        )?)
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        let previous = self.connection_state.send_replace(state);
        if previous != state {
            tracing::debug!(from = ?previous, to = ?state, "Connection state changed");
        }
    }

    pub(crate) fn broadcast(&self, event: ClientEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Invoke the event callback, if any, outside its lock.
    pub(crate) fn notify_update(&self, update: MeetingUpdate) {
        if let Some(callback) = self.event_callback.get() {
            callback(update);
        }
    }

    /// Invoke the error callback, if any, outside its lock.
    pub(crate) fn report_error(&self, error: &CoreError) {
        if let Some(callback) = self.error_callback.get() {
            callback(error);
        }
    }

    pub(crate) fn set_event_callback(&self, callback: impl Fn(MeetingUpdate) + Send + Sync + 'static) {
        self.event_callback.replace(Some(Arc::new(callback)));
    }

    pub(crate) fn set_error_callback(&self, callback: impl Fn(&CoreError) + Send + Sync + 'static) {
        self.error_callback.replace(Some(Arc::new(callback)));
    }
}

// ── Client ───────────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ClientInner>`. Manages the full connection
/// lifecycle: supervised reconnection, inbound routing into the state
/// cache, and outbound command correlation.
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

impl Client {
    /// Create a new Client from configuration. Does NOT connect.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            inner: Arc::new(ClientInner::new(config)),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// Port actually dialled (`0` in the config resolves to 8124).
    pub fn port(&self) -> u16 {
        effective_port(self.inner.config.port)
    }

    /// Endpoint URL the next attempt will use, token included.
    pub fn endpoint(&self) -> Result<Url, CoreError> {
        self.inner.endpoint()
    }

    // ── Connection lifecycle ─────────────────────────────────────────

    /// Start background supervision and return immediately.
    ///
    /// Must be called from within a Tokio runtime. Fails with
    /// [`CoreError::AlreadyRunning`] while a session is live.
    pub fn connect(&self) -> Result<(), CoreError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| CoreError::Internal(format!("connect() needs a Tokio runtime: {e}")))?;

        self.inner.session.write(|slot| {
            if let SessionSlot::Running(session) = slot {
                if session.is_live() {
                    return Err(CoreError::AlreadyRunning);
                }
                // Supervisor ended on its own; release the old router.
                session.cancel.cancel();
            }

            let cancel = CancellationToken::new();
            let supervisor = runtime.spawn(supervise(Arc::clone(&self.inner), cancel.clone()));
            let router = runtime.spawn(router_task(Arc::clone(&self.inner), cancel.clone()));
            *slot = SessionSlot::Running(Session {
                cancel,
                supervisor,
                router,
            });
            Ok(())
        })?;

        tracing::info!(port = self.port(), "Client started");
        Ok(())
    }

    /// Stop reconnecting and tear down the active connection, if any.
    ///
    /// Returns as soon as the session is signalled; see
    /// [`disconnect_and_wait`](Self::disconnect_and_wait) to join the tasks.
    pub fn disconnect(&self) -> DisconnectOutcome {
        self.take_session().0
    }

    /// Like [`disconnect`](Self::disconnect), then wait for the background
    /// tasks to finish.
    pub async fn disconnect_and_wait(&self) -> DisconnectOutcome {
        let (outcome, session) = self.take_session();
        if let Some(session) = session {
            let _ = session.supervisor.await;
            let _ = session.router.await;
        }
        outcome
    }

    fn take_session(&self) -> (DisconnectOutcome, Option<Session>) {
        let previous = self.inner.session.write(|slot| match slot {
            SessionSlot::Idle => SessionSlot::Idle,
            SessionSlot::Running(_) | SessionSlot::Stopped => {
                std::mem::replace(slot, SessionSlot::Stopped)
            }
        });

        match previous {
            SessionSlot::Idle => (DisconnectOutcome::NotRunning, None),
            SessionSlot::Stopped => (DisconnectOutcome::AlreadyDisconnected, None),
            SessionSlot::Running(session) => {
                let outcome = if session.is_live() {
                    DisconnectOutcome::Disconnected
                } else {
                    DisconnectOutcome::AlreadyDisconnected
                };
                session.cancel.cancel();
                tracing::info!(?outcome, "Client disconnect requested");
                (outcome, Some(session))
            }
        }
    }

    /// `true` only while a socket is open.
    pub fn is_connected(&self) -> bool {
        *self.inner.connection_state.borrow() == ConnectionState::Connected
    }

    pub fn connection_state(&self) -> ConnectionState {
        *self.inner.connection_state.borrow()
    }

    /// Subscribe to connection state changes.
    pub fn watch_connection(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Whether the supervisor retries after a connection ends.
    pub fn auto_reconnect(&self) -> bool {
        self.inner.auto_reconnect.get()
    }

    /// Takes effect after the current connection ends.
    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.inner.auto_reconnect.replace(enabled);
    }

    // ── Token ────────────────────────────────────────────────────────

    /// Current pairing token, if any.
    pub fn token(&self) -> Option<String> {
        self.inner
            .token
            .read(|token| token.as_ref().map(|t| t.expose_secret().to_owned()))
    }

    /// Replace the pairing token. Used from the next connection attempt on.
    pub fn set_token(&self, token: impl Into<String>) {
        let token: String = token.into();
        let token = (!token.is_empty()).then(|| SecretString::from(token));
        self.inner.token.replace(token);
    }

    // ── State ────────────────────────────────────────────────────────

    /// Last known meeting state.
    pub fn snapshot(&self) -> Snapshot {
        self.inner.state.snapshot()
    }

    fn read_flag(&self, f: impl FnOnce(&MeetingUpdate) -> bool) -> bool {
        self.inner.state.read_flag(f)
    }

    meeting_flags!(flag_accessors);

    /// Wait for the next meeting update routed after this call.
    ///
    /// Pair with [`refresh`](Self::refresh) and a timeout when freshness
    /// matters: nothing arrives while disconnected.
    pub async fn wait_for_update(&self) -> Result<Snapshot, CoreError> {
        let mut updates = self.inner.updates.subscribe();
        if !self.session_live() {
            return Err(CoreError::NotConnected);
        }
        updates
            .changed()
            .await
            .map_err(|_| CoreError::ChannelClosed)?;
        Ok(*updates.borrow_and_update())
    }

    fn session_live(&self) -> bool {
        self.inner.session.read(|slot| match slot {
            SessionSlot::Running(session) => session.is_live(),
            SessionSlot::Idle | SessionSlot::Stopped => false,
        })
    }

    // ── Callbacks and events ─────────────────────────────────────────

    /// Called synchronously on the router task for every meeting update.
    /// Must not block.
    pub fn set_event_callback(&self, callback: impl Fn(MeetingUpdate) + Send + Sync + 'static) {
        self.inner.set_event_callback(callback);
    }

    /// Called for connection failures, undecodable frames and rejected
    /// commands. The default is a no-op.
    pub fn set_error_callback(&self, callback: impl Fn(&CoreError) + Send + Sync + 'static) {
        self.inner.set_error_callback(callback);
    }

    pub fn clear_callbacks(&self) {
        self.inner.event_callback.replace(None);
        self.inner.error_callback.replace(None);
    }

    /// Subscribe to the event broadcast stream.
    pub fn subscribe(&self) -> broadcast::Receiver<ClientEvent> {
        self.inner.events.subscribe()
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Enqueue a command and return its request id.
    ///
    /// Commands issued while disconnected wait in the outbound queue and
    /// are written by the next connection.
    pub async fn send(&self, action: Action, modifier: Option<Modifier>) -> Result<u64, CoreError> {
        self.inner.commands.send(action, modifier).await
    }

    /// Id of the most recently enqueued command.
    pub fn last_request_id(&self) -> u64 {
        self.inner.commands.last_request_id()
    }

    /// Ask for a `meetingUpdate`.
    pub async fn refresh(&self) -> Result<u64, CoreError> {
        self.send(Action::QueryState, None).await
    }

    pub async fn toggle_mute(&self) -> Result<u64, CoreError> {
        self.send(Action::ToggleMute, None).await
    }

    pub async fn toggle_video(&self) -> Result<u64, CoreError> {
        self.send(Action::ToggleVideo, None).await
    }

    pub async fn toggle_background_blur(&self) -> Result<u64, CoreError> {
        self.send(Action::ToggleBackgroundBlur, None).await
    }

    pub async fn toggle_hand(&self) -> Result<u64, CoreError> {
        self.send(Action::ToggleHand, None).await
    }

    pub async fn toggle_chat(&self) -> Result<u64, CoreError> {
        self.send(Action::ToggleUi, Some(UiPanel::Chat.into())).await
    }

    pub async fn toggle_share_tray(&self) -> Result<u64, CoreError> {
        self.send(Action::ToggleUi, Some(UiPanel::ShareTray.into()))
            .await
    }

    pub async fn stop_sharing(&self) -> Result<u64, CoreError> {
        self.send(Action::StopSharing, None).await
    }

    pub async fn leave(&self) -> Result<u64, CoreError> {
        self.send(Action::LeaveCall, None).await
    }

    pub async fn react(&self, reaction: Reaction) -> Result<u64, CoreError> {
        self.send(Action::SendReaction, Some(reaction.into())).await
    }

    pub async fn react_love(&self) -> Result<u64, CoreError> {
        self.react(Reaction::Love).await
    }

    pub async fn react_laugh(&self) -> Result<u64, CoreError> {
        self.react(Reaction::Laugh).await
    }

    pub async fn react_applause(&self) -> Result<u64, CoreError> {
        self.react(Reaction::Applause).await
    }

    pub async fn react_wow(&self) -> Result<u64, CoreError> {
        self.react(Reaction::Wow).await
    }

    pub async fn react_like(&self) -> Result<u64, CoreError> {
        self.react(Reaction::Like).await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("port", &self.port())
            .field("state", &self.connection_state())
            .field("last_request_id", &self.last_request_id())
            .finish_non_exhaustive()
    }
}

// ── Tests ────────────────────────────────────────────────────────────
