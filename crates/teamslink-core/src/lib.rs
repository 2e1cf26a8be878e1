// teamslink-core: Auto-reconnecting client between teamslink-api and consumers (CLI).

pub mod client;
pub mod command;
pub mod config;
pub mod error;
mod router;
pub mod state;
mod supervisor;

// ── Primary re-exports ──────────────────────────────────────────────
pub use client::{
    Client, ClientEvent, ConnectionState, DisconnectOutcome, ErrorCallback, EventCallback,
};
pub use command::INITIAL_REQUEST_ID;
pub use config::{ClientConfig, OverflowPolicy, QueueConfig, ReconnectConfig, ReconnectStrategy};
pub use error::CoreError;
pub use state::{Guarded, Snapshot, StateCache};

// Wire vocabulary, re-exported so consumers need only this crate.
pub use teamslink_api::{
    Action, DEFAULT_PORT, DeviceIdentity, MeetingPermissions, MeetingState, MeetingUpdate,
    Modifier, Reaction, SUCCESS_RESPONSE, UiPanel,
};
