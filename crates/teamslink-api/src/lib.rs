// teamslink-api: Wire protocol and connection loop for the Teams third-party device API

pub mod channel;
pub mod endpoint;
pub mod error;
pub mod protocol;
pub mod websocket;

pub use channel::{ClientEnds, ConnectionEnds, InboundFrame, duplex};
pub use endpoint::{DEFAULT_PORT, DeviceIdentity, effective_port, endpoint_url};
pub use error::Error;
pub use protocol::{
    Action, InboundMessage, MeetingPermissions, MeetingState, MeetingUpdate, Modifier,
    OutboundMessage, PROTOCOL_VERSION, Reaction, SUCCESS_RESPONSE, UiPanel,
};
pub use websocket::{Connection, Termination, run_connection};
