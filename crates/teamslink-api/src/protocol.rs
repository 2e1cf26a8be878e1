//! Wire types for the third-party device protocol (version 2.0.0).
//!
//! Outbound frames are `{"action", "parameters"?, "requestId"}` objects.
//! Inbound frames carry one of `tokenRefresh`, `response` (with a
//! `requestId`), or `meetingUpdate`; [`InboundMessage::decode`] turns the
//! loosely-shaped JSON into a tagged enum.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

use crate::error::Error;

/// Protocol version advertised in the connection query string.
pub const PROTOCOL_VERSION: &str = "2.0.0";

/// Response string the meeting application uses to acknowledge a command.
pub const SUCCESS_RESPONSE: &str = "Success";

// ── Outbound vocabulary ─────────────────────────────────────────────

/// Every action the meeting application accepts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
    AsRefStr, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Action {
    ToggleMute,
    ToggleVideo,
    ToggleHand,
    LeaveCall,
    /// Ask for a fresh `meetingUpdate`.
    QueryState,
    ToggleBackgroundBlur,
    /// Requires a [`UiPanel`] modifier.
    ToggleUi,
    StopSharing,
    /// Requires a [`Reaction`] modifier.
    SendReaction,
}

/// Panels that `toggle-ui` can open or close.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
    AsRefStr, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum UiPanel {
    Chat,
    ShareTray,
}

/// Reactions accepted by `send-reaction`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
    AsRefStr, EnumIter,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Reaction {
    Love,
    Laugh,
    Applause,
    Wow,
    Like,
}

/// The `type` value carried in an action's `parameters` object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Modifier {
    Ui(UiPanel),
    Reaction(Reaction),
}

impl Modifier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ui(UiPanel::Chat) => "chat",
            Self::Ui(UiPanel::ShareTray) => "share-tray",
            Self::Reaction(Reaction::Love) => "love",
            Self::Reaction(Reaction::Laugh) => "laugh",
            Self::Reaction(Reaction::Applause) => "applause",
            Self::Reaction(Reaction::Wow) => "wow",
            Self::Reaction(Reaction::Like) => "like",
        }
    }
}

impl From<UiPanel> for Modifier {
    fn from(panel: UiPanel) -> Self {
        Self::Ui(panel)
    }
}

impl From<Reaction> for Modifier {
    fn from(reaction: Reaction) -> Self {
        Self::Reaction(reaction)
    }
}

impl std::fmt::Display for Modifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── OutboundMessage ─────────────────────────────────────────────────

/// A single command frame sent to the meeting application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub action: Action,

    /// `{"type": <modifier>}` when the action takes one, absent otherwise.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,

    /// Correlation id echoed back in the acknowledgement.
    pub request_id: u64,
}

impl OutboundMessage {
    pub fn new(action: Action, modifier: Option<Modifier>, request_id: u64) -> Self {
        Self {
            action,
            parameters: modifier.map(|m| serde_json::json!({ "type": m.as_str() })),
            request_id,
        }
    }

    /// Encode as a JSON text frame body.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

// ── Meeting state ───────────────────────────────────────────────────

/// Toggles the meeting application currently allows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::struct_excessive_bools)]
pub struct MeetingPermissions {
    pub can_toggle_mute: bool,
    pub can_toggle_video: bool,
    pub can_toggle_hand: bool,
    pub can_toggle_blur: bool,
    pub can_leave: bool,
    pub can_react: bool,
    pub can_toggle_share_tray: bool,
    pub can_toggle_chat: bool,
    pub can_stop_sharing: bool,
    pub can_pair: bool,
}

/// Current status flags of the local participant.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[allow(clippy::struct_excessive_bools)]
pub struct MeetingState {
    pub is_muted: bool,
    pub is_video_on: bool,
    pub is_hand_raised: bool,
    pub is_in_meeting: bool,
    pub is_recording_on: bool,
    pub is_background_blurred: bool,
    pub is_sharing: bool,
    pub has_unread_messages: bool,
}

/// Payload of a `meetingUpdate` frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MeetingUpdate {
    pub meeting_state: MeetingState,
    pub meeting_permissions: MeetingPermissions,
}

// ── InboundMessage ──────────────────────────────────────────────────

/// Raw inbound frame: every field optional, presence decides the kind.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawInbound {
    #[serde(default)]
    token_refresh: Option<String>,
    #[serde(default)]
    meeting_update: Option<MeetingUpdate>,
    #[serde(default)]
    request_id: Option<u64>,
    #[serde(default)]
    response: Option<String>,
}

/// A classified inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundMessage {
    /// The meeting application issued a new pairing token.
    TokenRefresh(String),
    /// Reply to a previously sent command. A reply other than
    /// [`SUCCESS_RESPONSE`] may still carry a state update.
    Acknowledgement {
        request_id: Option<u64>,
        response: String,
        update: Option<MeetingUpdate>,
    },
    /// New snapshot of meeting state and permissions.
    MeetingUpdate(MeetingUpdate),
    /// Valid JSON carrying none of the known fields.
    Unrecognized,
}

impl InboundMessage {
    /// Decode and classify a text frame.
    ///
    /// A non-empty `tokenRefresh` wins over everything else. A `"Success"`
    /// response is a plain acknowledgement; any other response keeps the
    /// `meetingUpdate` sent alongside it.
    pub fn decode(text: &str) -> Result<Self, Error> {
        let raw: RawInbound = serde_json::from_str(text).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body: text.to_owned(),
        })?;
        Ok(Self::classify(raw))
    }

    fn classify(raw: RawInbound) -> Self {
        if let Some(token) = raw.token_refresh.filter(|t| !t.is_empty()) {
            return Self::TokenRefresh(token);
        }
        match (raw.response, raw.meeting_update) {
            (Some(response), update) => {
                let update = update.filter(|_| response != SUCCESS_RESPONSE);
                Self::Acknowledgement {
                    request_id: raw.request_id,
                    response,
                    update,
                }
            }
            (None, Some(update)) => Self::MeetingUpdate(update),
            (None, None) => Self::Unrecognized,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use strum::IntoEnumIterator;

    use super::*;

    #[test]
    fn action_wire_names() {
        let names: Vec<String> = Action::iter().map(|a| a.to_string()).collect();
        assert_eq!(
            names,
            [
                "toggle-mute",
                "toggle-video",
                "toggle-hand",
                "leave-call",
                "query-state",
                "toggle-background-blur",
                "toggle-ui",
                "stop-sharing",
                "send-reaction",
            ]
        );
        assert_eq!(
            serde_json::to_value(Action::QueryState).unwrap(),
            serde_json::json!("query-state")
        );
    }

    #[test]
    fn modifier_strings_match_strum_names() {
        for panel in UiPanel::iter() {
            assert_eq!(Modifier::from(panel).as_str(), panel.as_ref());
        }
        for reaction in Reaction::iter() {
            assert_eq!(Modifier::from(reaction).as_str(), reaction.as_ref());
        }
    }

    #[test]
    fn reaction_parses_from_cli_string() {
        assert_eq!("applause".parse::<Reaction>().unwrap(), Reaction::Applause);
        assert!("boo".parse::<Reaction>().is_err());
    }

    #[test]
    fn outbound_without_modifier_omits_parameters() {
        let msg = OutboundMessage::new(Action::ToggleMute, None, 2);
        insta::assert_snapshot!(msg.to_json().unwrap(), @r#"{"action":"toggle-mute","requestId":2}"#);
    }

    #[test]
    fn outbound_with_modifier_carries_type_only() {
        let msg = OutboundMessage::new(Action::ToggleUi, Some(UiPanel::ShareTray.into()), 7);
        assert_eq!(msg.parameters, Some(serde_json::json!({ "type": "share-tray" })));
        insta::assert_snapshot!(
            msg.to_json().unwrap(),
            @r#"{"action":"toggle-ui","parameters":{"type":"share-tray"},"requestId":7}"#
        );
    }

    #[test]
    fn decode_token_refresh_takes_priority() {
        let msg = InboundMessage::decode(
            r#"{"tokenRefresh":"abc","requestId":3,"response":"Success"}"#,
        )
        .unwrap();
        assert_eq!(msg, InboundMessage::TokenRefresh("abc".into()));
    }

    #[test]
    fn decode_empty_token_is_ignored() {
        let msg = InboundMessage::decode(r#"{"tokenRefresh":"","requestId":3,"response":"Success"}"#)
            .unwrap();
        assert!(matches!(
            msg,
            InboundMessage::Acknowledgement { request_id: Some(3), .. }
        ));
    }

    #[test]
    fn decode_acknowledgement() {
        let msg = InboundMessage::decode(r#"{"requestId":5,"response":"Success"}"#).unwrap();
        assert_eq!(
            msg,
            InboundMessage::Acknowledgement {
                request_id: Some(5),
                response: "Success".into(),
                update: None,
            }
        );
    }

    #[test]
    fn success_acknowledgement_drops_piggybacked_update() {
        let msg = InboundMessage::decode(
            r#"{"requestId":5,"response":"Success","meetingUpdate":{"meetingState":{"isMuted":true}}}"#,
        )
        .unwrap();
        assert!(matches!(msg, InboundMessage::Acknowledgement { update: None, .. }));
    }

    #[test]
    fn failed_acknowledgement_keeps_meeting_update() {
        let msg = InboundMessage::decode(
            r#"{"requestId":4,"response":"Failure","meetingUpdate":{"meetingState":{"isMuted":true}}}"#,
        )
        .unwrap();
        let InboundMessage::Acknowledgement {
            request_id,
            response,
            update: Some(update),
        } = msg
        else {
            panic!("expected acknowledgement with update, got {msg:?}");
        };
        assert_eq!(request_id, Some(4));
        assert_eq!(response, "Failure");
        assert!(update.meeting_state.is_muted);
    }

    #[test]
    fn decode_meeting_update_with_partial_fields() {
        let msg = InboundMessage::decode(
            r#"{"meetingUpdate":{"meetingState":{"isMuted":true,"isSharing":true},
                "meetingPermissions":{"canLeave":true}}}"#,
        )
        .unwrap();
        let InboundMessage::MeetingUpdate(update) = msg else {
            panic!("expected meeting update, got {msg:?}");
        };
        assert!(update.meeting_state.is_muted);
        assert!(update.meeting_state.is_sharing);
        assert!(!update.meeting_state.is_video_on);
        assert!(update.meeting_permissions.can_leave);
        assert!(!update.meeting_permissions.can_toggle_mute);
    }

    #[test]
    fn decode_unknown_object() {
        let msg = InboundMessage::decode(r#"{"somethingElse":1}"#).unwrap();
        assert_eq!(msg, InboundMessage::Unrecognized);
    }

    #[test]
    fn decode_malformed_keeps_body() {
        let err = InboundMessage::decode("not json at all").unwrap_err();
        match err {
            Error::Deserialization { body, .. } => assert_eq!(body, "not json at all"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
