// ── Message router ──
//
// Consumes the inbound queue in arrival order and applies each frame:
// token refreshes update the stored token, acknowledgements are logged,
// and meeting updates (including one carried by a rejected command's
// reply) land in the state cache and reach the event callback.

use std::sync::Arc;

use secrecy::SecretString;
use tokio_util::sync::CancellationToken;

use teamslink_api::{InboundFrame, InboundMessage, MeetingUpdate, SUCCESS_RESPONSE};

use crate::client::{ClientEvent, ClientInner};
use crate::error::CoreError;

/// Drain the inbound queue until `cancel` fires.
pub(crate) async fn router_task(inner: Arc<ClientInner>, cancel: CancellationToken) {
    let mut frames = tokio::select! {
        biased;
        () = cancel.cancelled() => return,
        guard = Arc::clone(&inner.inbound).lock_owned() => guard,
    };

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            next = frames.recv() => {
                let Some(frame) = next else { break };
                route(&inner, frame);
            }
        }
    }

    tracing::debug!("Router stopped");
}

/// Apply one inbound frame. First match wins.
pub(crate) fn route(inner: &ClientInner, frame: InboundFrame) {
    let message = match frame {
        Ok(message) => message,
        Err(e) => {
            inner.report_error(&CoreError::from(e));
            return;
        }
    };

    match message {
        InboundMessage::TokenRefresh(token) => {
            tracing::info!(token = %masked(&token), "Pairing token refreshed");
            inner.token.replace(Some(SecretString::from(token)));
            inner.broadcast(ClientEvent::TokenRefreshed);
        }
        InboundMessage::Acknowledgement {
            request_id,
            response,
            update,
        } => {
            if response == SUCCESS_RESPONSE {
                tracing::debug!(?request_id, "Command acknowledged");
            } else {
                tracing::warn!(?request_id, %response, "Command rejected");
                inner.report_error(&CoreError::Rejected {
                    request_id,
                    response: response.clone(),
                });
            }
            inner.broadcast(ClientEvent::Acknowledged {
                request_id,
                response,
            });
            if let Some(update) = update {
                apply_update(inner, update);
            }
        }
        InboundMessage::MeetingUpdate(update) => apply_update(inner, update),
        InboundMessage::Unrecognized => {
            tracing::debug!("Ignoring inbound frame with no known fields");
        }
    }
}

fn apply_update(inner: &ClientInner, update: MeetingUpdate) {
    let snapshot = inner.state.apply(update);
    tracing::debug!(
        sequence = snapshot.sequence,
        in_meeting = update.meeting_state.is_in_meeting,
        muted = update.meeting_state.is_muted,
        "Meeting update"
    );
    inner.updates.send_replace(snapshot);
    inner.notify_update(update);
    inner.broadcast(ClientEvent::MeetingUpdated(snapshot));
}

/// First few characters of a token, for logs.
fn masked(token: &str) -> String {
    let prefix: String = token.chars().take(4).collect();
    if prefix.len() < token.len() {
        format!("{prefix}…")
    } else {
        "***".to_owned()
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;
    use teamslink_api::MeetingState;

    use super::*;
    use crate::ClientConfig;

    fn inner() -> Arc<ClientInner> {
        Arc::new(ClientInner::new(ClientConfig::default()))
    }

    fn decode(text: &str) -> InboundFrame {
        InboundMessage::decode(text)
    }

    #[test]
    fn last_token_refresh_wins() {
        let inner = inner();
        let mut events = inner.events.subscribe();

        for token in ["first", "second", "third"] {
            route(&inner, decode(&format!(r#"{{"tokenRefresh":"{token}"}}"#)));
        }

        let stored = inner.endpoint().unwrap();
        assert!(stored.as_str().ends_with("token=third"));
        assert_eq!(events.try_recv().unwrap(), ClientEvent::TokenRefreshed);
    }

    #[test]
    fn token_refresh_does_not_touch_state() {
        let inner = inner();
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        inner.set_event_callback(move |_| *counter.lock().unwrap() += 1);

        route(
            &inner,
            decode(r#"{"tokenRefresh":"t","meetingUpdate":{"meetingState":{"isMuted":true}}}"#),
        );

        assert!(!inner.state.is_muted());
        assert_eq!(*calls.lock().unwrap(), 0);
    }

    #[test]
    fn meeting_update_reaches_cache_and_callback() {
        let inner = inner();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        inner.set_event_callback(move |update| sink.lock().unwrap().push(update));
        let mut updates = inner.updates.subscribe();

        route(
            &inner,
            decode(
                r#"{"meetingUpdate":{"meetingState":{"isMuted":true,"isInMeeting":true},"meetingPermissions":{"canLeave":true}}}"#,
            ),
        );

        assert!(inner.state.is_muted());
        assert!(inner.state.is_in_meeting());
        assert!(inner.state.can_leave());
        assert!(!inner.state.is_video_on());
        assert!(updates.has_changed().unwrap());
        assert_eq!(updates.borrow_and_update().sequence, 1);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(
            seen[0].meeting_state,
            MeetingState {
                is_muted: true,
                is_in_meeting: true,
                ..MeetingState::default()
            }
        );
    }

    #[test]
    fn accessors_hold_until_next_update() {
        let inner = inner();
        route(&inner, decode(r#"{"meetingUpdate":{"meetingState":{"isMuted":true}}}"#));
        route(&inner, decode(r#"{"requestId":3,"response":"Success"}"#));
        route(&inner, decode(r#"{"tokenRefresh":"x"}"#));
        assert!(inner.state.is_muted());

        route(&inner, decode(r#"{"meetingUpdate":{"meetingState":{"isMuted":false}}}"#));
        assert!(!inner.state.is_muted());
    }

    #[test]
    fn success_ack_is_broadcast_without_error() {
        let inner = inner();
        let errors = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&errors);
        inner.set_error_callback(move |_| *counter.lock().unwrap() += 1);
        let mut events = inner.events.subscribe();

        route(&inner, decode(r#"{"requestId":2,"response":"Success"}"#));

        assert_eq!(*errors.lock().unwrap(), 0);
        assert_eq!(
            events.try_recv().unwrap(),
            ClientEvent::Acknowledged {
                request_id: Some(2),
                response: "Success".into()
            }
        );
        assert!(!inner.state.snapshot().is_populated());
    }

    #[test]
    fn rejected_ack_and_garbage_reach_error_callback() {
        let inner = inner();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        inner.set_error_callback(move |e| sink.lock().unwrap().push(e.to_string()));

        route(&inner, decode(r#"{"requestId":5,"response":"Not allowed"}"#));
        route(&inner, decode("{not json"));

        let errors = errors.lock().unwrap();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0], "Command 5 rejected: Not allowed");
        assert!(errors[1].starts_with("Protocol error"));
    }

    #[test]
    fn rejected_reply_still_applies_its_update() {
        let inner = inner();
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        inner.set_event_callback(move |_| *counter.lock().unwrap() += 1);
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        inner.set_error_callback(move |e| sink.lock().unwrap().push(e.to_string()));

        route(
            &inner,
            decode(
                r#"{"requestId":4,"response":"Failure","meetingUpdate":{"meetingState":{"isMuted":true}}}"#,
            ),
        );

        assert!(inner.state.is_muted());
        assert_eq!(*calls.lock().unwrap(), 1);
        assert_eq!(*errors.lock().unwrap(), ["Command 4 rejected: Failure"]);
    }

    #[test]
    fn unrecognized_frames_are_dropped() {
        let inner = inner();
        let mut events = inner.events.subscribe();
        route(&inner, decode(r#"{"somethingElse":1}"#));
        assert!(events.try_recv().is_err());
        assert_eq!(inner.state.snapshot(), crate::Snapshot::default());
    }

    #[test]
    fn masked_tokens_never_show_in_full() {
        assert_eq!(masked("abcdefgh"), "abcd…");
        assert_eq!(masked("abc"), "***");
    }

    #[tokio::test]
    async fn router_task_stops_on_cancel() {
        let inner = inner();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(router_task(Arc::clone(&inner), cancel.clone()));

        route(&inner, InboundMessage::decode(r#"{"tokenRefresh":"t"}"#));
        cancel.cancel();
        tokio::time::timeout(std::time::Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
    }
}
