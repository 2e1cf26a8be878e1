// ── Duplex channel pair ──
//
// Two bounded queues decouple the socket from application logic:
// commands flow client -> connection, frames flow connection -> client.
// The connection half outlives any single socket, so queued commands
// survive a reconnect.

use tokio::sync::mpsc;

use crate::error::Error;
use crate::protocol::{InboundMessage, OutboundMessage};

/// One decoded inbound frame, or the decode failure for it.
pub type InboundFrame = Result<InboundMessage, Error>;

pub const DEFAULT_OUTBOUND_CAPACITY: usize = 32;
pub const DEFAULT_INBOUND_CAPACITY: usize = 64;

/// Application-side ends: push commands, pull frames.
#[derive(Debug)]
pub struct ClientEnds {
    pub commands: mpsc::Sender<OutboundMessage>,
    pub frames: mpsc::Receiver<InboundFrame>,
}

/// Socket-side ends, lent to each connection attempt in turn.
#[derive(Debug)]
pub struct ConnectionEnds {
    pub commands: mpsc::Receiver<OutboundMessage>,
    pub frames: mpsc::Sender<InboundFrame>,
}

/// Create a channel pair with the given queue capacities.
pub fn duplex(outbound_capacity: usize, inbound_capacity: usize) -> (ClientEnds, ConnectionEnds) {
    let (command_tx, command_rx) = mpsc::channel(outbound_capacity.max(1));
    let (frame_tx, frame_rx) = mpsc::channel(inbound_capacity.max(1));

    (
        ClientEnds {
            commands: command_tx,
            frames: frame_rx,
        },
        ConnectionEnds {
            commands: command_rx,
            frames: frame_tx,
        },
    )
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::protocol::Action;

    #[tokio::test]
    async fn commands_flow_in_order() {
        let (client, mut conn) = duplex(4, 4);
        for id in 2..5 {
            client
                .commands
                .send(OutboundMessage::new(Action::ToggleMute, None, id))
                .await
                .unwrap();
        }
        let ids: Vec<u64> = [
            conn.commands.recv().await.unwrap(),
            conn.commands.recv().await.unwrap(),
            conn.commands.recv().await.unwrap(),
        ]
        .iter()
        .map(|m| m.request_id)
        .collect();
        assert_eq!(ids, [2, 3, 4]);
    }

    #[test]
    fn full_outbound_queue_applies_backpressure() {
        let (client, mut conn) = duplex(1, 1);
        client
            .commands
            .try_send(OutboundMessage::new(Action::ToggleMute, None, 2))
            .unwrap();

        let mut send = tokio_test::task::spawn(
            client
                .commands
                .send(OutboundMessage::new(Action::ToggleVideo, None, 3)),
        );
        tokio_test::assert_pending!(send.poll());

        assert_eq!(conn.commands.try_recv().unwrap().request_id, 2);
        assert!(send.is_woken());
        tokio_test::assert_ready_ok!(send.poll());
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let (client, _conn) = duplex(0, 0);
        assert_eq!(client.commands.max_capacity(), 1);
    }
}
