// ── Command facade ──
//
// Builds outbound frames with monotonically increasing correlation ids and
// enqueues them for whichever connection is currently writing. Id
// allocation and enqueue happen under one lock, after a queue slot has been
// reserved, so the ids seen on the wire are consecutive and in order even
// with concurrent callers.

use tokio::sync::mpsc::{self, error::TrySendError};

use teamslink_api::{Action, Modifier, OutboundMessage};

use crate::config::OverflowPolicy;
use crate::error::CoreError;
use crate::state::Guarded;

/// Seed for the correlation counter. Ids are pre-incremented, so the first
/// command carries `INITIAL_REQUEST_ID + 1`.
pub const INITIAL_REQUEST_ID: u64 = 1;

pub(crate) struct CommandFacade {
    last_request_id: Guarded<u64>,
    commands: mpsc::Sender<OutboundMessage>,
    overflow: OverflowPolicy,
}

impl CommandFacade {
    pub(crate) fn new(commands: mpsc::Sender<OutboundMessage>, overflow: OverflowPolicy) -> Self {
        Self {
            last_request_id: Guarded::new(INITIAL_REQUEST_ID),
            commands,
            overflow,
        }
    }

    /// Enqueue `action` and return the request id it was sent with.
    pub(crate) async fn send(
        &self,
        action: Action,
        modifier: Option<Modifier>,
    ) -> Result<u64, CoreError> {
        let permit = self.reserve().await?;

        let message = self.last_request_id.write(|last| {
            *last += 1;
            let message = OutboundMessage::new(action, modifier, *last);
            permit.send(message.clone());
            message
        });

        tracing::debug!(
            request_id = message.request_id,
            action = %message.action,
            modifier = ?modifier.map(|m| m.as_str()),
            "Queued command"
        );
        Ok(message.request_id)
    }

    /// The id the most recent command was sent with.
    pub(crate) fn last_request_id(&self) -> u64 {
        self.last_request_id.get()
    }

    async fn reserve(&self) -> Result<mpsc::Permit<'_, OutboundMessage>, CoreError> {
        let capacity = self.commands.max_capacity();

        match self.overflow {
            OverflowPolicy::Reject => self.commands.try_reserve().map_err(|e| match e {
                TrySendError::Full(()) => CoreError::QueueFull { capacity },
                TrySendError::Closed(()) => CoreError::ChannelClosed,
            }),
            OverflowPolicy::Block { timeout: None } => self
                .commands
                .reserve()
                .await
                .map_err(|_| CoreError::ChannelClosed),
            OverflowPolicy::Block {
                timeout: Some(timeout),
            } => match tokio::time::timeout(timeout, self.commands.reserve()).await {
                Ok(permit) => permit.map_err(|_| CoreError::ChannelClosed),
                Err(_) => {
                    tracing::warn!(
                        capacity,
                        timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                        "Outbound queue still full after timeout, dropping command"
                    );
                    Err(CoreError::QueueFull { capacity })
                }
            },
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
