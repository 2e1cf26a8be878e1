// ── Runtime client configuration ──
//
// These types describe *how* to reach the meeting application and how
// hard to try. They carry the pairing token but never touch disk: the
// CLI (or any embedder) builds a `ClientConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;

use teamslink_api::DeviceIdentity;
use teamslink_api::channel::{DEFAULT_INBOUND_CAPACITY, DEFAULT_OUTBOUND_CAPACITY};

/// Delay between attempts under the default fixed policy.
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// How long a blocked `send` waits for queue space by default.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(2);

// ── ReconnectConfig ──────────────────────────────────────────────────

/// Delay schedule between connection attempts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectStrategy {
    /// Same delay every time.
    Fixed { delay: Duration },
    /// `min(initial * 2^attempt, max)` with +-25% deterministic jitter.
    Exponential {
        initial_delay: Duration,
        max_delay: Duration,
    },
}

/// Reconnection policy for the supervisor.
///
/// The default is unconditional, unlimited, fixed 500 ms retry: the peer
/// is a local process, so there is nothing to back off from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub strategy: ReconnectStrategy,

    /// Consecutive failed attempts before giving up.
    /// `None` means retry forever.
    pub max_retries: Option<u32>,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            strategy: ReconnectStrategy::Fixed {
                delay: DEFAULT_RECONNECT_DELAY,
            },
            max_retries: None,
        }
    }
}

impl ReconnectConfig {
    /// Delay to wait before the attempt following `attempt` consecutive failures.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self.strategy {
            ReconnectStrategy::Fixed { delay } => delay,
            ReconnectStrategy::Exponential {
                initial_delay,
                max_delay,
            } => exponential_backoff(attempt, initial_delay, max_delay),
        }
    }
}

/// Exponential backoff with jitter.
///
/// `delay = min(initial * 2^attempt, max) * (1 +- 0.25)`
///
/// Jitter is seeded from the attempt number so it is reproducible.
fn exponential_backoff(attempt: u32, initial: Duration, max: Duration) -> Duration {
    let exponent = i32::try_from(attempt.min(30)).unwrap_or(30);
    let base = initial.as_secs_f64() * 2.0_f64.powi(exponent);
    let capped = base.min(max.as_secs_f64());

    let jitter_factor = 1.0 + 0.25 * (f64::from(attempt) * 7.3).sin();
    let with_jitter = (capped * jitter_factor).max(0.0);

    Duration::from_secs_f64(with_jitter)
}

// ── QueueConfig ──────────────────────────────────────────────────────

/// What `send` does when the outbound queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Fail immediately with `CoreError::QueueFull`.
    Reject,
    /// Wait for space; `None` waits indefinitely.
    Block { timeout: Option<Duration> },
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        Self::Block {
            timeout: Some(DEFAULT_SEND_TIMEOUT),
        }
    }
}

/// Sizing of the duplex channel pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueConfig {
    /// Commands buffered while no connection is writing.
    pub outbound_capacity: usize,
    /// Frames buffered between the reader and the router.
    pub inbound_capacity: usize,
    pub overflow: OverflowPolicy,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            outbound_capacity: DEFAULT_OUTBOUND_CAPACITY,
            inbound_capacity: DEFAULT_INBOUND_CAPACITY,
            overflow: OverflowPolicy::default(),
        }
    }
}

// ── ClientConfig ─────────────────────────────────────────────────────

/// Everything a [`Client`](crate::Client) needs to run.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub identity: DeviceIdentity,
    /// Local port; `0` selects the default (8124).
    pub port: u16,
    /// Pairing token from a previous session, if any.
    pub token: Option<SecretString>,
    /// Keep reconnecting after the first connection ends.
    pub auto_reconnect: bool,
    pub reconnect: ReconnectConfig,
    pub queue: QueueConfig,
    /// End the active connection on SIGINT / SIGTERM.
    pub handle_os_signals: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            identity: DeviceIdentity::default(),
            port: 0,
            token: None,
            auto_reconnect: true,
            reconnect: ReconnectConfig::default(),
            queue: QueueConfig::default(),
            handle_os_signals: true,
        }
    }
}
