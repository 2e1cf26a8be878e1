// ── Guarded state + meeting snapshot cache ──
//
// Every mutable field of the client sits behind its own `Guarded` lock.
// No accessor takes more than one guard, so lock order never matters;
// callers must not assume atomicity across two accessor calls.

use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;
use teamslink_api::{MeetingPermissions, MeetingState, MeetingUpdate};

// ── Guarded ──────────────────────────────────────────────────────────

/// A value behind a read/write lock, accessed only through closures so a
/// guard can never escape or be held across an `.await`.
///
/// Poisoning is ignored: every write is a plain field assignment, so a
/// panicking writer cannot leave the value half-updated.
#[derive(Debug, Default)]
pub struct Guarded<T> {
    inner: RwLock<T>,
}

impl<T> Guarded<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Swap in a new value, returning the old one.
    pub fn replace(&self, value: T) -> T {
        self.write(|slot| std::mem::replace(slot, value))
    }
}

impl<T: Clone> Guarded<T> {
    pub fn get(&self) -> T {
        self.read(T::clone)
    }
}

// ── Snapshot ─────────────────────────────────────────────────────────

/// The last meeting update received, as of the moment it was read.
///
/// There is no freshness guarantee: the value may be arbitrarily old.
/// Send `query-state` and wait for the next update when it matters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    #[serde(flatten)]
    pub update: MeetingUpdate,
    /// Number of updates routed so far; `0` means all fields are defaults.
    pub sequence: u64,
    #[serde(skip)]
    pub received_at: Option<Instant>,
}

impl Snapshot {
    pub fn state(&self) -> &MeetingState {
        &self.update.meeting_state
    }

    pub fn permissions(&self) -> &MeetingPermissions {
        &self.update.meeting_permissions
    }

    /// `false` until the first update arrives.
    pub fn is_populated(&self) -> bool {
        self.sequence > 0
    }

    /// Time since the update was received.
    pub fn age(&self) -> Option<Duration> {
        self.received_at.map(|at| at.elapsed())
    }
}

// ── Flag accessors ───────────────────────────────────────────────────

/// Invokes `$callback!` with the full list of boolean queries.
macro_rules! meeting_flags {
    ($callback:ident) => {
        $callback! {
            /// Local microphone is muted.
            is_muted => meeting_state.is_muted;
            /// Local camera is on.
            is_video_on => meeting_state.is_video_on;
            is_hand_raised => meeting_state.is_hand_raised;
            is_in_meeting => meeting_state.is_in_meeting;
            is_recording_on => meeting_state.is_recording_on;
            is_background_blurred => meeting_state.is_background_blurred;
            /// Local screen or window is being shared.
            is_sharing => meeting_state.is_sharing;
            has_unread_messages => meeting_state.has_unread_messages;
            can_toggle_mute => meeting_permissions.can_toggle_mute;
            can_toggle_video => meeting_permissions.can_toggle_video;
            /// Raising and lowering share the `canToggleHand` permission.
            can_raise_hand => meeting_permissions.can_toggle_hand;
            can_toggle_blur => meeting_permissions.can_toggle_blur;
            can_leave => meeting_permissions.can_leave;
            can_react => meeting_permissions.can_react;
            can_toggle_share_tray => meeting_permissions.can_toggle_share_tray;
            can_toggle_chat => meeting_permissions.can_toggle_chat;
            can_stop_sharing => meeting_permissions.can_stop_sharing;
            can_pair => meeting_permissions.can_pair;
        }
    };
}

/// Expands a flag list into `pub fn name(&self) -> bool` methods that
/// delegate to `self.read_flag`.
macro_rules! flag_accessors {
    ($( $(#[$doc:meta])* $name:ident => $section:ident . $field:ident; )*) => {
        $(
            $(#[$doc])*
            pub fn $name(&self) -> bool {
                self.read_flag(|update| update.$section.$field)
            }
        )*
    };
}

pub(crate) use {flag_accessors, meeting_flags};

// ── StateCache ───────────────────────────────────────────────────────

/// Last known meeting state, updated by the router.
#[derive(Debug, Default)]
pub struct StateCache {
    snapshot: Guarded<Snapshot>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of the current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot.get()
    }

    /// Replace the snapshot with a freshly received update.
    pub fn apply(&self, update: MeetingUpdate) -> Snapshot {
        self.snapshot.write(|snapshot| {
            *snapshot = Snapshot {
                update,
                sequence: snapshot.sequence + 1,
                received_at: Some(Instant::now()),
            };
            *snapshot
        })
    }

    pub(crate) fn read_flag(&self, f: impl FnOnce(&MeetingUpdate) -> bool) -> bool {
        self.snapshot.read(|snapshot| f(&snapshot.update))
    }

    meeting_flags!(flag_accessors);
}

// ── Tests ────────────────────────────────────────────────────────────
