//! Call session state.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use koi_core::types::{CallId, UserId};

/// Voice or video call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallType {
    /// Audio only.
    Voice,
    /// Audio and video.
    Video,
}

/// Call session status.
///
/// Transitions follow a fixed graph; see [`crate::call::machine::CallMachine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// No active call.
    Idle,
    /// Local user placed a call, waiting for the remote party.
    RingingOutgoing,
    /// Remote party is calling, waiting for a local answer.
    RingingIncoming,
    /// Call in progress.
    Connected,
    /// Call finished; resets to `Idle` after the teardown delay.
    Ended,
}

impl CallStatus {
    /// Whether the session is ringing or connected.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::RingingOutgoing | Self::RingingIncoming | Self::Connected
        )
    }
}

/// Why a call reached `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Local user ended the call.
    Local,
    /// Remote party ended the call.
    Remote,
    /// The call was declined.
    Declined,
    /// The ring window expired without an answer.
    Timeout,
}

/// Local toggle flags. Consumed by the presentation layer; the machine
/// only records them.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallFlags {
    /// Microphone muted.
    pub muted: bool,
    /// Camera enabled.
    pub video_on: bool,
    /// Speakerphone enabled.
    pub speaker_on: bool,
    /// Call UI minimized.
    pub minimized: bool,
}

/// The state of one call session.
///
/// `duration_seconds` only increments while `status` is `Connected`;
/// `participants` is non-empty only for group calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallSession {
    /// Call identifier.
    pub id: Option<CallId>,
    /// Voice or video.
    pub call_type: CallType,
    /// Current status.
    pub status: CallStatus,
    /// Whether this is a group call.
    pub is_group: bool,
    /// Group call membership, from signaling metadata.
    pub participants: HashSet<UserId>,
    /// Local toggle flags.
    pub flags: CallFlags,
    /// Connected time in whole seconds.
    pub duration_seconds: u64,
    /// The remote party (for one-to-one calls).
    pub remote_user: Option<UserId>,
    /// Terminal reason, set on `Ended`.
    pub end_reason: Option<EndReason>,
}

impl CallSession {
    /// An idle session with all fields cleared.
    pub fn idle() -> Self {
        Self {
            id: None,
            call_type: CallType::Voice,
            status: CallStatus::Idle,
            is_group: false,
            participants: HashSet::new(),
            flags: CallFlags::default(),
            duration_seconds: 0,
            remote_user: None,
            end_reason: None,
        }
    }
}

impl Default for CallSession {
    fn default() -> Self {
        Self::idle()
    }
}

/// A point-in-time copy of the session, published on every state change.
pub type CallSnapshot = CallSession;
