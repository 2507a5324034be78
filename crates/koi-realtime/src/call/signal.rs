//! Call signaling events.
//!
//! The `payload` fields carry the media negotiation blob. The client core
//! never interprets it; it is forwarded verbatim to the
//! [`MediaNegotiator`](crate::call::negotiator::MediaNegotiator).

use serde::{Deserialize, Serialize};

use koi_core::types::{CallId, UserId};

use super::session::CallType;

/// A discrete call signaling event, inbound or outbound.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum CallSignal {
    /// A call offer.
    Offer {
        /// Call identifier.
        call_id: CallId,
        /// Caller.
        from: UserId,
        /// Voice or video.
        call_type: CallType,
        /// Whether this is a group call.
        is_group: bool,
        /// Initial group membership.
        #[serde(default)]
        participants: Vec<UserId>,
        /// Opaque negotiation payload.
        payload: serde_json::Value,
    },
    /// The callee accepted.
    Accept {
        /// Call identifier.
        call_id: CallId,
        /// Accepting party.
        from: UserId,
        /// Opaque negotiation payload.
        payload: serde_json::Value,
    },
    /// The callee declined.
    Decline {
        /// Call identifier.
        call_id: CallId,
        /// Declining party.
        from: UserId,
    },
    /// A party hung up.
    End {
        /// Call identifier.
        call_id: CallId,
        /// Ending party.
        from: UserId,
    },
    /// A participant joined a group call.
    ParticipantJoined {
        /// Call identifier.
        call_id: CallId,
        /// Joining participant.
        user_id: UserId,
    },
    /// A participant left a group call.
    ParticipantLeft {
        /// Call identifier.
        call_id: CallId,
        /// Leaving participant.
        user_id: UserId,
    },
}
