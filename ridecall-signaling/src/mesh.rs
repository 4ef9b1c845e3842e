//! Mesh-relay signaling.
//!
//! A store-less relay for peers negotiating directly with each other:
//! offers, answers and candidates are forwarded to the other room members
//! verbatim. No routing context, transport or producer bookkeeping — the
//! only state is room membership in the hub.

use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

use ridecall_core::error::{Error, Result};
use ridecall_core::events::ServerEvent;
use ridecall_core::hub::MessageHub;
use ridecall_core::models::{ParticipantId, RoomId};

pub struct MeshRelay {
    hub: Arc<MessageHub>,
}

impl MeshRelay {
    #[must_use]
    pub fn new(hub: Arc<MessageHub>) -> Self {
        Self { hub }
    }

    /// Enter a relay room and announce the new peer to the others.
    pub fn join_room(&self, room_id: RoomId, connection_id: &ParticipantId) {
        self.hub.join_room(room_id.clone(), connection_id);
        debug!(room_id = %room_id, connection_id = %connection_id, "peer joined mesh room");
        self.hub.broadcast_except(
            &room_id,
            connection_id,
            &ServerEvent::PeerJoined {
                user_id: connection_id.clone(),
            },
        );
    }

    /// Relay an SDP offer to the other room members.
    pub fn offer(&self, room_id: RoomId, sdp: Value, from: &ParticipantId) {
        let event = ServerEvent::Offer {
            room_id: room_id.clone(),
            sdp,
            from: from.clone(),
        };
        self.hub.broadcast_except(&room_id, from, &event);
    }

    /// Relay an SDP answer to the other room members.
    pub fn answer(&self, room_id: RoomId, sdp: Value, from: &ParticipantId) {
        let event = ServerEvent::Answer {
            room_id: room_id.clone(),
            sdp,
            from: from.clone(),
        };
        self.hub.broadcast_except(&room_id, from, &event);
    }

    /// Validate and relay an ICE candidate. A malformed candidate is
    /// logged and dropped; the sender gets no reply either way.
    pub fn candidate(&self, room_id: RoomId, candidate: Value, from: &ParticipantId) {
        if let Err(err) = validate_candidate(&candidate) {
            warn!(room_id = %room_id, connection_id = %from, error = %err, "dropping malformed ICE candidate");
            return;
        }
        let event = ServerEvent::Candidate {
            room_id: room_id.clone(),
            candidate,
            from: from.clone(),
        };
        self.hub.broadcast_except(&room_id, from, &event);
    }

    /// Relay an offer request to the other room members.
    pub fn request_offer(&self, room_id: RoomId, from: &ParticipantId) {
        let event = ServerEvent::RequestOffer {
            room_id: room_id.clone(),
            from: from.clone(),
        };
        self.hub.broadcast_except(&room_id, from, &event);
    }
}

/// A relayable candidate needs a non-empty candidate string and a
/// media-line association (`sdpMid` or `sdpMlineIndex`).
pub fn validate_candidate(candidate: &Value) -> Result<()> {
    match candidate.get("candidate").and_then(Value::as_str) {
        Some(s) if !s.is_empty() => {}
        _ => {
            return Err(Error::MalformedCandidate(
                "missing candidate string".to_string(),
            ))
        }
    }

    let has_mid = candidate.get("sdpMid").is_some_and(Value::is_string);
    let has_mline_index = candidate
        .get("sdpMlineIndex")
        .is_some_and(Value::is_number);
    if !has_mid && !has_mline_index {
        return Err(Error::MalformedCandidate(
            "missing media-line association (sdpMid or sdpMlineIndex)".to_string(),
        ));
    }

    Ok(())
}
