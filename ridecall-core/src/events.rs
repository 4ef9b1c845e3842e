//! Server-to-client signaling events.
//!
//! One tagged enum covers replies to the requesting connection and room
//! broadcasts; the `type` tag is the wire event name. Field names follow
//! the client protocol (camelCase), matching what the mesh path relays
//! verbatim.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::engine::{MediaKind, RouterCapabilities, TransportParameters};
use crate::models::{ConsumerId, ParticipantId, ProducerId, RideId, RoomId, Role, TransportId};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// Reply to `join_ride`: the ride's routing capabilities.
    RouterCapabilities { capabilities: RouterCapabilities },

    /// Broadcast to a ride when a participant joins.
    UserJoined { user_id: ParticipantId, role: Role },

    /// Broadcast to a room when a participant leaves.
    UserLeft { user_id: ParticipantId },

    /// Reply to `share_ride`.
    ShareLinkGenerated { link: String },

    /// Reply to a `join_shared_ride` with a link that resolved.
    JoinedSharedRide { ride_id: RideId },

    /// Reply to a `join_shared_ride` with a link that did not resolve.
    InvalidLink,

    /// Reply to `create_transport`.
    TransportCreated {
        transport_id: TransportId,
        parameters: TransportParameters,
    },

    /// Reply to a `create_transport` that failed.
    TransportError { error: String },

    /// Reply to `produce`.
    ProducerCreated { producer_id: ProducerId },

    /// Reply to a `produce` that failed.
    ProduceError { error: String },

    /// Broadcast to the ride's other participants once a producer is
    /// registered and consumable.
    NewProducer {
        producer_id: ProducerId,
        user_id: ParticipantId,
        kind: MediaKind,
    },

    /// Reply to `consume`.
    ConsumerCreated {
        consumer_id: ConsumerId,
        producer_id: ProducerId,
    },

    /// Reply to a `consume` that failed.
    ConsumeError { error: String },

    /// Typed error reply for operations without a dedicated error event.
    RideError { code: String, error: String },

    /// Mesh relay: SDP offer forwarded to room peers.
    Offer { room_id: RoomId, sdp: Value, from: ParticipantId },

    /// Mesh relay: SDP answer forwarded to room peers.
    Answer { room_id: RoomId, sdp: Value, from: ParticipantId },

    /// Mesh relay: validated ICE candidate forwarded to room peers.
    Candidate {
        room_id: RoomId,
        candidate: Value,
        from: ParticipantId,
    },

    /// Mesh relay: a peer asks the room for a fresh offer.
    #[serde(rename = "requestOffer")]
    RequestOffer { room_id: RoomId, from: ParticipantId },

    /// Broadcast to a mesh room when a peer joins it.
    PeerJoined { user_id: ParticipantId },
}

impl ServerEvent {
    /// Wire event name, for logs.
    #[must_use]
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::RouterCapabilities { .. } => "router_capabilities",
            Self::UserJoined { .. } => "user_joined",
            Self::UserLeft { .. } => "user_left",
            Self::ShareLinkGenerated { .. } => "share_link_generated",
            Self::JoinedSharedRide { .. } => "joined_shared_ride",
            Self::InvalidLink => "invalid_link",
            Self::TransportCreated { .. } => "transport_created",
            Self::TransportError { .. } => "transport_error",
            Self::ProducerCreated { .. } => "producer_created",
            Self::ProduceError { .. } => "produce_error",
            Self::NewProducer { .. } => "new_producer",
            Self::ConsumerCreated { .. } => "consumer_created",
            Self::ConsumeError { .. } => "consume_error",
            Self::RideError { .. } => "ride_error",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::Candidate { .. } => "candidate",
            Self::RequestOffer { .. } => "requestOffer",
            Self::PeerJoined { .. } => "peer_joined",
        }
    }
}
