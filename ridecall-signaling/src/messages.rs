//! Client-to-server messages.
//!
//! One tagged enum for both protocols carried on the socket: the
//! SFU-backed ride protocol (snake_case event names) and the mesh-relay
//! protocol (camelCase names kept from its wire format). Engine payloads
//! and SDP blobs stay opaque JSON.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use ridecall_core::engine::{MediaKind, RtpCapabilities, RtpParameters};
use ridecall_core::models::{ProducerId, RideId, RoomId, Role};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    /// Join a ride and receive its routing capabilities.
    JoinRide { ride_id: RideId, role: Role },

    /// Request a shareable link for a ride.
    ShareRide { ride_id: RideId },

    /// Join a ride through a share link.
    JoinSharedRide { link: String },

    /// Leave every joined room and release ride resources.
    LeaveRide,

    /// Negotiate this connection's transport for a ride.
    CreateTransport { ride_id: RideId },

    /// Publish an outgoing stream.
    Produce {
        ride_id: RideId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    },

    /// Subscribe to a remote producer's stream.
    Consume {
        ride_id: RideId,
        producer_id: ProducerId,
        rtp_capabilities: RtpCapabilities,
    },

    /// Mesh: enter a relay room.
    #[serde(rename = "joinRoom")]
    JoinRoom { room_id: RoomId },

    /// Mesh: relay an SDP offer to the room.
    Offer { room_id: RoomId, sdp: Value },

    /// Mesh: relay an SDP answer to the room.
    Answer { room_id: RoomId, sdp: Value },

    /// Mesh: relay an ICE candidate to the room (validated first).
    Candidate { room_id: RoomId, candidate: Value },

    /// Mesh: ask the room's peers for a fresh offer.
    #[serde(rename = "requestOffer")]
    RequestOffer { room_id: RoomId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_ride_wire_shape() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"join_ride","rideId":"r1","role":"driver"}"#).unwrap();
        match msg {
            ClientMessage::JoinRide { ride_id, role } => {
                assert_eq!(ride_id.as_str(), "r1");
                assert_eq!(role, Role::Driver);
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_leave_ride_has_no_payload() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"leave_ride"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::LeaveRide));
    }

    #[test]
    fn test_produce_carries_opaque_parameters() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"produce","rideId":"r1","kind":"video","rtpParameters":{"codecs":[{"mimeType":"video/VP8"}]}}"#,
        )
        .unwrap();
        match msg {
            ClientMessage::Produce {
                kind,
                rtp_parameters,
                ..
            } => {
                assert_eq!(kind, MediaKind::Video);
                assert!(rtp_parameters.0["codecs"].is_array());
            }
            other => panic!("unexpected message {other:?}"),
        }
    }

    #[test]
    fn test_mesh_names_stay_camel_case() {
        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"joinRoom","roomId":"room-7"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::JoinRoom { .. }));

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type":"requestOffer","roomId":"room-7"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::RequestOffer { .. }));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"mute_all"}"#).is_err());
    }
}
