//! End-to-end signaling scenarios driven through the gateway dispatch,
//! with the in-process engine standing in for the SFU.

use std::sync::Arc;

use ridecall_core::config::EngineConfig;
use ridecall_core::engine::{FakeMediaEngine, MediaEngine, WorkerPool};
use ridecall_core::events::ServerEvent;
use ridecall_core::hub::{EventReceiver, MessageHub};
use ridecall_core::link::LinkService;
use ridecall_core::models::{ParticipantId, ProducerId, RideId, Role};
use ridecall_core::registry::MediaRegistry;
use ridecall_core::ride::RideService;
use ridecall_signaling::{ClientMessage, Gateway};

struct Harness {
    gateway: Gateway,
    engine: Arc<FakeMediaEngine>,
    hub: Arc<MessageHub>,
    registry: Arc<MediaRegistry>,
}

async fn harness() -> Harness {
    let engine = Arc::new(FakeMediaEngine::new());
    let pool = Arc::new(
        WorkerPool::start(engine.as_ref(), 2)
            .await
            .expect("pool start"),
    );
    let registry = Arc::new(MediaRegistry::new());
    let hub = Arc::new(MessageHub::new());
    let links = Arc::new(LinkService::new());
    let rides = Arc::new(RideService::new(
        engine.clone() as Arc<dyn MediaEngine>,
        pool,
        Arc::clone(&registry),
        Arc::clone(&hub),
        links,
        &EngineConfig::default(),
    ));
    let gateway = Gateway::new(rides, Arc::clone(&hub));
    Harness {
        gateway,
        engine,
        hub,
        registry,
    }
}

fn connect(harness: &Harness, id: &str) -> (ParticipantId, EventReceiver) {
    let participant = ParticipantId::from(id);
    let rx = harness.hub.register(participant.clone());
    (participant, rx)
}

fn msg(json: serde_json::Value) -> ClientMessage {
    serde_json::from_value(json).expect("valid client message")
}

async fn recv(rx: &mut EventReceiver) -> ServerEvent {
    tokio::time::timeout(std::time::Duration::from_secs(1), rx.recv())
        .await
        .expect("event within deadline")
        .expect("channel open")
}

#[tokio::test]
async fn test_driver_and_rider_negotiate_a_ride() {
    let h = harness().await;
    let (a, mut rx_a) = connect(&h, "A");
    let (b, mut rx_b) = connect(&h, "B");

    // A joins ride r1 as driver and receives router capabilities.
    h.gateway
        .handle(&a, msg(serde_json::json!({"type": "join_ride", "rideId": "r1", "role": "driver"})))
        .await;
    assert!(matches!(
        recv(&mut rx_a).await,
        ServerEvent::RouterCapabilities { .. }
    ));

    // B joins as rider: B gets capabilities, A gets user_joined {userId: B}.
    h.gateway
        .handle(&b, msg(serde_json::json!({"type": "join_ride", "rideId": "r1", "role": "rider"})))
        .await;
    assert!(matches!(
        recv(&mut rx_b).await,
        ServerEvent::RouterCapabilities { .. }
    ));
    match recv(&mut rx_a).await {
        ServerEvent::UserJoined { user_id, role } => {
            assert_eq!(user_id, b);
            assert_eq!(role, Role::Rider);
        }
        other => panic!("expected user_joined, got {other:?}"),
    }

    // Exactly one routing context exists even though both joined.
    assert_eq!(h.registry.stats().routers, 1);
    assert_eq!(h.engine.create_router_calls(), 1);

    // Both negotiate transports.
    for (participant, rx) in [(&a, &mut rx_a), (&b, &mut rx_b)] {
        h.gateway
            .handle(
                participant,
                msg(serde_json::json!({"type": "create_transport", "rideId": "r1"})),
            )
            .await;
        assert!(matches!(
            recv(rx).await,
            ServerEvent::TransportCreated { .. }
        ));
    }

    // A produces video: A gets producer_created, B gets new_producer.
    h.gateway
        .handle(
            &a,
            msg(serde_json::json!({
                "type": "produce",
                "rideId": "r1",
                "kind": "video",
                "rtpParameters": {"codecs": []},
            })),
        )
        .await;
    let produced = match recv(&mut rx_a).await {
        ServerEvent::ProducerCreated { producer_id } => producer_id,
        other => panic!("expected producer_created, got {other:?}"),
    };
    let announced = match recv(&mut rx_b).await {
        ServerEvent::NewProducer {
            producer_id,
            user_id,
            kind,
        } => {
            assert_eq!(user_id, a);
            assert_eq!(kind, ridecall_core::engine::MediaKind::Video);
            producer_id
        }
        other => panic!("expected new_producer, got {other:?}"),
    };
    assert_eq!(produced, announced);

    // B consumes the announced producer immediately; the broadcast
    // happens-after registration, so the lookup must succeed.
    h.gateway
        .handle(
            &b,
            msg(serde_json::json!({
                "type": "consume",
                "rideId": "r1",
                "producerId": announced.as_str(),
                "rtpCapabilities": {"codecs": []},
            })),
        )
        .await;
    match recv(&mut rx_b).await {
        ServerEvent::ConsumerCreated { producer_id, .. } => assert_eq!(producer_id, announced),
        other => panic!("expected consumer_created, got {other:?}"),
    }
}

#[tokio::test]
async fn test_produce_before_transport_is_rejected_without_engine_call() {
    let h = harness().await;
    let (a, mut rx_a) = connect(&h, "A");

    h.gateway
        .handle(&a, msg(serde_json::json!({"type": "join_ride", "rideId": "r1", "role": "driver"})))
        .await;
    let _ = recv(&mut rx_a).await; // router_capabilities

    h.gateway
        .handle(
            &a,
            msg(serde_json::json!({
                "type": "produce",
                "rideId": "r1",
                "kind": "audio",
                "rtpParameters": {},
            })),
        )
        .await;

    match recv(&mut rx_a).await {
        ServerEvent::ProduceError { error } => {
            assert!(error.contains("No transport"), "unexpected message: {error}");
        }
        other => panic!("expected produce_error, got {other:?}"),
    }
    assert_eq!(h.engine.produce_calls(), 0);
}

#[tokio::test]
async fn test_consume_removed_producer_is_rejected() {
    let h = harness().await;
    let (a, mut rx_a) = connect(&h, "A");

    h.gateway
        .handle(&a, msg(serde_json::json!({"type": "join_ride", "rideId": "r1", "role": "rider"})))
        .await;
    let _ = recv(&mut rx_a).await;
    h.gateway
        .handle(&a, msg(serde_json::json!({"type": "create_transport", "rideId": "r1"})))
        .await;
    let _ = recv(&mut rx_a).await;

    // Producer id that never existed (equivalently: removed between the
    // broadcast and this consume).
    h.gateway
        .handle(
            &a,
            msg(serde_json::json!({
                "type": "consume",
                "rideId": "r1",
                "producerId": ProducerId::new().as_str(),
                "rtpCapabilities": {},
            })),
        )
        .await;

    assert!(matches!(
        recv(&mut rx_a).await,
        ServerEvent::ConsumeError { .. }
    ));
    assert_eq!(h.registry.stats().consumers, 0);
}

#[tokio::test]
async fn test_share_link_flow() {
    let h = harness().await;
    let (a, mut rx_a) = connect(&h, "A");
    let (b, mut rx_b) = connect(&h, "B");

    h.gateway
        .handle(&a, msg(serde_json::json!({"type": "share_ride", "rideId": "actual_ride_id"})))
        .await;
    let link = match recv(&mut rx_a).await {
        ServerEvent::ShareLinkGenerated { link } => link,
        other => panic!("expected share_link_generated, got {other:?}"),
    };

    h.gateway
        .handle(&b, msg(serde_json::json!({"type": "join_shared_ride", "link": link})))
        .await;
    match recv(&mut rx_b).await {
        ServerEvent::JoinedSharedRide { ride_id } => {
            assert_eq!(ride_id, RideId::from("actual_ride_id"));
        }
        other => panic!("expected joined_shared_ride, got {other:?}"),
    }

    h.gateway
        .handle(&b, msg(serde_json::json!({"type": "join_shared_ride", "link": "invalid_link"})))
        .await;
    assert!(matches!(recv(&mut rx_b).await, ServerEvent::InvalidLink));
}

#[tokio::test]
async fn test_leave_ride_notifies_and_cleans_up() {
    let h = harness().await;
    let (a, mut rx_a) = connect(&h, "A");
    let (b, mut rx_b) = connect(&h, "B");

    for (participant, rx) in [(&a, &mut rx_a), (&b, &mut rx_b)] {
        h.gateway
            .handle(
                participant,
                msg(serde_json::json!({"type": "join_ride", "rideId": "r1", "role": "rider"})),
            )
            .await;
        let _ = recv(rx).await;
    }
    let _ = recv(&mut rx_a).await; // user_joined for B

    h.gateway
        .handle(&a, msg(serde_json::json!({"type": "leave_ride"})))
        .await;
    match recv(&mut rx_b).await {
        ServerEvent::UserLeft { user_id } => assert_eq!(user_id, a),
        other => panic!("expected user_left, got {other:?}"),
    }

    // B disconnects: ride is now empty, routing context closed.
    h.gateway.handle_disconnect(&b).await;
    assert_eq!(h.registry.stats().routers, 0);
    assert_eq!(h.engine.close_router_calls(), 1);
    assert_eq!(h.hub.connection_count(), 1); // only A's channel remains
}

#[tokio::test]
async fn test_mesh_candidate_validation_and_relay() {
    let h = harness().await;
    let (a, mut rx_a) = connect(&h, "A");
    let (b, mut rx_b) = connect(&h, "B");

    for participant in [&a, &b] {
        h.gateway
            .handle(
                participant,
                msg(serde_json::json!({"type": "joinRoom", "roomId": "mesh-1"})),
            )
            .await;
    }
    let _ = recv(&mut rx_a).await; // peer_joined for B

    // Malformed candidate (missing sdpMid/sdpMlineIndex): dropped.
    h.gateway
        .handle(
            &a,
            msg(serde_json::json!({
                "type": "candidate",
                "roomId": "mesh-1",
                "candidate": {"candidate": "candidate:1 1 UDP ..."},
            })),
        )
        .await;
    assert!(rx_b.try_recv().is_err());

    // Well-formed candidate: relayed to B, not echoed to A.
    h.gateway
        .handle(
            &a,
            msg(serde_json::json!({
                "type": "candidate",
                "roomId": "mesh-1",
                "candidate": {"candidate": "candidate:1 1 UDP ...", "sdpMid": "0"},
            })),
        )
        .await;
    match recv(&mut rx_b).await {
        ServerEvent::Candidate { candidate, from, .. } => {
            assert_eq!(candidate["sdpMid"], "0");
            assert_eq!(from, a);
        }
        other => panic!("expected candidate, got {other:?}"),
    }
    assert!(rx_a.try_recv().is_err());

    // Offer/answer relay carries the structured {sdp, roomId} payload.
    h.gateway
        .handle(
            &b,
            msg(serde_json::json!({
                "type": "offer",
                "roomId": "mesh-1",
                "sdp": {"type": "offer", "sdp": "v=0..."},
            })),
        )
        .await;
    match recv(&mut rx_a).await {
        ServerEvent::Offer { room_id, sdp, from } => {
            assert_eq!(room_id.as_str(), "mesh-1");
            assert_eq!(sdp["type"], "offer");
            assert_eq!(from, b);
        }
        other => panic!("expected offer, got {other:?}"),
    }
}

#[tokio::test]
async fn test_malformed_frame_gets_typed_error_reply() {
    let h = harness().await;
    let (a, mut rx_a) = connect(&h, "A");

    // The ws layer calls reject_malformed when a frame fails to decode.
    h.gateway.reject_malformed(&a);
    match recv(&mut rx_a).await {
        ServerEvent::RideError { code, .. } => assert_eq!(code, "bad_message"),
        other => panic!("expected ride_error, got {other:?}"),
    }
}
