//! Ride orchestration.
//!
//! Drives the SFU negotiation protocol per participant: join (routing
//! capabilities), transport negotiation, produce, consume, leave. Every
//! operation translates into registry reads/writes around engine calls;
//! peers are notified through the room hub, always after the registry
//! mutation that makes the notification actionable has committed.

use dashmap::{DashMap, DashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::engine::{
    CodecProfile, ConsumerHandle, MediaEngine, MediaKind, RouterCapabilities, RtpCapabilities,
    RtpParameters, TransportHandle, TransportOptions, TransportState, WorkerPool,
};
use crate::error::{Error, Result};
use crate::events::ServerEvent;
use crate::hub::MessageHub;
use crate::link::LinkService;
use crate::models::{ParticipantId, ProducerId, RideId, RoomId, Role, TransportId};
use crate::registry::MediaRegistry;

pub struct RideService {
    engine: Arc<dyn MediaEngine>,
    pool: Arc<WorkerPool>,
    registry: Arc<MediaRegistry>,
    hub: Arc<MessageHub>,
    links: Arc<LinkService>,
    codec_profile: CodecProfile,
    transport_options: TransportOptions,
    call_timeout: Duration,
    roles: DashMap<(RideId, ParticipantId), Role>,
    watched_transports: Arc<DashSet<TransportId>>,
}

impl RideService {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        pool: Arc<WorkerPool>,
        registry: Arc<MediaRegistry>,
        hub: Arc<MessageHub>,
        links: Arc<LinkService>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            engine,
            pool,
            registry,
            hub,
            links,
            codec_profile: CodecProfile::default(),
            transport_options: TransportOptions {
                listen_ip: config.listen_ip.clone(),
                announced_ip: config.announced_ip.clone(),
                initial_available_outgoing_bitrate: config.initial_available_outgoing_bitrate,
            },
            call_timeout: Duration::from_secs(config.call_timeout_secs),
            roles: DashMap::new(),
            watched_transports: Arc::new(DashSet::new()),
        }
    }

    /// Bound an engine call so a hung engine stalls one request, not the
    /// connection's whole task queue.
    async fn engine_call<T>(&self, call: impl Future<Output = Result<T>> + Send) -> Result<T> {
        match timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::EngineTimeout),
        }
    }

    /// Join a ride: resolve or create its routing context, enter the
    /// ride's room, and tell the other members.
    pub async fn join(
        &self,
        ride_id: &RideId,
        participant_id: &ParticipantId,
        role: Role,
    ) -> Result<RouterCapabilities> {
        let worker = self.pool.worker_for(ride_id)?;

        let router = self
            .registry
            .get_or_create_router(ride_id, || async {
                self.engine_call(self.engine.create_router(&worker, &self.codec_profile))
                    .await
            })
            .await?;

        let room = RoomId::from(ride_id);
        self.hub.join_room(room.clone(), participant_id);
        self.roles
            .insert((ride_id.clone(), participant_id.clone()), role);

        info!(ride_id = %ride_id, participant_id = %participant_id, role = role.as_str(), "participant joined ride");

        self.hub.broadcast_except(
            &room,
            participant_id,
            &ServerEvent::UserJoined {
                user_id: participant_id.clone(),
                role,
            },
        );

        Ok(router.capabilities.clone())
    }

    /// Negotiate the participant's transport for a ride, creating it on
    /// first request. Requires a prior `join` (the routing context must
    /// exist).
    pub async fn create_transport(
        &self,
        ride_id: &RideId,
        participant_id: &ParticipantId,
    ) -> Result<Arc<TransportHandle>> {
        self.pool.worker_for(ride_id)?;

        let router = self.registry.get_router(ride_id).ok_or_else(|| {
            Error::TransportCreationFailed(format!("no routing context for ride {ride_id}; join first"))
        })?;

        let transport = self
            .registry
            .get_or_create_transport(&router.id, participant_id, || async {
                self.engine_call(self.engine.create_transport(&router, &self.transport_options))
                    .await
            })
            .await?;

        if self.watched_transports.insert(transport.id.clone()) {
            self.spawn_close_watch(Arc::clone(&transport), participant_id.clone());
        }

        Ok(transport)
    }

    /// Registry cleanup when a transport reaches terminal closure: the
    /// participant's entries go, nobody else's do.
    fn spawn_close_watch(&self, transport: Arc<TransportHandle>, participant_id: ParticipantId) {
        let registry = Arc::clone(&self.registry);
        let watched = Arc::clone(&self.watched_transports);
        tokio::spawn(async move {
            let mut state = transport.state_watch();
            loop {
                if *state.borrow() == TransportState::Closed {
                    break;
                }
                // A dropped sender means the engine side is gone; treat it
                // as closed and clean up.
                if state.changed().await.is_err() {
                    break;
                }
            }
            debug!(transport_id = %transport.id, participant_id = %participant_id, "transport closed, removing participant entries");
            registry.remove_participant(&transport.router_id, &participant_id);
            watched.remove(&transport.id);
        });
    }

    /// Publish the participant's outgoing stream. The `new_producer`
    /// notification goes out only after the producer is registered, so a
    /// peer reacting to it can always resolve the producer.
    pub async fn produce(
        &self,
        ride_id: &RideId,
        participant_id: &ParticipantId,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerId> {
        self.pool.worker_for(ride_id)?;

        let router = self
            .registry
            .get_router(ride_id)
            .ok_or_else(|| Error::TransportMissing(participant_id.to_string()))?;
        let transport = self
            .registry
            .get_transport(&router.id, participant_id)
            .ok_or_else(|| Error::TransportMissing(participant_id.to_string()))?;

        let producer = Arc::new(
            self.engine_call(self.engine.produce(&transport, kind, rtp_parameters))
                .await?,
        );
        self.registry
            .insert_producer(ride_id, participant_id, Arc::clone(&producer));

        info!(ride_id = %ride_id, participant_id = %participant_id, producer_id = %producer.id, kind = kind.as_str(), "producer created");

        self.hub.broadcast_except(
            &RoomId::from(ride_id),
            participant_id,
            &ServerEvent::NewProducer {
                producer_id: producer.id.clone(),
                user_id: participant_id.clone(),
                kind,
            },
        );

        Ok(producer.id.clone())
    }

    /// Subscribe the participant to a remote producer's stream.
    pub async fn consume(
        &self,
        ride_id: &RideId,
        participant_id: &ParticipantId,
        producer_id: &ProducerId,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<Arc<ConsumerHandle>> {
        self.pool.worker_for(ride_id)?;

        let router = self
            .registry
            .get_router(ride_id)
            .ok_or_else(|| Error::TransportMissing(participant_id.to_string()))?;
        let transport = self
            .registry
            .get_transport(&router.id, participant_id)
            .ok_or_else(|| Error::TransportMissing(participant_id.to_string()))?;

        let producer = self
            .registry
            .find_producer(ride_id, producer_id)
            .ok_or_else(|| Error::ProducerMissing(producer_id.to_string()))?;

        let consumer = self
            .engine_call(self.engine.consume(&transport, &producer.id, rtp_capabilities))
            .await?;

        // The producer may have been torn down while the engine call was
        // in flight; never install a consumer for a dead producer.
        if self.registry.find_producer(ride_id, producer_id).is_none() {
            return Err(Error::ProducerMissing(producer_id.to_string()));
        }

        let consumer = Arc::new(consumer);
        self.registry
            .insert_consumer(ride_id, participant_id, Arc::clone(&consumer));

        info!(ride_id = %ride_id, participant_id = %participant_id, consumer_id = %consumer.id, "consumer created");

        Ok(consumer)
    }

    /// Leave every room the connection is in, cleaning up ride resources
    /// and notifying remaining members. Idempotent: a second call finds
    /// no memberships and does nothing.
    pub async fn leave(&self, participant_id: &ParticipantId) {
        for room in self.hub.rooms_of(participant_id) {
            self.hub.leave_room(&room, participant_id);
            self.hub.broadcast(
                &room,
                &ServerEvent::UserLeft {
                    user_id: participant_id.clone(),
                },
            );

            let ride_id = RideId::from(room.as_str());
            if let Some(router) = self.registry.get_router(&ride_id) {
                if let Some(transport) = self.registry.get_transport(&router.id, participant_id) {
                    if let Err(err) = self.engine.close_transport(&transport).await {
                        warn!(transport_id = %transport.id, error = %err, "failed to close transport on leave");
                    }
                }
                self.registry.remove_participant(&router.id, participant_id);
            }
            self.roles
                .remove(&(ride_id.clone(), participant_id.clone()));

            // Last one out closes the routing context; engine resources
            // must not outlive the ride.
            if self.hub.member_count(&room) == 0 {
                if let Some(router) = self.registry.remove_ride(&ride_id) {
                    if let Err(err) = self.engine.close_router(&router).await {
                        warn!(router_id = %router.id, error = %err, "failed to close routing context");
                    }
                    info!(ride_id = %ride_id, router_id = %router.id, "closed routing context for empty ride");
                }
            }
        }
    }

    /// Mint (or re-issue) the ride's share link.
    #[must_use]
    pub fn share(&self, ride_id: &RideId) -> String {
        self.links.generate(ride_id)
    }

    /// Resolve a share link and enter the ride's room.
    pub fn join_shared_ride(
        &self,
        link: &str,
        participant_id: &ParticipantId,
    ) -> Result<RideId> {
        let ride_id = self.links.resolve(link).ok_or(Error::InvalidLink)?;
        self.hub.join_room(RoomId::from(&ride_id), participant_id);
        info!(ride_id = %ride_id, participant_id = %participant_id, "joined ride via share link");
        Ok(ride_id)
    }

    /// Role the participant joined a ride with, if it is a member.
    #[must_use]
    pub fn role_of(&self, ride_id: &RideId, participant_id: &ParticipantId) -> Option<Role> {
        self.roles
            .get(&(ride_id.clone(), participant_id.clone()))
            .map(|entry| *entry.value())
    }
}
