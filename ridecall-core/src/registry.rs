//! Session resource registry.
//!
//! The only shared mutable state in the core: maps ride ids to routing
//! contexts and (routing context, participant) pairs to transports,
//! producers and consumers. All mutation goes through the operation
//! surface below; nothing else may touch the maps.
//!
//! Creation is the one place that needs real atomicity. A plain
//! check-then-create lets two concurrent joins both observe "absent"
//! across the engine-call suspension point and split one ride across two
//! routing contexts, so every get-or-create runs its creation future
//! under a per-key [`CreationGuard`]. Unrelated keys proceed in parallel.

use dashmap::DashMap;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;

use crate::engine::{ConsumerHandle, ProducerHandle, RouterHandle, TransportHandle};
use crate::error::Result;
use crate::models::{ParticipantId, ProducerId, RideId, RouterId};
use crate::singleflight::CreationGuard;

/// Key of a transport: participant scoped to a routing context.
pub type TransportKey = (RouterId, ParticipantId);

/// Key of a producer or consumer: participant scoped to a ride.
pub type MediaKey = (RideId, ParticipantId);

/// Registry entry counts, served on the stats endpoint.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RegistryStats {
    pub routers: usize,
    pub transports: usize,
    pub producers: usize,
    pub consumers: usize,
}

pub struct MediaRegistry {
    routers: DashMap<RideId, Arc<RouterHandle>>,
    transports: DashMap<TransportKey, Arc<TransportHandle>>,
    producers: DashMap<MediaKey, Arc<ProducerHandle>>,
    consumers: DashMap<MediaKey, Arc<ConsumerHandle>>,
    router_guard: CreationGuard<RideId, Arc<RouterHandle>>,
    transport_guard: CreationGuard<TransportKey, Arc<TransportHandle>>,
}

impl MediaRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            routers: DashMap::new(),
            transports: DashMap::new(),
            producers: DashMap::new(),
            consumers: DashMap::new(),
            router_guard: CreationGuard::new(),
            transport_guard: CreationGuard::new(),
        }
    }

    /// The ride's routing context, creating it through `create` if absent.
    ///
    /// Exactly one creation runs per ride even under concurrent joins;
    /// losers of the race receive the winner's handle. A failed creation
    /// installs nothing.
    pub async fn get_or_create_router<F, Fut>(
        &self,
        ride_id: &RideId,
        create: F,
    ) -> Result<Arc<RouterHandle>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<RouterHandle>> + Send,
    {
        if let Some(router) = self.routers.get(ride_id) {
            return Ok(Arc::clone(router.value()));
        }

        self.router_guard
            .run(ride_id.clone(), async {
                // Re-check under the guard: the previous leader may have
                // finished between our miss and joining the flight.
                if let Some(router) = self.routers.get(ride_id) {
                    return Ok(Arc::clone(router.value()));
                }
                let handle = Arc::new(create().await?);
                self.routers.insert(ride_id.clone(), Arc::clone(&handle));
                Ok(handle)
            })
            .await
    }

    /// The participant's transport in a routing context, creating it
    /// through `create` if absent. Same atomicity as router creation.
    pub async fn get_or_create_transport<F, Fut>(
        &self,
        router_id: &RouterId,
        participant_id: &ParticipantId,
        create: F,
    ) -> Result<Arc<TransportHandle>>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<TransportHandle>> + Send,
    {
        let key = (router_id.clone(), participant_id.clone());
        if let Some(transport) = self.transports.get(&key) {
            return Ok(Arc::clone(transport.value()));
        }

        self.transport_guard
            .run(key.clone(), async {
                if let Some(transport) = self.transports.get(&key) {
                    return Ok(Arc::clone(transport.value()));
                }
                let handle = Arc::new(create().await?);
                self.transports.insert(key.clone(), Arc::clone(&handle));
                Ok(handle)
            })
            .await
    }

    #[must_use]
    pub fn get_router(&self, ride_id: &RideId) -> Option<Arc<RouterHandle>> {
        self.routers.get(ride_id).map(|r| Arc::clone(r.value()))
    }

    #[must_use]
    pub fn get_transport(
        &self,
        router_id: &RouterId,
        participant_id: &ParticipantId,
    ) -> Option<Arc<TransportHandle>> {
        self.transports
            .get(&(router_id.clone(), participant_id.clone()))
            .map(|t| Arc::clone(t.value()))
    }

    pub fn insert_producer(
        &self,
        ride_id: &RideId,
        participant_id: &ParticipantId,
        producer: Arc<ProducerHandle>,
    ) {
        self.producers
            .insert((ride_id.clone(), participant_id.clone()), producer);
    }

    #[must_use]
    pub fn get_producer(
        &self,
        ride_id: &RideId,
        participant_id: &ParticipantId,
    ) -> Option<Arc<ProducerHandle>> {
        self.producers
            .get(&(ride_id.clone(), participant_id.clone()))
            .map(|p| Arc::clone(p.value()))
    }

    /// Resolve a producer by its engine id within one ride.
    #[must_use]
    pub fn find_producer(
        &self,
        ride_id: &RideId,
        producer_id: &ProducerId,
    ) -> Option<Arc<ProducerHandle>> {
        self.producers.iter().find_map(|entry| {
            let (ride, _) = entry.key();
            if ride == ride_id && entry.value().id == *producer_id {
                Some(Arc::clone(entry.value()))
            } else {
                None
            }
        })
    }

    pub fn remove_producer(&self, ride_id: &RideId, participant_id: &ParticipantId) {
        self.producers
            .remove(&(ride_id.clone(), participant_id.clone()));
    }

    pub fn insert_consumer(
        &self,
        ride_id: &RideId,
        participant_id: &ParticipantId,
        consumer: Arc<ConsumerHandle>,
    ) {
        self.consumers
            .insert((ride_id.clone(), participant_id.clone()), consumer);
    }

    #[must_use]
    pub fn get_consumer(
        &self,
        ride_id: &RideId,
        participant_id: &ParticipantId,
    ) -> Option<Arc<ConsumerHandle>> {
        self.consumers
            .get(&(ride_id.clone(), participant_id.clone()))
            .map(|c| Arc::clone(c.value()))
    }

    pub fn remove_consumer(&self, ride_id: &RideId, participant_id: &ParticipantId) {
        self.consumers
            .remove(&(ride_id.clone(), participant_id.clone()));
    }

    /// Ride a routing context belongs to.
    #[must_use]
    pub fn ride_of_router(&self, router_id: &RouterId) -> Option<RideId> {
        self.routers.iter().find_map(|entry| {
            if entry.value().id == *router_id {
                Some(entry.key().clone())
            } else {
                None
            }
        })
    }

    /// Drop every entry a participant holds under a routing context.
    /// Idempotent; never touches other participants' entries.
    pub fn remove_participant(&self, router_id: &RouterId, participant_id: &ParticipantId) {
        self.transports
            .remove(&(router_id.clone(), participant_id.clone()));
        if let Some(ride_id) = self.ride_of_router(router_id) {
            self.remove_producer(&ride_id, participant_id);
            self.remove_consumer(&ride_id, participant_id);
        }
    }

    /// Drop a ride's routing context and anything still keyed under it.
    /// Returns the router handle so the caller can close it engine-side.
    pub fn remove_ride(&self, ride_id: &RideId) -> Option<Arc<RouterHandle>> {
        let (_, router) = self.routers.remove(ride_id)?;
        self.transports
            .retain(|(router_id, _), _| *router_id != router.id);
        self.producers.retain(|(ride, _), _| ride != ride_id);
        self.consumers.retain(|(ride, _), _| ride != ride_id);
        Some(router)
    }

    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            routers: self.routers.len(),
            transports: self.transports.len(),
            producers: self.producers.len(),
            consumers: self.consumers.len(),
        }
    }
}

impl Default for MediaRegistry {
    fn default() -> Self {
        Self::new()
    }
}
