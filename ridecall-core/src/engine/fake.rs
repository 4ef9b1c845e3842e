//! In-process media engine.
//!
//! Stands in for a real SFU engine: hands out freshly minted handles and
//! tracks enough state to drive transport lifecycle signals. The binary
//! runs on it when no real engine is wired up, and tests use its call
//! counters and failure switches to assert exactly which engine calls an
//! operation performed.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::models::{ConsumerId, ProducerId, RouterId, TransportId, WorkerId};

use super::{
    CodecProfile, ConsumerHandle, MediaEngine, MediaKind, ProducerHandle, RouterCapabilities,
    RouterHandle, RtpCapabilities, RtpParameters, TransportHandle, TransportOptions,
    TransportParameters, TransportState, WorkerHandle,
};

#[derive(Debug, Default)]
struct CallCounters {
    create_worker: AtomicUsize,
    create_router: AtomicUsize,
    create_transport: AtomicUsize,
    produce: AtomicUsize,
    consume: AtomicUsize,
    close_router: AtomicUsize,
    close_transport: AtomicUsize,
}

/// Scriptable failure switches. When set, the next matching call fails
/// with the stored reason and the switch clears.
#[derive(Debug, Default)]
struct FailureScript {
    create_router: Mutex<Option<String>>,
    create_transport: Mutex<Option<String>>,
    produce: Mutex<Option<String>>,
    consume: Mutex<Option<String>>,
}

fn take(slot: &Mutex<Option<String>>) -> Option<String> {
    slot.lock().take()
}

pub struct FakeMediaEngine {
    calls: CallCounters,
    failures: FailureScript,
    workers: DashMap<WorkerId, WorkerHandle>,
    transport_states: DashMap<TransportId, watch::Sender<TransportState>>,
    producer_kinds: DashMap<ProducerId, MediaKind>,
}

impl FakeMediaEngine {
    #[must_use]
    pub fn new() -> Self {
        Self {
            calls: CallCounters::default(),
            failures: FailureScript::default(),
            workers: DashMap::new(),
            transport_states: DashMap::new(),
            producer_kinds: DashMap::new(),
        }
    }

    // Call counters, for assertions on exactly which engine calls ran.

    pub fn create_router_calls(&self) -> usize {
        self.calls.create_router.load(Ordering::SeqCst)
    }

    pub fn create_transport_calls(&self) -> usize {
        self.calls.create_transport.load(Ordering::SeqCst)
    }

    pub fn produce_calls(&self) -> usize {
        self.calls.produce.load(Ordering::SeqCst)
    }

    pub fn consume_calls(&self) -> usize {
        self.calls.consume.load(Ordering::SeqCst)
    }

    pub fn close_router_calls(&self) -> usize {
        self.calls.close_router.load(Ordering::SeqCst)
    }

    pub fn close_transport_calls(&self) -> usize {
        self.calls.close_transport.load(Ordering::SeqCst)
    }

    // Failure scripting.

    pub fn fail_next_create_router(&self, reason: impl Into<String>) {
        *self.failures.create_router.lock() = Some(reason.into());
    }

    pub fn fail_next_create_transport(&self, reason: impl Into<String>) {
        *self.failures.create_transport.lock() = Some(reason.into());
    }

    pub fn fail_next_produce(&self, reason: impl Into<String>) {
        *self.failures.produce.lock() = Some(reason.into());
    }

    pub fn fail_next_consume(&self, reason: impl Into<String>) {
        *self.failures.consume.lock() = Some(reason.into());
    }

    // Lifecycle control.

    /// Simulate a worker process dying.
    pub fn kill_worker(&self, worker_id: &WorkerId) {
        if let Some(worker) = self.workers.get(worker_id) {
            worker.mark_dead();
        }
    }

    /// Drive a transport's connection-state signal.
    pub fn set_transport_state(&self, transport_id: &TransportId, state: TransportState) {
        if let Some(sender) = self.transport_states.get(transport_id) {
            let _ = sender.send(state);
        }
    }
}

impl Default for FakeMediaEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaEngine for FakeMediaEngine {
    async fn create_worker(&self) -> Result<WorkerHandle> {
        self.calls.create_worker.fetch_add(1, Ordering::SeqCst);
        let worker = WorkerHandle::new(WorkerId::new());
        self.workers.insert(worker.id.clone(), worker.clone());
        Ok(worker)
    }

    async fn create_router(
        &self,
        worker: &WorkerHandle,
        profile: &CodecProfile,
    ) -> Result<RouterHandle> {
        self.calls.create_router.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = take(&self.failures.create_router) {
            return Err(Error::RouterCreationFailed(reason));
        }
        if worker.is_dead() {
            return Err(Error::EngineFatal);
        }
        let capabilities = RouterCapabilities(serde_json::json!({
            "codecs": profile.codecs,
        }));
        Ok(RouterHandle {
            id: RouterId::new(),
            worker_id: worker.id.clone(),
            capabilities,
            created_at: Utc::now(),
        })
    }

    async fn create_transport(
        &self,
        router: &RouterHandle,
        options: &TransportOptions,
    ) -> Result<TransportHandle> {
        self.calls.create_transport.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = take(&self.failures.create_transport) {
            return Err(Error::TransportCreationFailed(reason));
        }
        let id = TransportId::new();
        let (tx, rx) = watch::channel(TransportState::New);
        self.transport_states.insert(id.clone(), tx);
        let parameters = TransportParameters(serde_json::json!({
            "id": id.as_str(),
            "iceRole": "controlled",
            "listenIp": options.listen_ip,
            "announcedIp": options.announced_ip,
            "initialAvailableOutgoingBitrate": options.initial_available_outgoing_bitrate,
        }));
        Ok(TransportHandle::new(id, router.id.clone(), parameters, rx))
    }

    async fn produce(
        &self,
        _transport: &TransportHandle,
        kind: MediaKind,
        _rtp_parameters: RtpParameters,
    ) -> Result<ProducerHandle> {
        self.calls.produce.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = take(&self.failures.produce) {
            return Err(Error::ProduceFailed(reason));
        }
        let id = ProducerId::new();
        self.producer_kinds.insert(id.clone(), kind);
        Ok(ProducerHandle { id, kind })
    }

    async fn consume(
        &self,
        _transport: &TransportHandle,
        producer_id: &ProducerId,
        _rtp_capabilities: RtpCapabilities,
    ) -> Result<ConsumerHandle> {
        self.calls.consume.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = take(&self.failures.consume) {
            return Err(Error::ConsumeFailed(reason));
        }
        let kind = self
            .producer_kinds
            .get(producer_id)
            .map(|entry| *entry.value())
            .ok_or_else(|| Error::ConsumeFailed(format!("unknown producer {producer_id}")))?;
        Ok(ConsumerHandle {
            id: ConsumerId::new(),
            producer_id: producer_id.clone(),
            kind,
        })
    }

    async fn close_router(&self, _router: &RouterHandle) -> Result<()> {
        self.calls.close_router.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close_transport(&self, transport: &TransportHandle) -> Result<()> {
        self.calls.close_transport.fetch_add(1, Ordering::SeqCst);
        if let Some(sender) = self.transport_states.get(&transport.id) {
            let _ = sender.send(TransportState::Closed);
        }
        Ok(())
    }
}
