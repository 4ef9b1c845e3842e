//! Media engine contract.
//!
//! The SFU engine is an external collaborator. The core only consumes the
//! capability surface below: workers host routing contexts, routing
//! contexts host per-participant transports, and transports carry
//! producers (outgoing streams) and consumers (incoming streams).
//!
//! Codec/RTP payloads are opaque JSON blobs negotiated between the engine
//! and clients; the core never inspects them.

pub mod fake;
pub mod pool;

pub use fake::FakeMediaEngine;
pub use pool::WorkerPool;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::models::{ConsumerId, ProducerId, RouterId, TransportId, WorkerId};

/// Media kind of a stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

impl MediaKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }
}

/// Codec descriptor for one media kind inside a routing context profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecSpec {
    pub kind: MediaKind,
    pub mime_type: String,
    pub clock_rate: u32,
    pub channels: Option<u8>,
}

/// Codec profile a routing context is created with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CodecProfile {
    pub codecs: Vec<CodecSpec>,
}

impl Default for CodecProfile {
    fn default() -> Self {
        Self {
            codecs: vec![
                CodecSpec {
                    kind: MediaKind::Audio,
                    mime_type: "audio/opus".to_string(),
                    clock_rate: 48_000,
                    channels: Some(2),
                },
                CodecSpec {
                    kind: MediaKind::Video,
                    mime_type: "video/VP8".to_string(),
                    clock_rate: 90_000,
                    channels: None,
                },
            ],
        }
    }
}

/// Network options a transport is created with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportOptions {
    pub listen_ip: String,
    pub announced_ip: Option<String>,
    pub initial_available_outgoing_bitrate: u32,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            listen_ip: "0.0.0.0".to_string(),
            announced_ip: None,
            initial_available_outgoing_bitrate: 1_000_000,
        }
    }
}

/// Opaque codec/negotiation descriptor of a routing context, returned to
/// joining clients so they can prepare matching send/receive parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RouterCapabilities(pub serde_json::Value);

/// Opaque client-side media parameters attached to a produce request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpParameters(pub serde_json::Value);

/// Opaque client-side receive capabilities attached to a consume request.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RtpCapabilities(pub serde_json::Value);

/// Opaque transport negotiation parameters (ICE/DTLS material) handed to
/// the client that owns the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportParameters(pub serde_json::Value);

/// Connection state reported by a transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportState {
    New,
    Connecting,
    Connected,
    Closed,
}

/// Handle to one engine worker process.
///
/// Worker death is broadcast through the cancellation token; everything
/// bound to a dead worker is unusable.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    pub id: WorkerId,
    died: CancellationToken,
}

impl WorkerHandle {
    #[must_use]
    pub fn new(id: WorkerId) -> Self {
        Self {
            id,
            died: CancellationToken::new(),
        }
    }

    /// Token cancelled when the worker terminates unexpectedly.
    #[must_use]
    pub fn death_signal(&self) -> CancellationToken {
        self.died.clone()
    }

    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.died.is_cancelled()
    }

    /// Mark the worker as dead. Called by the engine implementation when
    /// it observes the worker process terminate.
    pub fn mark_dead(&self) {
        self.died.cancel();
    }
}

/// Handle to one routing context (router), bound to one worker.
#[derive(Debug, Clone)]
pub struct RouterHandle {
    pub id: RouterId,
    pub worker_id: WorkerId,
    pub capabilities: RouterCapabilities,
    pub created_at: DateTime<Utc>,
}

/// Handle to one participant's transport.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    pub id: TransportId,
    pub router_id: RouterId,
    pub parameters: TransportParameters,
    state: watch::Receiver<TransportState>,
}

impl TransportHandle {
    #[must_use]
    pub fn new(
        id: TransportId,
        router_id: RouterId,
        parameters: TransportParameters,
        state: watch::Receiver<TransportState>,
    ) -> Self {
        Self {
            id,
            router_id,
            parameters,
            state,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> TransportState {
        *self.state.borrow()
    }

    /// Watch channel for state changes. The sender side lives in the
    /// engine; a terminal `Closed` means the transport is gone.
    #[must_use]
    pub fn state_watch(&self) -> watch::Receiver<TransportState> {
        self.state.clone()
    }
}

/// Handle to one outgoing stream.
#[derive(Debug, Clone)]
pub struct ProducerHandle {
    pub id: ProducerId,
    pub kind: MediaKind,
}

/// Handle to one incoming stream bound to a remote producer.
#[derive(Debug, Clone)]
pub struct ConsumerHandle {
    pub id: ConsumerId,
    pub producer_id: ProducerId,
    pub kind: MediaKind,
}

/// The capability surface the orchestration layer consumes.
///
/// All operations are fallible and may suspend; failures must leave no
/// registry state behind (the caller only installs handles on `Ok`).
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Spawn a worker process.
    async fn create_worker(&self) -> Result<WorkerHandle>;

    /// Create a routing context on `worker` with the given codec profile.
    async fn create_router(
        &self,
        worker: &WorkerHandle,
        profile: &CodecProfile,
    ) -> Result<RouterHandle>;

    /// Create a transport inside `router`.
    async fn create_transport(
        &self,
        router: &RouterHandle,
        options: &TransportOptions,
    ) -> Result<TransportHandle>;

    /// Attach an outgoing stream to `transport`.
    async fn produce(
        &self,
        transport: &TransportHandle,
        kind: MediaKind,
        rtp_parameters: RtpParameters,
    ) -> Result<ProducerHandle>;

    /// Attach an incoming stream for `producer_id` to `transport`.
    async fn consume(
        &self,
        transport: &TransportHandle,
        producer_id: &ProducerId,
        rtp_capabilities: RtpCapabilities,
    ) -> Result<ConsumerHandle>;

    /// Tear down a routing context and everything inside it.
    async fn close_router(&self, router: &RouterHandle) -> Result<()>;

    /// Tear down a single transport and its producers/consumers.
    async fn close_transport(&self, transport: &TransportHandle) -> Result<()>;
}
