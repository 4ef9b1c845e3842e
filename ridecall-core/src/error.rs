//! Error taxonomy for the signaling layer.
//!
//! Every variant carries only owned strings so the enum is `Clone`:
//! creation errors are shared between all callers coalesced onto one
//! in-flight creation (see [`crate::singleflight`]).

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The engine rejected or failed routing-context creation.
    #[error("Routing context creation failed: {0}")]
    RouterCreationFailed(String),

    /// An operation required a transport that was never negotiated.
    #[error("No transport for participant {0}")]
    TransportMissing(String),

    /// The engine rejected or failed transport creation.
    #[error("Transport creation failed: {0}")]
    TransportCreationFailed(String),

    /// `consume` referenced a producer that is not (or no longer) live.
    #[error("Producer not found: {0}")]
    ProducerMissing(String),

    /// The engine rejected a produce request.
    #[error("Produce failed: {0}")]
    ProduceFailed(String),

    /// The engine rejected a consume request.
    #[error("Consume failed: {0}")]
    ConsumeFailed(String),

    /// Share link does not resolve to a ride.
    #[error("Invalid share link")]
    InvalidLink,

    /// ICE candidate payload failed validation.
    #[error("Malformed ICE candidate: {0}")]
    MalformedCandidate(String),

    /// The engine worker bound to this ride has died.
    #[error("Media engine worker is down")]
    EngineFatal,

    /// An engine call exceeded the configured deadline.
    #[error("Media engine call timed out")]
    EngineTimeout,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Stable wire code carried in typed error replies.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::RouterCreationFailed(_) => "router_creation_failed",
            Self::TransportMissing(_) => "transport_missing",
            Self::TransportCreationFailed(_) => "transport_creation_failed",
            Self::ProducerMissing(_) => "producer_missing",
            Self::ProduceFailed(_) => "produce_failed",
            Self::ConsumeFailed(_) => "consume_failed",
            Self::InvalidLink => "invalid_link",
            Self::MalformedCandidate(_) => "malformed_candidate",
            Self::EngineFatal => "engine_fatal",
            Self::EngineTimeout => "engine_timeout",
            Self::Serialization(_) => "bad_message",
            Self::Internal(_) => "internal_error",
        }
    }

    /// Client-safe message. Internal details stay in server logs.
    #[must_use]
    pub fn client_message(&self) -> String {
        match self {
            Self::Serialization(_) => "Malformed message".to_string(),
            Self::Internal(_) => "An internal error occurred".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
