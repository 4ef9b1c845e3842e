//! Domain model types shared across the workspace.

pub mod id;

pub use id::{
    ConsumerId, ParticipantId, ProducerId, RideId, RoomId, RouterId, TransportId, WorkerId,
};

use serde::{Deserialize, Serialize};

/// Role a participant plays in a ride.
///
/// Drivers publish their media into the ride; riders subscribe to it. The
/// role is informational for peers (carried on `user_joined`), not an
/// enforcement boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Driver,
    Rider,
}

impl Role {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Driver => "driver",
            Self::Rider => "rider",
        }
    }
}
