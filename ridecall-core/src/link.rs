//! Shareable invite links.
//!
//! A ride can be shared through an opaque link token that resolves back
//! to the ride id. Storage is in-memory and keyed both ways so link
//! generation is idempotent per ride.

use dashmap::DashMap;
use nanoid::nanoid;

use crate::models::RideId;

pub struct LinkService {
    by_link: DashMap<String, RideId>,
    by_ride: DashMap<RideId, String>,
}

impl LinkService {
    #[must_use]
    pub fn new() -> Self {
        Self {
            by_link: DashMap::new(),
            by_ride: DashMap::new(),
        }
    }

    /// Return the ride's share link, minting one on first request.
    pub fn generate(&self, ride_id: &RideId) -> String {
        if let Some(existing) = self.by_ride.get(ride_id) {
            return existing.clone();
        }
        let link = nanoid!(21);
        self.by_ride.insert(ride_id.clone(), link.clone());
        self.by_link.insert(link.clone(), ride_id.clone());
        link
    }

    /// Resolve a link back to its ride, if it was ever generated.
    #[must_use]
    pub fn resolve(&self, link: &str) -> Option<RideId> {
        self.by_link.get(link).map(|entry| entry.clone())
    }
}

impl Default for LinkService {
    fn default() -> Self {
        Self::new()
    }
}
