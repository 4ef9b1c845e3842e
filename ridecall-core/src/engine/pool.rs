//! Engine worker pool.
//!
//! Workers are spawned once at startup and rides are assigned to them by
//! hashing the ride id, so one worker's death only poisons the rides that
//! hash onto it. Operations against a poisoned ride fail with
//! `EngineFatal` instead of taking the process down.

use std::sync::Arc;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::models::RideId;

use super::{MediaEngine, WorkerHandle};

pub struct WorkerPool {
    workers: Vec<Arc<WorkerHandle>>,
}

impl WorkerPool {
    /// Spawn `size` workers on `engine`. Fails if any worker cannot be
    /// created; a partially started pool is useless.
    pub async fn start(engine: &dyn MediaEngine, size: usize) -> Result<Self> {
        if size == 0 {
            return Err(Error::Internal("worker pool size must be at least 1".to_string()));
        }

        let mut workers = Vec::with_capacity(size);
        for _ in 0..size {
            let worker = Arc::new(engine.create_worker().await?);
            let death = worker.death_signal();
            let worker_id = worker.id.clone();
            tokio::spawn(async move {
                death.cancelled().await;
                error!(worker_id = %worker_id, "engine worker died, its rides are now unserviceable");
            });
            workers.push(worker);
        }

        info!(pool_size = size, "engine worker pool started");
        Ok(Self { workers })
    }

    /// The worker a ride is assigned to, or `EngineFatal` if that worker
    /// has died.
    pub fn worker_for(&self, ride_id: &RideId) -> Result<Arc<WorkerHandle>> {
        let index = (fnv1a(ride_id.as_str()) % self.workers.len() as u64) as usize;
        let worker = &self.workers[index];
        if worker.is_dead() {
            return Err(Error::EngineFatal);
        }
        Ok(Arc::clone(worker))
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    #[must_use]
    pub fn alive_count(&self) -> usize {
        self.workers.iter().filter(|w| !w.is_dead()).count()
    }
}

/// FNV-1a, 64 bit. Stable across processes so a ride always lands on the
/// same worker for a given pool size.
fn fnv1a(s: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    let mut hash = OFFSET;
    for byte in s.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}
