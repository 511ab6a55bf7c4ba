//! Bounded pool of box identifiers.
//!
//! The pool is pure capacity control: it hands out exclusive leases over a
//! fixed range of box ids and takes them back. It never blocks, queues or
//! retries; callers that want backpressure layer it on top (see
//! [`crate::service::SandboxService::lease_with_backoff`]).

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of boxes in a pool.
pub const DEFAULT_CAPACITY: usize = 100;

/// Identifier of one isolation context, in `[0, capacity)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoxId(u32);

impl BoxId {
    /// Wraps a raw box number.
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw box number.
    pub fn get(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

struct PoolState {
    free: Vec<BoxId>,
    leased: Vec<bool>,
}

/// Registry of a fixed number of box ids.
///
/// Cloning is cheap and every clone shares the same free list, so one pool
/// can be handed to every worker that needs it.
#[derive(Clone)]
pub struct SandboxPool {
    state: Arc<Mutex<PoolState>>,
    capacity: usize,
}

impl SandboxPool {
    /// Creates a pool whose free list holds every id in `[0, capacity)`.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` exceeds the range of a box id.
    pub fn new(capacity: usize) -> Self {
        let Ok(top) = u32::try_from(capacity) else {
            panic!("pool capacity {} does not fit a box id", capacity);
        };
        let free = (0..top).map(BoxId).collect();
        Self {
            state: Arc::new(Mutex::new(PoolState {
                free,
                leased: vec![false; capacity],
            })),
            capacity,
        }
    }

    // The state is updated atomically under the lock, so a panic elsewhere
    // cannot leave it half-written.
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Removes one id from the free list.
    ///
    /// Fails with [`Error::PoolExhausted`] when every id is leased. Which free
    /// id is returned is unspecified.
    pub fn acquire(&self) -> Result<BoxId> {
        let mut state = self.lock();
        let id = state.free.pop().ok_or(Error::PoolExhausted {
            capacity: self.capacity,
        })?;
        state.leased[id.index()] = true;
        tracing::debug!(box_id = %id, available = state.free.len(), "acquired box");
        Ok(id)
    }

    /// Returns `id` to the free list.
    ///
    /// Releasing an id that is not currently leased is rejected and leaves the
    /// pool untouched.
    pub fn release(&self, id: BoxId) -> Result<()> {
        if id.index() >= self.capacity {
            tracing::error!(box_id = %id, capacity = self.capacity, "release of unknown box");
            return Err(Error::UnknownBox {
                id,
                capacity: self.capacity,
            });
        }

        let mut state = self.lock();
        if !state.leased[id.index()] {
            tracing::error!(box_id = %id, "release of box that is not leased");
            return Err(Error::NotLeased(id));
        }
        state.leased[id.index()] = false;
        state.free.push(id);
        tracing::debug!(box_id = %id, available = state.free.len(), "released box");
        Ok(())
    }

    /// Acquires an id wrapped in a [`Lease`] that releases it when dropped.
    pub fn lease(&self) -> Result<Lease> {
        let id = self.acquire()?;
        Ok(Lease {
            pool: self.clone(),
            id,
            released: false,
        })
    }

    /// Total number of boxes.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of boxes currently free.
    pub fn available(&self) -> usize {
        self.lock().free.len()
    }

    /// Ids currently leased, in ascending order.
    pub fn leased(&self) -> Vec<BoxId> {
        self.lock()
            .leased
            .iter()
            .enumerate()
            .filter(|(_, leased)| **leased)
            .map(|(idx, _)| BoxId(idx as u32))
            .collect()
    }
}

impl fmt::Debug for SandboxPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SandboxPool")
            .field("capacity", &self.capacity)
            .field("available", &self.available())
            .finish()
    }
}

/// Exclusive, single-use right to one box id.
///
/// The id goes back to the pool exactly once: on [`Lease::release`] or, if
/// that was never called, when the lease is dropped.
#[derive(Debug)]
pub struct Lease {
    pool: SandboxPool,
    id: BoxId,
    released: bool,
}

impl Lease {
    /// The leased box id.
    pub fn id(&self) -> BoxId {
        self.id
    }

    /// Returns the id to the pool now.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        self.pool.release(self.id)
    }
}

impl Drop for Lease {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            if let Err(e) = self.pool.release(self.id) {
                tracing::error!(error = %e, box_id = %self.id, "failed to release box on drop");
            }
        }
    }
}
