//! Fixed-capacity pool of element-sized device slots
//!
//! The pool carves one contiguous device allocation into `capacity` slots of
//! `slot_chunks` chunks each. `acquire` hands out the next free slot wrapped
//! in a `SlotHandle`; clones of a handle share one reference count and the
//! slot returns to the free list when the last clone is dropped.
//!
//! Key Features:
//! - FIFO free list: released slots are reused last
//! - Generation counters so a stale release can never free a reissued slot
//! - No growth on demand: exhaustion is reported to the caller immediately
//! - Mutex-protected bookkeeping, safe to use from several host threads

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Gf2nError, Result};
use crate::gpu::{Device, DeviceBuffer};

/// Default number of slots per field configuration
pub const DATA_POOL_SIZE: usize = 20;

#[derive(Debug)]
struct PoolState {
    free: VecDeque<usize>,
    /// Live slots and the generation they were issued with
    used: BTreeMap<usize, u64>,
    generations: Vec<u64>,
}

#[derive(Debug)]
struct PoolInner {
    slab: DeviceBuffer,
    slot_chunks: usize,
    capacity: usize,
    state: Mutex<PoolState>,
}

impl PoolInner {
    fn lock(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self, index: usize, generation: u64) {
        let mut state = self.lock();
        match state.used.get(&index) {
            Some(&live) if live == generation => {
                state.used.remove(&index);
                state.generations[index] += 1;
                state.free.push_back(index);
                tracing::debug!(slot = index, free = state.free.len(), "pool slot released");
            }
            _ => {
                tracing::warn!(slot = index, generation, "ignoring release of a stale pool slot");
            }
        }
    }
}

/// Pool of reusable element buffers on one device
#[derive(Debug, Clone)]
pub struct DevicePool {
    inner: Arc<PoolInner>,
}

impl DevicePool {
    /// Allocates the slab for `capacity` slots of `slot_chunks` chunks
    ///
    /// # Arguments
    /// * `device` - Device owning the slab
    /// * `capacity` - Number of slots, fixed for the pool's lifetime
    /// * `slot_chunks` - Chunks per slot (the field's `num_chunks`)
    ///
    /// # Returns
    /// * `Result<Self>` - The pool, or an allocation error
    pub fn new(device: &Device, capacity: usize, slot_chunks: usize) -> Result<Self> {
        if capacity == 0 || slot_chunks == 0 {
            return Err(Gf2nError::InvalidParameters(format!(
                "pool needs at least one slot of at least one chunk (capacity {}, slot {})",
                capacity, slot_chunks
            )));
        }

        let slab = device.alloc(capacity * slot_chunks)?;
        tracing::debug!(capacity, slot_chunks, "device pool created");

        Ok(Self {
            inner: Arc::new(PoolInner {
                slab,
                slot_chunks,
                capacity,
                state: Mutex::new(PoolState {
                    free: (0..capacity).collect(),
                    used: BTreeMap::new(),
                    generations: vec![0; capacity],
                }),
            }),
        })
    }

    /// Takes the next free slot
    ///
    /// # Returns
    /// * `Result<SlotHandle>` - Owned handle, or `PoolExhausted`
    pub fn acquire(&self) -> Result<SlotHandle> {
        let mut state = self.inner.lock();
        let index = state.free.pop_front().ok_or(Gf2nError::PoolExhausted {
            capacity: self.inner.capacity,
        })?;
        let generation = state.generations[index];
        state.used.insert(index, generation);
        drop(state);

        let buffer = self
            .inner
            .slab
            .slice(index * self.inner.slot_chunks, self.inner.slot_chunks)?;
        tracing::debug!(slot = index, generation, "pool slot acquired");

        Ok(SlotHandle {
            lease: Arc::new(SlotLease {
                pool: Arc::clone(&self.inner),
                index,
                generation,
                buffer,
            }),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    pub fn slot_chunks(&self) -> usize {
        self.inner.slot_chunks
    }

    /// Number of free slots
    pub fn available(&self) -> usize {
        self.inner.lock().free.len()
    }

    /// Number of slots held by live handles
    pub fn in_use(&self) -> usize {
        self.inner.lock().used.len()
    }

    /// Indices of the slots held by live handles
    pub fn live_slots(&self) -> Vec<usize> {
        self.inner.lock().used.keys().copied().collect()
    }
}

#[derive(Debug)]
struct SlotLease {
    pool: Arc<PoolInner>,
    index: usize,
    generation: u64,
    buffer: DeviceBuffer,
}

impl Drop for SlotLease {
    fn drop(&mut self) {
        self.pool.release(self.index, self.generation);
    }
}

/// Shared ownership of one pool slot
#[derive(Debug, Clone)]
pub struct SlotHandle {
    lease: Arc<SlotLease>,
}

impl SlotHandle {
    pub fn index(&self) -> usize {
        self.lease.index
    }

    pub fn generation(&self) -> u64 {
        self.lease.generation
    }

    /// Device memory of the slot
    pub fn buffer(&self) -> &DeviceBuffer {
        &self.lease.buffer
    }

    /// Number of live clones of this handle
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.lease)
    }

    /// Whether both handles refer to the same lease
    pub fn shares_slot_with(&self, other: &SlotHandle) -> bool {
        Arc::ptr_eq(&self.lease, &other.lease)
    }
}
