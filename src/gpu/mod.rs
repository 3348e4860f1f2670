//! Launch layer for GF(2^n) kernels
//!
//! This module defines the contracts the arithmetic engine needs from a
//! massively parallel device and provides a host-emulated implementation of
//! them. The emulation keeps the device's execution semantics: global memory
//! is a slab of atomic chunks, kernels are launched over a grid of blocks that
//! run in parallel on the rayon thread pool, and all work is ordered through
//! streams so asynchronous transfers and launches behave as they would on
//! real hardware.
//!
//! Key Features:
//! - Device memory allocation with capacity tracking
//! - In-order streams with events for timing
//! - Synchronous and asynchronous host/device transfers
//! - Grid/block kernel launches with per-block shared memory
//! - Launch configuration validation against device limits
//!
//! Memory Model:
//! - Every host-visible read synchronizes the default stream first
//! - Work on different streams is unordered unless the caller synchronizes
//! - Kernel blocks must write disjoint cells or use the atomic XOR accessor

pub mod kernels;
pub mod pool;
pub mod stream;
pub mod utils;

pub use pool::{DevicePool, SlotHandle, DATA_POOL_SIZE};
pub use stream::{Event, Stream};
pub use utils::{DeviceStats, MemoryTransferDirection, TransferMode};

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, Weak};
use std::time::Duration;

use rayon::prelude::*;

use crate::error::{Gf2nError, Result};
use crate::geometry::{AtomicChunk, Chunk, CHUNK_BYTES};
use utils::timed;

/// Device capabilities relevant to kernel configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProperties {
    /// Device name
    pub name: String,

    /// Maximum threads per block
    pub max_threads_per_block: u32,

    /// Maximum number of blocks in a grid
    pub max_grid_dim: u32,

    /// Shared memory per block, counted in chunks
    pub max_shared_chunks: usize,

    /// Number of multiprocessors executing blocks concurrently
    pub multiprocessor_count: u32,

    /// Warp size
    pub warp_size: u32,

    /// Total global memory in bytes
    pub global_memory: usize,
}

impl Default for DeviceProperties {
    fn default() -> Self {
        Self {
            name: "Emulated GF(2^n) device".to_string(),
            max_threads_per_block: 1024,
            max_grid_dim: 1 << 24,
            max_shared_chunks: 48 * 1024 / CHUNK_BYTES,
            multiprocessor_count: rayon::current_num_threads() as u32,
            warp_size: 32,
            global_memory: 256 * 1024 * 1024,
        }
    }
}

/// Grid shape of one kernel launch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub grid_dim: u32,
    pub block_dim: u32,
    /// Shared memory per block, in chunks
    pub shared_chunks: usize,
}

impl LaunchConfig {
    /// One thread per work item with `threads_per_block` threads per block
    pub fn for_items(items: usize, threads_per_block: u32) -> Self {
        let threads = threads_per_block.max(1);
        let grid = items.div_ceil(threads as usize).max(1);
        Self {
            grid_dim: grid as u32,
            block_dim: threads,
            shared_chunks: 0,
        }
    }

    /// A single block, used by kernels that loop over their work internally
    pub fn single_block(threads: u32) -> Self {
        Self {
            grid_dim: 1,
            block_dim: threads.max(1),
            shared_chunks: 0,
        }
    }

    pub fn with_shared(mut self, shared_chunks: usize) -> Self {
        self.shared_chunks = shared_chunks;
        self
    }

    /// Total number of threads in the grid
    pub fn total_threads(&self) -> usize {
        self.grid_dim as usize * self.block_dim as usize
    }
}

/// Execution context of one block
#[derive(Debug)]
pub struct BlockContext {
    pub block_idx: u32,
    pub block_dim: u32,
    pub grid_dim: u32,
    /// Block-local shared memory, zeroed at block start
    pub shared: Vec<Chunk>,
}

impl BlockContext {
    /// Thread indices of this block
    pub fn threads(&self) -> Range<u32> {
        0..self.block_dim
    }

    /// Global index of thread `tid` of this block
    pub fn global_id(&self, tid: u32) -> usize {
        self.block_idx as usize * self.block_dim as usize + tid as usize
    }

    /// Total number of threads in the grid
    pub fn grid_size(&self) -> usize {
        self.grid_dim as usize * self.block_dim as usize
    }
}

/// A kernel executable on the device.
///
/// `run_block` executes every thread of one block. Threads are iterated by
/// the kernel body itself; code between two passes over `threads()` runs
/// after all threads of the previous pass, matching a block-wide barrier.
pub trait Kernel: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    fn run_block(&self, block: &mut BlockContext);
}

struct Allocation {
    cells: Box<[AtomicChunk]>,
    device: Weak<DeviceInner>,
}

impl Drop for Allocation {
    fn drop(&mut self) {
        if let Some(device) = self.device.upgrade() {
            device.allocated.fetch_sub(self.cells.len() * CHUNK_BYTES, Ordering::SeqCst);
        }
    }
}

/// View into a device allocation
#[derive(Clone)]
pub struct DeviceBuffer {
    alloc: Arc<Allocation>,
    offset: usize,
    len: usize,
}

impl DeviceBuffer {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Sub-view of `len` chunks starting at `offset`
    pub fn slice(&self, offset: usize, len: usize) -> Result<DeviceBuffer> {
        if offset + len > self.len {
            return Err(Gf2nError::InvalidParameters(format!(
                "device slice {}..{} out of bounds for buffer of {} chunks",
                offset,
                offset + len,
                self.len
            )));
        }
        Ok(DeviceBuffer {
            alloc: Arc::clone(&self.alloc),
            offset: self.offset + offset,
            len,
        })
    }

    /// The cells of this view
    pub fn cells(&self) -> &[AtomicChunk] {
        &self.alloc.cells[self.offset..self.offset + self.len]
    }

    #[inline]
    pub fn load(&self, index: usize) -> Chunk {
        self.cells()[index].load(Ordering::Relaxed)
    }

    #[inline]
    pub fn store(&self, index: usize, value: Chunk) {
        self.cells()[index].store(value, Ordering::Relaxed)
    }

    /// Atomic XOR, for kernels whose threads accumulate into shared cells
    #[inline]
    pub fn xor(&self, index: usize, value: Chunk) {
        self.cells()[index].fetch_xor(value, Ordering::Relaxed);
    }

    /// Reads the whole view into a local array
    pub fn read_all(&self) -> Vec<Chunk> {
        self.cells().iter().map(|c| c.load(Ordering::Relaxed)).collect()
    }

    /// Overwrites the view with `src`, which must have the same length
    pub fn write_all(&self, src: &[Chunk]) {
        for (cell, &value) in self.cells().iter().zip(src) {
            cell.store(value, Ordering::Relaxed);
        }
    }

    /// Whether both views start at the same device address
    pub fn same_address(&self, other: &DeviceBuffer) -> bool {
        Arc::ptr_eq(&self.alloc, &other.alloc) && self.offset == other.offset
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("offset", &self.offset)
            .field("len", &self.len)
            .finish()
    }
}

struct DeviceInner {
    properties: DeviceProperties,
    default_stream: Stream,
    allocated: AtomicUsize,
    next_stream_id: AtomicUsize,
    stats: Mutex<DeviceStats>,
}

/// Handle to a compute device; clones share the device
#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

impl Device {
    /// Creates an emulated device with the given capabilities
    pub fn new(properties: DeviceProperties) -> Result<Self> {
        if properties.max_threads_per_block == 0 || properties.max_grid_dim == 0 {
            return Err(Gf2nError::InvalidParameters(
                "device must allow at least one thread and one block".to_string(),
            ));
        }

        let default_stream = Stream::spawn(0)?;
        tracing::info!(
            name = %properties.name,
            global_memory = properties.global_memory,
            multiprocessors = properties.multiprocessor_count,
            "device initialized"
        );

        Ok(Self {
            inner: Arc::new(DeviceInner {
                properties,
                default_stream,
                allocated: AtomicUsize::new(0),
                next_stream_id: AtomicUsize::new(1),
                stats: Mutex::new(DeviceStats::default()),
            }),
        })
    }

    pub fn properties(&self) -> &DeviceProperties {
        &self.inner.properties
    }

    /// Stream used by transfers and by kernels that do not create their own
    pub fn default_stream(&self) -> &Stream {
        &self.inner.default_stream
    }

    /// Creates an additional stream
    pub fn create_stream(&self) -> Result<Stream> {
        let id = self.inner.next_stream_id.fetch_add(1, Ordering::Relaxed);
        Stream::spawn(id)
    }

    /// Waits for all work on the default stream
    pub fn synchronize(&self) -> Result<()> {
        self.inner.default_stream.synchronize()
    }

    /// Bytes currently allocated on the device
    pub fn allocated_bytes(&self) -> usize {
        self.inner.allocated.load(Ordering::SeqCst)
    }

    pub fn stats(&self) -> DeviceStats {
        let mut stats = *self.lock_stats();
        stats.allocated_bytes = self.allocated_bytes() as u64;
        stats
    }

    /// Allocates `len` zeroed chunks of device memory
    pub fn alloc(&self, len: usize) -> Result<DeviceBuffer> {
        let bytes = len * CHUNK_BYTES;
        let limit = self.inner.properties.global_memory;
        let reserved = self
            .inner
            .allocated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current.checked_add(bytes).filter(|&total| total <= limit)
            });
        if let Err(current) = reserved {
            return Err(Gf2nError::DeviceOutOfMemory {
                requested: bytes,
                available: limit.saturating_sub(current),
            });
        }

        let cells: Box<[AtomicChunk]> = (0..len).map(|_| AtomicChunk::new(0)).collect();
        Ok(DeviceBuffer {
            alloc: Arc::new(Allocation {
                cells,
                device: Arc::downgrade(&self.inner),
            }),
            offset: 0,
            len,
        })
    }

    /// Checks a launch configuration against the device limits
    pub fn validate_launch(&self, config: &LaunchConfig) -> Result<()> {
        let props = &self.inner.properties;
        if config.block_dim == 0 || config.block_dim > props.max_threads_per_block {
            return Err(Gf2nError::InvalidLaunchConfig(format!(
                "block dimension {} outside 1..={}",
                config.block_dim, props.max_threads_per_block
            )));
        }
        if config.grid_dim == 0 || config.grid_dim > props.max_grid_dim {
            return Err(Gf2nError::InvalidLaunchConfig(format!(
                "grid dimension {} outside 1..={}",
                config.grid_dim, props.max_grid_dim
            )));
        }
        if config.shared_chunks > props.max_shared_chunks {
            return Err(Gf2nError::InvalidLaunchConfig(format!(
                "{} shared chunks requested, {} available",
                config.shared_chunks, props.max_shared_chunks
            )));
        }
        Ok(())
    }

    /// Enqueues `kernel` on `stream`
    pub fn launch<K: Kernel>(&self, stream: &Stream, config: LaunchConfig, kernel: K) -> Result<()> {
        self.validate_launch(&config)?;
        self.lock_stats().kernel_launches += 1;
        tracing::trace!(
            kernel = kernel.name(),
            stream = stream.id(),
            grid = config.grid_dim,
            block = config.block_dim,
            "kernel launch"
        );

        stream.enqueue(move || {
            (0..config.grid_dim).into_par_iter().for_each(|block_idx| {
                let mut block = BlockContext {
                    block_idx,
                    block_dim: config.block_dim,
                    grid_dim: config.grid_dim,
                    shared: vec![0; config.shared_chunks],
                };
                kernel.run_block(&mut block);
            });
        })
    }

    /// Launches `kernel` and waits for it, returning the elapsed time
    pub fn launch_and_wait<K: Kernel>(
        &self,
        stream: &Stream,
        config: LaunchConfig,
        kernel: K,
    ) -> Result<Duration> {
        let (result, elapsed) = timed(|| {
            self.launch(stream, config, kernel)?;
            stream.synchronize()
        });
        result.map(|_| elapsed)
    }

    /// Copies host chunks into device memory on the default stream.
    ///
    /// Synchronous copies return the time spent; asynchronous copies return
    /// immediately with a zero duration.
    pub fn upload(&self, dst: &DeviceBuffer, src: &[Chunk], mode: TransferMode) -> Result<Duration> {
        if src.len() != dst.len() {
            return Err(Gf2nError::InvalidBufferLength {
                max: dst.len(),
                got: src.len(),
            });
        }
        self.record_transfer(MemoryTransferDirection::HostToDevice, src.len());

        let staged = src.to_vec();
        let target = dst.clone();
        match mode {
            TransferMode::Synchronous => {
                let (result, elapsed) = timed(|| {
                    self.inner
                        .default_stream
                        .enqueue(move || target.write_all(&staged))?;
                    self.inner.default_stream.synchronize()
                });
                result.map(|_| elapsed)
            }
            TransferMode::Asynchronous => {
                self.inner
                    .default_stream
                    .enqueue(move || target.write_all(&staged))?;
                Ok(Duration::ZERO)
            }
        }
    }

    /// Copies device memory to the host after draining the default stream
    pub fn download(&self, src: &DeviceBuffer) -> Result<(Vec<Chunk>, Duration)> {
        self.record_transfer(MemoryTransferDirection::DeviceToHost, src.len());
        let (result, elapsed) = timed(|| {
            self.inner.default_stream.synchronize()?;
            Ok(src.read_all())
        });
        result.map(|chunks| (chunks, elapsed))
    }

    /// Enqueues a device-to-device copy on `stream`
    pub fn copy(&self, stream: &Stream, dst: &DeviceBuffer, src: &DeviceBuffer) -> Result<()> {
        if src.len() != dst.len() {
            return Err(Gf2nError::InvalidBufferLength {
                max: dst.len(),
                got: src.len(),
            });
        }
        self.record_transfer(MemoryTransferDirection::DeviceToDevice, src.len());

        let (dst, src) = (dst.clone(), src.clone());
        stream.enqueue(move || dst.write_all(&src.read_all()))
    }

    fn record_transfer(&self, direction: MemoryTransferDirection, chunks: usize) {
        self.lock_stats()
            .record_transfer(direction, chunks * CHUNK_BYTES);
    }

    fn lock_stats(&self) -> std::sync::MutexGuard<'_, DeviceStats> {
        self.inner.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.inner.properties.name)
            .field("allocated_bytes", &self.allocated_bytes())
            .finish()
    }
}

static DEFAULT_DEVICE: OnceLock<Device> = OnceLock::new();

/// Process-wide device shared by contexts that do not bring their own
pub fn default_device() -> Result<Device> {
    if let Some(device) = DEFAULT_DEVICE.get() {
        return Ok(device.clone());
    }
    let device = Device::new(DeviceProperties::default())?;
    Ok(DEFAULT_DEVICE.get_or_init(|| device).clone())
}
