//! Field addition: chunk-wise XOR
//!
//! All strategies compute `out = a ^ b` and differ only in how the chunks
//! are distributed over threads, blocks and streams:
//! - `par_add`: one thread per chunk on the default stream
//! - `par_add_loop`: grid-stride loop with a caller-chosen launch shape
//! - `par_add_time`: measures load / exec / store phases inside the kernel
//! - `par_add_with_events`: timed with stream events around the launch
//! - `par_add_own_stream`: a private stream with a fixed block shape
//! - `par_add_multi_stream`: the chunk range split over several streams
//! - `par_add_shared_mem`: operands staged through block shared memory

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use crate::config::LaunchProperties;
use crate::error::Result;
use crate::geometry::Chunk;
use crate::gpu::kernels::{BinaryOperands, PhaseTimes, DEFAULT_THREADS_PER_BLOCK};
use crate::gpu::{BlockContext, Device, Event, Kernel, LaunchConfig};

/// One thread per chunk
pub struct XorKernel {
    pub ops: BinaryOperands,
}

impl Kernel for XorKernel {
    fn name(&self) -> &'static str {
        "xor"
    }

    fn run_block(&self, block: &mut BlockContext) {
        let ops = &self.ops;
        for tid in block.threads() {
            let gid = block.global_id(tid);
            if gid < ops.len() {
                ops.out.store(gid, ops.a.load(gid) ^ ops.b.load(gid));
            }
        }
    }
}

/// Grid-stride loop, correct for any launch shape
pub struct XorGridStrideKernel {
    pub ops: BinaryOperands,
}

impl Kernel for XorGridStrideKernel {
    fn name(&self) -> &'static str {
        "xor_grid_stride"
    }

    fn run_block(&self, block: &mut BlockContext) {
        let ops = &self.ops;
        let stride = block.grid_size();
        for tid in block.threads() {
            let mut i = block.global_id(tid);
            while i < ops.len() {
                ops.out.store(i, ops.a.load(i) ^ ops.b.load(i));
                i += stride;
            }
        }
    }
}

/// XOR with per-phase clocks; the slowest block's phases are kept
pub struct XorTimedKernel {
    pub ops: BinaryOperands,
    pub phases: Arc<Mutex<PhaseTimes>>,
}

impl Kernel for XorTimedKernel {
    fn name(&self) -> &'static str {
        "xor_timed"
    }

    fn run_block(&self, block: &mut BlockContext) {
        let ops = &self.ops;
        let start = block.global_id(0).min(ops.len());
        let end = (start + block.block_dim as usize).min(ops.len());

        let clock = Instant::now();
        let a: Vec<Chunk> = (start..end).map(|i| ops.a.load(i)).collect();
        let b: Vec<Chunk> = (start..end).map(|i| ops.b.load(i)).collect();
        let load = clock.elapsed();

        let clock = Instant::now();
        let sum: Vec<Chunk> = a.iter().zip(&b).map(|(x, y)| x ^ y).collect();
        let exec = clock.elapsed();

        let clock = Instant::now();
        for (offset, value) in sum.into_iter().enumerate() {
            ops.out.store(start + offset, value);
        }
        let store = clock.elapsed();

        self.phases
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge_max(&PhaseTimes { load, exec, store });
    }
}

/// Stages a tile of both operands in shared memory before the XOR
pub struct XorSharedMemKernel {
    pub ops: BinaryOperands,
}

impl Kernel for XorSharedMemKernel {
    fn name(&self) -> &'static str {
        "xor_shared_mem"
    }

    fn run_block(&self, block: &mut BlockContext) {
        let ops = &self.ops;
        let tile = block.block_dim as usize;

        for tid in block.threads() {
            let gid = block.global_id(tid);
            if gid < ops.len() {
                block.shared[tid as usize] = ops.a.load(gid);
                block.shared[tile + tid as usize] = ops.b.load(gid);
            }
        }

        for tid in block.threads() {
            let gid = block.global_id(tid);
            if gid < ops.len() {
                let t = tid as usize;
                ops.out.store(gid, block.shared[t] ^ block.shared[tile + t]);
            }
        }
    }
}

/// Enqueues the one-thread-per-chunk XOR on the default stream
pub fn par_add(device: &Device, ops: &BinaryOperands) -> Result<()> {
    let config = LaunchConfig::for_items(ops.len(), DEFAULT_THREADS_PER_BLOCK);
    device.launch(device.default_stream(), config, XorKernel { ops: ops.clone() })
}

/// Enqueues the grid-stride XOR with the given launch shape
pub fn par_add_loop(device: &Device, ops: &BinaryOperands, launch: LaunchProperties) -> Result<()> {
    let threads = if launch.num_threads == 0 {
        DEFAULT_THREADS_PER_BLOCK
    } else {
        launch.num_threads
    };
    let blocks = if launch.num_blocks == 0 {
        LaunchConfig::for_items(ops.len(), threads).grid_dim
    } else {
        launch.num_blocks
    };

    let config = LaunchConfig {
        grid_dim: blocks,
        block_dim: threads,
        shared_chunks: 0,
    };
    device.launch(device.default_stream(), config, XorGridStrideKernel { ops: ops.clone() })
}

/// Runs the instrumented XOR and waits for it
pub fn par_add_time(device: &Device, ops: &BinaryOperands) -> Result<PhaseTimes> {
    let phases = Arc::new(Mutex::new(PhaseTimes::default()));
    let config = LaunchConfig::for_items(ops.len(), DEFAULT_THREADS_PER_BLOCK);
    device.launch_and_wait(
        device.default_stream(),
        config,
        XorTimedKernel {
            ops: ops.clone(),
            phases: Arc::clone(&phases),
        },
    )?;

    let measured = *phases.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(measured)
}

/// Runs the XOR between two events and returns the time between them
pub fn par_add_with_events(device: &Device, ops: &BinaryOperands) -> Result<Duration> {
    let stream = device.default_stream();
    let (start, end) = (Event::new(), Event::new());

    start.record(stream)?;
    par_add(device, ops)?;
    end.record(stream)?;
    stream.synchronize()?;

    Event::elapsed(&start, &end)
}

/// Runs the XOR on a private stream with `threads_per_block` threads
pub fn par_add_own_stream(device: &Device, ops: &BinaryOperands, threads_per_block: u32) -> Result<()> {
    // Operands may still be in flight on the default stream.
    device.synchronize()?;

    let stream = device.create_stream()?;
    let config = LaunchConfig::for_items(ops.len(), threads_per_block);
    device.launch(&stream, config, XorKernel { ops: ops.clone() })?;
    stream.synchronize()
}

/// Splits the chunk range into `streams` parts, each XORed on its own stream
pub fn par_add_multi_stream(device: &Device, ops: &BinaryOperands, streams: usize) -> Result<()> {
    device.synchronize()?;

    let parts = streams.clamp(1, ops.len().max(1));
    let part_len = ops.len().div_ceil(parts);
    let mut launched = Vec::with_capacity(parts);

    for offset in (0..ops.len()).step_by(part_len.max(1)) {
        let len = part_len.min(ops.len() - offset);
        let part = BinaryOperands {
            a: ops.a.slice(offset, len)?,
            b: ops.b.slice(offset, len)?,
            out: ops.out.slice(offset, len)?,
        };
        let stream = device.create_stream()?;
        let config = LaunchConfig::for_items(len, DEFAULT_THREADS_PER_BLOCK);
        device.launch(&stream, config, XorKernel { ops: part })?;
        launched.push(stream);
    }

    for stream in &launched {
        stream.synchronize()?;
    }
    Ok(())
}

/// Enqueues the shared-memory XOR on the default stream
pub fn par_add_shared_mem(device: &Device, ops: &BinaryOperands) -> Result<()> {
    let threads = DEFAULT_THREADS_PER_BLOCK;
    let config = LaunchConfig::for_items(ops.len(), threads).with_shared(2 * threads as usize);
    device.launch(device.default_stream(), config, XorSharedMemKernel { ops: ops.clone() })
}
