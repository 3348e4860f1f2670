//! Housekeeping kernels: byte-order normalization, constant initialization,
//! degree queries and the empty kernel used to measure launch overhead.

use std::time::Duration;

use crate::error::Result;
use crate::geometry::Chunk;
use crate::gpu::kernels::{primitives, DEFAULT_THREADS_PER_BLOCK};
use crate::gpu::{BlockContext, Device, DeviceBuffer, Kernel, LaunchConfig, Stream};

/// Reverses the byte order of every chunk in place
pub struct SwapBytesKernel {
    pub buffer: DeviceBuffer,
}

impl Kernel for SwapBytesKernel {
    fn name(&self) -> &'static str {
        "swap_bytes"
    }

    fn run_block(&self, block: &mut BlockContext) {
        for tid in block.threads() {
            let gid = block.global_id(tid);
            if gid < self.buffer.len() {
                self.buffer.store(gid, self.buffer.load(gid).swap_bytes());
            }
        }
    }
}

/// Constants a buffer can be initialized to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constant {
    Zero,
    One,
}

/// Writes the field's zero or one element
pub struct SetConstantKernel {
    pub buffer: DeviceBuffer,
    pub constant: Constant,
}

impl Kernel for SetConstantKernel {
    fn name(&self) -> &'static str {
        match self.constant {
            Constant::Zero => "set0",
            Constant::One => "set1",
        }
    }

    fn run_block(&self, block: &mut BlockContext) {
        let last = self.buffer.len().saturating_sub(1);
        for tid in block.threads() {
            let gid = block.global_id(tid);
            if gid < self.buffer.len() {
                let value = if gid == last && self.constant == Constant::One { 1 } else { 0 };
                self.buffer.store(gid, value);
            }
        }
    }
}

/// Computes the degree of a buffer.
///
/// Writes `out[0] = 1` and `out[1] = degree` for a non-zero input, and
/// `out[0] = 0` for zero.
pub struct DegreeKernel {
    pub src: DeviceBuffer,
    pub out: DeviceBuffer,
}

impl Kernel for DegreeKernel {
    fn name(&self) -> &'static str {
        "element_degree"
    }

    fn run_block(&self, block: &mut BlockContext) {
        let len = self.src.len();
        let stride = block.block_dim as usize;

        // Each thread finds the first non-empty chunk among the ones it owns.
        for tid in block.threads() {
            let t = tid as usize;
            let first = (t..len)
                .step_by(stride)
                .find(|&i| self.src.load(i) != 0)
                .unwrap_or(len);
            block.shared[t] = first as Chunk;
        }

        let first = block.shared.iter().map(|&i| i as usize).min().unwrap_or(len);
        if first < len {
            let degree = primitives::element_degree(&[self.src.load(first)])
                .map(|d| d + (len - 1 - first) * Chunk::BITS as usize)
                .unwrap_or(0);
            self.out.store(0, 1);
            self.out.store(1, degree as Chunk);
        } else {
            self.out.store(0, 0);
            self.out.store(1, 0);
        }
    }
}

/// Does nothing; used to time a bare launch
pub struct EmptyKernel;

impl Kernel for EmptyKernel {
    fn name(&self) -> &'static str {
        "empty"
    }

    fn run_block(&self, _block: &mut BlockContext) {}
}

/// Enqueues an in-place byte swap of `buffer`
pub fn swap_bytes(device: &Device, stream: &Stream, buffer: &DeviceBuffer) -> Result<()> {
    let config = LaunchConfig::for_items(buffer.len(), DEFAULT_THREADS_PER_BLOCK);
    device.launch(stream, config, SwapBytesKernel { buffer: buffer.clone() })
}

/// Enqueues the initialization of `buffer` to zero or one
pub fn set_constant(device: &Device, stream: &Stream, buffer: &DeviceBuffer, constant: Constant) -> Result<()> {
    let config = LaunchConfig::for_items(buffer.len(), DEFAULT_THREADS_PER_BLOCK);
    device.launch(
        stream,
        config,
        SetConstantKernel {
            buffer: buffer.clone(),
            constant,
        },
    )
}

/// Degree of a device buffer, `None` for zero
pub fn degree(device: &Device, src: &DeviceBuffer) -> Result<Option<usize>> {
    let out = device.alloc(2)?;
    let threads = super::single_block_threads(src.len());
    let config = LaunchConfig::single_block(threads).with_shared(threads as usize);
    device.launch(
        device.default_stream(),
        config,
        DegreeKernel {
            src: src.clone(),
            out: out.clone(),
        },
    )?;

    let (result, _) = device.download(&out)?;
    Ok((result[0] != 0).then(|| result[1] as usize))
}

/// Launches the empty kernel on `stream` and waits for it
pub fn launch_empty(device: &Device, stream: &Stream) -> Result<Duration> {
    device.launch_and_wait(stream, LaunchConfig::single_block(1), EmptyKernel)
}
