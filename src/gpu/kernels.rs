//! Device kernels for GF(2^n) arithmetic
//!
//! Every field operation comes in one or more strategies that compute the
//! same result with a different parallelization: block shaping, private
//! streams, shared-memory staging or instrumentation granularity. The
//! strategies are kept side by side so they can be compared empirically.
//!
//! Key Features:
//! - Addition as chunk-parallel XOR in several launch shapes
//! - Multiplication via a parallel double-width carry-less product followed
//!   by bitwise or chunk-wise polynomial reduction
//! - Square-and-multiply exponentiation built from the multiplication kernels
//! - Extended-Euclid and Fermat inversion
//! - Byte-order normalization, constant initialization and degree queries
//!
//! All operands are canonical big-endian chunk arrays of `num_chunks` words.

pub mod add;
pub mod exp;
pub mod inverse;
pub mod misc;
pub mod mul;
pub mod primitives;

use std::time::Duration;

use crate::geometry::ChunkGeometry;
use crate::gpu::DeviceBuffer;

/// Threads per block used when a strategy has no shape of its own
pub const DEFAULT_THREADS_PER_BLOCK: u32 = 256;

/// Per-phase timing measured inside a kernel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimes {
    /// Reading operands from global memory
    pub load: Duration,
    /// Arithmetic
    pub exec: Duration,
    /// Writing the result to global memory
    pub store: Duration,
}

impl PhaseTimes {
    /// Keeps the slowest block's time for every phase
    pub fn merge_max(&mut self, other: &PhaseTimes) {
        self.load = self.load.max(other.load);
        self.exec = self.exec.max(other.exec);
        self.store = self.store.max(other.store);
    }
}

/// Device-resident parameters of one field configuration
#[derive(Debug, Clone)]
pub struct FieldParams {
    pub geometry: ChunkGeometry,
    /// The reduction polynomial, `num_chunks` chunks
    pub poly: DeviceBuffer,
}

/// Inputs and output of a binary kernel
#[derive(Debug, Clone)]
pub struct BinaryOperands {
    pub a: DeviceBuffer,
    pub b: DeviceBuffer,
    pub out: DeviceBuffer,
}

impl BinaryOperands {
    pub fn len(&self) -> usize {
        self.out.len()
    }

    pub fn is_empty(&self) -> bool {
        self.out.is_empty()
    }
}

/// Threads for a single-block kernel working on `width` chunks
pub(crate) fn single_block_threads(width: usize) -> u32 {
    (width as u32).clamp(1, DEFAULT_THREADS_PER_BLOCK)
}
