//! Field multiplication
//!
//! Multiplication runs in two launches on one stream:
//! 1. `ProductKernel` builds the double-width carry-less product. Thread
//!    `(i, j)` multiplies chunk `i` of `a` with chunk `j` of `b` and XORs the
//!    two-chunk partial product into output chunks `i + j` and `i + j + 1`,
//!    so every output chunk is an XOR reduction over all partial products
//!    that land on it.
//! 2. A reduction kernel folds the product back below `x^n`:
//!    - `BitwiseReductionKernel` clears one bit at a time, XORing the
//!      polynomial shifted to the offending bit.
//!    - `ChunkedReductionKernel` clears up to a whole chunk of bits per step
//!      by XORing `q * f` shifted into place, where `q` is the top window.
//!      The number of steps grows with `n / CHUNK_BITS` instead of `n`.

use crate::error::Result;
use crate::geometry::{Chunk, CHUNK_BITS};
use crate::gpu::kernels::misc::{self, Constant};
use crate::gpu::kernels::primitives::{self, clmul};
use crate::gpu::kernels::{single_block_threads, BinaryOperands, FieldParams, DEFAULT_THREADS_PER_BLOCK};
use crate::gpu::{BlockContext, Device, DeviceBuffer, Kernel, LaunchConfig, Stream};

/// Reduction strategy after the product
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reduction {
    /// One bit per step
    #[default]
    Bitwise,
    /// One chunk-wide window per step
    Chunked,
}

/// Partial products of all chunk pairs, accumulated with atomic XOR
pub struct ProductKernel {
    pub a: DeviceBuffer,
    pub b: DeviceBuffer,
    /// `2 * num_chunks` chunks, zeroed before launch
    pub product: DeviceBuffer,
}

impl Kernel for ProductKernel {
    fn name(&self) -> &'static str {
        "chunk_product"
    }

    fn run_block(&self, block: &mut BlockContext) {
        let m = self.a.len();
        for tid in block.threads() {
            let gid = block.global_id(tid);
            if gid >= m * m {
                continue;
            }
            let (i, j) = (gid / m, gid % m);
            let (x, y) = (self.a.load(i), self.b.load(j));
            if x == 0 || y == 0 {
                continue;
            }
            let (high, low) = clmul(x, y);
            self.product.xor(i + j, high);
            self.product.xor(i + j + 1, low);
        }
    }
}

/// Bit-serial reduction of the product by the field polynomial
pub struct BitwiseReductionKernel {
    pub product: DeviceBuffer,
    pub poly: DeviceBuffer,
    pub out: DeviceBuffer,
    pub field_size: usize,
}

impl Kernel for BitwiseReductionKernel {
    fn name(&self) -> &'static str {
        "reduce_bitwise"
    }

    fn run_block(&self, block: &mut BlockContext) {
        let mut product = self.product.read_all();
        let poly = self.poly.read_all();
        let n = self.field_size;

        if let Some(top) = primitives::element_degree(&product) {
            for bit in (n..=top).rev() {
                if primitives::test_bit(&product, bit) {
                    primitives::xor_shift_left_into(&mut product, &poly, bit - n);
                }
            }
        }

        store_low_half(block, &product, &self.out);
    }
}

/// Window-at-a-time reduction of the product by the field polynomial
pub struct ChunkedReductionKernel {
    pub product: DeviceBuffer,
    pub poly: DeviceBuffer,
    pub out: DeviceBuffer,
    pub field_size: usize,
}

impl Kernel for ChunkedReductionKernel {
    fn name(&self) -> &'static str {
        "reduce_chunked"
    }

    fn run_block(&self, block: &mut BlockContext) {
        let mut product = self.product.read_all();
        let poly = self.poly.read_all();
        let n = self.field_size;
        let m = poly.len();

        let mut high = vec![0 as Chunk; m];
        let mut low = vec![0 as Chunk; m];
        let mut scaled = vec![0 as Chunk; m + 1];

        while let Some(top) = primitives::element_degree(&product) {
            if top < n {
                break;
            }
            let window = (top - n + 1).min(CHUNK_BITS as usize) as u32;
            let base = top + 1 - window as usize;
            let q = primitives::extract_bits(&product, base, window);

            // scaled = q * poly: per-chunk partial products, then carry-combine
            for tid in block.threads() {
                for j in (tid as usize..m).step_by(block.block_dim as usize) {
                    let (h, l) = clmul(poly[j], q);
                    high[j] = h;
                    low[j] = l;
                }
            }
            for tid in block.threads() {
                for k in (tid as usize..=m).step_by(block.block_dim as usize) {
                    let from_high = if k < m { high[k] } else { 0 };
                    let from_low = if k > 0 { low[k - 1] } else { 0 };
                    scaled[k] = from_high ^ from_low;
                }
            }

            // Clears bits base..=top; everything added stays below top.
            primitives::xor_shift_left_into(&mut product, &scaled, base - n);
        }

        store_low_half(block, &product, &self.out);
    }
}

fn store_low_half(block: &BlockContext, product: &[Chunk], out: &DeviceBuffer) {
    let m = out.len();
    let offset = product.len() - m;
    for tid in block.threads() {
        for i in (tid as usize..m).step_by(block.block_dim as usize) {
            out.store(i, product[offset + i]);
        }
    }
}

/// Scratch memory for one multiplication pipeline
#[derive(Debug, Clone)]
pub struct MulScratch {
    product: DeviceBuffer,
}

impl MulScratch {
    pub fn new(device: &Device, num_chunks: usize) -> Result<Self> {
        Ok(Self {
            product: device.alloc(2 * num_chunks)?,
        })
    }
}

/// Enqueues `out = a * b mod f` on `stream`
///
/// `out` may alias `a` or `b`; the product is complete before the
/// reduction writes.
pub fn enqueue_mul(
    device: &Device,
    stream: &Stream,
    ops: &BinaryOperands,
    field: &FieldParams,
    reduction: Reduction,
    scratch: &MulScratch,
) -> Result<()> {
    let m = field.geometry.num_chunks();
    let product = &scratch.product;

    misc::set_constant(device, stream, product, Constant::Zero)?;
    device.launch(
        stream,
        LaunchConfig::for_items(m * m, DEFAULT_THREADS_PER_BLOCK),
        ProductKernel {
            a: ops.a.clone(),
            b: ops.b.clone(),
            product: product.clone(),
        },
    )?;

    let config = LaunchConfig::single_block(single_block_threads(2 * m));
    let field_size = field.geometry.field_size() as usize;
    match reduction {
        Reduction::Bitwise => device.launch(
            stream,
            config,
            BitwiseReductionKernel {
                product: product.clone(),
                poly: field.poly.clone(),
                out: ops.out.clone(),
                field_size,
            },
        ),
        Reduction::Chunked => device.launch(
            stream,
            config,
            ChunkedReductionKernel {
                product: product.clone(),
                poly: field.poly.clone(),
                out: ops.out.clone(),
                field_size,
            },
        ),
    }
}

/// Enqueues a multiplication on the default stream with fresh scratch memory
pub fn par_mul(device: &Device, ops: &BinaryOperands, field: &FieldParams, reduction: Reduction) -> Result<()> {
    let scratch = MulScratch::new(device, field.geometry.num_chunks())?;
    enqueue_mul(device, device.default_stream(), ops, field, reduction, &scratch)
}
