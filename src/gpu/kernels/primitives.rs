//! Device functions shared by the multiplication, reduction and inversion
//! kernels.
//!
//! Arrays are big-endian chunk arrays; positions are counted from the least
//! significant end so arrays of different widths line up at bit 0.

use crate::geometry::{Chunk, WideChunk, CHUNK_BITS};

/// A shift distance split into whole chunks and residual bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShiftPlan {
    pub block_offset: usize,
    pub bits: u32,
}

impl ShiftPlan {
    pub fn new(shift: usize) -> Self {
        Self {
            block_offset: shift / CHUNK_BITS as usize,
            bits: (shift % CHUNK_BITS as usize) as u32,
        }
    }

    /// Bits of a chunk that stay inside it when shifting left
    pub fn left_mask(&self) -> Chunk {
        Chunk::MAX >> self.bits
    }

    /// Bits of a chunk carried into the next chunk when shifting left
    pub fn right_mask(&self) -> Chunk {
        !self.left_mask()
    }
}

/// Chunk `p` of `a`, counted from the least significant end
#[inline]
pub fn chunk_from_bottom(a: &[Chunk], p: usize) -> Chunk {
    if p < a.len() {
        a[a.len() - 1 - p]
    } else {
        0
    }
}

/// Chunk `q` (from the bottom) of `src << shift`
#[inline]
pub fn shifted_left_chunk(src: &[Chunk], plan: ShiftPlan, q: usize) -> Chunk {
    if q < plan.block_offset {
        return 0;
    }
    let p = q - plan.block_offset;
    let stay = (chunk_from_bottom(src, p) & plan.left_mask()) << plan.bits;
    if plan.bits == 0 || p == 0 {
        return stay;
    }
    let carry = (chunk_from_bottom(src, p - 1) & plan.right_mask()) >> (CHUNK_BITS - plan.bits);
    stay | carry
}

/// Chunk `q` (from the bottom) of `src >> shift`
#[inline]
pub fn shifted_right_chunk(src: &[Chunk], plan: ShiftPlan, q: usize) -> Chunk {
    let p = q + plan.block_offset;
    let low = chunk_from_bottom(src, p) >> plan.bits;
    if plan.bits == 0 {
        return low;
    }
    let carry = chunk_from_bottom(src, p + 1) << (CHUNK_BITS - plan.bits);
    low | carry
}

/// `src << shift`, truncated to `width` chunks
pub fn shift_left(src: &[Chunk], shift: usize, width: usize) -> Vec<Chunk> {
    let plan = ShiftPlan::new(shift);
    (0..width)
        .rev()
        .map(|q| shifted_left_chunk(src, plan, q))
        .collect()
}

/// `src >> shift` in `width` chunks
pub fn shift_right(src: &[Chunk], shift: usize, width: usize) -> Vec<Chunk> {
    let plan = ShiftPlan::new(shift);
    (0..width)
        .rev()
        .map(|q| shifted_right_chunk(src, plan, q))
        .collect()
}

/// `dst ^= src << shift`, bits beyond `dst` are dropped
pub fn xor_shift_left_into(dst: &mut [Chunk], src: &[Chunk], shift: usize) {
    let plan = ShiftPlan::new(shift);
    let width = dst.len();
    let end = width.min(plan.block_offset + src.len() + 1);
    for q in plan.block_offset..end {
        dst[width - 1 - q] ^= shifted_left_chunk(src, plan, q);
    }
}

/// Index of the first non-zero chunk
pub fn first_nonempty_chunk(a: &[Chunk]) -> Option<usize> {
    a.iter().position(|&c| c != 0)
}

/// Degree of the polynomial held in `a`; `None` for zero
pub fn element_degree(a: &[Chunk]) -> Option<usize> {
    first_nonempty_chunk(a).map(|i| {
        (a.len() - 1 - i) * CHUNK_BITS as usize + (CHUNK_BITS - 1 - a[i].leading_zeros()) as usize
    })
}

/// `width` bits of `a` starting at bit `low`, `width <= CHUNK_BITS`
pub fn extract_bits(a: &[Chunk], low: usize, width: u32) -> Chunk {
    let value = shifted_right_chunk(a, ShiftPlan::new(low), 0);
    if width >= CHUNK_BITS {
        value
    } else {
        value & (((1 as Chunk) << width) - 1)
    }
}

/// Whether bit `bit` of `a` is set
pub fn test_bit(a: &[Chunk], bit: usize) -> bool {
    let chunk = chunk_from_bottom(a, bit / CHUNK_BITS as usize);
    (chunk >> (bit % CHUNK_BITS as usize)) & 1 == 1
}

/// Carry-less product of two chunks as `(high, low)`
#[inline]
pub fn clmul(a: Chunk, b: Chunk) -> (Chunk, Chunk) {
    let wide = a as WideChunk;
    let mut rest = b;
    let mut acc: WideChunk = 0;
    while rest != 0 {
        acc ^= wide << rest.trailing_zeros();
        rest &= rest - 1;
    }
    ((acc >> CHUNK_BITS) as Chunk, acc as Chunk)
}
