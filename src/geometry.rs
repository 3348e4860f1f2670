//! Chunked representation of GF(2^n) elements.
//!
//! An element (or the reduction polynomial) is a sequence of `num_chunks`
//! fixed-width machine words in big-endian chunk order: index 0 holds the most
//! significant bits. The chunk count covers `field_size + 1` bits so that the
//! polynomial's leading term `x^n` always fits into chunk 0.
//!
//! Key Features:
//! - Field geometry derived from a runtime bit-width
//! - Reduction mask index locating the field boundary inside chunk 0
//! - Conversions between chunk arrays, big-endian byte strings and decimal text
//!
//! The chunk width is a compile-time choice: 32-bit words by default, 64-bit
//! words with the `wide-chunks` feature. Byte and decimal views are identical
//! for both widths.

use num_bigint::BigUint;
use num_traits::Zero;

use crate::error::{Gf2nError, Result};

#[cfg(not(feature = "wide-chunks"))]
mod width {
    use byteorder::{BigEndian, ByteOrder};

    pub type Chunk = u32;
    pub type AtomicChunk = std::sync::atomic::AtomicU32;
    pub type WideChunk = u64;

    pub(crate) fn read(buf: &[u8]) -> Chunk {
        BigEndian::read_u32(buf)
    }

    pub(crate) fn write(buf: &mut [u8], value: Chunk) {
        BigEndian::write_u32(buf, value)
    }
}

#[cfg(feature = "wide-chunks")]
mod width {
    use byteorder::{BigEndian, ByteOrder};

    pub type Chunk = u64;
    pub type AtomicChunk = std::sync::atomic::AtomicU64;
    pub type WideChunk = u128;

    pub(crate) fn read(buf: &[u8]) -> Chunk {
        BigEndian::read_u64(buf)
    }

    pub(crate) fn write(buf: &mut [u8], value: Chunk) {
        BigEndian::write_u64(buf, value)
    }
}

pub use width::{AtomicChunk, Chunk, WideChunk};

/// Bits per chunk
pub const CHUNK_BITS: u32 = Chunk::BITS;

/// Bytes per chunk
pub const CHUNK_BYTES: usize = (Chunk::BITS / 8) as usize;

/// Largest supported field size
pub const MAX_FIELD_SIZE: u32 = 1 << 16;

/// Geometry of one field configuration.
///
/// Immutable once constructed; a different field size needs a new geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkGeometry {
    field_size: u32,
    num_chunks: usize,
    reduction_mask_index: u32,
}

impl ChunkGeometry {
    /// Derives the geometry for GF(2^field_size)
    ///
    /// # Arguments
    /// * `field_size` - Bit-width `n` of the field, 1 ..= `MAX_FIELD_SIZE`
    ///
    /// # Returns
    /// * `Result<Self>` - Geometry or `InvalidFieldSize`
    pub fn new(field_size: u32) -> Result<Self> {
        if field_size == 0 || field_size > MAX_FIELD_SIZE {
            return Err(Gf2nError::InvalidFieldSize(field_size));
        }

        let num_chunks = (field_size as usize + 1).div_ceil(CHUNK_BITS as usize);
        let reduction_mask_index = CHUNK_BITS - (field_size % CHUNK_BITS);

        Ok(Self {
            field_size,
            num_chunks,
            reduction_mask_index,
        })
    }

    pub fn field_size(&self) -> u32 {
        self.field_size
    }

    pub fn num_chunks(&self) -> usize {
        self.num_chunks
    }

    /// Number of padding bits at the top of chunk 0 for field elements.
    ///
    /// Equals `CHUNK_BITS` when the field ends on a chunk boundary, in which
    /// case chunk 0 only ever carries the polynomial's leading term.
    pub fn reduction_mask_index(&self) -> u32 {
        self.reduction_mask_index
    }

    /// Size of one element buffer in bytes
    pub fn byte_len(&self) -> usize {
        self.num_chunks * CHUNK_BYTES
    }

    /// Size of the externally visible value, `ceil(field_size / 8)` bytes
    pub fn value_len(&self) -> usize {
        (self.field_size as usize).div_ceil(8)
    }

    /// Mask of element bits inside chunk 0
    pub fn top_chunk_mask(&self) -> Chunk {
        self.leading_bit() - 1
    }

    /// Position of the polynomial's `x^n` term inside chunk 0
    pub fn leading_bit(&self) -> Chunk {
        (1 as Chunk) << (CHUNK_BITS - self.reduction_mask_index)
    }

    /// Maps a bit position (0 = constant term) to `(chunk index, bit in chunk)`
    pub fn bit_location(&self, bit: u32) -> (usize, u32) {
        let from_bottom = (bit / CHUNK_BITS) as usize;
        (self.num_chunks - 1 - from_bottom, bit % CHUNK_BITS)
    }

    /// Right-aligns a big-endian chunk array into `num_chunks` chunks
    ///
    /// Leading zero chunks beyond the geometry are tolerated.
    pub fn align(&self, chunks: &[Chunk]) -> Result<Vec<Chunk>> {
        let first = chunks.iter().position(|&c| c != 0).unwrap_or(chunks.len());
        let significant = &chunks[first..];
        if significant.len() > self.num_chunks {
            return Err(Gf2nError::InvalidBufferLength {
                max: self.num_chunks,
                got: chunks.len(),
            });
        }

        let mut aligned = vec![0; self.num_chunks];
        aligned[self.num_chunks - significant.len()..].copy_from_slice(significant);
        Ok(aligned)
    }

    /// Converts a big-endian byte string into an aligned chunk array
    pub fn chunks_from_bytes(&self, bytes: &[u8]) -> Result<Vec<Chunk>> {
        if bytes.len() > self.byte_len() {
            return Err(Gf2nError::InvalidBufferLength {
                max: self.byte_len(),
                got: bytes.len(),
            });
        }
        self.align(&bytes_to_chunks(bytes))
    }

    /// Extracts the `value_len()` trailing bytes of the big-endian image
    pub fn value_bytes(&self, chunks: &[Chunk]) -> Vec<u8> {
        let image = chunks_to_bytes(chunks);
        image[image.len() - self.value_len()..].to_vec()
    }

    /// Whether an aligned chunk array holds a value below `x^n`
    pub fn fits_field(&self, chunks: &[Chunk]) -> bool {
        chunks.len() == self.num_chunks && chunks[0] & !self.top_chunk_mask() == 0
    }

    /// Checks that an aligned chunk array is an element of the field
    pub fn check_field_value(&self, chunks: &[Chunk]) -> Result<()> {
        if self.fits_field(chunks) {
            Ok(())
        } else {
            Err(Gf2nError::ValueOutOfField {
                field_size: self.field_size,
                bits: significant_bits(chunks),
            })
        }
    }
}

/// Packs a big-endian byte string into the minimal big-endian chunk array.
///
/// The input is left-padded to a whole number of chunks; an empty input
/// yields a single zero chunk.
pub fn bytes_to_chunks(bytes: &[u8]) -> Vec<Chunk> {
    let count = bytes.len().div_ceil(CHUNK_BYTES).max(1);
    let mut padded = vec![0u8; count * CHUNK_BYTES];
    padded[count * CHUNK_BYTES - bytes.len()..].copy_from_slice(bytes);
    padded.chunks_exact(CHUNK_BYTES).map(width::read).collect()
}

/// Serializes a big-endian chunk array into its big-endian byte image
pub fn chunks_to_bytes(chunks: &[Chunk]) -> Vec<u8> {
    let mut image = vec![0u8; chunks.len() * CHUNK_BYTES];
    for (dst, &chunk) in image.chunks_exact_mut(CHUNK_BYTES).zip(chunks) {
        width::write(dst, chunk);
    }
    image
}

/// Reads the native-endian memory image of a big-endian byte stream.
///
/// This is how a little-endian host sees the bytes when they are copied
/// verbatim into chunk memory: every chunk comes out byte-reversed.
pub fn bytes_to_le_image(bytes: &[u8]) -> Vec<Chunk> {
    bytes_to_chunks(bytes).into_iter().map(Chunk::swap_bytes).collect()
}

/// Parses a non-negative decimal integer into the minimal chunk array
pub fn parse_decimal(text: &str) -> Result<Vec<Chunk>> {
    let trimmed = text.trim();
    let value = BigUint::parse_bytes(trimmed.as_bytes(), 10)
        .ok_or_else(|| Gf2nError::InvalidDecimal(text.to_string()))?;
    Ok(bytes_to_chunks(&value.to_bytes_be()))
}

/// Renders a big-endian chunk array as decimal text
pub fn chunks_to_decimal(chunks: &[Chunk]) -> String {
    let value = BigUint::from_bytes_be(&chunks_to_bytes(chunks));
    if value.is_zero() {
        "0".to_string()
    } else {
        value.to_str_radix(10)
    }
}

/// Bit length of a big-endian chunk array
pub fn significant_bits(chunks: &[Chunk]) -> u64 {
    match chunks.iter().position(|&c| c != 0) {
        Some(i) => {
            let below = (chunks.len() - i - 1) as u64 * CHUNK_BITS as u64;
            below + (CHUNK_BITS - chunks[i].leading_zeros()) as u64
        }
        None => 0,
    }
}
