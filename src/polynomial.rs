//! Reduction polynomials
//!
//! An `IrreduciblePolynomial` is the full bit pattern of the field modulus
//! stored as `num_chunks` big-endian chunks, the same layout the kernels
//! consume. It can be built from any of the input forms callers use:
//! decimal text, raw big-endian bytes, a native chunk array or a list of
//! exponent positions.
//!
//! Key Features:
//! - Validation of chunk count and degree against the field geometry
//! - Standard polynomial per field size: published polynomials for common
//!   sizes, otherwise the lowest-weight irreducible polynomial found by search
//! - Ben-Or irreducibility test on the host
//! - Seeded random polynomials for dummy configurations

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, PoisonError};

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::error::{Gf2nError, Result};
use crate::geometry::{self, Chunk, ChunkGeometry};
use crate::reference::BinaryPoly;

/// Input forms accepted for a reduction polynomial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolynomialSource<'a> {
    /// Decimal text of the bit pattern
    Decimal(&'a str),
    /// Big-endian bytes of the bit pattern
    Bytes(&'a [u8]),
    /// Big-endian chunks of the bit pattern
    Chunks(&'a [Chunk]),
    /// Exponent positions, ended by a negative value or the slice end
    Exponents(&'a [i64]),
    /// Random polynomial of the field's degree with `x^n` and `1` set
    Random { seed: u64 },
}

/// Published polynomials, highest exponent first
const KNOWN_POLYNOMIALS: &[&[u32]] = &[
    &[2, 1, 0],
    &[3, 1, 0],
    &[4, 1, 0],
    &[5, 2, 0],
    &[6, 1, 0],
    &[7, 1, 0],
    &[8, 4, 3, 1, 0],
    &[9, 4, 0],
    &[10, 3, 0],
    &[11, 2, 0],
    &[12, 3, 0],
    &[13, 4, 3, 1, 0],
    &[14, 5, 0],
    &[15, 1, 0],
    &[16, 5, 3, 1, 0],
    &[17, 3, 0],
    &[32, 7, 3, 2, 0],
    &[64, 4, 3, 1, 0],
    &[127, 1, 0],
    &[128, 7, 2, 1, 0],
    &[163, 7, 6, 3, 0],
    &[233, 74, 0],
    &[283, 12, 7, 5, 0],
    &[409, 87, 0],
    &[571, 10, 5, 2, 0],
];

static STANDARD_CACHE: OnceLock<Mutex<HashMap<u32, Vec<u32>>>> = OnceLock::new();

/// Reduction polynomial of one field configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrreduciblePolynomial {
    geometry: ChunkGeometry,
    chunks: Vec<Chunk>,
}

impl IrreduciblePolynomial {
    /// Builds the polynomial from any supported input form
    ///
    /// # Arguments
    /// * `geometry` - Geometry of the field the polynomial defines
    /// * `source` - The polynomial in one of the accepted encodings
    ///
    /// # Returns
    /// * `Result<Self>` - The polynomial, `WrongPolynomialSize` when it has
    ///   more chunks than the geometry, or `WrongPolynomialDegree` when its
    ///   degree is not the field size
    pub fn from_source(geometry: ChunkGeometry, source: PolynomialSource<'_>) -> Result<Self> {
        match source {
            PolynomialSource::Decimal(text) => Self::from_decimal(geometry, text),
            PolynomialSource::Bytes(bytes) => Self::from_bytes(geometry, bytes),
            PolynomialSource::Chunks(chunks) => Self::from_chunks(geometry, chunks),
            PolynomialSource::Exponents(exponents) => Self::from_exponents(geometry, exponents),
            PolynomialSource::Random { seed } => Ok(Self::random(geometry, seed)),
        }
    }

    pub fn from_decimal(geometry: ChunkGeometry, text: &str) -> Result<Self> {
        Self::from_chunks(geometry, &geometry::parse_decimal(text)?)
    }

    pub fn from_bytes(geometry: ChunkGeometry, bytes: &[u8]) -> Result<Self> {
        Self::from_chunks(geometry, &geometry::bytes_to_chunks(bytes))
    }

    /// Shorter arrays are right-aligned; leading zero chunks are ignored
    pub fn from_chunks(geometry: ChunkGeometry, chunks: &[Chunk]) -> Result<Self> {
        let aligned = geometry
            .align(chunks)
            .map_err(|_| Gf2nError::WrongPolynomialSize {
                expected: geometry.num_chunks(),
                got: chunks.len(),
            })?;

        let degree = BinaryPoly::from_chunks(&aligned).degree();
        if degree != Some(geometry.field_size() as usize) {
            return Err(Gf2nError::WrongPolynomialDegree {
                field_size: geometry.field_size(),
                degree: degree.map_or(-1, |d| d as i64),
            });
        }

        Ok(Self {
            geometry,
            chunks: aligned,
        })
    }

    /// Reads exponent positions up to the first negative entry
    pub fn from_exponents(geometry: ChunkGeometry, exponents: &[i64]) -> Result<Self> {
        let n = geometry.field_size() as i64;
        let mut poly = BinaryPoly::zero();
        for &e in exponents.iter().take_while(|&&e| e >= 0) {
            if e > n {
                return Err(Gf2nError::WrongPolynomialDegree {
                    field_size: geometry.field_size(),
                    degree: e,
                });
            }
            poly.flip_bit(e as usize);
        }
        Self::from_chunks(geometry, &poly.to_chunks(geometry.num_chunks()))
    }

    /// Random polynomial of degree `n` with constant term, not necessarily
    /// irreducible
    pub fn random(geometry: ChunkGeometry, seed: u64) -> Self {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let n = geometry.field_size() as usize;
        let mut poly = BinaryPoly::monomial(n);
        poly.set_bit(0);
        for bit in 1..n {
            if rng.gen::<bool>() {
                poly.set_bit(bit);
            }
        }
        Self {
            geometry,
            chunks: poly.to_chunks(geometry.num_chunks()),
        }
    }

    /// Standard polynomial for GF(2^n)
    ///
    /// Published polynomials are used where they exist. Other sizes get the
    /// trinomial `x^n + x^k + 1` with the smallest `k`, or failing that the
    /// pentanomial `x^n + x^k3 + x^k2 + x^k1 + 1` with the lexicographically
    /// smallest `(k3, k2, k1)`. Results are cached per size.
    pub fn standard(field_size: u32) -> Result<Self> {
        let geometry = ChunkGeometry::new(field_size)?;
        let cache = STANDARD_CACHE.get_or_init(|| Mutex::new(HashMap::new()));

        let cached = cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&field_size)
            .cloned();
        let exponents = match cached {
            Some(exponents) => exponents,
            None => {
                let exponents = known_polynomial(field_size)
                    .map(<[u32]>::to_vec)
                    .or_else(|| search_low_weight(field_size))
                    .ok_or_else(|| {
                        Gf2nError::InvalidParameters(format!(
                            "no irreducible trinomial or pentanomial of degree {}",
                            field_size
                        ))
                    })?;
                tracing::debug!(field_size, ?exponents, "standard polynomial selected");
                cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .insert(field_size, exponents.clone());
                exponents
            }
        };

        let poly = BinaryPoly::from_exponents(&exponents);
        Ok(Self {
            geometry,
            chunks: poly.to_chunks(geometry.num_chunks()),
        })
    }

    pub fn geometry(&self) -> ChunkGeometry {
        self.geometry
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    /// Exponents of the non-zero terms, highest first
    pub fn exponents(&self) -> Vec<u32> {
        self.to_binary_poly().exponents()
    }

    pub fn to_decimal(&self) -> String {
        geometry::chunks_to_decimal(&self.chunks)
    }

    /// Ben-Or test
    pub fn is_irreducible(&self) -> bool {
        self.to_binary_poly().is_irreducible()
    }

    pub fn to_binary_poly(&self) -> BinaryPoly {
        BinaryPoly::from_chunks(&self.chunks)
    }
}

fn known_polynomial(field_size: u32) -> Option<&'static [u32]> {
    KNOWN_POLYNOMIALS
        .iter()
        .find(|exponents| exponents[0] == field_size)
        .copied()
}

fn search_low_weight(n: u32) -> Option<Vec<u32>> {
    if n == 1 {
        return Some(vec![1, 0]);
    }

    // Swan: no irreducible trinomials when n is a multiple of 8
    if n % 8 != 0 {
        for k in 1..n {
            let candidate = [n, k, 0];
            if BinaryPoly::from_exponents(&candidate).is_irreducible() {
                return Some(candidate.to_vec());
            }
        }
    }

    for k3 in 3..n {
        for k2 in 2..k3 {
            for k1 in 1..k2 {
                let candidate = [n, k3, k2, k1, 0];
                if BinaryPoly::from_exponents(&candidate).is_irreducible() {
                    return Some(candidate.to_vec());
                }
            }
        }
    }
    None
}
