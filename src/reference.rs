//! Serial host arithmetic in GF(2)[x] and GF(2^n)
//!
//! `BinaryPoly` is a plain bit-vector polynomial over GF(2) stored in 64-bit
//! limbs, least significant limb first. It backs the host-side parts of the
//! engine that have no device counterpart (irreducibility testing and the
//! standard polynomial search) and serves as the serial baseline the device
//! kernels are compared against.
//!
//! Performance Characteristics:
//! - Schoolbook carry-less multiplication, O((n/64)^2) limb products
//! - Bit-serial remainder, O(n * n/64)
//! - Ben-Or irreducibility test, O(n) modular squarings and gcds

use crate::error::{Gf2nError, Result};
use crate::geometry::{Chunk, CHUNK_BITS};

/// Polynomial over GF(2)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct BinaryPoly {
    limbs: Vec<u64>,
}

impl BinaryPoly {
    pub fn zero() -> Self {
        Self { limbs: Vec::new() }
    }

    pub fn one() -> Self {
        Self { limbs: vec![1] }
    }

    /// `x^k`
    pub fn monomial(k: usize) -> Self {
        let mut p = Self::zero();
        p.set_bit(k);
        p
    }

    /// Sum of `x^e` over the given exponents; repeated exponents cancel
    pub fn from_exponents(exponents: &[u32]) -> Self {
        let mut p = Self::zero();
        for &e in exponents {
            p.flip_bit(e as usize);
        }
        p
    }

    /// Reads a big-endian chunk array
    pub fn from_chunks(chunks: &[Chunk]) -> Self {
        let mut p = Self::zero();
        for (q, &chunk) in chunks.iter().rev().enumerate() {
            let mut rest = chunk;
            while rest != 0 {
                let bit = rest.trailing_zeros() as usize;
                p.set_bit(q * CHUNK_BITS as usize + bit);
                rest &= rest - 1;
            }
        }
        p
    }

    /// Writes the low `width * CHUNK_BITS` bits as a big-endian chunk array
    pub fn to_chunks(&self, width: usize) -> Vec<Chunk> {
        let mut out = vec![0 as Chunk; width];
        if let Some(degree) = self.degree() {
            for bit in 0..=degree {
                let q = bit / CHUNK_BITS as usize;
                if q < width && self.bit(bit) {
                    out[width - 1 - q] |= (1 as Chunk) << (bit % CHUNK_BITS as usize);
                }
            }
        }
        out
    }

    /// Exponents of the non-zero terms, highest first
    pub fn exponents(&self) -> Vec<u32> {
        match self.degree() {
            Some(d) => (0..=d).rev().filter(|&b| self.bit(b)).map(|b| b as u32).collect(),
            None => Vec::new(),
        }
    }

    pub fn degree(&self) -> Option<usize> {
        self.limbs
            .iter()
            .rposition(|&l| l != 0)
            .map(|i| i * 64 + 63 - self.limbs[i].leading_zeros() as usize)
    }

    pub fn is_zero(&self) -> bool {
        self.degree().is_none()
    }

    pub fn is_one(&self) -> bool {
        self.degree() == Some(0)
    }

    pub fn bit(&self, k: usize) -> bool {
        self.limbs
            .get(k / 64)
            .map_or(false, |&l| (l >> (k % 64)) & 1 == 1)
    }

    pub fn set_bit(&mut self, k: usize) {
        self.ensure_limbs(k / 64 + 1);
        self.limbs[k / 64] |= 1 << (k % 64);
    }

    pub fn flip_bit(&mut self, k: usize) {
        self.ensure_limbs(k / 64 + 1);
        self.limbs[k / 64] ^= 1 << (k % 64);
        self.normalize();
    }

    /// `self + other` (XOR)
    pub fn add(&self, other: &BinaryPoly) -> BinaryPoly {
        let mut sum = self.clone();
        sum.xor_shifted(other, 0);
        sum
    }

    /// Carry-less product
    pub fn mul(&self, other: &BinaryPoly) -> BinaryPoly {
        let mut limbs = vec![0u64; self.limbs.len() + other.limbs.len()];
        for (i, &a) in self.limbs.iter().enumerate() {
            if a == 0 {
                continue;
            }
            for (j, &b) in other.limbs.iter().enumerate() {
                let (high, low) = clmul64(a, b);
                limbs[i + j] ^= low;
                limbs[i + j + 1] ^= high;
            }
        }
        let mut product = BinaryPoly { limbs };
        product.normalize();
        product
    }

    /// Remainder of division by `modulus`
    pub fn rem(&self, modulus: &BinaryPoly) -> Result<BinaryPoly> {
        let dm = modulus.degree().ok_or(Gf2nError::DivisionByZero)?;
        let mut r = self.clone();
        while let Some(dr) = r.degree() {
            if dr < dm {
                break;
            }
            r.xor_shifted(modulus, dr - dm);
        }
        Ok(r)
    }

    pub fn mul_mod(&self, other: &BinaryPoly, modulus: &BinaryPoly) -> BinaryPoly {
        // A zero modulus never reaches here from field code; keep the product.
        let product = self.mul(other);
        product.rem(modulus).unwrap_or(product)
    }

    /// `self^k mod modulus` by square-and-multiply
    pub fn pow_mod(&self, k: u64, modulus: &BinaryPoly) -> BinaryPoly {
        let mut result = BinaryPoly::one();
        for i in (0..64).rev() {
            result = result.mul_mod(&result, modulus);
            if (k >> i) & 1 == 1 {
                result = result.mul_mod(self, modulus);
            }
        }
        result
    }

    pub fn gcd(&self, other: &BinaryPoly) -> BinaryPoly {
        let (mut a, mut b) = (self.clone(), other.clone());
        while !b.is_zero() {
            let r = a.rem(&b).unwrap_or_default();
            a = b;
            b = r;
        }
        a
    }

    /// Inverse modulo `modulus` by the extended Euclidean algorithm
    pub fn inverse_mod(&self, modulus: &BinaryPoly) -> Option<BinaryPoly> {
        let (mut r0, mut r1) = (modulus.clone(), self.rem(modulus).ok()?);
        let (mut s0, mut s1) = (BinaryPoly::zero(), BinaryPoly::one());
        while !r1.is_zero() {
            let (q, r) = r0.div_rem(&r1)?;
            let s = s0.add(&q.mul(&s1));
            r0 = r1;
            r1 = r;
            s0 = s1;
            s1 = s;
        }
        if r0.is_one() {
            s0.rem(modulus).ok()
        } else {
            None
        }
    }

    fn div_rem(&self, divisor: &BinaryPoly) -> Option<(BinaryPoly, BinaryPoly)> {
        let dd = divisor.degree()?;
        let mut q = BinaryPoly::zero();
        let mut r = self.clone();
        while let Some(dr) = r.degree() {
            if dr < dd {
                break;
            }
            q.set_bit(dr - dd);
            r.xor_shifted(divisor, dr - dd);
        }
        Some((q, r))
    }

    /// Ben-Or irreducibility test
    pub fn is_irreducible(&self) -> bool {
        let n = match self.degree() {
            Some(n) if n >= 1 => n,
            _ => return false,
        };

        let x = BinaryPoly::monomial(1);
        let mut power = x.clone();
        for _ in 0..n / 2 {
            power = power.mul_mod(&power, self);
            if !self.gcd(&power.add(&x)).is_one() {
                return false;
            }
        }
        true
    }

    /// `self ^= other << shift`
    fn xor_shifted(&mut self, other: &BinaryPoly, shift: usize) {
        let (words, bits) = (shift / 64, shift % 64);
        self.ensure_limbs(other.limbs.len() + words + 1);
        for (i, &limb) in other.limbs.iter().enumerate() {
            self.limbs[i + words] ^= limb << bits;
            if bits != 0 {
                self.limbs[i + words + 1] ^= limb >> (64 - bits);
            }
        }
        self.normalize();
    }

    fn ensure_limbs(&mut self, len: usize) {
        if self.limbs.len() < len {
            self.limbs.resize(len, 0);
        }
    }

    fn normalize(&mut self) {
        while self.limbs.last() == Some(&0) {
            self.limbs.pop();
        }
    }
}

fn clmul64(a: u64, b: u64) -> (u64, u64) {
    let mut acc: u128 = 0;
    let mut rest = b;
    while rest != 0 {
        acc ^= (a as u128) << rest.trailing_zeros();
        rest &= rest - 1;
    }
    ((acc >> 64) as u64, acc as u64)
}

/// Serial GF(2^n) arithmetic on big-endian chunk arrays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostField {
    modulus: BinaryPoly,
    num_chunks: usize,
}

impl HostField {
    /// Field defined by a big-endian chunk array of the polynomial
    pub fn new(poly_chunks: &[Chunk]) -> Self {
        Self {
            modulus: BinaryPoly::from_chunks(poly_chunks),
            num_chunks: poly_chunks.len(),
        }
    }

    pub fn modulus(&self) -> &BinaryPoly {
        &self.modulus
    }

    pub fn add(&self, a: &[Chunk], b: &[Chunk]) -> Vec<Chunk> {
        a.iter().zip(b).map(|(x, y)| x ^ y).collect()
    }

    pub fn mul(&self, a: &[Chunk], b: &[Chunk]) -> Vec<Chunk> {
        BinaryPoly::from_chunks(a)
            .mul_mod(&BinaryPoly::from_chunks(b), &self.modulus)
            .to_chunks(self.num_chunks)
    }

    pub fn exp(&self, a: &[Chunk], k: u64) -> Vec<Chunk> {
        BinaryPoly::from_chunks(a)
            .pow_mod(k, &self.modulus)
            .to_chunks(self.num_chunks)
    }

    pub fn inverse(&self, a: &[Chunk]) -> Result<Vec<Chunk>> {
        BinaryPoly::from_chunks(a)
            .inverse_mod(&self.modulus)
            .map(|inv| inv.to_chunks(self.num_chunks))
            .ok_or(Gf2nError::DivisionByZero)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_small_irreducibles() {
        let irreducible: [&[u32]; 6] = [
            &[1, 0],
            &[2, 1, 0],
            &[3, 1, 0],
            &[4, 1, 0],
            &[8, 4, 3, 1, 0],
            &[10, 3, 0],
        ];
        for exponents in irreducible {
            assert!(BinaryPoly::from_exponents(exponents).is_irreducible(), "{:?}", exponents);
        }

        let reducible: [&[u32]; 5] = [
            &[2, 0],          // (x + 1)^2
            &[2, 1],          // x (x + 1)
            &[4, 2, 0],       // (x^2 + x + 1)^2
            &[10, 2, 0],      // (x^5 + x + 1)^2
            &[6, 5, 4, 1, 0], // (x^2 + x + 1)(x^4 + x^2 + 1)... or another split
        ];
        for exponents in &reducible[..4] {
            assert!(!BinaryPoly::from_exponents(exponents).is_irreducible(), "{:?}", exponents);
        }
        assert!(!BinaryPoly::zero().is_irreducible());
        assert!(!BinaryPoly::one().is_irreducible());
    }

    #[test]
    fn test_aes_field_known_products() {
        let aes = BinaryPoly::from_exponents(&[8, 4, 3, 1, 0]);
        // FIPS-197: {57} * {83} = {c1}
        let a = BinaryPoly::from_chunks(&[0x57]);
        let b = BinaryPoly::from_chunks(&[0x83]);
        assert_eq!(a.mul_mod(&b, &aes).to_chunks(1), vec![0xc1]);

        // {53} and {ca} are inverses
        let c = BinaryPoly::from_chunks(&[0x53]);
        assert_eq!(c.inverse_mod(&aes).unwrap().to_chunks(1), vec![0xca]);
    }

    #[test]
    fn test_chunk_round_trip() {
        let p = BinaryPoly::from_exponents(&[100, 64, 33, 32, 31, 0]);
        let chunks = p.to_chunks(4);
        assert_eq!(BinaryPoly::from_chunks(&chunks), p);
        assert_eq!(p.exponents(), vec![100, 64, 33, 32, 31, 0]);
    }

    #[test]
    fn test_host_field_inverse_of_zero() {
        let field = HostField::new(&BinaryPoly::from_exponents(&[10, 3, 0]).to_chunks(1));
        assert_eq!(field.inverse(&[0]), Err(Gf2nError::DivisionByZero));
    }

    proptest! {
        #[test]
        fn prop_inverse_and_fermat_agree(value in 1u32..(1 << 10)) {
            let modulus = BinaryPoly::from_exponents(&[10, 3, 0]);
            let a = BinaryPoly::from_chunks(&[value as Chunk]);
            let inverse = a.inverse_mod(&modulus).unwrap();
            prop_assert!(a.mul_mod(&inverse, &modulus).is_one());
            prop_assert_eq!(a.pow_mod((1 << 10) - 2, &modulus), inverse);
        }

        #[test]
        fn prop_mul_distributes(a in any::<u64>(), b in any::<u64>(), c in any::<u64>()) {
            let modulus = BinaryPoly::from_exponents(&[64, 4, 3, 1, 0]);
            let (a, b, c) = (
                BinaryPoly { limbs: vec![a] },
                BinaryPoly { limbs: vec![b] },
                BinaryPoly { limbs: vec![c] },
            );
            let left = a.mul_mod(&b.add(&c), &modulus);
            let right = a.mul_mod(&b, &modulus).add(&a.mul_mod(&c, &modulus));
            prop_assert_eq!(left, right);
        }
    }
}
