//! Square-and-multiply exponentiation
//!
//! The host walks the exponent from the most significant set bit down and
//! enqueues one squaring per bit plus one multiplication per set bit, all on
//! the same stream. Every step is a full multiplication launch followed by a
//! reduction, so the accumulator never leaves the field.

use crate::error::Result;
use crate::gpu::kernels::misc::{self, Constant};
use crate::gpu::kernels::mul::{enqueue_mul, MulScratch, Reduction};
use crate::gpu::kernels::{BinaryOperands, FieldParams};
use crate::gpu::{Device, DeviceBuffer, Stream};

/// Bits of `k`, most significant first, without leading zeros.
///
/// Zero yields an empty sequence.
pub fn exponent_bits(k: u64) -> Vec<bool> {
    let significant = u64::BITS - k.leading_zeros();
    (0..significant).rev().map(|i| (k >> i) & 1 == 1).collect()
}

/// Bits of `2^n - 2`: `n - 1` ones followed by a zero
pub fn fermat_inverse_bits(field_size: u32) -> Vec<bool> {
    if field_size < 2 {
        // GF(2): 2^1 - 2 = 0
        return Vec::new();
    }
    let mut bits = vec![true; field_size as usize - 1];
    bits.push(false);
    bits
}

/// Enqueues `out = base^e` where `e` is given by `bits`, most significant first
///
/// `out` may alias `base`.
pub fn enqueue_pow(
    device: &Device,
    stream: &Stream,
    base: &DeviceBuffer,
    bits: &[bool],
    out: &DeviceBuffer,
    field: &FieldParams,
    reduction: Reduction,
) -> Result<()> {
    if bits.iter().all(|&bit| !bit) {
        return misc::set_constant(device, stream, out, Constant::One);
    }

    let m = field.geometry.num_chunks();
    let operand = device.alloc(m)?;
    let acc = device.alloc(m)?;
    let scratch = MulScratch::new(device, m)?;
    device.copy(stream, &operand, base)?;

    let square = BinaryOperands {
        a: acc.clone(),
        b: acc.clone(),
        out: acc.clone(),
    };
    let multiply = BinaryOperands {
        a: acc.clone(),
        b: operand.clone(),
        out: acc.clone(),
    };

    let mut started = false;
    for &bit in bits {
        if started {
            enqueue_mul(device, stream, &square, field, reduction, &scratch)?;
        }
        if bit {
            if started {
                enqueue_mul(device, stream, &multiply, field, reduction, &scratch)?;
            } else {
                device.copy(stream, &acc, &operand)?;
                started = true;
            }
        }
    }

    device.copy(stream, out, &acc)
}

/// Enqueues `out = base^k` on the default stream
pub fn par_exp(
    device: &Device,
    base: &DeviceBuffer,
    k: u64,
    out: &DeviceBuffer,
    field: &FieldParams,
    reduction: Reduction,
) -> Result<()> {
    tracing::debug!(exponent = k, ?reduction, "exponentiation");
    enqueue_pow(
        device,
        device.default_stream(),
        base,
        &exponent_bits(k),
        out,
        field,
        reduction,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{Chunk, ChunkGeometry};
    use crate::gpu::{DeviceProperties, TransferMode};
    use crate::reference::BinaryPoly;

    fn setup(exponents: &[u32]) -> (Device, FieldParams, BinaryPoly) {
        let device = Device::new(DeviceProperties::default()).unwrap();
        let geometry = ChunkGeometry::new(exponents[0]).unwrap();
        let poly = BinaryPoly::from_exponents(exponents);
        let buffer = device.alloc(geometry.num_chunks()).unwrap();
        device
            .upload(&buffer, &poly.to_chunks(geometry.num_chunks()), TransferMode::Synchronous)
            .unwrap();
        (device, FieldParams { geometry, poly: buffer }, poly)
    }

    fn upload(device: &Device, value: &[Chunk]) -> DeviceBuffer {
        let buffer = device.alloc(value.len()).unwrap();
        device.upload(&buffer, value, TransferMode::Synchronous).unwrap();
        buffer
    }

    #[test]
    fn test_exponent_bits() {
        assert!(exponent_bits(0).is_empty());
        assert_eq!(exponent_bits(1), vec![true]);
        assert_eq!(exponent_bits(0b1011), vec![true, false, true, true]);
        assert_eq!(exponent_bits(u64::MAX).len(), 64);

        assert_eq!(fermat_inverse_bits(4), vec![true, true, true, false]);
        assert!(fermat_inverse_bits(1).is_empty());
    }

    #[test]
    fn test_exp_zero_and_one() {
        let (device, field, poly) = setup(&[10, 3, 0]);
        let m = field.geometry.num_chunks();
        let x = BinaryPoly::from_exponents(&[9, 5, 2]);
        let base = upload(&device, &x.to_chunks(m));
        let out = device.alloc(m).unwrap();

        par_exp(&device, &base, 0, &out, &field, Reduction::Chunked).unwrap();
        assert_eq!(device.download(&out).unwrap().0, BinaryPoly::one().to_chunks(m));

        par_exp(&device, &base, 1, &out, &field, Reduction::Chunked).unwrap();
        assert_eq!(device.download(&out).unwrap().0, x.to_chunks(m));

        // zero^0 is one as well
        let zero = device.alloc(m).unwrap();
        par_exp(&device, &zero, 0, &out, &field, Reduction::Bitwise).unwrap();
        assert_eq!(device.download(&out).unwrap().0, BinaryPoly::one().to_chunks(m));
        assert!(poly.is_irreducible());
    }

    #[test]
    fn test_exp_matches_reference() {
        for exponents in [&[10u32, 3, 0][..], &[64, 4, 3, 1, 0], &[163, 7, 6, 3, 0]] {
            let (device, field, poly) = setup(exponents);
            let m = field.geometry.num_chunks();
            let x = BinaryPoly::from_exponents(&[exponents[0] - 1, 7, 3, 0]);
            let base = upload(&device, &x.to_chunks(m));

            for k in [2u64, 3, 255, 1 << 20, 0xdead_beef] {
                for reduction in [Reduction::Bitwise, Reduction::Chunked] {
                    let out = device.alloc(m).unwrap();
                    par_exp(&device, &base, k, &out, &field, reduction).unwrap();
                    assert_eq!(
                        device.download(&out).unwrap().0,
                        x.pow_mod(k, &poly).to_chunks(m),
                        "x^{} in GF(2^{})",
                        k,
                        exponents[0]
                    );
                }
            }
        }
    }

    #[test]
    fn test_exp_in_place() {
        let (device, field, poly) = setup(&[32, 7, 3, 2, 0]);
        let m = field.geometry.num_chunks();
        let x = BinaryPoly::from_exponents(&[31, 1]);
        let buffer = upload(&device, &x.to_chunks(m));

        par_exp(&device, &buffer, 5, &buffer, &field, Reduction::Chunked).unwrap();
        assert_eq!(device.download(&buffer).unwrap().0, x.pow_mod(5, &poly).to_chunks(m));
    }
}
