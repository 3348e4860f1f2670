//! Multiplicative inversion
//!
//! Two strategies that must agree bit for bit on non-zero inputs:
//! - `EuclidInverseKernel`: binary extended Euclid on the polynomial pair
//!   `(a, f)`, tracking degrees with the element-degree primitive
//! - Fermat: `a^(2^n - 2)` through the exponentiation pipeline
//!
//! Neither strategy checks for zero; callers reject it before dispatch.

use crate::error::Result;
use crate::geometry::Chunk;
use crate::gpu::kernels::exp::{enqueue_pow, fermat_inverse_bits};
use crate::gpu::kernels::mul::Reduction;
use crate::gpu::kernels::{primitives, single_block_threads, FieldParams};
use crate::gpu::{BlockContext, Device, DeviceBuffer, Kernel, LaunchConfig, Stream};

/// Extended Euclid over GF(2)[x] in a single block.
///
/// Maintains `u * a = r` and `v * a = s (mod f)` while cancelling the
/// leading term of the higher-degree remainder, until `r = 1`.
pub struct EuclidInverseKernel {
    pub a: DeviceBuffer,
    pub poly: DeviceBuffer,
    pub out: DeviceBuffer,
}

impl Kernel for EuclidInverseKernel {
    fn name(&self) -> &'static str {
        "inverse_euclid"
    }

    fn run_block(&self, block: &mut BlockContext) {
        let m = self.poly.len();
        let mut r = self.a.read_all();
        let mut s = self.poly.read_all();
        let mut u = vec![0 as Chunk; m];
        let mut v = vec![0 as Chunk; m];
        u[m - 1] = 1;

        while let Some(deg_r) = primitives::element_degree(&r) {
            if deg_r == 0 {
                break;
            }
            let deg_s = primitives::element_degree(&s).unwrap_or(0);
            if deg_s < deg_r {
                std::mem::swap(&mut r, &mut s);
                std::mem::swap(&mut u, &mut v);
            }
            let delta = deg_s.abs_diff(deg_r);
            primitives::xor_shift_left_into(&mut s, &r, delta);
            primitives::xor_shift_left_into(&mut v, &u, delta);
        }

        for tid in block.threads() {
            for i in (tid as usize..m).step_by(block.block_dim as usize) {
                self.out.store(i, u[i]);
            }
        }
    }
}

/// Enqueues `out = a^-1` computed by extended Euclid
pub fn enqueue_inverse(
    device: &Device,
    stream: &Stream,
    a: &DeviceBuffer,
    out: &DeviceBuffer,
    field: &FieldParams,
) -> Result<()> {
    let config = LaunchConfig::single_block(single_block_threads(field.geometry.num_chunks()));
    device.launch(
        stream,
        config,
        EuclidInverseKernel {
            a: a.clone(),
            poly: field.poly.clone(),
            out: out.clone(),
        },
    )
}

/// Euclidean inverse on the default stream
pub fn par_inverse(device: &Device, a: &DeviceBuffer, out: &DeviceBuffer, field: &FieldParams) -> Result<()> {
    enqueue_inverse(device, device.default_stream(), a, out, field)
}

/// Fermat inverse `a^(2^n - 2)` on the default stream
pub fn par_inverse_with_exp(
    device: &Device,
    a: &DeviceBuffer,
    out: &DeviceBuffer,
    field: &FieldParams,
) -> Result<()> {
    let bits = fermat_inverse_bits(field.geometry.field_size());
    enqueue_pow(
        device,
        device.default_stream(),
        a,
        &bits,
        out,
        field,
        Reduction::Chunked,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::ChunkGeometry;
    use crate::gpu::kernels::mul::par_mul;
    use crate::gpu::kernels::BinaryOperands;
    use crate::gpu::{DeviceProperties, TransferMode};
    use crate::reference::BinaryPoly;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha20Rng;

    fn setup(device: &Device, exponents: &[u32]) -> (FieldParams, BinaryPoly) {
        let geometry = ChunkGeometry::new(exponents[0]).unwrap();
        let poly = BinaryPoly::from_exponents(exponents);
        let buffer = device.alloc(geometry.num_chunks()).unwrap();
        device
            .upload(&buffer, &poly.to_chunks(geometry.num_chunks()), TransferMode::Synchronous)
            .unwrap();
        (FieldParams { geometry, poly: buffer }, poly)
    }

    fn random_nonzero(rng: &mut ChaCha20Rng, n: u32) -> BinaryPoly {
        loop {
            let mut value = BinaryPoly::zero();
            for bit in 0..n as usize {
                if rng.gen::<bool>() {
                    value.set_bit(bit);
                }
            }
            if !value.is_zero() {
                return value;
            }
        }
    }

    #[test]
    fn test_strategies_agree_and_invert() {
        let device = Device::new(DeviceProperties::default()).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(11);

        let fields: [&[u32]; 4] = [&[2, 1, 0], &[10, 3, 0], &[64, 4, 3, 1, 0], &[127, 1, 0]];
        for exponents in fields {
            let (field, poly) = setup(&device, exponents);
            let m = field.geometry.num_chunks();

            for _ in 0..3 {
                let x = random_nonzero(&mut rng, exponents[0]);
                let a = device.alloc(m).unwrap();
                device.upload(&a, &x.to_chunks(m), TransferMode::Synchronous).unwrap();

                let euclid = device.alloc(m).unwrap();
                let fermat = device.alloc(m).unwrap();
                par_inverse(&device, &a, &euclid, &field).unwrap();
                par_inverse_with_exp(&device, &a, &fermat, &field).unwrap();

                let (euclid_value, _) = device.download(&euclid).unwrap();
                let (fermat_value, _) = device.download(&fermat).unwrap();
                assert_eq!(euclid_value, fermat_value, "GF(2^{})", exponents[0]);
                assert_eq!(
                    euclid_value,
                    x.inverse_mod(&poly).unwrap().to_chunks(m)
                );

                let product = device.alloc(m).unwrap();
                let ops = BinaryOperands {
                    a: a.clone(),
                    b: euclid.clone(),
                    out: product.clone(),
                };
                par_mul(&device, &ops, &field, Reduction::Bitwise).unwrap();
                assert_eq!(device.download(&product).unwrap().0, BinaryPoly::one().to_chunks(m));
            }
        }
    }

    #[test]
    fn test_inverse_of_one_is_one() {
        let device = Device::new(DeviceProperties::default()).unwrap();
        let (field, _) = setup(&device, &[163, 7, 6, 3, 0]);
        let m = field.geometry.num_chunks();
        let one = BinaryPoly::one().to_chunks(m);

        let a = device.alloc(m).unwrap();
        device.upload(&a, &one, TransferMode::Synchronous).unwrap();
        par_inverse(&device, &a, &a, &field).unwrap();
        assert_eq!(device.download(&a).unwrap().0, one);
    }
}
