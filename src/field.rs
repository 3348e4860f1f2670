//! Field context
//!
//! A `FieldContext` owns one field configuration: its geometry, reduction
//! polynomial (host copy plus a device mirror uploaded once), and the device
//! pool its elements draw from. It is also the factory for elements.
//!
//! Reconfiguring builds a fresh configuration. Elements created earlier keep
//! the configuration they were made under alive until they are dropped, so
//! they never see a polynomial or pool from a different field.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rand_core::RngCore;
use zeroize::Zeroizing;

use crate::config::{EngineConfig, LaunchProperties};
use crate::element::{ByteOrder, Element, ElementMetrics};
use crate::error::{Gf2nError, Result};
use crate::geometry::{self, Chunk, ChunkGeometry};
use crate::gpu::kernels::misc::{self, Constant};
use crate::gpu::kernels::FieldParams;
use crate::gpu::{Device, DevicePool, DeviceProperties, TransferMode};
use crate::polynomial::{IrreduciblePolynomial, PolynomialSource};

/// Execution backend of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Parallel device kernels
    #[default]
    Gpu,
}

impl Mode {
    pub fn name(self) -> &'static str {
        match self {
            Mode::Gpu => "gpu",
        }
    }
}

impl FromStr for Mode {
    type Err = Gf2nError;

    /// Accepts `cuda`, `gpu` and `device`, in any case
    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cuda" | "gpu" | "device" => Ok(Mode::Gpu),
            _ => Err(Gf2nError::ModeNotFound(s.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Configuration shared by a context and every element made under it
pub(crate) struct FieldShared {
    pub(crate) device: Device,
    pub(crate) pool: DevicePool,
    pub(crate) params: FieldParams,
    pub(crate) polynomial: IrreduciblePolynomial,
    pub(crate) launch: LaunchProperties,
    async_transfers: AtomicBool,
}

impl FieldShared {
    pub(crate) fn geometry(&self) -> ChunkGeometry {
        self.params.geometry
    }

    pub(crate) fn transfer_mode(&self) -> TransferMode {
        TransferMode::from_async_flag(self.async_transfers.load(Ordering::Relaxed))
    }

    /// Waits for the default stream unless transfers are asynchronous
    pub(crate) fn settle(&self) -> Result<()> {
        match self.transfer_mode() {
            TransferMode::Synchronous => self.device.synchronize(),
            TransferMode::Asynchronous => Ok(()),
        }
    }
}

/// Field configuration and element factory
pub struct FieldContext {
    mode: Mode,
    config: EngineConfig,
    device: Device,
    shared: Option<Arc<FieldShared>>,
}

impl FieldContext {
    /// Creates a context on a dedicated device sized by the configuration
    ///
    /// # Arguments
    /// * `mode` - Execution backend
    /// * `config` - Pool size, transfer mode, launch shape and memory budget
    ///
    /// # Returns
    /// * `Result<Self>` - An unconfigured context; call `set_field_size` or
    ///   `set_polynomial` before creating elements
    pub fn new(mode: Mode, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let device = Device::new(DeviceProperties {
            global_memory: config.device_memory_limit,
            ..DeviceProperties::default()
        })?;
        Ok(Self::with_device(mode, config, device))
    }

    /// Creates a context on an existing device
    pub fn with_device(mode: Mode, config: EngineConfig, device: Device) -> Self {
        Self {
            mode,
            config,
            device,
            shared: None,
        }
    }

    /// Creates a context with the default configuration from a mode name
    pub fn create(mode: &str) -> Result<Self> {
        Self::new(mode.parse()?, EngineConfig::default())
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    /// Configures GF(2^n) with its standard polynomial
    pub fn set_field_size(&mut self, field_size: u32) -> Result<()> {
        let polynomial = IrreduciblePolynomial::standard(field_size)?;
        self.configure(polynomial)
    }

    /// Configures GF(2^n) with a caller-supplied polynomial
    pub fn set_polynomial(&mut self, field_size: u32, source: PolynomialSource<'_>) -> Result<()> {
        let geometry = ChunkGeometry::new(field_size)?;
        let polynomial = IrreduciblePolynomial::from_source(geometry, source)?;
        self.configure(polynomial)
    }

    /// Applies run flags; `FLAG_ASYNC` switches the transfer mode
    pub fn set_flags(&mut self, flags: u32) {
        self.config.apply_flags(flags);
        if let Some(shared) = &self.shared {
            shared
                .async_transfers
                .store(self.config.async_transfers, Ordering::Relaxed);
        }
    }

    pub fn is_configured(&self) -> bool {
        self.shared.is_some()
    }

    pub fn geometry(&self) -> Result<ChunkGeometry> {
        Ok(self.shared()?.geometry())
    }

    pub fn polynomial(&self) -> Result<&IrreduciblePolynomial> {
        Ok(&self.shared()?.polynomial)
    }

    /// Free pool slots
    pub fn pool_available(&self) -> Result<usize> {
        Ok(self.shared()?.pool.available())
    }

    pub fn element_from_decimal(&self, text: &str) -> Result<Element> {
        let shared = self.shared()?;
        let geometry = shared.geometry();
        let chunks = Zeroizing::new(geometry::parse_decimal(text)?);
        let aligned = Zeroizing::new(geometry.align(&chunks)?);
        Element::upload(Arc::clone(shared), &aligned, ByteOrder::Big)
    }

    /// Element from big-endian bytes, uploaded in little-endian chunk layout
    pub fn element_from_bytes(&self, bytes: &[u8]) -> Result<Element> {
        let shared = self.shared()?;
        let aligned = Zeroizing::new(shared.geometry().chunks_from_bytes(bytes)?);
        Element::upload(Arc::clone(shared), &aligned, ByteOrder::Little)
    }

    /// Element from big-endian chunks; shorter arrays are right-aligned
    pub fn element_from_chunks(&self, chunks: &[Chunk]) -> Result<Element> {
        let shared = self.shared()?;
        let aligned = Zeroizing::new(shared.geometry().align(chunks)?);
        Element::upload(Arc::clone(shared), &aligned, ByteOrder::Big)
    }

    pub fn zero(&self) -> Result<Element> {
        self.constant(Constant::Zero)
    }

    pub fn one(&self) -> Result<Element> {
        self.constant(Constant::One)
    }

    /// Uniformly random element
    pub fn random_element<R: RngCore>(&self, rng: &mut R) -> Result<Element> {
        let shared = self.shared()?;
        let geometry = shared.geometry();
        let mut chunks = Zeroizing::new(vec![0 as Chunk; geometry.num_chunks()]);
        for chunk in chunks.iter_mut() {
            *chunk = random_chunk(rng);
        }
        chunks[0] &= geometry.top_chunk_mask();
        Element::upload(Arc::clone(shared), &chunks, ByteOrder::Big)
    }

    fn constant(&self, constant: Constant) -> Result<Element> {
        let shared = self.shared()?;
        let handle = shared.pool.acquire()?;
        let device = &shared.device;
        let elapsed = {
            let clock = std::time::Instant::now();
            misc::set_constant(device, device.default_stream(), handle.buffer(), constant)?;
            shared.settle()?;
            clock.elapsed()
        };
        let metrics = ElementMetrics {
            creation: elapsed,
            ..ElementMetrics::default()
        };
        Ok(Element::with_handle(Arc::clone(shared), handle, ByteOrder::Big, metrics))
    }

    fn configure(&mut self, polynomial: IrreduciblePolynomial) -> Result<()> {
        let geometry = polynomial.geometry();
        let num_chunks = geometry.num_chunks();

        let pool = DevicePool::new(&self.device, self.config.pool_capacity, num_chunks)?;
        let poly = self.device.alloc(num_chunks)?;
        self.device
            .upload(&poly, polynomial.chunks(), TransferMode::Synchronous)?;

        tracing::info!(
            field_size = geometry.field_size(),
            num_chunks,
            reduction_mask_index = geometry.reduction_mask_index(),
            pool_capacity = self.config.pool_capacity,
            "field configured"
        );

        self.shared = Some(Arc::new(FieldShared {
            device: self.device.clone(),
            pool,
            params: FieldParams { geometry, poly },
            polynomial,
            launch: self.config.launch,
            async_transfers: AtomicBool::new(self.config.async_transfers),
        }));
        Ok(())
    }

    fn shared(&self) -> Result<&Arc<FieldShared>> {
        self.shared.as_ref().ok_or(Gf2nError::FieldNotConfigured)
    }
}

impl fmt::Debug for FieldContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldContext")
            .field("mode", &self.mode)
            .field("config", &self.config)
            .field("geometry", &self.shared.as_ref().map(|s| s.geometry()))
            .finish()
    }
}

fn random_chunk<R: RngCore>(rng: &mut R) -> Chunk {
    // Truncates to 32 bits when chunks are narrow.
    rng.next_u64() as Chunk
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FLAG_ASYNC;
    use crate::reference::HostField;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    #[test]
    fn test_modes() {
        assert_eq!("CUDA".parse::<Mode>().unwrap(), Mode::Gpu);
        assert_eq!(" device ".parse::<Mode>().unwrap(), Mode::Gpu);
        assert_eq!(
            "openssl".parse::<Mode>(),
            Err(Gf2nError::ModeNotFound("openssl".to_string()))
        );
        assert!(FieldContext::create("fpga").is_err());
    }

    #[test]
    fn test_unconfigured_context() {
        let ctx = FieldContext::create("gpu").unwrap();
        assert!(!ctx.is_configured());
        assert_eq!(ctx.zero().unwrap_err(), Gf2nError::FieldNotConfigured);
        assert_eq!(ctx.geometry().unwrap_err(), Gf2nError::FieldNotConfigured);
    }

    #[test]
    fn test_field_ten_scenarios() {
        let mut ctx = FieldContext::create("gpu").unwrap();
        ctx.set_field_size(10).unwrap();

        let one = ctx.element_from_decimal("1").unwrap();
        let four = ctx.element_from_decimal("4").unwrap();
        assert_eq!(one.add(&four).unwrap().to_decimal().unwrap(), "5");

        let three = ctx.element_from_bytes(&[0x3]).unwrap();
        let four = ctx.element_from_bytes(&[0x4]).unwrap();
        let oracle = HostField::new(ctx.polynomial().unwrap().chunks());
        let expected = oracle.mul(&[3], &[4]);
        let product = three.mul(&four).unwrap();
        assert_eq!(product.chunks().unwrap(), expected.as_slice());
        assert_eq!(product.get_value().unwrap().len(), 2);
    }

    #[test]
    fn test_values_outside_the_field_are_rejected() {
        let mut ctx = FieldContext::create("gpu").unwrap();
        ctx.set_field_size(10).unwrap();
        assert_eq!(
            ctx.element_from_decimal("1024").unwrap_err(),
            Gf2nError::ValueOutOfField { field_size: 10, bits: 11 }
        );
        assert!(matches!(
            ctx.element_from_chunks(&[1, 0]),
            Err(Gf2nError::InvalidBufferLength { .. })
        ));
        assert!(matches!(
            ctx.element_from_decimal("twelve"),
            Err(Gf2nError::InvalidDecimal(_))
        ));
    }

    #[test]
    fn test_custom_polynomial() {
        let mut ctx = FieldContext::create("gpu").unwrap();
        assert_eq!(
            ctx.set_polynomial(8, PolynomialSource::Chunks(&[1, 0x11b])),
            Err(Gf2nError::WrongPolynomialSize { expected: 1, got: 2 })
        );
        ctx.set_polynomial(8, PolynomialSource::Exponents(&[8, 4, 3, 1, 0, -1]))
            .unwrap();
        assert_eq!(ctx.polynomial().unwrap().to_decimal(), "283");

        let a = ctx.element_from_chunks(&[0x57]).unwrap();
        let b = ctx.element_from_chunks(&[0x83]).unwrap();
        assert_eq!(a.mul(&b).unwrap().chunks().unwrap(), &[0xc1]);
    }

    #[test]
    fn test_reconfiguration_keeps_old_elements_valid() {
        let mut ctx = FieldContext::create("gpu").unwrap();
        ctx.set_field_size(10).unwrap();
        let old = ctx.element_from_decimal("1000").unwrap();

        ctx.set_field_size(64).unwrap();
        let new = ctx.element_from_decimal("1000").unwrap();
        assert_eq!(old.field_size(), 10);
        assert_eq!(new.num_chunks(), ChunkGeometry::new(64).unwrap().num_chunks());
        assert_eq!(old.add(&new).unwrap_err(), Gf2nError::FieldMismatch);
        assert_eq!(old.to_decimal().unwrap(), "1000");
    }

    #[test]
    fn test_async_mode_reads_are_consistent() {
        let mut ctx = FieldContext::create("gpu").unwrap();
        ctx.set_field_size(233).unwrap();
        ctx.set_flags(FLAG_ASYNC);

        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let a = ctx.random_element(&mut rng).unwrap();
        let b = ctx.random_element(&mut rng).unwrap();
        let product = a.mul(&b).unwrap();

        let oracle = HostField::new(ctx.polynomial().unwrap().chunks());
        let expected = oracle.mul(a.chunks().unwrap(), b.chunks().unwrap());
        assert_eq!(product.chunks().unwrap(), expected.as_slice());
        assert_eq!(a.metrics().copy_to_device, std::time::Duration::ZERO);
    }

    #[test]
    fn test_identity_elements() {
        let mut ctx = FieldContext::create("gpu").unwrap();
        ctx.set_field_size(127).unwrap();
        assert_eq!(ctx.zero().unwrap().to_decimal().unwrap(), "0");
        assert_eq!(ctx.one().unwrap().to_decimal().unwrap(), "1");
        assert_eq!(ctx.one().unwrap().degree().unwrap(), Some(0));
    }
}
