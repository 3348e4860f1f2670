//! Field elements
//!
//! An `Element` is a value of GF(2^n) living in a device pool slot, with a
//! host copy materialized lazily on the first read. Every arithmetic method
//! acquires a fresh slot for its result, launches one of the kernel
//! strategies on the operands' slots and returns the result as a new
//! element that starts out device-only.
//!
//! Key Features:
//! - Explicit state: `DeviceAcquired`, `Synchronized`, `HostOnly`, `Released`
//! - Host copies held in a `OnceLock`, so reads take `&self` and elements
//!   stay `Send + Sync`
//! - Per-element timings for transfers, creation and kernel phases
//! - Runtime-tunable launch shape through named properties
//! - Host buffers are zeroized when dropped

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use zeroize::Zeroizing;

use crate::config::LaunchProperties;
use crate::dispatch::{BinaryOperation, ScalarOperation};
use crate::error::{Gf2nError, Result};
use crate::field::FieldShared;
use crate::geometry::{self, Chunk, ChunkGeometry};
use crate::gpu::kernels::mul::Reduction;
use crate::gpu::kernels::{add, exp, inverse, misc, mul, primitives, BinaryOperands, DEFAULT_THREADS_PER_BLOCK};
use crate::gpu::utils::as_millis_f64;
use crate::gpu::{Device, DeviceBuffer, SlotHandle};

/// Byte order of the host representation an element was built from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ByteOrder {
    /// Chunks given numerically, most significant first
    #[default]
    Big,
    /// Raw bytes laid out in chunk memory by a little-endian host
    Little,
}

/// Where the value of an element currently lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    /// Device slot only; the host copy has not been read yet
    DeviceAcquired,
    /// Device slot and host copy
    Synchronized,
    /// Host copy only; the slot was returned early
    HostOnly,
    /// Neither
    Released,
}

/// Named timing samples of an element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    CopyToDevice,
    CopyToHost,
    Creation,
    Load,
    Exec,
    Store,
}

impl MetricKind {
    pub const ALL: [MetricKind; 6] = [
        MetricKind::CopyToDevice,
        MetricKind::CopyToHost,
        MetricKind::Creation,
        MetricKind::Load,
        MetricKind::Exec,
        MetricKind::Store,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MetricKind::CopyToDevice => "copy_to_device",
            MetricKind::CopyToHost => "copy_to_host",
            MetricKind::Creation => "creation",
            MetricKind::Load => "load",
            MetricKind::Exec => "exec",
            MetricKind::Store => "store",
        }
    }

    /// Looks a metric up by name; a `_time` suffix and camel case are accepted
    pub fn from_name(name: &str) -> Option<Self> {
        let base = name.strip_suffix("_time").unwrap_or(name);
        match base {
            "copyToDevice" => return Some(MetricKind::CopyToDevice),
            "copyToHost" => return Some(MetricKind::CopyToHost),
            _ => {}
        }
        Self::ALL.into_iter().find(|kind| kind.name() == base)
    }
}

/// Timing samples of one element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ElementMetrics {
    pub copy_to_device: Duration,
    pub copy_to_host: Duration,
    pub creation: Duration,
    pub load: Duration,
    pub exec: Duration,
    pub store: Duration,
}

impl ElementMetrics {
    pub fn get(&self, kind: MetricKind) -> Duration {
        match kind {
            MetricKind::CopyToDevice => self.copy_to_device,
            MetricKind::CopyToHost => self.copy_to_host,
            MetricKind::Creation => self.creation,
            MetricKind::Load => self.load,
            MetricKind::Exec => self.exec,
            MetricKind::Store => self.store,
        }
    }

    /// `name=value` lines in milliseconds
    pub fn report(&self) -> String {
        MetricKind::ALL
            .iter()
            .map(|&kind| format!("{}={}\n", kind.name(), as_millis_f64(self.get(kind))))
            .collect()
    }
}

/// A value of GF(2^n)
pub struct Element {
    field: Arc<FieldShared>,
    handle: Option<SlotHandle>,
    host: OnceLock<Zeroizing<Vec<Chunk>>>,
    byte_order: ByteOrder,
    metrics: Mutex<ElementMetrics>,
    launch: LaunchProperties,
}

impl Element {
    /// Uploads a canonical chunk array into a fresh pool slot
    ///
    /// # Arguments
    /// * `field` - Field configuration the element belongs to
    /// * `canonical` - `num_chunks` big-endian chunks below `x^n`
    /// * `byte_order` - Host layout to reproduce on upload
    ///
    /// # Returns
    /// * `Result<Element>` - The element in `DeviceAcquired` state
    pub(crate) fn upload(field: Arc<FieldShared>, canonical: &[Chunk], byte_order: ByteOrder) -> Result<Self> {
        let geometry = field.geometry();
        geometry.check_field_value(canonical)?;

        let clock = Instant::now();
        let handle = field.pool.acquire()?;
        let mode = field.transfer_mode();
        let copy_to_device = match byte_order {
            ByteOrder::Big => field.device.upload(handle.buffer(), canonical, mode)?,
            ByteOrder::Little => {
                // The chunk memory holds the bytes as a little-endian host
                // wrote them; the device restores canonical order in place.
                let image = Zeroizing::new(geometry::bytes_to_le_image(&geometry::chunks_to_bytes(canonical)));
                let copied = field.device.upload(handle.buffer(), &image, mode)?;
                misc::swap_bytes(&field.device, field.device.default_stream(), handle.buffer())?;
                field.settle()?;
                copied
            }
        };

        let metrics = ElementMetrics {
            copy_to_device,
            creation: clock.elapsed(),
            ..ElementMetrics::default()
        };
        tracing::debug!(slot = handle.index(), ?byte_order, "element uploaded");

        Ok(Self::with_handle(field, handle, byte_order, metrics))
    }

    /// Wraps a slot whose contents were produced on the device
    pub(crate) fn with_handle(
        field: Arc<FieldShared>,
        handle: SlotHandle,
        byte_order: ByteOrder,
        metrics: ElementMetrics,
    ) -> Self {
        let launch = field.launch;
        Self {
            field,
            handle: Some(handle),
            host: OnceLock::new(),
            byte_order,
            metrics: Mutex::new(metrics),
            launch,
        }
    }

    pub fn state(&self) -> ElementState {
        match (self.handle.is_some(), self.host.get().is_some()) {
            (true, false) => ElementState::DeviceAcquired,
            (true, true) => ElementState::Synchronized,
            (false, true) => ElementState::HostOnly,
            (false, false) => ElementState::Released,
        }
    }

    pub fn geometry(&self) -> ChunkGeometry {
        self.field.geometry()
    }

    pub fn field_size(&self) -> u32 {
        self.geometry().field_size()
    }

    pub fn num_chunks(&self) -> usize {
        self.geometry().num_chunks()
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    /// Pool slot backing this element, if it still has one
    pub fn slot(&self) -> Option<&SlotHandle> {
        self.handle.as_ref()
    }

    /// Whether both elements belong to the same field configuration
    pub fn same_field(&self, other: &Element) -> bool {
        Arc::ptr_eq(&self.field, &other.field)
    }

    /// Returns the device slot to the pool.
    ///
    /// A host copy read earlier stays available.
    pub fn release_device(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::debug!(slot = handle.index(), "device slot released early");
        }
    }

    // ---- addition strategies ----

    pub fn par_add(&self, other: &Element) -> Result<Element> {
        self.binary(other, add::par_add).map(|(element, _)| element)
    }

    /// Grid-stride XOR using this element's launch properties
    pub fn par_add_loop(&self, other: &Element) -> Result<Element> {
        let launch = self.launch;
        self.binary(other, |device, ops| add::par_add_loop(device, ops, launch))
            .map(|(element, _)| element)
    }

    /// XOR with load / exec / store timings recorded in the result's metrics
    pub fn par_add_time(&self, other: &Element) -> Result<Element> {
        let (element, phases) = self.binary(other, add::par_add_time)?;
        {
            let mut metrics = element.lock_metrics();
            metrics.load = phases.load;
            metrics.exec = phases.exec;
            metrics.store = phases.store;
        }
        Ok(element)
    }

    /// XOR timed by stream events; `creation` holds the event interval
    pub fn par_add_with_events(&self, other: &Element) -> Result<Element> {
        let (element, elapsed) = self.binary(other, add::par_add_with_events)?;
        element.lock_metrics().creation = elapsed;
        Ok(element)
    }

    /// XOR on a private stream with `threads_per_block` threads, or this
    /// element's `num_threads` property when zero
    pub fn par_add_own_stream(&self, other: &Element, threads_per_block: u32) -> Result<Element> {
        let threads = match (threads_per_block, self.launch.num_threads) {
            (0, 0) => DEFAULT_THREADS_PER_BLOCK,
            (0, configured) => configured,
            (fixed, _) => fixed,
        };
        self.binary(other, |device, ops| add::par_add_own_stream(device, ops, threads))
            .map(|(element, _)| element)
    }

    /// XOR split over `streams` private streams
    pub fn par_add_multi_stream(&self, other: &Element, streams: usize) -> Result<Element> {
        self.binary(other, |device, ops| add::par_add_multi_stream(device, ops, streams))
            .map(|(element, _)| element)
    }

    pub fn par_add_shared_mem(&self, other: &Element) -> Result<Element> {
        self.binary(other, add::par_add_shared_mem).map(|(element, _)| element)
    }

    // ---- multiplication strategies ----

    /// Product with bit-serial reduction
    pub fn par_mul(&self, other: &Element) -> Result<Element> {
        self.mul_with(other, Reduction::Bitwise)
    }

    /// Product with chunk-wise reduction
    pub fn par_mul_chunked(&self, other: &Element) -> Result<Element> {
        self.mul_with(other, Reduction::Chunked)
    }

    fn mul_with(&self, other: &Element, reduction: Reduction) -> Result<Element> {
        let field = Arc::clone(&self.field);
        self.binary(other, |device, ops| mul::par_mul(device, ops, &field.params, reduction))
            .map(|(element, _)| element)
    }

    /// Times a launch of the empty kernel.
    ///
    /// The returned element shares this element's slot; only its `creation`
    /// metric is new.
    pub fn measure_kernel_launch_overhead(&self, other: &Element) -> Result<Element> {
        self.ensure_same_field(other)?;
        let handle = self.handle.clone().ok_or(Gf2nError::ElementReleased)?;
        let device = &self.field.device;
        let elapsed = misc::launch_empty(device, device.default_stream())?;

        let metrics = ElementMetrics {
            creation: elapsed,
            ..ElementMetrics::default()
        };
        let mut element = Element::with_handle(Arc::clone(&self.field), handle, self.byte_order, metrics);
        element.launch = self.launch;
        Ok(element)
    }

    // ---- scalar operations ----

    /// `self^k` by square-and-multiply on the device
    pub fn par_exponentiation(&self, k: u64) -> Result<Element> {
        let field = Arc::clone(&self.field);
        self.unary(|device, src, out| exp::par_exp(device, src, k, out, &field.params, Reduction::Chunked))
    }

    /// Inverse by extended Euclid; zero gives `DivisionByZero`
    pub fn par_inverse_element(&self) -> Result<Element> {
        self.ensure_invertible()?;
        let field = Arc::clone(&self.field);
        self.unary(|device, src, out| inverse::par_inverse(device, src, out, &field.params))
    }

    /// Inverse as `self^(2^n - 2)`; zero gives `DivisionByZero`
    pub fn par_inverse_element_with_exp(&self) -> Result<Element> {
        self.ensure_invertible()?;
        let field = Arc::clone(&self.field);
        self.unary(|device, src, out| inverse::par_inverse_with_exp(device, src, out, &field.params))
    }

    // ---- core operators ----

    pub fn add(&self, other: &Element) -> Result<Element> {
        self.par_add(other)
    }

    /// Same as `add` in characteristic 2
    pub fn sub(&self, other: &Element) -> Result<Element> {
        self.par_add(other)
    }

    pub fn mul(&self, other: &Element) -> Result<Element> {
        self.par_mul(other)
    }

    /// Division is not provided and always yields `None`
    pub fn div(&self, _other: &Element) -> Option<Element> {
        tracing::warn!("division is not supported, returning no result");
        None
    }

    pub fn exp(&self, k: u64) -> Result<Element> {
        self.par_exponentiation(k)
    }

    pub fn inverse(&self) -> Result<Element> {
        self.par_inverse_element()
    }

    /// Runs the binary operation registered under `name`
    ///
    /// # Returns
    /// * `Result<Option<Element>>` - `Ok(None)` only for `div`;
    ///   `OperationNotFound` for unknown names
    pub fn run_with_element(&self, name: &str, other: &Element) -> Result<Option<Element>> {
        BinaryOperation::from_name(name)?.run(self, other)
    }

    /// Runs the scalar operation registered under `name`
    pub fn run_with_value(&self, name: &str, value: u64) -> Result<Option<Element>> {
        ScalarOperation::from_name(name)?.run(self, value)
    }

    // ---- reads ----

    /// Canonical chunk array, downloading it on first use
    pub fn chunks(&self) -> Result<&[Chunk]> {
        if let Some(value) = self.host.get() {
            return Ok(value.as_slice());
        }

        let buffer = self.device_buffer()?;
        let device = &self.field.device;
        let (value, elapsed) = match self.byte_order {
            ByteOrder::Big => device.download(buffer)?,
            ByteOrder::Little => {
                // Undo the device order into a scratch buffer, then read the
                // bytes back the way a little-endian host sees them.
                let scratch = device.alloc(buffer.len())?;
                device.copy(device.default_stream(), &scratch, buffer)?;
                misc::swap_bytes(device, device.default_stream(), &scratch)?;
                let (image, elapsed) = device.download(&scratch)?;
                (image.into_iter().map(Chunk::swap_bytes).collect(), elapsed)
            }
        };
        self.lock_metrics().copy_to_host = elapsed;

        // A concurrent reader may have won; both copies are identical.
        let _ = self.host.set(Zeroizing::new(value));
        self.host
            .get()
            .map(|value| value.as_slice())
            .ok_or(Gf2nError::ElementReleased)
    }

    pub fn to_decimal(&self) -> Result<String> {
        Ok(geometry::chunks_to_decimal(self.chunks()?))
    }

    /// Big-endian bytes covering exactly `field_size` bits
    pub fn get_value(&self) -> Result<Vec<u8>> {
        let geometry = self.geometry();
        Ok(geometry.value_bytes(self.chunks()?))
    }

    /// Writes the value right-aligned into `out`, zeroing the bytes before it
    ///
    /// # Returns
    /// * `Result<usize>` - Number of value bytes, `ceil(field_size / 8)`
    pub fn get_value_into(&self, out: &mut [u8]) -> Result<usize> {
        let value = Zeroizing::new(self.get_value()?);
        if out.len() < value.len() {
            return Err(Gf2nError::InvalidBufferLength {
                max: out.len(),
                got: value.len(),
            });
        }
        let pad = out.len() - value.len();
        out[..pad].fill(0);
        out[pad..].copy_from_slice(&value);
        Ok(value.len())
    }

    /// Degree of the value as a polynomial; `None` for zero
    pub fn degree(&self) -> Result<Option<usize>> {
        match (&self.handle, self.host.get()) {
            (_, Some(value)) => Ok(primitives::element_degree(value)),
            (Some(handle), None) => misc::degree(&self.field.device, handle.buffer()),
            (None, None) => Err(Gf2nError::ElementReleased),
        }
    }

    pub fn is_zero(&self) -> Result<bool> {
        Ok(self.degree()?.is_none())
    }

    // ---- metrics and properties ----

    pub fn metrics(&self) -> ElementMetrics {
        *self.lock_metrics()
    }

    /// Metric in milliseconds; unknown names read as zero
    pub fn metric(&self, name: &str) -> f64 {
        MetricKind::from_name(name)
            .map(|kind| as_millis_f64(self.lock_metrics().get(kind)))
            .unwrap_or(0.0)
    }

    pub fn metrics_report(&self) -> String {
        self.lock_metrics().report()
    }

    pub fn launch_properties(&self) -> LaunchProperties {
        self.launch
    }

    /// Sets a launch property; unknown names are ignored
    pub fn set_property(&mut self, name: &str, value: &str) -> Result<()> {
        if !self.launch.set(name, value)? {
            tracing::warn!(name, "ignoring unknown element property");
        }
        Ok(())
    }

    // ---- internals ----

    fn device_buffer(&self) -> Result<&DeviceBuffer> {
        self.handle
            .as_ref()
            .map(SlotHandle::buffer)
            .ok_or(Gf2nError::ElementReleased)
    }

    fn ensure_same_field(&self, other: &Element) -> Result<()> {
        if self.same_field(other) {
            Ok(())
        } else {
            Err(Gf2nError::FieldMismatch)
        }
    }

    fn ensure_invertible(&self) -> Result<()> {
        if self.is_zero()? {
            return Err(Gf2nError::DivisionByZero);
        }
        Ok(())
    }

    fn lock_metrics(&self) -> MutexGuard<'_, ElementMetrics> {
        self.metrics.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Result element sharing this element's field, byte order and launch shape
    fn derive(&self, handle: SlotHandle, creation: Duration) -> Element {
        let metrics = ElementMetrics {
            creation,
            ..ElementMetrics::default()
        };
        let mut element = Element::with_handle(Arc::clone(&self.field), handle, self.byte_order, metrics);
        element.launch = self.launch;
        element
    }

    fn binary<T, F>(&self, other: &Element, op: F) -> Result<(Element, T)>
    where
        F: FnOnce(&Device, &BinaryOperands) -> Result<T>,
    {
        self.ensure_same_field(other)?;
        let a = self.device_buffer()?.clone();
        let b = other.device_buffer()?.clone();

        let clock = Instant::now();
        let handle = self.field.pool.acquire()?;
        let ops = BinaryOperands {
            a,
            b,
            out: handle.buffer().clone(),
        };
        let extra = op(&self.field.device, &ops)?;
        self.field.settle()?;

        Ok((self.derive(handle, clock.elapsed()), extra))
    }

    fn unary<F>(&self, op: F) -> Result<Element>
    where
        F: FnOnce(&Device, &DeviceBuffer, &DeviceBuffer) -> Result<()>,
    {
        let src = self.device_buffer()?.clone();

        let clock = Instant::now();
        let handle = self.field.pool.acquire()?;
        op(&self.field.device, &src, handle.buffer())?;
        self.field.settle()?;

        Ok(self.derive(handle, clock.elapsed()))
    }
}

impl fmt::Debug for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Element")
            .field("field_size", &self.field_size())
            .field("state", &self.state())
            .field("slot", &self.handle.as_ref().map(SlotHandle::index))
            .field("byte_order", &self.byte_order)
            .finish()
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_decimal().map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::field::{FieldContext, Mode};

    fn context(n: u32) -> FieldContext {
        let mut ctx = FieldContext::new(Mode::Gpu, EngineConfig::default().with_pool_capacity(32)).unwrap();
        ctx.set_field_size(n).unwrap();
        ctx
    }

    #[test]
    fn test_state_transitions() {
        let ctx = context(10);
        let a = ctx.element_from_decimal("5").unwrap();
        let b = ctx.element_from_decimal("3").unwrap();
        assert_eq!(a.state(), ElementState::DeviceAcquired);

        let mut sum = a.add(&b).unwrap();
        assert_eq!(sum.state(), ElementState::DeviceAcquired);
        assert_eq!(sum.to_decimal().unwrap(), "6");
        assert_eq!(sum.state(), ElementState::Synchronized);

        sum.release_device();
        assert_eq!(sum.state(), ElementState::HostOnly);
        assert_eq!(sum.to_decimal().unwrap(), "6");
        assert_eq!(sum.degree().unwrap(), Some(2));
        assert_eq!(sum.add(&a).unwrap_err(), Gf2nError::ElementReleased);

        let mut c = ctx.element_from_decimal("7").unwrap();
        c.release_device();
        assert_eq!(c.state(), ElementState::Released);
        assert_eq!(c.get_value().unwrap_err(), Gf2nError::ElementReleased);
    }

    #[test]
    fn test_result_slot_returns_to_pool() {
        let ctx = context(10);
        let a = ctx.element_from_decimal("9").unwrap();
        let before = ctx.pool_available().unwrap();
        {
            let _sum = a.add(&a).unwrap();
            assert_eq!(ctx.pool_available().unwrap(), before - 1);
        }
        assert_eq!(ctx.pool_available().unwrap(), before);
    }

    #[test]
    fn test_little_endian_round_trip() {
        let ctx = context(20);
        let bytes = [0x0a, 0xbc, 0xde];
        let a = ctx.element_from_bytes(&bytes).unwrap();
        assert_eq!(a.byte_order(), ByteOrder::Little);
        assert_eq!(a.get_value().unwrap(), bytes.to_vec());
        assert_eq!(a.to_decimal().unwrap(), (0x0abcde).to_string());

        // results inherit the receiver's byte order
        let b = ctx.element_from_decimal("1").unwrap();
        let sum = a.add(&b).unwrap();
        assert_eq!(sum.byte_order(), ByteOrder::Little);
        assert_eq!(sum.get_value().unwrap(), vec![0x0a, 0xbc, 0xdf]);
        assert_eq!(b.add(&a).unwrap().byte_order(), ByteOrder::Big);
    }

    #[test]
    fn test_get_value_into() {
        let ctx = context(12);
        let a = ctx.element_from_decimal("4095").unwrap();
        let mut out = [0xffu8; 4];
        assert_eq!(a.get_value_into(&mut out).unwrap(), 2);
        assert_eq!(out, [0, 0, 0x0f, 0xff]);

        let mut short = [0u8; 1];
        assert_eq!(
            a.get_value_into(&mut short),
            Err(Gf2nError::InvalidBufferLength { max: 1, got: 2 })
        );
    }

    #[test]
    fn test_inverse_of_zero_is_rejected() {
        let ctx = context(10);
        let zero = ctx.zero().unwrap();
        assert!(zero.is_zero().unwrap());
        assert_eq!(zero.inverse().unwrap_err(), Gf2nError::DivisionByZero);
        assert_eq!(
            zero.par_inverse_element_with_exp().unwrap_err(),
            Gf2nError::DivisionByZero
        );
    }

    #[test]
    fn test_field_mismatch() {
        let a_ctx = context(10);
        let b_ctx = context(10);
        let a = a_ctx.element_from_decimal("1").unwrap();
        let b = b_ctx.element_from_decimal("1").unwrap();
        assert_eq!(a.add(&b).unwrap_err(), Gf2nError::FieldMismatch);
    }

    #[test]
    fn test_div_has_no_result() {
        let ctx = context(10);
        let a = ctx.element_from_decimal("3").unwrap();
        assert!(a.div(&a).is_none());
        assert!(a.run_with_element("div", &a).unwrap().is_none());
    }

    #[test]
    fn test_metrics_and_properties() {
        let ctx = context(64);
        let mut a = ctx.element_from_decimal("12345678901234567").unwrap();
        let b = ctx.element_from_decimal("98765").unwrap();

        let timed = a.par_add_time(&b).unwrap();
        let report = timed.metrics_report();
        for kind in MetricKind::ALL {
            assert!(report.contains(&format!("{}=", kind.name())));
        }
        assert_eq!(timed.metric("no_such_metric"), 0.0);
        assert_eq!(timed.metric("creation"), timed.metric("creation_time"));
        assert_eq!(MetricKind::from_name("copyToHost_time"), Some(MetricKind::CopyToHost));

        a.set_property("num_threads", "32").unwrap();
        a.set_property("num_blocks", "2").unwrap();
        a.set_property("shared_memory", "1").unwrap();
        assert_eq!(a.launch_properties(), LaunchProperties { num_threads: 32, num_blocks: 2 });
        assert!(a.set_property("num_blocks", "-1").is_err());

        let looped = a.par_add_loop(&b).unwrap();
        assert_eq!(looped.launch_properties().num_threads, 32);
        assert_eq!(looped.to_decimal().unwrap(), a.par_add(&b).unwrap().to_decimal().unwrap());
    }

    #[test]
    fn test_launch_overhead_shares_slot() {
        let ctx = context(10);
        let a = ctx.element_from_decimal("5").unwrap();
        let probe = a.measure_kernel_launch_overhead(&a).unwrap();
        let (slot_a, slot_probe) = (a.slot().unwrap(), probe.slot().unwrap());
        assert!(slot_a.shares_slot_with(slot_probe));
        assert_eq!(slot_a.ref_count(), 2);
        assert_eq!(probe.to_decimal().unwrap(), "5");
    }
}
