//! Arithmetic in binary extension fields GF(2^n) on a parallel compute device.
//!
//! The field size is chosen at runtime. Elements live in a fixed pool of
//! device slots, and every operation runs as one or more kernels on
//! device-resident operands. Most operations come in several kernel
//! strategies that can be selected by name, so their performance can be
//! compared without changing call sites.
//!
//! Key Features:
//! - Chunked big-integer representation with canonical big-endian order
//! - Fixed-capacity device pool with RAII slot handles
//! - Addition, multiplication, exponentiation and inversion kernels
//! - Named operation dispatch for benchmarking drivers
//! - Lazy host materialization with explicit element states
//! - Synchronous and asynchronous transfer modes
//!
//! ```no_run
//! use gf2n_device::{FieldContext, Result};
//!
//! fn main() -> Result<()> {
//!     let mut ctx = FieldContext::create("gpu")?;
//!     ctx.set_field_size(163)?;
//!
//!     let a = ctx.element_from_decimal("12345")?;
//!     let b = ctx.element_from_decimal("67890")?;
//!     let product = a.run_with_element("parMulChunkedBarRed", &b)?;
//!     if let Some(product) = product {
//!         println!("{}", product.to_decimal()?);
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod element;
pub mod error;
pub mod field;
pub mod geometry;
pub mod gpu;
pub mod polynomial;
pub mod reference;
pub mod session;

pub use config::{EngineConfig, LaunchProperties, FLAG_ASYNC, FLAG_REUSE_OPERANDS, FLAG_SCALAR_OP};
pub use dispatch::{BinaryOperation, ScalarOperation};
pub use element::{ByteOrder, Element, ElementMetrics, ElementState, MetricKind};
pub use error::{Gf2nError, Result};
pub use field::{FieldContext, Mode};
pub use geometry::{Chunk, ChunkGeometry, CHUNK_BITS};
pub use gpu::{Device, DevicePool, DeviceProperties, SlotHandle, TransferMode};
pub use polynomial::{IrreduciblePolynomial, PolynomialSource};
pub use reference::{BinaryPoly, HostField};
pub use session::{Session, Slot};

#[cfg(test)]
mod tests;
