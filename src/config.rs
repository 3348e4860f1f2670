//! Engine configuration
//!
//! `EngineConfig` groups the runtime switches of a field context: pool size,
//! transfer mode, default launch shape and the device memory budget. Launch
//! shape can also be tuned per element through named properties.

use crate::error::{Gf2nError, Result};
use crate::gpu::DATA_POOL_SIZE;

/// Run flag: keep the operands of the previous run
pub const FLAG_REUSE_OPERANDS: u32 = 0x1;

/// Run flag: asynchronous host/device transfers
pub const FLAG_ASYNC: u32 = 0x2;

/// Run flag: the operation takes a scalar instead of a second element
pub const FLAG_SCALAR_OP: u32 = 0x4;

/// Runtime-tunable launch geometry.
///
/// Zero means "derive from the operand size".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LaunchProperties {
    pub num_threads: u32,
    pub num_blocks: u32,
}

impl LaunchProperties {
    /// Names accepted by `set`
    pub const NAMES: [&'static str; 2] = ["num_threads", "num_blocks"];

    /// Sets a property by name.
    ///
    /// Returns `Ok(false)` for unknown names, which are ignored.
    pub fn set(&mut self, name: &str, value: &str) -> Result<bool> {
        let slot = match name {
            "num_threads" => &mut self.num_threads,
            "num_blocks" => &mut self.num_blocks,
            _ => return Ok(false),
        };
        *slot = value.trim().parse().map_err(|_| Gf2nError::InvalidProperty {
            name: name.to_string(),
            value: value.to_string(),
        })?;
        Ok(true)
    }

    pub fn get(&self, name: &str) -> Option<u32> {
        match name {
            "num_threads" => Some(self.num_threads),
            "num_blocks" => Some(self.num_blocks),
            _ => None,
        }
    }
}

/// Configuration of a field context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Slots in the device pool
    pub pool_capacity: usize,

    /// Whether uploads and default-stream kernels run asynchronously
    pub async_transfers: bool,

    /// Launch shape inherited by new elements
    pub launch: LaunchProperties,

    /// Upper bound on device memory used by the engine, in bytes
    pub device_memory_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pool_capacity: DATA_POOL_SIZE,
            async_transfers: false,
            launch: LaunchProperties::default(),
            device_memory_limit: 256 * 1024 * 1024,
        }
    }
}

impl EngineConfig {
    pub fn with_pool_capacity(mut self, pool_capacity: usize) -> Self {
        self.pool_capacity = pool_capacity;
        self
    }

    pub fn with_async_transfers(mut self, async_transfers: bool) -> Self {
        self.async_transfers = async_transfers;
        self
    }

    pub fn with_launch(mut self, launch: LaunchProperties) -> Self {
        self.launch = launch;
        self
    }

    pub fn with_device_memory_limit(mut self, bytes: usize) -> Self {
        self.device_memory_limit = bytes;
        self
    }

    /// Applies a run-flag word; only `FLAG_ASYNC` affects the configuration
    pub fn apply_flags(&mut self, flags: u32) {
        self.async_transfers = flags & FLAG_ASYNC != 0;
    }

    /// Validates the configuration
    ///
    /// # Returns
    /// * `Result<()>` - Ok, or `InvalidParameters` describing the problem
    pub fn validate(&self) -> Result<()> {
        if self.pool_capacity == 0 {
            return Err(Gf2nError::InvalidParameters(
                "pool capacity must be at least 1".to_string(),
            ));
        }
        if self.device_memory_limit == 0 {
            return Err(Gf2nError::InvalidParameters(
                "device memory limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
