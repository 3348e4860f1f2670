//! Transfer bookkeeping and timing helpers for the device layer
//!
//! Key Features:
//! - Direction and blocking mode of every host/device copy
//! - Per-direction transfer counters kept by each device
//! - Millisecond conversion used by element metrics

use std::time::{Duration, Instant};

/// Memory transfer direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryTransferDirection {
    /// Host to device transfer
    HostToDevice,
    /// Device to host transfer
    DeviceToHost,
    /// Device to device transfer
    DeviceToDevice,
}

/// Whether a transfer blocks the host until it completes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransferMode {
    /// Blocks and is timed around the blocking call
    #[default]
    Synchronous,
    /// Enqueued on a stream; completion is only observed by a later synchronize
    Asynchronous,
}

impl TransferMode {
    pub fn from_async_flag(async_transfers: bool) -> Self {
        if async_transfers {
            TransferMode::Asynchronous
        } else {
            TransferMode::Synchronous
        }
    }
}

/// Counters for one transfer direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectionStats {
    pub transfers: u64,
    pub bytes: u64,
}

/// Snapshot of a device's activity counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceStats {
    pub host_to_device: DirectionStats,
    pub device_to_host: DirectionStats,
    pub device_to_device: DirectionStats,
    pub kernel_launches: u64,
    pub allocated_bytes: u64,
}

impl DeviceStats {
    pub(crate) fn record_transfer(&mut self, direction: MemoryTransferDirection, bytes: usize) {
        let entry = match direction {
            MemoryTransferDirection::HostToDevice => &mut self.host_to_device,
            MemoryTransferDirection::DeviceToHost => &mut self.device_to_host,
            MemoryTransferDirection::DeviceToDevice => &mut self.device_to_device,
        };
        entry.transfers += 1;
        entry.bytes += bytes as u64;
    }
}

/// Runs `f` and returns its result along with the elapsed wall time
pub fn timed<T>(f: impl FnOnce() -> T) -> (T, Duration) {
    let start = Instant::now();
    let value = f();
    (value, start.elapsed())
}

/// Converts a duration to fractional milliseconds
pub fn as_millis_f64(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
