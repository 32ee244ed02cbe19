//! Device memory introspection.
//!
//! [`DeviceMemory`] is the narrow surface the accountant needs from a GPU
//! runtime: counters to read and pools to flush. [`SimulatedDevice`] keeps
//! those counters in-process and behaves like a caching allocator: freed
//! blocks stay reserved until `empty_cache` releases them.

use std::process::Command;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{operation} failed on {device}: {message}")]
pub struct DeviceError {
    pub device: String,
    pub operation: &'static str,
    pub message: String,
}

pub trait DeviceMemory: Send + Sync {
    fn name(&self) -> &str;
    /// Bytes currently held by live tensors.
    fn allocated_bytes(&self) -> u64;
    /// Bytes held by the allocator, live or cached.
    fn reserved_bytes(&self) -> u64;
    fn peak_allocated_bytes(&self) -> u64;
    fn empty_cache(&self) -> Result<(), DeviceError>;
    fn ipc_collect(&self) -> Result<(), DeviceError>;
    /// Block until all queued device work has finished.
    fn synchronize(&self) -> Result<(), DeviceError>;
    fn reset_peak_stats(&self) -> Result<(), DeviceError>;
    fn reset_accumulated_stats(&self) -> Result<(), DeviceError>;
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / BYTES_PER_MB
}

pub fn mb_to_bytes(mb: u64) -> u64 {
    mb.saturating_mul(1024 * 1024)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SimulatedStats {
    pub allocated: u64,
    pub cached: u64,
    pub peak: u64,
    pub allocations: u64,
    pub accumulated_bytes: u64,
    pub synchronizations: u64,
}

/// In-process stand-in for a CUDA caching allocator.
#[derive(Debug, Default)]
pub struct SimulatedDevice {
    stats: Mutex<SimulatedStats>,
}

impl SimulatedDevice {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, SimulatedStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Reserve `bytes` until the returned handle is dropped.
    pub fn allocate(self: &Arc<Self>, bytes: u64) -> DeviceAllocation {
        {
            let mut stats = self.lock();
            // Reuse cached blocks before growing the pool.
            let reused = stats.cached.min(bytes);
            stats.cached -= reused;
            stats.allocated += bytes;
            stats.peak = stats.peak.max(stats.allocated);
            stats.allocations += 1;
            stats.accumulated_bytes += bytes;
        }
        DeviceAllocation {
            device: Arc::clone(self),
            bytes,
        }
    }

    pub fn stats(&self) -> SimulatedStats {
        *self.lock()
    }

    fn free(&self, bytes: u64) {
        let mut stats = self.lock();
        stats.allocated = stats.allocated.saturating_sub(bytes);
        stats.cached += bytes;
    }
}

impl DeviceMemory for SimulatedDevice {
    fn name(&self) -> &str {
        "simulated"
    }

    fn allocated_bytes(&self) -> u64 {
        self.lock().allocated
    }

    fn reserved_bytes(&self) -> u64 {
        let stats = self.lock();
        stats.allocated + stats.cached
    }

    fn peak_allocated_bytes(&self) -> u64 {
        self.lock().peak
    }

    fn empty_cache(&self) -> Result<(), DeviceError> {
        self.lock().cached = 0;
        Ok(())
    }

    fn ipc_collect(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn synchronize(&self) -> Result<(), DeviceError> {
        self.lock().synchronizations += 1;
        Ok(())
    }

    fn reset_peak_stats(&self) -> Result<(), DeviceError> {
        let mut stats = self.lock();
        stats.peak = stats.allocated;
        Ok(())
    }

    fn reset_accumulated_stats(&self) -> Result<(), DeviceError> {
        let mut stats = self.lock();
        stats.allocations = 0;
        stats.accumulated_bytes = 0;
        Ok(())
    }
}

/// RAII handle for simulated device memory. Dropping it returns the bytes
/// to the allocator cache, not to the device.
#[derive(Debug)]
pub struct DeviceAllocation {
    device: Arc<SimulatedDevice>,
    bytes: u64,
}

impl DeviceAllocation {
    pub fn bytes(&self) -> u64 {
        self.bytes
    }
}

impl Drop for DeviceAllocation {
    fn drop(&mut self) {
        self.device.free(self.bytes);
    }
}

/// Free VRAM in MB as reported by `nvidia-smi`, if the tool is present.
///
/// Used only for reporting; admission never depends on it.
pub fn query_free_vram_mb() -> Option<f64> {
    let output = Command::new("nvidia-smi")
        .args(["--query-gpu=memory.free", "--format=csv,noheader,nounits"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8(output.stdout).ok()?;
    // One line per GPU; report the first device.
    stdout.lines().next()?.trim().parse::<f64>().ok()
}
