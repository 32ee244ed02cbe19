//! Device memory accounting and forced reclamation.

use std::sync::Arc;

use gen_studio_types::{GenError, ModelKind, ReclaimReport};
use log::{debug, info, warn};

use crate::device::{bytes_to_mb, DeviceError, DeviceMemory};
use crate::pipeline::Pipeline;

pub type SharedAccountant = Arc<ResourceAccountant>;

/// Reads device counters and flushes allocator pools.
///
/// The lifecycle manager and this type are the only code paths that free
/// pipeline-level device memory.
pub struct ResourceAccountant {
    device: Arc<dyn DeviceMemory>,
}

impl ResourceAccountant {
    pub fn new(device: Arc<dyn DeviceMemory>) -> Self {
        Self { device }
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }

    pub fn allocated_mb(&self) -> f64 {
        bytes_to_mb(self.device.allocated_bytes())
    }

    pub fn reserved_mb(&self) -> f64 {
        bytes_to_mb(self.device.reserved_bytes())
    }

    pub fn peak_allocated_mb(&self) -> f64 {
        bytes_to_mb(self.device.peak_allocated_bytes())
    }

    /// Best-effort memory attributable to a freshly loaded pipeline.
    ///
    /// A declared footprint wins. The allocation delta observed across the
    /// load is only a fallback: it also counts whatever other slots allocated
    /// or freed while this one was loading.
    pub fn estimate_usage(&self, baseline_mb: f64, pipeline: &dyn Pipeline) -> f64 {
        let delta = (self.allocated_mb() - baseline_mb).max(0.0);
        let estimate = match pipeline.footprint_mb() {
            Some(declared) if declared > 0.0 => declared,
            _ => delta,
        };
        debug!(
            target: "accountant",
            "{} usage estimate: {estimate:.1}MB (delta={delta:.1}MB declared={:?})",
            pipeline.kind(),
            pipeline.footprint_mb()
        );
        estimate
    }

    /// Flush the allocator cache after one slot dropped its pipeline.
    ///
    /// Peak and accumulated counters are left alone; only
    /// [`force_reclaim_all`](Self::force_reclaim_all) resets them.
    pub fn release_slot(&self, kind: ModelKind) -> Result<(), GenError> {
        let before = self.reserved_mb();
        self.device
            .empty_cache()
            .and_then(|_| self.device.synchronize())
            .map_err(|e| reclaim_error(&e))?;
        debug!(
            target: "accountant",
            "Released {kind}: reserved {:.1}MB -> {:.1}MB",
            before,
            self.reserved_mb()
        );
        Ok(())
    }

    /// Device-wide reset: flush every pool, collect IPC handles, wait for
    /// outstanding work and reset the peak/accumulated counters.
    ///
    /// Every step runs even if an earlier one fails; failures are collected
    /// into the report and never abort the caller.
    pub fn force_reclaim_all(&self) -> ReclaimReport {
        let allocated_before_mb = self.allocated_mb();
        let reserved_before_mb = self.reserved_mb();

        let steps: [(&str, Result<(), DeviceError>); 5] = [
            ("empty_cache", self.device.empty_cache()),
            ("ipc_collect", self.device.ipc_collect()),
            ("reset_peak_stats", self.device.reset_peak_stats()),
            ("reset_accumulated_stats", self.device.reset_accumulated_stats()),
            ("synchronize", self.device.synchronize()),
        ];

        let mut errors = Vec::new();
        for (step, result) in steps {
            if let Err(e) = result {
                warn!(target: "accountant", "Reclaim step {step} failed: {e}");
                errors.push(reclaim_error(&e).to_string());
            }
        }

        let report = ReclaimReport {
            success: errors.is_empty(),
            allocated_before_mb,
            allocated_after_mb: self.allocated_mb(),
            reserved_before_mb,
            reserved_after_mb: self.reserved_mb(),
            errors,
        };
        info!(
            target: "accountant",
            "Forced reclaim on {}: reserved {:.1}MB -> {:.1}MB (freed {:.1}MB)",
            self.device_name(),
            report.reserved_before_mb,
            report.reserved_after_mb,
            report.freed_mb()
        );
        report
    }
}

fn reclaim_error(e: &DeviceError) -> GenError {
    GenError::ResourceReclaimFailure(e.to_string())
}
