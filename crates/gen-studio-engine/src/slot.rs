//! Per-kind lifecycle container.
//!
//! A slot holds three independent locks:
//! - `record`: a short-lived std mutex over the observable fields, so status
//!   snapshots never wait on a load or an inference.
//! - `lifecycle`: an async mutex held for the whole of a load or unload,
//!   making administrative calls on one slot mutually exclusive.
//! - `gate`: the use-gate. It owns the pipeline handle, so whoever holds the
//!   gate has exclusive access to the pipeline.

use std::sync::{Arc, Mutex, MutexGuard};

use gen_studio_types::{ModelKind, SlotState, SlotStatus};
use tokio::sync::{Mutex as TokioMutex, MutexGuard as TokioMutexGuard, OwnedMutexGuard};

use crate::pipeline::Pipeline;

/// Exclusive access to a slot's pipeline handle (`None` while not loaded).
pub type PipelineGuard = OwnedMutexGuard<Option<Box<dyn Pipeline>>>;

#[derive(Debug, Clone, Default)]
struct SlotRecord {
    state: SlotState,
    memory_usage_mb: f64,
    load_time_seconds: Option<f64>,
    last_error: Option<String>,
}

pub struct ModelSlot {
    kind: ModelKind,
    record: Mutex<SlotRecord>,
    lifecycle: TokioMutex<()>,
    gate: Arc<TokioMutex<Option<Box<dyn Pipeline>>>>,
}

impl ModelSlot {
    pub fn new(kind: ModelKind) -> Self {
        Self {
            kind,
            record: Mutex::new(SlotRecord::default()),
            lifecycle: TokioMutex::new(()),
            gate: Arc::new(TokioMutex::new(None)),
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    fn record(&self) -> MutexGuard<'_, SlotRecord> {
        // Every update is a plain field store, so a poisoned record is still consistent.
        self.record.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> SlotState {
        self.record().state
    }

    pub fn snapshot(&self) -> SlotStatus {
        let record = self.record();
        SlotStatus {
            state: record.state,
            model_id: self.kind.model_id().to_string(),
            memory_usage_mb: record.memory_usage_mb,
            load_time_seconds: record.load_time_seconds,
            last_error: record.last_error.clone(),
        }
    }

    pub(crate) fn begin_loading(&self) {
        let mut record = self.record();
        record.state = SlotState::Loading;
        record.last_error = None;
    }

    pub(crate) fn begin_unloading(&self) {
        self.record().state = SlotState::Unloading;
    }

    pub(crate) fn mark_loaded(&self, memory_usage_mb: f64, load_time_seconds: f64) {
        let mut record = self.record();
        record.state = SlotState::Loaded;
        record.memory_usage_mb = memory_usage_mb;
        record.load_time_seconds = Some(load_time_seconds);
        record.last_error = None;
    }

    /// Back to `Unloaded`. The last successful load time is kept for
    /// observability; memory is always zeroed.
    pub(crate) fn mark_unloaded(&self, error: Option<String>) {
        let mut record = self.record();
        record.state = SlotState::Unloaded;
        record.memory_usage_mb = 0.0;
        if error.is_some() {
            record.last_error = error;
        }
    }

    /// Serializes load/unload on this slot.
    pub(crate) async fn lock_lifecycle(&self) -> TokioMutexGuard<'_, ()> {
        self.lifecycle.lock().await
    }

    /// Acquire the use-gate. Waits for any in-flight inference to finish.
    pub async fn acquire_gate(&self) -> PipelineGuard {
        Arc::clone(&self.gate).lock_owned().await
    }

    #[cfg(test)]
    pub(crate) fn try_acquire_gate(&self) -> Option<PipelineGuard> {
        Arc::clone(&self.gate).try_lock_owned().ok()
    }
}
