//! Model lifecycle manager.
//!
//! Owns one [`ModelSlot`] per [`ModelKind`] and is the only component that
//! constructs or destroys pipelines. Loads and unloads run on their own
//! spawned task: if the caller's future is dropped midway the operation
//! still runs to completion, so no slot is ever left stuck in `Loading` or
//! `Unloading`.

use std::sync::Arc;
use std::time::Instant;

use gen_studio_types::{
    ClearAllOutcome, GenError, LoadOutcome, ModelKind, ReclaimReport, SlotState, StatusReport,
    UnloadAllOutcome,
};
use log::{debug, error, info, warn};

use crate::accountant::SharedAccountant;
use crate::pipeline::PipelineBackend;
use crate::slot::{ModelSlot, PipelineGuard};

pub type SharedModelManager = Arc<ModelLifecycleManager>;

/// How many times a lazy caller retries when a concurrent unload evicts the
/// pipeline between its load and its gate acquisition.
const LAZY_LOAD_ATTEMPTS: usize = 2;

/// Whether a slot can serve an inference right now.
pub enum Readiness {
    /// The gate is held and the pipeline is resident.
    Ready(PipelineGuard),
    /// Not resident and the caller did not ask for a lazy load.
    NeedsLoad,
    /// A lazy load was attempted and failed.
    LoadFailed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UnloadResult {
    AlreadyUnloaded,
    Unloaded,
    Failed,
}

pub struct ModelLifecycleManager {
    slots: [Arc<ModelSlot>; 3],
    backend: Arc<dyn PipelineBackend>,
    accountant: SharedAccountant,
}

impl ModelLifecycleManager {
    pub fn new(backend: Arc<dyn PipelineBackend>, accountant: SharedAccountant) -> Self {
        info!(
            target: "lifecycle",
            "Model manager ready (backend: {}, device: {})",
            backend.name(),
            accountant.device_name()
        );
        Self {
            slots: ModelKind::ALL.map(|kind| Arc::new(ModelSlot::new(kind))),
            backend,
            accountant,
        }
    }

    pub fn slot(&self, kind: ModelKind) -> &Arc<ModelSlot> {
        &self.slots[kind.index()]
    }

    pub fn accountant(&self) -> &SharedAccountant {
        &self.accountant
    }

    fn task(&self, kind: ModelKind) -> LifecycleTask {
        LifecycleTask {
            slot: Arc::clone(self.slot(kind)),
            backend: Arc::clone(&self.backend),
            accountant: Arc::clone(&self.accountant),
        }
    }

    /// Make `kind` resident.
    ///
    /// A second call on an already loaded slot is a no-op unless
    /// `force_reload` is set, in which case the pipeline is rebuilt. A load
    /// failure is reported in the outcome and leaves the slot `Unloaded`.
    pub async fn load(&self, kind: ModelKind, force_reload: bool) -> LoadOutcome {
        let task = self.task(kind);
        match tokio::spawn(task.load(force_reload)).await {
            Ok(outcome) => outcome,
            Err(e) => {
                let err = GenError::LoadFailure {
                    kind,
                    message: format!("load task aborted: {e}"),
                };
                error!(target: "lifecycle", "{err}");
                LoadOutcome::failed(kind, 0.0, &err)
            }
        }
    }

    /// Destroy the pipeline for `kind`, waiting for any in-flight inference.
    ///
    /// Returns `true` when the slot ends up `Unloaded` with its memory
    /// released. Unloading an unloaded slot succeeds.
    pub async fn unload(&self, kind: ModelKind) -> bool {
        self.unload_inner(kind).await != UnloadResult::Failed
    }

    async fn unload_inner(&self, kind: ModelKind) -> UnloadResult {
        match tokio::spawn(self.task(kind).unload()).await {
            Ok(result) => result,
            Err(e) => {
                error!(target: "lifecycle", "Unload task for {kind} aborted: {e}");
                UnloadResult::Failed
            }
        }
    }

    /// Unload every kind other than `keep`, then force a device-wide reclaim.
    ///
    /// Slots still loading are waited out and then unloaded. Reclaim
    /// failures are logged and reported, never raised.
    pub async fn unload_all_except(&self, keep: Option<ModelKind>) -> UnloadAllOutcome {
        let mut unloaded = Vec::new();
        let mut failed = Vec::new();

        for kind in ModelKind::ALL {
            if Some(kind) == keep {
                continue;
            }
            match self.unload_inner(kind).await {
                UnloadResult::Unloaded => unloaded.push(kind),
                UnloadResult::Failed => failed.push(kind),
                UnloadResult::AlreadyUnloaded => {}
            }
        }

        let accountant = Arc::clone(&self.accountant);
        let reclaim = tokio::task::spawn_blocking(move || accountant.force_reclaim_all())
            .await
            .unwrap_or_else(|e| ReclaimReport {
                success: false,
                errors: vec![format!("reclaim task panicked: {e}")],
                ..Default::default()
            });

        match keep {
            Some(kind) => info!(
                target: "lifecycle",
                "Unloaded {} pipeline(s), kept {kind}",
                unloaded.len()
            ),
            None => info!(target: "lifecycle", "Unloaded {} pipeline(s)", unloaded.len()),
        }
        if !failed.is_empty() {
            warn!(target: "lifecycle", "Failed to unload: {failed:?}");
        }

        UnloadAllOutcome {
            unloaded,
            failed,
            kept: keep,
            reclaim,
        }
    }

    /// Unload everything and reset device counters.
    pub async fn clear_all(&self) -> ClearAllOutcome {
        let started = Instant::now();
        let outcome = self.unload_all_except(None).await;
        ClearAllOutcome {
            success: outcome.failed.is_empty() && outcome.reclaim.success,
            processing_time: started.elapsed().as_secs_f64(),
            unloaded: outcome.unloaded,
            reclaim: outcome.reclaim,
        }
    }

    /// Snapshot of every slot. Never blocks on a load or an inference.
    pub fn status(&self) -> StatusReport {
        self.slots
            .iter()
            .map(|slot| (slot.kind(), slot.snapshot()))
            .collect()
    }

    pub fn total_memory_mb(&self) -> f64 {
        self.slots.iter().map(|s| s.snapshot().memory_usage_mb).sum()
    }

    /// Acquire the use-gate of `kind` if its pipeline is resident.
    ///
    /// With `lazy_load`, a missing pipeline is loaded first. The returned
    /// guard must be dropped as soon as the pipeline call returns.
    pub async fn readiness(&self, kind: ModelKind, lazy_load: bool) -> Readiness {
        let slot = self.slot(kind);
        for attempt in 0..=LAZY_LOAD_ATTEMPTS {
            let guard = slot.acquire_gate().await;
            if guard.is_some() {
                return Readiness::Ready(guard);
            }
            drop(guard);

            if !lazy_load || attempt == LAZY_LOAD_ATTEMPTS {
                break;
            }
            info!(target: "lifecycle", "{kind} is not resident, loading on demand");
            let outcome = self.load(kind, false).await;
            if let Some(err) = outcome.error {
                return Readiness::LoadFailed(err);
            }
        }
        Readiness::NeedsLoad
    }
}

/// The state a spawned load or unload needs, detached from the manager.
struct LifecycleTask {
    slot: Arc<ModelSlot>,
    backend: Arc<dyn PipelineBackend>,
    accountant: SharedAccountant,
}

impl LifecycleTask {
    async fn load(self, force_reload: bool) -> LoadOutcome {
        let kind = self.slot.kind();
        let _lifecycle = self.slot.lock_lifecycle().await;

        match self.slot.state() {
            SlotState::Loaded if !force_reload => {
                let status = self.slot.snapshot();
                debug!(target: "lifecycle", "{kind} already loaded");
                return LoadOutcome {
                    model_type: kind,
                    loaded: true,
                    already_loaded: true,
                    loading_time: status.load_time_seconds.unwrap_or(0.0),
                    memory_usage_mb: status.memory_usage_mb,
                    error: None,
                };
            }
            SlotState::Loaded | SlotState::Unloading => {
                info!(target: "lifecycle", "Reloading {kind}");
                if let Err(err) = self.unload_locked().await {
                    return LoadOutcome::failed(kind, 0.0, &err);
                }
            }
            SlotState::Loading => {
                // Only reachable if an earlier task died mid-load; the gate is empty.
                warn!(target: "lifecycle", "Recovering {kind} from an interrupted load");
            }
            SlotState::Unloaded => {}
        }

        self.slot.begin_loading();
        info!(target: "lifecycle", "Loading {kind} ({})", kind.model_id());
        let baseline_mb = self.accountant.allocated_mb();
        let started = Instant::now();

        let backend = Arc::clone(&self.backend);
        let built = tokio::task::spawn_blocking(move || backend.load(kind)).await;
        let loading_time = started.elapsed().as_secs_f64();

        let pipeline = match built {
            Ok(Ok(pipeline)) if pipeline.kind() == kind => pipeline,
            Ok(Ok(pipeline)) => {
                let message = format!("backend returned a {} pipeline", pipeline.kind());
                drop(pipeline);
                return self.fail_load(GenError::LoadFailure { kind, message }, loading_time);
            }
            Ok(Err(e)) => {
                let message = if e.out_of_memory {
                    format!("out of device memory: {}", e.message)
                } else {
                    e.message
                };
                return self.fail_load(GenError::LoadFailure { kind, message }, loading_time);
            }
            Err(e) => {
                let message = format!("loader panicked: {e}");
                return self.fail_load(GenError::LoadFailure { kind, message }, loading_time);
            }
        };

        let memory_usage_mb = self.accountant.estimate_usage(baseline_mb, pipeline.as_ref());
        {
            let mut gate = self.slot.acquire_gate().await;
            *gate = Some(pipeline);
        }
        self.slot.mark_loaded(memory_usage_mb, loading_time);
        info!(
            target: "lifecycle",
            "Loaded {kind} in {loading_time:.2}s ({memory_usage_mb:.1}MB)"
        );

        LoadOutcome {
            model_type: kind,
            loaded: true,
            already_loaded: false,
            loading_time,
            memory_usage_mb,
            error: None,
        }
    }

    fn fail_load(&self, err: GenError, loading_time: f64) -> LoadOutcome {
        let kind = self.slot.kind();
        error!(target: "lifecycle", "{err}");
        // Whatever the failed constructor left in the pool goes back to the device.
        if let Err(e) = self.accountant.release_slot(kind) {
            warn!(target: "lifecycle", "{e}");
        }
        self.slot.mark_unloaded(Some(err.to_string()));
        LoadOutcome::failed(kind, loading_time, &err)
    }

    async fn unload(self) -> UnloadResult {
        let kind = self.slot.kind();
        let _lifecycle = self.slot.lock_lifecycle().await;

        if self.slot.state() == SlotState::Unloaded {
            debug!(target: "lifecycle", "{kind} already unloaded");
            return UnloadResult::AlreadyUnloaded;
        }
        match self.unload_locked().await {
            Ok(()) => UnloadResult::Unloaded,
            Err(e) => {
                error!(target: "lifecycle", "{e}");
                UnloadResult::Failed
            }
        }
    }

    /// Caller holds the lifecycle lock.
    async fn unload_locked(&self) -> Result<(), GenError> {
        let kind = self.slot.kind();
        self.slot.begin_unloading();
        info!(target: "lifecycle", "Unloading {kind}");
        let started = Instant::now();

        // Waits for any in-flight inference to release the gate.
        let pipeline = self.slot.acquire_gate().await.take();

        let teardown = match pipeline {
            Some(pipeline) => tokio::task::spawn_blocking(move || drop(pipeline))
                .await
                .map_err(|e| {
                    GenError::ResourceReclaimFailure(format!(
                        "{kind} pipeline teardown panicked: {e}"
                    ))
                }),
            None => Ok(()),
        };

        if let Err(e) = self.accountant.release_slot(kind) {
            warn!(target: "lifecycle", "{e}");
        }
        self.slot.mark_unloaded(None);
        info!(
            target: "lifecycle",
            "Unloaded {kind} in {:.2}s",
            started.elapsed().as_secs_f64()
        );
        teardown
    }
}
