//! Test doubles shared by the engine's unit tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use gen_studio_types::{GenerationParams, ModelKind};
use image::{Rgb, RgbImage};

use crate::device::{mb_to_bytes, DeviceAllocation, DeviceError, DeviceMemory, SimulatedDevice};
use crate::pipeline::{BackendError, Pipeline, PipelineBackend, RawArtifact};

/// Shared instrumentation for every pipeline a [`StubBackend`] builds for one kind.
#[derive(Debug, Default)]
pub struct StubBehavior {
    run_delay: Duration,
    rendezvous: Option<Arc<Barrier>>,
    fail_runs: AtomicU32,
    panic_runs: AtomicU32,
    active: AtomicU32,
    max_active: AtomicU32,
    runs: AtomicU32,
}

impl StubBehavior {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_run_delay(mut self, ms: u64) -> Self {
        self.run_delay = Duration::from_millis(ms);
        self
    }

    /// Every `run` waits on the barrier before returning.
    pub fn with_rendezvous(mut self, barrier: Arc<Barrier>) -> Self {
        self.rendezvous = Some(barrier);
        self
    }

    /// The next `n` runs fail.
    pub fn failing_runs(self, n: u32) -> Self {
        self.fail_runs.store(n, Ordering::SeqCst);
        self
    }

    /// The next `n` runs panic.
    pub fn panicking_runs(self, n: u32) -> Self {
        self.panic_runs.store(n, Ordering::SeqCst);
        self
    }

    pub fn runs(&self) -> u32 {
        self.runs.load(Ordering::SeqCst)
    }

    /// Highest number of simultaneous `run` calls ever observed.
    pub fn max_active(&self) -> u32 {
        self.max_active.load(Ordering::SeqCst)
    }

    fn take_failure(&self) -> bool {
        take_one(&self.fail_runs)
    }
}

fn take_one(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

pub struct StubPipeline {
    kind: ModelKind,
    footprint_mb: Option<f64>,
    behavior: Arc<StubBehavior>,
    _allocation: Option<DeviceAllocation>,
}

impl StubPipeline {
    pub fn new(kind: ModelKind, footprint_mb: Option<f64>) -> Self {
        Self {
            kind,
            footprint_mb,
            behavior: Arc::new(StubBehavior::new()),
            _allocation: None,
        }
    }
}

impl Pipeline for StubPipeline {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn footprint_mb(&self) -> Option<f64> {
        self.footprint_mb
    }

    fn run(&mut self, params: &GenerationParams) -> Result<RawArtifact, BackendError> {
        let behavior = Arc::clone(&self.behavior);
        if take_one(&behavior.panic_runs) {
            panic!("stub pipeline panicked");
        }
        let now_active = behavior.active.fetch_add(1, Ordering::SeqCst) + 1;
        behavior.max_active.fetch_max(now_active, Ordering::SeqCst);
        behavior.runs.fetch_add(1, Ordering::SeqCst);

        if let Some(barrier) = &behavior.rendezvous {
            barrier.wait();
        }
        thread::sleep(behavior.run_delay);

        let result = if behavior.take_failure() {
            Err(BackendError::new("stub pipeline failure"))
        } else {
            let frame = RgbImage::from_pixel(params.width, params.height, Rgb([40, 80, 120]));
            Ok(match params.num_frames {
                Some(n) => RawArtifact::Frames(vec![frame; n as usize]),
                None => RawArtifact::Image(frame),
            })
        };
        behavior.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Backend that allocates a fixed amount of simulated memory per pipeline
/// and counts how often each kind was constructed.
pub struct StubBackend {
    device: Arc<SimulatedDevice>,
    memory_mb: u64,
    load_delay: Duration,
    fail_loads: AtomicU32,
    panic_loads: AtomicU32,
    loads: [AtomicU32; 3],
    behaviors: [Arc<StubBehavior>; 3],
}

impl StubBackend {
    pub fn new(device: Arc<SimulatedDevice>, memory_mb: u64) -> Self {
        Self {
            device,
            memory_mb,
            load_delay: Duration::ZERO,
            fail_loads: AtomicU32::new(0),
            panic_loads: AtomicU32::new(0),
            loads: Default::default(),
            behaviors: Default::default(),
        }
    }

    pub fn with_load_delay(mut self, ms: u64) -> Self {
        self.load_delay = Duration::from_millis(ms);
        self
    }

    pub fn with_behavior(mut self, kind: ModelKind, behavior: StubBehavior) -> Self {
        self.behaviors[kind.index()] = Arc::new(behavior);
        self
    }

    /// The next `n` loads fail with an out-of-memory error.
    pub fn failing_loads(self, n: u32) -> Self {
        self.fail_loads.store(n, Ordering::SeqCst);
        self
    }

    /// The next `n` loads panic inside the constructor.
    pub fn panicking_loads(self, n: u32) -> Self {
        self.panic_loads.store(n, Ordering::SeqCst);
        self
    }

    pub fn loads(&self, kind: ModelKind) -> u32 {
        self.loads[kind.index()].load(Ordering::SeqCst)
    }

    pub fn behavior(&self, kind: ModelKind) -> Arc<StubBehavior> {
        Arc::clone(&self.behaviors[kind.index()])
    }
}

impl PipelineBackend for StubBackend {
    fn name(&self) -> &str {
        "stub"
    }

    fn load(&self, kind: ModelKind) -> Result<Box<dyn Pipeline>, BackendError> {
        self.loads[kind.index()].fetch_add(1, Ordering::SeqCst);
        thread::sleep(self.load_delay);

        if take_one(&self.panic_loads) {
            panic!("stub loader panicked");
        }
        if take_one(&self.fail_loads) {
            return Err(BackendError::out_of_memory("CUDA out of memory (stub)"));
        }

        Ok(Box::new(StubPipeline {
            kind,
            footprint_mb: Some(self.memory_mb as f64),
            behavior: self.behavior(kind),
            _allocation: Some(self.device.allocate(mb_to_bytes(self.memory_mb))),
        }))
    }
}

/// Device whose `synchronize` always fails; every other call succeeds.
#[derive(Debug, Default)]
pub struct FaultyDevice {
    peak_reset: AtomicBool,
}

impl FaultyDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn peak_was_reset(&self) -> bool {
        self.peak_reset.load(Ordering::SeqCst)
    }
}

impl DeviceMemory for FaultyDevice {
    fn name(&self) -> &str {
        "faulty"
    }

    fn allocated_bytes(&self) -> u64 {
        0
    }

    fn reserved_bytes(&self) -> u64 {
        0
    }

    fn peak_allocated_bytes(&self) -> u64 {
        0
    }

    fn empty_cache(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn ipc_collect(&self) -> Result<(), DeviceError> {
        Ok(())
    }

    fn synchronize(&self) -> Result<(), DeviceError> {
        Err(DeviceError {
            device: "faulty".to_string(),
            operation: "synchronize",
            message: "device lost".to_string(),
        })
    }

    fn reset_peak_stats(&self) -> Result<(), DeviceError> {
        self.peak_reset.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn reset_accumulated_stats(&self) -> Result<(), DeviceError> {
        Ok(())
    }
}
