//! Deterministic stand-in for the diffusion pipelines.
//!
//! Loading sleeps for the configured delay and pins the configured amount
//! of simulated device memory until the pipeline is dropped. Each inference
//! step costs `step_delay_ms`. Output is a gradient seeded from the prompt,
//! so the same request always renders the same pixels.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use gen_studio_config::{BackendConfig, ModelProfile};
use gen_studio_types::{GenerationParams, ModelKind};
use image::{Rgb, RgbImage};
use log::debug;

use crate::device::{mb_to_bytes, DeviceAllocation, SimulatedDevice};
use crate::pipeline::{BackendError, Pipeline, PipelineBackend, RawArtifact};

/// Bytes of scratch memory per pixel held for the duration of one run.
const ACTIVATION_BYTES_PER_PIXEL: u64 = 24;

pub struct SyntheticBackend {
    device: Arc<SimulatedDevice>,
    config: BackendConfig,
}

impl SyntheticBackend {
    pub fn new(device: Arc<SimulatedDevice>, config: BackendConfig) -> Self {
        Self { device, config }
    }
}

impl PipelineBackend for SyntheticBackend {
    fn name(&self) -> &str {
        "synthetic"
    }

    fn load(&self, kind: ModelKind) -> Result<Box<dyn Pipeline>, BackendError> {
        let profile = self.config.profile(kind).clone();
        if profile.memory_mb == 0 {
            return Err(BackendError::new(format!(
                "no weights configured for {}",
                kind.model_id()
            )));
        }
        thread::sleep(Duration::from_millis(profile.load_delay_ms));
        let weights = self.device.allocate(mb_to_bytes(profile.memory_mb));
        debug!(
            target: "lifecycle",
            "Synthetic {kind} resident with {}MB",
            profile.memory_mb
        );
        Ok(Box::new(SyntheticPipeline {
            kind,
            profile,
            device: Arc::clone(&self.device),
            _weights: weights,
        }))
    }
}

pub struct SyntheticPipeline {
    kind: ModelKind,
    profile: ModelProfile,
    device: Arc<SimulatedDevice>,
    _weights: DeviceAllocation,
}

impl Pipeline for SyntheticPipeline {
    fn kind(&self) -> ModelKind {
        self.kind
    }

    fn footprint_mb(&self) -> Option<f64> {
        Some(self.profile.memory_mb as f64)
    }

    fn run(&mut self, params: &GenerationParams) -> Result<RawArtifact, BackendError> {
        let pixels = u64::from(params.width) * u64::from(params.height);
        let frames = params.num_frames.unwrap_or(1).max(1);
        let _activations = self
            .device
            .allocate(pixels * u64::from(frames) * ACTIVATION_BYTES_PER_PIXEL);

        let steps = u64::from(params.num_inference_steps.max(1));
        thread::sleep(Duration::from_millis(self.profile.step_delay_ms * steps));

        let seed = prompt_seed(&params.prompt);
        Ok(match params.num_frames {
            Some(n) => RawArtifact::Frames(
                (0..n)
                    .map(|t| render(seed, params.width, params.height, t))
                    .collect(),
            ),
            None => RawArtifact::Image(render(seed, params.width, params.height, 0)),
        })
    }
}

/// FNV-1a over the prompt bytes.
fn prompt_seed(prompt: &str) -> u64 {
    prompt.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
    })
}

fn render(seed: u64, width: u32, height: u32, frame: u32) -> RgbImage {
    let [r0, g0, b0, dx, dy, ..] = seed.to_le_bytes();
    let w = width.max(1);
    let h = height.max(1);
    let shift = frame.wrapping_mul(9);
    RgbImage::from_fn(width, height, |x, y| {
        let fx = x * 255 / w;
        let fy = y * 255 / h;
        Rgb([
            (u32::from(r0) + fx + shift) as u8,
            (u32::from(g0) + fy + shift / 2) as u8,
            (u32::from(b0) + (fx * u32::from(dx | 1) + fy * u32::from(dy | 1)) / 255) as u8,
        ])
    })
}
