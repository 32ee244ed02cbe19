//! Seams to the numeric backend.
//!
//! A [`PipelineBackend`] constructs one [`Pipeline`] per model kind. The
//! engine treats both as opaque: it only needs to build, run and drop them.
//! Dropping a pipeline must release its device allocations.

use gen_studio_types::{GenerationParams, ModelKind};
use image::RgbImage;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
    /// Set when the backend ran out of device memory.
    pub out_of_memory: bool,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            out_of_memory: false,
        }
    }

    pub fn out_of_memory(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            out_of_memory: true,
        }
    }
}

/// Unencoded pipeline output.
#[derive(Debug, Clone)]
pub enum RawArtifact {
    Image(RgbImage),
    Frames(Vec<RgbImage>),
}

impl RawArtifact {
    pub fn frame_count(&self) -> usize {
        match self {
            RawArtifact::Image(_) => 1,
            RawArtifact::Frames(frames) => frames.len(),
        }
    }
}

/// A constructed, resident inference pipeline.
///
/// Not safe for concurrent forward passes; the engine guarantees `run` is
/// never entered twice at once for the same instance.
pub trait Pipeline: Send {
    fn kind(&self) -> ModelKind;

    /// Device memory held by this pipeline's own weights, in MB, or `None`
    /// when the backend cannot tell.
    fn footprint_mb(&self) -> Option<f64>;

    fn run(&mut self, params: &GenerationParams) -> Result<RawArtifact, BackendError>;
}

/// Builds pipelines. Construction is slow and may fail (missing weights,
/// out of memory); it is always invoked from a blocking worker thread.
pub trait PipelineBackend: Send + Sync {
    fn name(&self) -> &str;

    fn load(&self, kind: ModelKind) -> Result<Box<dyn Pipeline>, BackendError>;
}
