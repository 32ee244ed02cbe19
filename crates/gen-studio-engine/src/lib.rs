//! Generation core: model lifecycle, device memory accounting and the
//! dispatch service that routes requests to resident pipelines.

pub mod accountant;
pub mod device;
pub mod dispatch;
pub mod encode;
pub mod manager;
pub mod pipeline;
pub mod slot;
pub mod synthetic;

#[cfg(test)]
mod testing;

pub use accountant::{ResourceAccountant, SharedAccountant};
pub use device::{query_free_vram_mb, DeviceMemory, SimulatedDevice};
pub use dispatch::{GenerativeService, SharedGenerativeService};
pub use encode::{is_safe_video_filename, ArtifactEncoder, GifWriter, Mp4Writer, VideoWriter};
pub use manager::{ModelLifecycleManager, Readiness, SharedModelManager};
pub use pipeline::{BackendError, Pipeline, PipelineBackend, RawArtifact};
pub use synthetic::SyntheticBackend;
