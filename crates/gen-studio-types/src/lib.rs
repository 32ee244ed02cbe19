//! Shared value types for the generation server.
//!
//! Everything that crosses a crate boundary lives here: the closed set of
//! model kinds, validated generation parameters, result records and the
//! error taxonomy. The engine and the web front-end both depend on this
//! crate, never on each other's internals.

pub mod error;
pub mod kind;
pub mod outcome;
pub mod params;

pub use error::{FailureKind, GenError};
pub use kind::{ModelKind, OutputKind, SlotState, VideoFormat};
pub use outcome::{
    Artifact, ClearAllOutcome, GenerationResult, LoadOutcome, ReclaimReport, SlotStatus,
    StatusReport, UnloadAllOutcome,
};
pub use params::{ArtParams, GenerationParams, GenerationRequest, StreamingParams, VideoParams};
