//! Gen Studio: a generation server hosting art, video and streaming
//! pipelines on one GPU.
//!
//! The workspace crates are re-exported here; [`build_service`] wires them
//! together from a [`ServerConfig`].

use std::sync::Arc;

use gen_studio_config::ServerConfig;
use gen_studio_engine::{
    ArtifactEncoder, GenerativeService, ModelLifecycleManager, ResourceAccountant,
    SharedGenerativeService, SimulatedDevice, SyntheticBackend,
};

pub mod logging;

pub use gen_studio_config as config;
pub use gen_studio_engine as engine;
pub use gen_studio_types as types;
pub use gen_studio_web as web;

/// Build the dispatch service on the synthetic backend and a simulated device.
pub fn build_service(config: &ServerConfig) -> SharedGenerativeService {
    let device = SimulatedDevice::new();
    let backend = Arc::new(SyntheticBackend::new(device.clone(), config.backend.clone()));
    let accountant = Arc::new(ResourceAccountant::new(device));
    let manager = Arc::new(ModelLifecycleManager::new(backend, accountant));
    let encoder = Arc::new(ArtifactEncoder::from_config(config));
    Arc::new(GenerativeService::new(manager, encoder))
}
