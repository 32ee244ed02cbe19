//! Generative dispatch service.
//!
//! One entry point per request: validate, make sure the pipeline is
//! resident, run it under the slot's use-gate on the blocking pool, then
//! encode the output after the gate is released. Every failure is folded
//! into the returned [`GenerationResult`]; nothing here panics or returns
//! `Err` to the transport layer.

use std::sync::Arc;
use std::time::Instant;

use gen_studio_types::{
    ArtParams, FailureKind, GenError, GenerationRequest, GenerationResult, StreamingParams,
    VideoParams,
};
use log::{error, info, warn};

use crate::encode::ArtifactEncoder;
use crate::manager::{Readiness, SharedModelManager};
use crate::pipeline::BackendError;

pub type SharedGenerativeService = Arc<GenerativeService>;

pub struct GenerativeService {
    manager: SharedModelManager,
    encoder: Arc<ArtifactEncoder>,
}

impl GenerativeService {
    pub fn new(manager: SharedModelManager, encoder: Arc<ArtifactEncoder>) -> Self {
        Self { manager, encoder }
    }

    pub fn manager(&self) -> &SharedModelManager {
        &self.manager
    }

    pub fn encoder(&self) -> &Arc<ArtifactEncoder> {
        &self.encoder
    }

    pub async fn generate_art(&self, params: ArtParams) -> GenerationResult {
        self.generate(GenerationRequest::Art(params)).await
    }

    pub async fn generate_video(&self, params: VideoParams) -> GenerationResult {
        self.generate(GenerationRequest::Video(params)).await
    }

    pub async fn generate_streaming(&self, params: StreamingParams) -> GenerationResult {
        self.generate(GenerationRequest::Streaming(params)).await
    }

    pub async fn generate(&self, request: GenerationRequest) -> GenerationResult {
        let kind = request.kind();
        let prompt = request.prompt().to_string();

        if let Err(err) = request.validate() {
            warn!(target: "dispatch", "Rejected {kind} request: {err}");
            return GenerationResult::failed(kind, &prompt, 0.0, &err);
        }

        let guard = match self.manager.readiness(kind, true).await {
            Readiness::Ready(guard) => guard,
            Readiness::LoadFailed(message) => {
                error!(target: "dispatch", "{message}");
                return GenerationResult::failed_with(
                    kind,
                    &prompt,
                    0.0,
                    FailureKind::LoadFailure,
                    message,
                );
            }
            Readiness::NeedsLoad => {
                let err = GenError::LoadFailure {
                    kind,
                    message: "pipeline was evicted before it could be used".to_string(),
                };
                error!(target: "dispatch", "{err}");
                return GenerationResult::failed(kind, &prompt, 0.0, &err);
            }
        };

        info!(target: "dispatch", "Generating with {kind}: {}", preview(&prompt));
        let params = request.params();
        let started = Instant::now();
        let ran = tokio::task::spawn_blocking(move || {
            let mut guard = guard;
            let output = match (*guard).as_mut() {
                Some(pipeline) => pipeline.run(&params),
                None => Err(BackendError::new("pipeline handle missing")),
            };
            // Release the gate before the result travels back.
            drop(guard);
            output
        })
        .await;
        let processing_time = started.elapsed().as_secs_f64();

        let raw = match ran {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                let err = GenError::InferenceFailure {
                    kind,
                    message: e.message,
                };
                error!(target: "dispatch", "{err}");
                return GenerationResult::failed(kind, &prompt, processing_time, &err);
            }
            Err(e) => {
                let err = GenError::InferenceFailure {
                    kind,
                    message: format!("pipeline panicked: {e}"),
                };
                error!(target: "dispatch", "{err}");
                return GenerationResult::failed(kind, &prompt, processing_time, &err);
            }
        };

        let encoder = Arc::clone(&self.encoder);
        let encoded = tokio::task::spawn_blocking(move || encoder.encode(kind, raw))
            .await
            .unwrap_or_else(|e| Err(GenError::Encoding(format!("encoder panicked: {e}"))));

        match encoded {
            Ok(artifact) => {
                info!(target: "dispatch", "{kind} finished in {processing_time:.2}s");
                GenerationResult::succeeded(kind, &prompt, processing_time, artifact)
            }
            Err(err) => {
                error!(target: "dispatch", "{err}");
                GenerationResult::failed(kind, &prompt, processing_time, &err)
            }
        }
    }
}

fn preview(prompt: &str) -> String {
    const MAX: usize = 50;
    match prompt.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &prompt[..cut]),
        None => prompt.to_string(),
    }
}
