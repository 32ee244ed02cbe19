use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{FailureKind, GenError};
use crate::kind::{ModelKind, SlotState};

/// Result of a `load` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadOutcome {
    pub model_type: ModelKind,
    pub loaded: bool,
    /// True when the slot was already resident and nothing was constructed.
    #[serde(default)]
    pub already_loaded: bool,
    pub loading_time: f64,
    pub memory_usage_mb: f64,
    pub error: Option<String>,
}

impl LoadOutcome {
    pub fn failed(kind: ModelKind, loading_time: f64, err: &GenError) -> Self {
        Self {
            model_type: kind,
            loaded: false,
            already_loaded: false,
            loading_time,
            memory_usage_mb: 0.0,
            error: Some(err.to_string()),
        }
    }
}

/// Read-only snapshot of one slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotStatus {
    pub state: SlotState,
    pub model_id: String,
    pub memory_usage_mb: f64,
    pub load_time_seconds: Option<f64>,
    pub last_error: Option<String>,
}

pub type StatusReport = BTreeMap<ModelKind, SlotStatus>;

/// What the accountant observed while forcing a device-wide reclaim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ReclaimReport {
    pub success: bool,
    pub allocated_before_mb: f64,
    pub allocated_after_mb: f64,
    pub reserved_before_mb: f64,
    pub reserved_after_mb: f64,
    pub errors: Vec<String>,
}

impl ReclaimReport {
    pub fn freed_mb(&self) -> f64 {
        (self.reserved_before_mb - self.reserved_after_mb).max(0.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnloadAllOutcome {
    pub unloaded: Vec<ModelKind>,
    pub failed: Vec<ModelKind>,
    pub kept: Option<ModelKind>,
    pub reclaim: ReclaimReport,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClearAllOutcome {
    pub success: bool,
    pub processing_time: f64,
    pub unloaded: Vec<ModelKind>,
    pub reclaim: ReclaimReport,
}

/// Encoded output of a successful generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Artifact {
    Image {
        image_base64: String,
    },
    Video {
        video_filename: String,
        num_frames: u32,
        fps: u32,
    },
}

/// Transport-ready record returned by every generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationResult {
    pub success: bool,
    pub model_kind: ModelKind,
    pub model_used: String,
    pub prompt_used: String,
    /// Wall time of the pipeline call in seconds.
    pub processing_time: f64,
    #[serde(flatten)]
    pub artifact: Option<Artifact>,
    pub error: Option<String>,
    pub failure: Option<FailureKind>,
}

impl GenerationResult {
    pub fn succeeded(kind: ModelKind, prompt: &str, processing_time: f64, artifact: Artifact) -> Self {
        Self {
            success: true,
            model_kind: kind,
            model_used: kind.model_id().to_string(),
            prompt_used: prompt.to_string(),
            processing_time,
            artifact: Some(artifact),
            error: None,
            failure: None,
        }
    }

    pub fn failed(kind: ModelKind, prompt: &str, processing_time: f64, err: &GenError) -> Self {
        Self::failed_with(kind, prompt, processing_time, err.failure_kind(), err.to_string())
    }

    /// Failure whose message was already rendered elsewhere (e.g. a load outcome).
    pub fn failed_with(
        kind: ModelKind,
        prompt: &str,
        processing_time: f64,
        failure: FailureKind,
        message: String,
    ) -> Self {
        Self {
            success: false,
            model_kind: kind,
            model_used: kind.model_id().to_string(),
            prompt_used: prompt.to_string(),
            processing_time,
            artifact: None,
            error: Some(message),
            failure: Some(failure),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_report_keys_use_wire_names() {
        let mut report = StatusReport::new();
        report.insert(
            ModelKind::Art,
            SlotStatus {
                state: SlotState::Loaded,
                model_id: ModelKind::Art.model_id().to_string(),
                memory_usage_mb: 2600.0,
                load_time_seconds: Some(1.5),
                last_error: None,
            },
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["generative_art"]["state"], "loaded");
        assert_eq!(json["generative_art"]["memory_usage_mb"], 2600.0);
    }

    #[test]
    fn test_image_result_flattens_artifact() {
        let result = GenerationResult::succeeded(
            ModelKind::Streaming,
            "city",
            0.25,
            Artifact::Image {
                image_base64: "aGk=".to_string(),
            },
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["image_base64"], "aGk=");
        assert_eq!(json["model_used"], "stabilityai/sdxl-turbo");
        assert_eq!(json["success"], true);
    }

    #[test]
    fn test_failed_result_carries_failure_kind() {
        let err = GenError::InferenceFailure {
            kind: ModelKind::Art,
            message: "boom".to_string(),
        };
        let result = GenerationResult::failed(ModelKind::Art, "fox", 0.1, &err);
        assert!(!result.success);
        assert_eq!(result.failure, Some(FailureKind::InferenceFailure));
        assert!(result.artifact.is_none());
    }

    #[test]
    fn test_freed_mb_never_negative() {
        let report = ReclaimReport {
            reserved_before_mb: 10.0,
            reserved_after_mb: 12.0,
            ..Default::default()
        };
        assert_eq!(report.freed_mb(), 0.0);
    }
}
