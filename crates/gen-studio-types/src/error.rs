use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::kind::ModelKind;

/// Errors produced anywhere in the generation core.
///
/// Public engine operations never return these directly to the transport
/// layer; they are folded into result records (see [`crate::outcome`]).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GenError {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("failed to load {kind}: {message}")]
    LoadFailure { kind: ModelKind, message: String },

    #[error("inference failed on {kind}: {message}")]
    InferenceFailure { kind: ModelKind, message: String },

    #[error("resource reclaim failed: {0}")]
    ResourceReclaimFailure(String),

    #[error("failed to encode artifact: {0}")]
    Encoding(String),

    #[error("unknown model kind '{0}'")]
    UnknownModelKind(String),
}

impl GenError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        GenError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            GenError::Validation { .. } | GenError::UnknownModelKind(_) => FailureKind::Validation,
            GenError::LoadFailure { .. } => FailureKind::LoadFailure,
            GenError::InferenceFailure { .. } => FailureKind::InferenceFailure,
            GenError::ResourceReclaimFailure(_) => FailureKind::ResourceReclaimFailure,
            GenError::Encoding(_) => FailureKind::Encoding,
        }
    }
}

/// Serializable tag for the failure category carried in result records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    LoadFailure,
    InferenceFailure,
    ResourceReclaimFailure,
    Encoding,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_kind() {
        let err = GenError::LoadFailure {
            kind: ModelKind::Video,
            message: "out of memory".to_string(),
        };
        assert_eq!(err.to_string(), "failed to load generative_video: out of memory");
        assert_eq!(err.failure_kind(), FailureKind::LoadFailure);
    }

    #[test]
    fn test_unknown_kind_counts_as_validation() {
        let err = GenError::UnknownModelKind("llm".to_string());
        assert_eq!(err.failure_kind(), FailureKind::Validation);
    }
}
