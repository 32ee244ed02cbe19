use serde::{Deserialize, Serialize};

use crate::error::GenError;
use crate::kind::ModelKind;

pub const MAX_PROMPT_CHARS: usize = 1000;
pub const MIN_DIMENSION: u32 = 256;
pub const MAX_DIMENSION: u32 = 1024;

// Art (openjourney) request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtParams {
    pub prompt: String,
    #[serde(default = "default_art_steps")]
    pub num_inference_steps: u32,
    #[serde(default = "default_art_guidance")]
    pub guidance_scale: f32,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
}

// Video (AnimateDiff-Lightning) request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoParams {
    pub prompt: String,
    #[serde(default = "default_video_frames")]
    pub num_frames: u32,
    #[serde(default = "default_video_guidance")]
    pub guidance_scale: f32,
    #[serde(default = "default_video_steps")]
    pub num_inference_steps: u32,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
}

// Streaming (sdxl-turbo) request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingParams {
    pub prompt: String,
    #[serde(default = "default_streaming_steps")]
    pub num_inference_steps: u32,
    #[serde(default)]
    pub guidance_scale: f32,
    #[serde(default = "default_dimension")]
    pub width: u32,
    #[serde(default = "default_dimension")]
    pub height: u32,
}

fn default_art_steps() -> u32 {
    70
}

fn default_art_guidance() -> f32 {
    5.0
}

fn default_video_frames() -> u32 {
    32
}

fn default_video_guidance() -> f32 {
    1.0
}

fn default_video_steps() -> u32 {
    4
}

fn default_streaming_steps() -> u32 {
    2
}

fn default_dimension() -> u32 {
    512
}

impl ArtParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            num_inference_steps: default_art_steps(),
            guidance_scale: default_art_guidance(),
            width: default_dimension(),
            height: default_dimension(),
        }
    }
}

impl VideoParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            num_frames: default_video_frames(),
            guidance_scale: default_video_guidance(),
            num_inference_steps: default_video_steps(),
            width: default_dimension(),
            height: default_dimension(),
        }
    }
}

impl StreamingParams {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            num_inference_steps: default_streaming_steps(),
            guidance_scale: 0.0,
            width: default_dimension(),
            height: default_dimension(),
        }
    }
}

/// A generation request for one of the model kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    Art(ArtParams),
    Video(VideoParams),
    Streaming(StreamingParams),
}

/// Kind-independent view of a request, handed to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub prompt: String,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
    pub width: u32,
    pub height: u32,
    /// Only set for video requests.
    pub num_frames: Option<u32>,
}

impl GenerationRequest {
    pub fn kind(&self) -> ModelKind {
        match self {
            GenerationRequest::Art(_) => ModelKind::Art,
            GenerationRequest::Video(_) => ModelKind::Video,
            GenerationRequest::Streaming(_) => ModelKind::Streaming,
        }
    }

    pub fn prompt(&self) -> &str {
        match self {
            GenerationRequest::Art(p) => &p.prompt,
            GenerationRequest::Video(p) => &p.prompt,
            GenerationRequest::Streaming(p) => &p.prompt,
        }
    }

    pub fn params(&self) -> GenerationParams {
        match self {
            GenerationRequest::Art(p) => GenerationParams {
                prompt: p.prompt.clone(),
                num_inference_steps: p.num_inference_steps,
                guidance_scale: p.guidance_scale,
                width: p.width,
                height: p.height,
                num_frames: None,
            },
            GenerationRequest::Video(p) => GenerationParams {
                prompt: p.prompt.clone(),
                num_inference_steps: p.num_inference_steps,
                guidance_scale: p.guidance_scale,
                width: p.width,
                height: p.height,
                num_frames: Some(p.num_frames),
            },
            GenerationRequest::Streaming(p) => GenerationParams {
                prompt: p.prompt.clone(),
                num_inference_steps: p.num_inference_steps,
                guidance_scale: p.guidance_scale,
                width: p.width,
                height: p.height,
                num_frames: None,
            },
        }
    }

    /// Check every field against the bounds of its model kind.
    pub fn validate(&self) -> Result<(), GenError> {
        check_prompt(self.prompt())?;
        match self {
            GenerationRequest::Art(p) => {
                check_range("num_inference_steps", p.num_inference_steps, 10, 100)?;
                check_guidance(p.guidance_scale, 1.0, 20.0)?;
                check_dimensions(p.width, p.height)
            }
            GenerationRequest::Video(p) => {
                check_range("num_frames", p.num_frames, 8, 64)?;
                check_guidance(p.guidance_scale, 0.5, 2.0)?;
                check_range("num_inference_steps", p.num_inference_steps, 1, 10)?;
                check_dimensions(p.width, p.height)
            }
            GenerationRequest::Streaming(p) => {
                check_range("num_inference_steps", p.num_inference_steps, 1, 5)?;
                check_guidance(p.guidance_scale, 0.0, 1.0)?;
                check_dimensions(p.width, p.height)
            }
        }
    }
}

fn check_prompt(prompt: &str) -> Result<(), GenError> {
    let chars = prompt.chars().count();
    if prompt.trim().is_empty() {
        return Err(GenError::validation("prompt", "must not be empty"));
    }
    if chars > MAX_PROMPT_CHARS {
        return Err(GenError::validation(
            "prompt",
            format!("must be at most {MAX_PROMPT_CHARS} characters, got {chars}"),
        ));
    }
    Ok(())
}

fn check_range(field: &'static str, value: u32, min: u32, max: u32) -> Result<(), GenError> {
    if value < min || value > max {
        return Err(GenError::validation(
            field,
            format!("must be between {min} and {max}, got {value}"),
        ));
    }
    Ok(())
}

fn check_guidance(value: f32, min: f32, max: f32) -> Result<(), GenError> {
    if !value.is_finite() || value < min || value > max {
        return Err(GenError::validation(
            "guidance_scale",
            format!("must be between {min} and {max}, got {value}"),
        ));
    }
    Ok(())
}

fn check_dimensions(width: u32, height: u32) -> Result<(), GenError> {
    check_range("width", width, MIN_DIMENSION, MAX_DIMENSION)?;
    check_range("height", height, MIN_DIMENSION, MAX_DIMENSION)
}
