//! Server configuration.
//!
//! Values come from three layers, later layers winning: built-in defaults,
//! an optional JSON file, then environment variables. The resulting
//! [`ServerConfig`] is built once at startup and passed down explicitly.

use std::path::{Path, PathBuf};

use gen_studio_types::{ModelKind, VideoFormat};
use log::info;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid value for {var}: '{value}' ({reason})")]
    InvalidEnv {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Simulated cost profile for one model kind of the synthetic backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelProfile {
    pub memory_mb: u64,
    pub load_delay_ms: u64,
    pub step_delay_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub art: ModelProfile,
    pub video: ModelProfile,
    pub streaming: ModelProfile,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            art: ModelProfile {
                memory_mb: 2600,
                load_delay_ms: 1500,
                step_delay_ms: 20,
            },
            video: ModelProfile {
                memory_mb: 4200,
                load_delay_ms: 2500,
                step_delay_ms: 150,
            },
            streaming: ModelProfile {
                memory_mb: 6900,
                load_delay_ms: 2000,
                step_delay_ms: 40,
            },
        }
    }
}

impl BackendConfig {
    pub fn profile(&self, kind: ModelKind) -> &ModelProfile {
        match kind {
            ModelKind::Art => &self.art,
            ModelKind::Video => &self.video,
            ModelKind::Streaming => &self.streaming,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub debug: bool,
    pub max_requests_per_minute: u32,
    pub rate_limit_window_secs: u64,
    pub rate_limit_sweep_secs: u64,
    pub allowed_origins: Vec<String>,
    /// Accepted `Host` header names; `*` accepts any.
    pub allowed_hosts: Vec<String>,
    pub video_dir: PathBuf,
    pub video_fps: u32,
    pub video_format: VideoFormat,
    pub ffmpeg_path: String,
    pub log_dir: PathBuf,
    pub backend: BackendConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            debug: true,
            max_requests_per_minute: 30,
            rate_limit_window_secs: 60,
            rate_limit_sweep_secs: 300,
            allowed_origins: vec![
                "http://localhost:3000".to_string(),
                "http://localhost:5173".to_string(),
                "http://127.0.0.1:5173".to_string(),
            ],
            allowed_hosts: vec![
                "localhost".to_string(),
                "127.0.0.1".to_string(),
                "0.0.0.0".to_string(),
            ],
            video_dir: PathBuf::from("videos"),
            video_fps: 5,
            video_format: VideoFormat::Mp4,
            ffmpeg_path: "ffmpeg".to_string(),
            log_dir: PathBuf::from("logs"),
            backend: BackendConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Defaults, then the JSON file (if any), then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|var| std::env::var(var).ok())?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(target: "config", "Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Apply overrides from a variable lookup (the process environment in production).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("HOST") {
            self.host = host;
        }
        if let Some(port) = lookup("PORT") {
            self.port = parse_env("PORT", &port)?;
        }
        if let Some(debug) = lookup("DEBUG") {
            self.debug = debug.trim().eq_ignore_ascii_case("true");
        }
        if let Some(max) = lookup("MAX_REQUESTS_PER_MINUTE") {
            self.max_requests_per_minute = parse_env("MAX_REQUESTS_PER_MINUTE", &max)?;
        }
        if let Some(origins) = lookup("ALLOWED_ORIGINS") {
            self.allowed_origins = split_list(&origins);
        }
        if let Some(hosts) = lookup("ALLOWED_HOSTS") {
            self.allowed_hosts = split_list(&hosts);
        }
        if let Some(dir) = lookup("VIDEO_DIR") {
            self.video_dir = PathBuf::from(dir);
        }
        if let Some(fps) = lookup("VIDEO_FPS") {
            let fps: u32 = parse_env("VIDEO_FPS", &fps)?;
            if fps == 0 {
                return Err(ConfigError::InvalidEnv {
                    var: "VIDEO_FPS",
                    value: fps.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
            self.video_fps = fps;
        }
        if let Some(format) = lookup("VIDEO_FORMAT") {
            self.video_format = format.parse().map_err(|reason| ConfigError::InvalidEnv {
                var: "VIDEO_FORMAT",
                value: format.clone(),
                reason,
            })?;
        }
        if let Some(ffmpeg) = lookup("FFMPEG_PATH") {
            self.ffmpeg_path = ffmpeg;
        }
        if let Some(dir) = lookup("LOG_DIR") {
            self.log_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env<T>(var: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        var,
        value: value.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_default_values() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8000);
        assert_eq!(config.max_requests_per_minute, 30);
        assert_eq!(config.video_fps, 5);
        assert_eq!(config.video_format, VideoFormat::Mp4);
        assert_eq!(config.allowed_origins.len(), 3);
        assert_eq!(config.allowed_hosts, vec!["localhost", "127.0.0.1", "0.0.0.0"]);
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServerConfig::default();
        config
            .apply_env(env(&[
                ("PORT", "9100"),
                ("DEBUG", "False"),
                ("ALLOWED_ORIGINS", "http://a.test, http://b.test,"),
                ("VIDEO_FORMAT", "gif"),
                ("VIDEO_DIR", "/tmp/videos"),
                ("ALLOWED_HOSTS", "api.internal, localhost"),
            ]))
            .unwrap();
        assert_eq!(config.port, 9100);
        assert!(!config.debug);
        assert_eq!(config.allowed_origins, vec!["http://a.test", "http://b.test"]);
        assert_eq!(config.video_format, VideoFormat::Gif);
        assert_eq!(config.video_dir, PathBuf::from("/tmp/videos"));
        assert_eq!(config.allowed_hosts, vec!["api.internal", "localhost"]);
    }

    #[test]
    fn test_invalid_port_names_variable() {
        let mut config = ServerConfig::default();
        let err = config.apply_env(env(&[("PORT", "eighty")])).unwrap_err();
        match err {
            ConfigError::InvalidEnv { var, value, .. } => {
                assert_eq!(var, "PORT");
                assert_eq!(value, "eighty");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_fps_rejected() {
        let mut config = ServerConfig::default();
        assert!(config.apply_env(env(&[("VIDEO_FPS", "0")])).is_err());
    }

    #[test]
    fn test_partial_json_file_keeps_defaults() {
        let path = std::env::temp_dir().join(format!("gen_studio_{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&path, r#"{"port": 8123, "backend": {"art": {"memory_mb": 10, "load_delay_ms": 0, "step_delay_ms": 0}}}"#).unwrap();

        let config = ServerConfig::from_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.port, 8123);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.backend.profile(ModelKind::Art).memory_mb, 10);
        assert_eq!(config.backend.profile(ModelKind::Video).memory_mb, 4200);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = ServerConfig::from_file(Path::new("/definitely/not/here.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
