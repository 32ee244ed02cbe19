//! Turning raw pipeline output into transport-ready artifacts.

use std::fs::{self, File};
use std::io::{BufWriter, Cursor, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;

use base64::{engine::general_purpose, Engine as _};
use gen_studio_config::ServerConfig;
use gen_studio_types::{Artifact, GenError, ModelKind, OutputKind, VideoFormat};
use image::codecs::gif::{GifEncoder, Repeat};
use image::{Delay, DynamicImage, Frame, ImageFormat, RgbImage};
use lazy_static::lazy_static;
use log::{debug, info, warn};
use regex::Regex;
use uuid::Uuid;

use crate::pipeline::RawArtifact;

lazy_static! {
    // Single path component, no dot other than the extension separator.
    static ref VIDEO_FILENAME: Regex =
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*\.(mp4|gif)$").expect("valid video filename regex");
}

/// True if `name` can be served from the video directory without escaping it.
pub fn is_safe_video_filename(name: &str) -> bool {
    VIDEO_FILENAME.is_match(name)
}

pub fn unique_video_filename(format: VideoFormat) -> String {
    format!("video_{}.{}", Uuid::new_v4().simple(), format.extension())
}

pub fn encode_png_base64(image: &RgbImage) -> Result<String, GenError> {
    let mut buffer = Cursor::new(Vec::new());
    image
        .write_to(&mut buffer, ImageFormat::Png)
        .map_err(|e| GenError::Encoding(format!("PNG encoding failed: {e}")))?;
    Ok(general_purpose::STANDARD.encode(buffer.into_inner()))
}

/// Writes an ordered frame sequence to a video file.
pub trait VideoWriter: Send + Sync {
    fn format(&self) -> VideoFormat;

    fn write(&self, frames: &[RgbImage], fps: u32, path: &Path) -> Result<(), GenError>;
}

/// Animated GIF via the `image` crate; needs no external tools.
pub struct GifWriter;

impl VideoWriter for GifWriter {
    fn format(&self) -> VideoFormat {
        VideoFormat::Gif
    }

    fn write(&self, frames: &[RgbImage], fps: u32, path: &Path) -> Result<(), GenError> {
        let file = File::create(path)
            .map_err(|e| GenError::Encoding(format!("cannot create {}: {e}", path.display())))?;
        let mut encoder = GifEncoder::new(BufWriter::new(file));
        encoder
            .set_repeat(Repeat::Infinite)
            .map_err(|e| GenError::Encoding(e.to_string()))?;

        let delay = Delay::from_numer_denom_ms(1000, fps.max(1));
        for frame in frames {
            let rgba = DynamicImage::ImageRgb8(frame.clone()).into_rgba8();
            encoder
                .encode_frame(Frame::from_parts(rgba, 0, 0, delay))
                .map_err(|e| GenError::Encoding(format!("GIF frame encoding failed: {e}")))?;
        }
        Ok(())
    }
}

/// H.264 MP4 by piping raw RGB frames into an `ffmpeg` child process.
pub struct Mp4Writer {
    ffmpeg_path: String,
}

impl Mp4Writer {
    pub fn new(ffmpeg_path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
        }
    }
}

impl VideoWriter for Mp4Writer {
    fn format(&self) -> VideoFormat {
        VideoFormat::Mp4
    }

    fn write(&self, frames: &[RgbImage], fps: u32, path: &Path) -> Result<(), GenError> {
        let (width, height) = frames
            .first()
            .map(|f| f.dimensions())
            .ok_or_else(|| GenError::Encoding("no frames to encode".to_string()))?;

        let mut child = Command::new(&self.ffmpeg_path)
            .args(["-y", "-loglevel", "error", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{width}x{height}"), "-r", &fps.to_string()])
            .args(["-i", "-", "-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| GenError::Encoding(format!("failed to start {}: {e}", self.ffmpeg_path)))?;

        // Drained concurrently so a chatty ffmpeg cannot stall on a full pipe.
        let stderr_reader = child.stderr.take().map(|mut stderr| {
            thread::spawn(move || {
                let mut captured = String::new();
                stderr.read_to_string(&mut captured).ok();
                captured
            })
        });

        {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| GenError::Encoding("ffmpeg stdin unavailable".to_string()))?;
            for frame in frames {
                if let Err(e) = stdin.write_all(frame.as_raw()) {
                    warn!(target: "dispatch", "ffmpeg closed its input early: {e}");
                    break;
                }
            }
        }

        let status = child
            .wait()
            .map_err(|e| GenError::Encoding(format!("ffmpeg did not finish: {e}")))?;
        let stderr = stderr_reader
            .and_then(|reader| reader.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(GenError::Encoding(format!(
                "ffmpeg exited with {status}: {}",
                stderr.trim()
            )));
        }
        if !stderr.trim().is_empty() {
            debug!(target: "dispatch", "ffmpeg: {}", stderr.trim());
        }
        Ok(())
    }
}

/// Encodes images inline and writes videos under `video_dir`.
pub struct ArtifactEncoder {
    video_dir: PathBuf,
    fps: u32,
    writer: Box<dyn VideoWriter>,
}

impl ArtifactEncoder {
    pub fn new(video_dir: impl Into<PathBuf>, fps: u32, writer: Box<dyn VideoWriter>) -> Self {
        Self {
            video_dir: video_dir.into(),
            fps: fps.max(1),
            writer,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        let writer: Box<dyn VideoWriter> = match config.video_format {
            VideoFormat::Mp4 => Box::new(Mp4Writer::new(config.ffmpeg_path.clone())),
            VideoFormat::Gif => Box::new(GifWriter),
        };
        Self::new(config.video_dir.clone(), config.video_fps, writer)
    }

    pub fn video_dir(&self) -> &Path {
        &self.video_dir
    }

    pub fn video_format(&self) -> VideoFormat {
        self.writer.format()
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Path of a previously written video, or `None` if the name is unsafe.
    pub fn video_path(&self, filename: &str) -> Option<PathBuf> {
        is_safe_video_filename(filename).then(|| self.video_dir.join(filename))
    }

    pub fn encode(&self, kind: ModelKind, raw: RawArtifact) -> Result<Artifact, GenError> {
        match (kind.output(), raw) {
            (OutputKind::Image, RawArtifact::Image(image)) => Ok(Artifact::Image {
                image_base64: encode_png_base64(&image)?,
            }),
            (OutputKind::Video, RawArtifact::Frames(frames)) => self.write_video(&frames),
            (expected, raw) => Err(GenError::Encoding(format!(
                "{kind} produced {} frame(s) but {:?} output was expected",
                raw.frame_count(),
                expected
            ))),
        }
    }

    fn write_video(&self, frames: &[RgbImage]) -> Result<Artifact, GenError> {
        let first = frames
            .first()
            .ok_or_else(|| GenError::Encoding("pipeline returned no frames".to_string()))?;
        if frames.iter().any(|f| f.dimensions() != first.dimensions()) {
            return Err(GenError::Encoding("frames differ in size".to_string()));
        }

        fs::create_dir_all(&self.video_dir).map_err(|e| {
            GenError::Encoding(format!("cannot create {}: {e}", self.video_dir.display()))
        })?;
        let filename = unique_video_filename(self.writer.format());
        let path = self.video_dir.join(&filename);

        debug!(target: "dispatch", "Writing {} frames to {}", frames.len(), path.display());
        if let Err(e) = self.writer.write(frames, self.fps, &path) {
            fs::remove_file(&path).ok();
            return Err(e);
        }
        info!(target: "dispatch", "Video saved: {}", path.display());

        Ok(Artifact::Video {
            video_filename: filename,
            num_frames: frames.len() as u32,
            fps: self.fps,
        })
    }
}
