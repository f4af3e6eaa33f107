//! Still-image + audio composition through the `ffmpeg` binary.

use crate::error::{MiniPresError, Result};
use crate::video::compositor::VideoCompositor;
use crate::video::types::{ComposedVideo, CompositionRequest};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Number of trailing stderr lines kept in an error message.
const STDERR_TAIL_LINES: usize = 8;

/// Composes clips by running `ffmpeg`.
///
/// The image is looped for the requested duration and the audio is muxed
/// underneath; audio longer than the clip is cut, shorter audio leaves
/// silence at the end.
#[derive(Debug, Clone)]
pub struct FfmpegCompositor {
    program: PathBuf,
    codec: String,
}

impl Default for FfmpegCompositor {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            codec: "libx264".into(),
        }
    }
}

impl FfmpegCompositor {
    /// Creates a compositor that runs `ffmpeg` from `PATH` with libx264.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the ffmpeg program name or path.
    pub fn program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    /// Sets the video codec.
    pub fn codec(mut self, codec: impl Into<String>) -> Self {
        self.codec = codec.into();
        self
    }

    fn args(&self, request: &CompositionRequest) -> Vec<OsString> {
        let fps = request.fps.to_string();
        let duration = request.duration_secs.to_string();

        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-loop".into(),
            "1".into(),
            "-framerate".into(),
            fps.clone().into(),
            "-i".into(),
            request.image_path.clone().into(),
            "-i".into(),
            request.audio_path.clone().into(),
            "-t".into(),
            duration.into(),
            "-r".into(),
            fps.into(),
            "-c:v".into(),
            self.codec.clone().into(),
        ];
        if self.codec == "libx264" {
            args.push("-tune".into());
            args.push("stillimage".into());
        }
        // yuv420p needs even dimensions
        for arg in [
            "-vf",
            "scale=trunc(iw/2)*2:trunc(ih/2)*2",
            "-pix_fmt",
            "yuv420p",
            "-c:a",
            "aac",
        ] {
            args.push(arg.into());
        }
        args.push(request.output_path.clone().into());
        args
    }
}

fn require_input(path: &Path, what: &str) -> Result<()> {
    if path.is_file() {
        Ok(())
    } else {
        Err(MiniPresError::Composition(format!(
            "{what} not found: {}",
            path.display()
        )))
    }
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

#[async_trait]
impl VideoCompositor for FfmpegCompositor {
    async fn compose(&self, request: &CompositionRequest) -> Result<ComposedVideo> {
        let start = Instant::now();
        if request.duration_secs == 0 || request.fps == 0 {
            return Err(MiniPresError::InvalidRequest(
                "clip duration and frame rate must be positive".into(),
            ));
        }
        require_input(&request.image_path, "image")?;
        require_input(&request.audio_path, "audio")?;

        let args = self.args(request);
        tracing::debug!(
            program = %self.program.display(),
            output = %request.output_path.display(),
            "running ffmpeg"
        );

        let output = match tokio::process::Command::new(&self.program)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .output()
            .await
        {
            Ok(output) => output,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(MiniPresError::Composition(format!(
                    "{} not found; install ffmpeg or set its path",
                    self.program.display()
                )));
            }
            Err(e) => return Err(MiniPresError::Composition(e.to_string())),
        };

        if !output.status.success() {
            remove_if_exists(&request.output_path)?;
            let detail = stderr_tail(&output.stderr);
            return Err(MiniPresError::Composition(if detail.is_empty() {
                format!("ffmpeg exited with {}", output.status)
            } else {
                format!("ffmpeg exited with {}: {detail}", output.status)
            }));
        }

        let size_bytes = std::fs::metadata(&request.output_path)
            .map_err(|e| MiniPresError::Composition(format!("no output written: {e}")))?
            .len();

        Ok(ComposedVideo {
            path: request.output_path.clone(),
            size_bytes,
            duration_secs: request.duration_secs,
            duration_ms: Some(start.elapsed().as_millis() as u64),
        })
    }

    fn name(&self) -> &str {
        "ffmpeg"
    }
}
