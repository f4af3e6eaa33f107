//! Core types for video composition.

use std::path::PathBuf;

/// A request to turn a still image and a narration track into a clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionRequest {
    /// Still image shown for the whole clip.
    pub image_path: PathBuf,
    /// Audio track laid under the image.
    pub audio_path: PathBuf,
    /// Where the encoded clip is written. Replaced if it exists.
    pub output_path: PathBuf,
    /// Clip length in seconds.
    pub duration_secs: u32,
    /// Output frame rate.
    pub fps: u32,
}

impl CompositionRequest {
    /// Creates a 5 second, 24 fps request.
    pub fn new(
        image_path: impl Into<PathBuf>,
        audio_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            image_path: image_path.into(),
            audio_path: audio_path.into(),
            output_path: output_path.into(),
            duration_secs: 5,
            fps: 24,
        }
    }

    /// Sets the clip length.
    pub fn with_duration(mut self, secs: u32) -> Self {
        self.duration_secs = secs;
        self
    }

    /// Sets the frame rate.
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.fps = fps;
        self
    }
}

/// Metadata about a composed clip on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComposedVideo {
    /// Location of the encoded clip.
    pub path: PathBuf,
    /// Size of the file in bytes.
    pub size_bytes: u64,
    /// Clip length in seconds.
    pub duration_secs: u32,
    /// Composition time in milliseconds.
    pub duration_ms: Option<u64>,
}
