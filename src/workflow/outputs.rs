//! Artifact locations for a run.

use crate::config::OutputLayout;
use crate::error::Result;
use std::path::{Path, PathBuf};

/// Still frame file name.
pub const FRAME_FILE: &str = "frame.png";
/// Narration file name.
pub const AUDIO_FILE: &str = "speech.mp3";
/// Clip file name.
pub const VIDEO_FILE: &str = "video.mp4";

/// The three files one run writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    dir: PathBuf,
    /// Still frame used for the clip.
    pub frame: PathBuf,
    /// Narration audio.
    pub audio: PathBuf,
    /// Composed clip.
    pub video: PathBuf,
}

impl OutputPaths {
    /// Paths directly inside `dir`.
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            frame: dir.join(FRAME_FILE),
            audio: dir.join(AUDIO_FILE),
            video: dir.join(VIDEO_FILE),
            dir,
        }
    }

    /// Resolves paths for a new run under `root`.
    pub fn for_run(root: &Path, layout: OutputLayout) -> Self {
        match layout {
            OutputLayout::Fixed => Self::in_dir(root),
            OutputLayout::PerRun => {
                Self::in_dir(root.join("runs").join(uuid::Uuid::new_v4().to_string()))
            }
        }
    }

    /// Directory holding the files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the directory if needed.
    pub fn prepare(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        Ok(())
    }
}
