//! Stages, run states and the events a run reports.

use crate::describe::Description;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

/// One sequential unit of the workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Query to description.
    Describe,
    /// Description to image.
    Image,
    /// Description to narration audio.
    Speech,
    /// Image and audio to clip.
    Video,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 4] = [Stage::Describe, Stage::Image, Stage::Speech, Stage::Video];

    /// Status line shown while the stage runs.
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::Describe => "Generating description...",
            Self::Image => "Generating image...",
            Self::Speech => "Generating audio...",
            Self::Video => "Generating video...",
        }
    }

    /// Status line shown when the stage fails.
    pub fn failure_text(&self) -> &'static str {
        match self {
            Self::Describe => "Error getting description",
            Self::Image => "Error generating image",
            Self::Speech => "Error generating audio",
            Self::Video => "Video generation failed",
        }
    }

    /// Whether a failure of this stage ends the run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Video)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Describe => write!(f, "describe"),
            Self::Image => write!(f, "image"),
            Self::Speech => write!(f, "speech"),
            Self::Video => write!(f, "video"),
        }
    }
}

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    /// Nothing has started.
    #[default]
    Idle,
    /// Waiting on the describer.
    Describing,
    /// Waiting on the image generator.
    Imaging,
    /// Waiting on speech synthesis.
    Speaking,
    /// Composing the clip.
    Composing,
    /// The run reached the end; `video` tells whether a clip exists.
    Done {
        /// Whether composition succeeded.
        video: bool,
    },
    /// A fatal stage failed.
    Failed {
        /// The failing stage.
        stage: Stage,
    },
}

impl RunState {
    /// State while `stage` is running.
    pub fn running(stage: Stage) -> Self {
        match stage {
            Stage::Describe => Self::Describing,
            Stage::Image => Self::Imaging,
            Stage::Speech => Self::Speaking,
            Stage::Video => Self::Composing,
        }
    }

    /// The stage being worked on, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Describing => Some(Stage::Describe),
            Self::Imaging => Some(Stage::Image),
            Self::Speaking => Some(Stage::Speech),
            Self::Composing => Some(Stage::Video),
            Self::Idle | Self::Done { .. } | Self::Failed { .. } => None,
        }
    }

    /// Whether a run is in flight.
    pub fn is_active(&self) -> bool {
        self.stage().is_some()
    }

    /// Returns the state after `stage` starts, or `None` if that is not a
    /// legal step from here.
    pub fn start(self, stage: Stage) -> Option<Self> {
        let legal = match (self, stage) {
            (Self::Idle | Self::Done { .. } | Self::Failed { .. }, Stage::Describe) => true,
            (Self::Describing, Stage::Image) => true,
            (Self::Imaging, Stage::Speech) => true,
            (Self::Speaking, Stage::Video) => true,
            _ => false,
        };
        legal.then(|| Self::running(stage))
    }

    /// Returns the state after the current stage fails.
    pub fn fail(self) -> Option<Self> {
        match self.stage()? {
            Stage::Video => Some(Self::Done { video: false }),
            stage => Some(Self::Failed { stage }),
        }
    }

    /// Returns the state after the last stage completes.
    pub fn finish(self) -> Option<Self> {
        match self {
            Self::Composing => Some(Self::Done { video: true }),
            _ => None,
        }
    }

    /// User-visible status line.
    pub fn status_text(&self) -> &'static str {
        match self {
            Self::Idle => "",
            Self::Done { .. } => "Done!",
            Self::Failed { stage } => stage.failure_text(),
            active => active
                .stage()
                .map(|stage| stage.status_text())
                .unwrap_or_default(),
        }
    }
}

/// Summary of a run that reached `Done!`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// The query as submitted (trimmed).
    pub query: String,
    /// Description produced by the first stage.
    pub description: Description,
    /// Still frame written for the clip.
    pub frame_path: PathBuf,
    /// Narration audio.
    pub audio_path: PathBuf,
    /// Composed clip, absent when composition failed.
    pub video_path: Option<PathBuf>,
    /// Composition failure message, if it failed.
    pub video_error: Option<String>,
    /// Wall time of the run in milliseconds.
    pub duration_ms: u64,
}

/// Progress reported from the worker thread.
#[derive(Debug, Clone)]
pub enum WorkflowEvent {
    /// A stage began; carries the new state.
    Status(RunState),
    /// The describer produced prompts.
    Described(Description),
    /// The image is decoded and ready to preview.
    ImageReady {
        /// Decoded RGBA raster.
        preview: Arc<::image::RgbaImage>,
    },
    /// The narration file exists.
    AudioReady(PathBuf),
    /// The clip file exists.
    VideoReady(PathBuf),
    /// Composition failed; the run continues to `Done!`.
    VideoFailed(String),
    /// A fatal stage failed; nothing follows.
    Failed {
        /// The failing stage.
        stage: Stage,
        /// Human-readable cause.
        message: String,
    },
    /// The run reached `Done!`.
    Finished(RunSummary),
}
