//! Front-end state derived from workflow events.

use crate::describe::Description;
use crate::workflow::events::{RunState, Stage, WorkflowEvent};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Severity of a message shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeKind {
    /// Informational, e.g. input required.
    Info,
    /// Non-fatal problem; the run continued.
    Warning,
    /// The run stopped.
    Error,
}

/// A dialog-worthy message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    /// Severity.
    pub kind: NoticeKind,
    /// Dialog title.
    pub title: String,
    /// Dialog body.
    pub message: String,
}

impl Notice {
    fn new(kind: NoticeKind, title: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            title: title.to_string(),
            message: message.into(),
        }
    }

    /// Shown when the user submits a blank query.
    pub fn input_required() -> Self {
        Self::new(
            NoticeKind::Info,
            "Input required",
            "Please enter a word or phrase.",
        )
    }

    /// A generic error dialog.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(NoticeKind::Error, "Error", message)
    }

    /// Whether the dialog must be dismissed before the window is usable
    /// again. Warnings leave the window usable.
    pub fn is_blocking(&self) -> bool {
        self.kind != NoticeKind::Warning
    }

    /// Shown when an artifact cannot be handed to the OS.
    pub fn open_failed(what: &str, err: impl std::fmt::Display) -> Self {
        Self::new(NoticeKind::Error, "Error", format!("Cannot {what}: {err}"))
    }
}

fn failure_prefix(stage: Stage) -> &'static str {
    match stage {
        Stage::Describe => "Failed to get description",
        Stage::Image => "Failed to generate image",
        Stage::Speech => "Failed to generate audio",
        Stage::Video => "Video generation failed",
    }
}

/// What a front-end displays: status label, preview, action buttons and
/// pending dialogs.
#[derive(Debug, Default)]
pub struct WorkflowView {
    state: RunState,
    status: String,
    description: Option<Description>,
    preview: Option<Arc<::image::RgbaImage>>,
    preview_version: u64,
    audio: Option<PathBuf>,
    video: Option<PathBuf>,
    notices: VecDeque<Notice>,
}

impl WorkflowView {
    /// Creates an idle view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds one event into the view.
    pub fn apply(&mut self, event: WorkflowEvent) {
        match event {
            WorkflowEvent::Status(state) => {
                if state == RunState::Describing {
                    // Artifacts of the previous run are about to be replaced.
                    self.description = None;
                    self.audio = None;
                    self.video = None;
                }
                self.state = state;
                self.status = state.status_text().to_string();
            }
            WorkflowEvent::Described(description) => self.description = Some(description),
            WorkflowEvent::ImageReady { preview } => {
                self.preview = Some(preview);
                self.preview_version += 1;
            }
            WorkflowEvent::AudioReady(path) => self.audio = Some(path),
            WorkflowEvent::VideoReady(path) => self.video = Some(path),
            WorkflowEvent::VideoFailed(message) => {
                self.status = Stage::Video.failure_text().to_string();
                self.notices.push_back(Notice::new(
                    NoticeKind::Warning,
                    "Warning",
                    format!("{}: {message}", failure_prefix(Stage::Video)),
                ));
            }
            WorkflowEvent::Failed { stage, message } => {
                let kind = if stage.is_fatal() {
                    self.state = RunState::Failed { stage };
                    self.status = stage.failure_text().to_string();
                    NoticeKind::Error
                } else {
                    NoticeKind::Warning
                };
                self.notices.push_back(Notice::new(
                    kind,
                    "Error",
                    format!("{}: {message}", failure_prefix(stage)),
                ));
            }
            WorkflowEvent::Finished(_) => {}
        }
    }

    /// Records a notice raised outside of a run.
    pub fn notify(&mut self, notice: Notice) {
        self.notices.push_back(notice);
    }

    /// Marks a run as failed when its worker ended without a terminal event.
    pub fn worker_lost(&mut self, message: impl Into<String>) {
        let stage = self.state.stage().unwrap_or(Stage::Describe);
        self.state = RunState::Failed { stage };
        self.status = stage.failure_text().to_string();
        self.notices.push_back(Notice::new(
            NoticeKind::Error,
            "Error",
            format!("{}: {}", failure_prefix(stage), message.into()),
        ));
    }

    /// Takes the oldest pending notice.
    pub fn take_notice(&mut self) -> Option<Notice> {
        self.notices.pop_front()
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        self.state
    }

    /// Status label text.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Whether a run is in flight.
    pub fn is_busy(&self) -> bool {
        self.state.is_active()
    }

    /// Description of the current run, once known.
    pub fn description(&self) -> Option<&Description> {
        self.description.as_ref()
    }

    /// Latest preview raster and a counter that changes with it.
    pub fn preview(&self) -> Option<(&Arc<::image::RgbaImage>, u64)> {
        self.preview.as_ref().map(|p| (p, self.preview_version))
    }

    /// Narration file, if the play-audio action is available.
    pub fn audio(&self) -> Option<&Path> {
        self.audio.as_deref()
    }

    /// Clip file, if the open-video action is available.
    pub fn video(&self) -> Option<&Path> {
        self.video.as_deref()
    }
}
