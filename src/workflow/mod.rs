//! The describe → image → speech → video workflow.

mod events;
mod outputs;
mod runner;
mod view;

pub use events::{RunState, RunSummary, Stage, WorkflowEvent};
pub use outputs::{OutputPaths, AUDIO_FILE, FRAME_FILE, VIDEO_FILE};
pub use runner::{RunHandle, WorkflowRunner};
pub use view::{Notice, NoticeKind, WorkflowView};
