#![warn(missing_docs)]
//! MiniPres - one query in, a tiny presentation out.
//!
//! A query is sent to a chat model which answers with three prompts. The
//! image prompt becomes a picture, the audio text becomes narration, and
//! the two are composed into a short clip. The stages run strictly in
//! order on a worker thread and report progress as events.
//!
//! # Quick Start
//!
//! ```no_run
//! use minipres::{
//!     ApiKeyStore, FfmpegCompositor, OpenAiBackend, Settings, WorkflowEvent, WorkflowRunner,
//! };
//! use std::sync::Arc;
//!
//! fn main() -> minipres::Result<()> {
//!     let key = ApiKeyStore::default()
//!         .resolve(None)?
//!         .expect("no API key configured");
//!     let backend = OpenAiBackend::builder().api_key(key).build()?;
//!     let runner = WorkflowRunner::new(
//!         Arc::new(backend),
//!         Arc::new(FfmpegCompositor::new()),
//!         Settings::default(),
//!     );
//!
//!     let handle = runner.submit("a cat playing piano")?;
//!     for event in handle.events().iter() {
//!         if let WorkflowEvent::Status(state) = event {
//!             println!("{}", state.status_text());
//!         }
//!     }
//!     let summary = handle.join()?;
//!     println!("audio at {}", summary.audio_path.display());
//!     Ok(())
//! }
//! ```
//!
//! # Features
//!
//! - `cli` (default): the `minipres` command-line binary
//! - `gui`: the desktop window (`minipres gui`)

mod error;

pub mod backend;
pub mod config;
pub mod describe;
pub mod image;
pub mod launch;
pub mod providers;
pub mod speech;
pub mod video;
pub mod workflow;

#[cfg(feature = "gui")]
pub mod gui;

// Re-export error types at crate root
pub use error::{MiniPresError, Result};

pub use backend::MediaBackend;
pub use config::{ApiKey, ApiKeyStore, OutputLayout, Settings};
pub use describe::{ChatModel, DescribeRequest, Description};
pub use image::{GeneratedImage, ImageFormat, ImageModel, ImageRequest};
pub use providers::{OpenAiBackend, OpenAiBackendBuilder};
pub use speech::{GeneratedSpeech, SpeechModel, SpeechRequest, Voice};
pub use video::{ComposedVideo, CompositionRequest, FfmpegCompositor, VideoCompositor};
pub use workflow::{
    Notice, NoticeKind, OutputPaths, RunHandle, RunState, RunSummary, Stage, WorkflowEvent,
    WorkflowRunner, WorkflowView,
};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::backend::MediaBackend;
    pub use crate::config::{ApiKey, ApiKeyStore, Settings};
    pub use crate::error::{MiniPresError, Result};
    pub use crate::providers::OpenAiBackend;
    pub use crate::video::{FfmpegCompositor, VideoCompositor};
    pub use crate::workflow::{WorkflowEvent, WorkflowRunner, WorkflowView};
}
