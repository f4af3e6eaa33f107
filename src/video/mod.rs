//! Local video composition.

mod compositor;
mod ffmpeg;
mod types;

pub use compositor::VideoCompositor;
pub use ffmpeg::FfmpegCompositor;
pub use types::{ComposedVideo, CompositionRequest};
