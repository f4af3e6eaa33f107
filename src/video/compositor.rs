//! Video compositor trait.

use crate::error::Result;
use crate::video::types::{ComposedVideo, CompositionRequest};
use async_trait::async_trait;

/// Produces a video file from a still image and an audio file.
#[async_trait]
pub trait VideoCompositor: Send + Sync {
    /// Composes the clip described by `request`.
    async fn compose(&self, request: &CompositionRequest) -> Result<ComposedVideo>;

    /// Returns the name of this compositor for display.
    fn name(&self) -> &str;
}
