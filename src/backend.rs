//! The capability interface the workflow generates media through.

use crate::describe::{DescribeRequest, Description};
use crate::error::Result;
use crate::image::{GeneratedImage, ImageRequest};
use crate::speech::{GeneratedSpeech, SpeechRequest};
use async_trait::async_trait;

/// A provider of the three remote generation capabilities.
///
/// The workflow only talks to this trait, so it can run against fakes in
/// tests or against any OpenAI-compatible service.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    /// Turns a query into per-medium prompts.
    async fn describe(&self, request: &DescribeRequest) -> Result<Description>;

    /// Generates a single image.
    async fn generate_image(&self, request: &ImageRequest) -> Result<GeneratedImage>;

    /// Synthesizes speech audio.
    async fn synthesize_speech(&self, request: &SpeechRequest) -> Result<GeneratedSpeech>;

    /// Returns the name of this backend for display.
    fn name(&self) -> &str;

    /// Checks that the backend is configured well enough to be called.
    async fn health_check(&self) -> Result<()>;
}
