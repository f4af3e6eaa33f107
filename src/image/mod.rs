//! Image generation types.

mod types;

#[cfg(test)]
pub(crate) use types::sample_png;
pub use types::{save_png, GeneratedImage, ImageFormat, ImageModel, ImageRequest};
