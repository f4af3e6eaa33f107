//! Core types for image generation.

use crate::error::{MiniPresError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Supported image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    /// PNG format (lossless).
    #[default]
    Png,
    /// JPEG format (lossy).
    Jpeg,
    /// WebP format (modern, efficient).
    WebP,
}

impl ImageFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// Detects image format from magic bytes.
    pub fn from_magic_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < 12 {
            return None;
        }

        // PNG: 89 50 4E 47 0D 0A 1A 0A
        if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(Self::Png);
        }

        // JPEG: FF D8 FF
        if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(Self::Jpeg);
        }

        // WebP: RIFF....WEBP
        if data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
            return Some(Self::WebP);
        }

        None
    }

    fn to_codec(self) -> ::image::ImageFormat {
        match self {
            Self::Png => ::image::ImageFormat::Png,
            Self::Jpeg => ::image::ImageFormat::Jpeg,
            Self::WebP => ::image::ImageFormat::WebP,
        }
    }
}

/// Image model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageModel {
    /// DALL-E 2, the only OpenAI model offering 256/512 px squares.
    #[default]
    #[serde(rename = "dall-e-2")]
    DallE2,
    /// DALL-E 3.
    #[serde(rename = "dall-e-3")]
    DallE3,
}

impl ImageModel {
    /// Returns the API model identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DallE2 => "dall-e-2",
            Self::DallE3 => "dall-e-3",
        }
    }

    /// Returns true if the model accepts a `size`x`size` request.
    pub fn supports_square(&self, size: u32) -> bool {
        match self {
            Self::DallE2 => matches!(size, 256 | 512 | 1024),
            Self::DallE3 => size == 1024,
        }
    }
}

/// A request to generate one square image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// The text prompt describing the desired image.
    pub prompt: String,
    /// Edge length in pixels.
    pub size: u32,
    /// Model override; the backend default applies when unset.
    pub model: Option<ImageModel>,
}

impl ImageRequest {
    /// Creates a 512x512 request with the given prompt.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            size: 512,
            model: None,
        }
    }

    /// Sets the edge length.
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }

    /// Sets the image model.
    pub fn with_model(mut self, model: ImageModel) -> Self {
        self.model = Some(model);
        self
    }

    /// Returns the size in the `WxH` form the API expects.
    pub fn size_str(&self) -> String {
        format!("{}x{}", self.size, self.size)
    }
}

/// A generated image with its encoded bytes.
#[derive(Debug, Clone)]
#[must_use = "generated image should be decoded or saved"]
pub struct GeneratedImage {
    /// Encoded image bytes as returned by the provider.
    pub data: Vec<u8>,
    /// Detected format.
    pub format: ImageFormat,
    /// Model that produced the image.
    pub model: Option<String>,
    /// Prompt as rewritten by the provider, if it did so.
    pub revised_prompt: Option<String>,
    /// Request duration in milliseconds.
    pub duration_ms: Option<u64>,
}

impl GeneratedImage {
    /// Wraps encoded bytes, detecting the format from magic bytes.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        let format = ImageFormat::from_magic_bytes(&data)
            .ok_or_else(|| MiniPresError::Decode("unknown image format".into()))?;
        Ok(Self {
            data,
            format,
            model: None,
            revised_prompt: None,
            duration_ms: None,
        })
    }

    /// Decodes base64 image data. Accepts data URLs and stray whitespace.
    pub fn from_base64(encoded: &str) -> Result<Self> {
        use base64::Engine;

        let b64 = match encoded.find(";base64,") {
            Some(pos) => &encoded[pos + 8..],
            None => encoded,
        };
        let cleaned: String = b64.chars().filter(|c| !c.is_ascii_whitespace()).collect();
        let data = base64::engine::general_purpose::STANDARD
            .decode(&cleaned)
            .or_else(|_| base64::engine::general_purpose::STANDARD_NO_PAD.decode(&cleaned))
            .map_err(|e| MiniPresError::Decode(e.to_string()))?;
        Self::from_bytes(data)
    }

    /// Returns the size of the encoded data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Decodes the bytes into an RGBA raster.
    pub fn to_raster(&self) -> Result<::image::RgbaImage> {
        let decoded = ::image::load_from_memory_with_format(&self.data, self.format.to_codec())
            .map_err(|e| MiniPresError::Decode(e.to_string()))?;
        Ok(decoded.to_rgba8())
    }
}

/// Writes a raster as PNG, replacing any existing file.
pub fn save_png(raster: &::image::RgbaImage, path: impl AsRef<Path>) -> Result<()> {
    raster
        .save_with_format(path.as_ref(), ::image::ImageFormat::Png)
        .map_err(|e| match e {
            ::image::ImageError::IoError(io) => MiniPresError::Io(io),
            other => MiniPresError::Decode(other.to_string()),
        })
}

#[cfg(test)]
pub(crate) fn sample_png(width: u32, height: u32) -> Vec<u8> {
    let raster = ::image::RgbaImage::from_pixel(width, height, ::image::Rgba([200, 40, 90, 255]));
    let mut out = std::io::Cursor::new(Vec::new());
    raster
        .write_to(&mut out, ::image::ImageFormat::Png)
        .expect("encode sample png");
    out.into_inner()
}
