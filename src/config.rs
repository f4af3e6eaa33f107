//! API key storage and run settings.

use crate::error::{MiniPresError, Result};
use crate::image::ImageModel;
use crate::speech::{SpeechModel, Voice};
use crate::describe::ChatModel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Default key file, relative to the working directory.
pub const DEFAULT_KEY_FILE: &str = "openai_key.txt";

/// Environment variable consulted before the key file.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// An OpenAI API key. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wraps a key, rejecting blank input.
    pub fn new(key: impl Into<String>) -> Result<Self> {
        let key = key.into().trim().to_string();
        if key.is_empty() {
            return Err(MiniPresError::Auth("API key is empty".into()));
        }
        Ok(Self(key))
    }

    /// Returns the raw key for request headers.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Returns a display-safe form such as `sk-a…9xyz`.
    pub fn masked(&self) -> String {
        let chars: Vec<char> = self.0.chars().collect();
        if chars.len() <= 8 {
            return "*".repeat(chars.len());
        }
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}…{tail}")
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ApiKey").field(&self.masked()).finish()
    }
}

/// Plain-text key file holding a single API key.
#[derive(Debug, Clone)]
pub struct ApiKeyStore {
    path: PathBuf,
}

impl Default for ApiKeyStore {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_FILE)
    }
}

impl ApiKeyStore {
    /// Creates a store backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the key. A missing or blank file yields `Ok(None)`.
    pub fn load(&self) -> Result<Option<ApiKey>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => Ok(ApiKey::new(contents).ok()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Writes the key, replacing any previous contents.
    pub fn save(&self, key: &ApiKey) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, key.expose())?;
        tracing::debug!(path = %self.path.display(), "saved API key");
        Ok(())
    }

    /// Deletes the key file. Missing files are not an error.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Resolves a key from an explicit value, then `OPENAI_API_KEY`, then
    /// the key file. Blank values at any step are skipped.
    pub fn resolve(&self, explicit: Option<&str>) -> Result<Option<ApiKey>> {
        self.resolve_with(explicit, std::env::var(API_KEY_ENV).ok().as_deref())
    }

    fn resolve_with(&self, explicit: Option<&str>, env: Option<&str>) -> Result<Option<ApiKey>> {
        if let Some(key) = explicit.and_then(|k| ApiKey::new(k).ok()) {
            return Ok(Some(key));
        }
        if let Some(key) = env.and_then(|k| ApiKey::new(k).ok()) {
            return Ok(Some(key));
        }
        self.load()
    }

    /// Handles a key typed in by the user. A blank entry means the user
    /// declined and yields `Ok(None)`; anything else is saved and returned.
    pub fn accept_entry(&self, input: &str) -> Result<Option<ApiKey>> {
        let Ok(key) = ApiKey::new(input) else {
            return Ok(None);
        };
        self.save(&key)?;
        Ok(Some(key))
    }
}

/// Where a run writes its artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputLayout {
    /// `frame.png`, `speech.mp3`, `video.mp4` directly in the output
    /// directory, overwritten on every run.
    #[default]
    Fixed,
    /// A fresh `runs/<uuid>/` subdirectory per run.
    PerRun,
}

/// Knobs for one workflow run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Chat model used by the describer.
    pub chat_model: ChatModel,
    /// Image model.
    pub image_model: ImageModel,
    /// Square image edge in pixels.
    pub image_size: u32,
    /// Speech synthesis model.
    pub speech_model: SpeechModel,
    /// Narration voice.
    pub voice: Voice,
    /// Length of the composed clip in seconds.
    pub video_duration_secs: u32,
    /// Frame rate of the composed clip.
    pub video_fps: u32,
    /// Video codec passed to ffmpeg.
    pub video_codec: String,
    /// ffmpeg program name or path.
    pub ffmpeg: PathBuf,
    /// Directory artifacts are written under.
    pub output_dir: PathBuf,
    /// Fixed or per-run artifact paths.
    pub layout: OutputLayout,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            chat_model: ChatModel::default(),
            image_model: ImageModel::default(),
            image_size: 512,
            speech_model: SpeechModel::default(),
            voice: Voice::default(),
            video_duration_secs: 5,
            video_fps: 24,
            video_codec: "libx264".into(),
            ffmpeg: PathBuf::from("ffmpeg"),
            output_dir: PathBuf::from("."),
            layout: OutputLayout::Fixed,
        }
    }
}

impl Settings {
    /// Checks value ranges before a run starts.
    pub fn validate(&self) -> Result<()> {
        if self.image_size == 0 {
            return Err(MiniPresError::InvalidRequest("image size must be positive".into()));
        }
        if self.video_duration_secs == 0 {
            return Err(MiniPresError::InvalidRequest(
                "video duration must be at least one second".into(),
            ));
        }
        if self.video_fps == 0 {
            return Err(MiniPresError::InvalidRequest("frame rate must be positive".into()));
        }
        Ok(())
    }
}
