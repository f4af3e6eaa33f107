//! Core types for speech synthesis.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Speech model variants.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SpeechModel {
    /// TTS-1, optimised for latency.
    #[default]
    #[serde(rename = "tts-1")]
    Tts1,
    /// TTS-1 HD, optimised for quality.
    #[serde(rename = "tts-1-hd")]
    Tts1Hd,
}

impl SpeechModel {
    /// Returns the API model identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tts1 => "tts-1",
            Self::Tts1Hd => "tts-1-hd",
        }
    }
}

/// Built-in narration voices.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    #[default]
    Alloy,
    Echo,
    Fable,
    Onyx,
    Nova,
    Shimmer,
}

impl Voice {
    /// Returns the API voice identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alloy => "alloy",
            Self::Echo => "echo",
            Self::Fable => "fable",
            Self::Onyx => "onyx",
            Self::Nova => "nova",
            Self::Shimmer => "shimmer",
        }
    }
}

impl std::fmt::Display for Voice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request to speak a piece of text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechRequest {
    /// Text to speak.
    pub input: String,
    /// Voice to speak with.
    pub voice: Voice,
    /// Model override; the backend default applies when unset.
    pub model: Option<SpeechModel>,
}

impl SpeechRequest {
    /// Creates a request using the default voice.
    pub fn new(input: impl Into<String>) -> Self {
        Self {
            input: input.into(),
            voice: Voice::default(),
            model: None,
        }
    }

    /// Sets the voice.
    pub fn with_voice(mut self, voice: Voice) -> Self {
        self.voice = voice;
        self
    }

    /// Sets the speech model.
    pub fn with_model(mut self, model: SpeechModel) -> Self {
        self.model = Some(model);
        self
    }
}

/// Synthesized audio, kept as the raw bytes the provider returned.
#[derive(Debug, Clone)]
#[must_use = "generated speech should be saved"]
pub struct GeneratedSpeech {
    /// Encoded audio bytes (MP3).
    pub data: Vec<u8>,
    /// Model that produced the audio.
    pub model: Option<String>,
    /// Request duration in milliseconds.
    pub duration_ms: Option<u64>,
}

impl GeneratedSpeech {
    /// Wraps raw audio bytes.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            data,
            model: None,
            duration_ms: None,
        }
    }

    /// Returns the size of the audio data in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// Writes the audio to `path`, replacing any existing file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, &self.data)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_narration_setup() {
        let req = SpeechRequest::new("A cat is playing the piano.");
        assert_eq!(req.voice, Voice::Alloy);
        assert_eq!(SpeechModel::default().as_str(), "tts-1");
    }

    #[test]
    fn test_voice_serde_names() {
        let json = serde_json::to_string(&Voice::Shimmer).unwrap();
        assert_eq!(json, "\"shimmer\"");
        let voice: Voice = serde_json::from_str("\"onyx\"").unwrap();
        assert_eq!(voice, Voice::Onyx);
    }

    #[test]
    fn test_save_replaces_longer_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speech.mp3");
        std::fs::write(&path, b"an older and much longer recording").unwrap();

        GeneratedSpeech::new(b"ID3new".to_vec()).save(&path).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"ID3new");
    }
}
