//! Core types for the describer stage.

use crate::error::{MiniPresError, Result};
use serde::{Deserialize, Serialize};

/// Instruction sent ahead of every query.
pub const SYSTEM_INSTRUCTION: &str = "You are an assistant that returns JSON for image, audio and video. \
Given a user query, respond ONLY with a JSON like:\n\
{\"image_prompt\": \"text for image\", \"audio_text\": \"text to speak\", \"video_prompt\": \"text for video\"}";

/// Chat model variants used to describe a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatModel {
    /// GPT-3.5 Turbo.
    #[default]
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
    /// GPT-4o mini.
    #[serde(rename = "gpt-4o-mini")]
    Gpt4oMini,
    /// GPT-4o.
    #[serde(rename = "gpt-4o")]
    Gpt4o,
}

impl ChatModel {
    /// Returns the API model identifier string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gpt35Turbo => "gpt-3.5-turbo",
            Self::Gpt4oMini => "gpt-4o-mini",
            Self::Gpt4o => "gpt-4o",
        }
    }
}

/// A request to describe a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescribeRequest {
    /// The user's query, already trimmed.
    pub query: String,
    /// Model override; the backend default applies when unset.
    pub model: Option<ChatModel>,
}

impl DescribeRequest {
    /// Creates a new request for the given query.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            model: None,
        }
    }

    /// Sets the chat model.
    pub fn with_model(mut self, model: ChatModel) -> Self {
        self.model = Some(model);
        self
    }
}

/// Per-medium prompts derived from one query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    /// Prompt for the image generator.
    pub image_prompt: String,
    /// Text to be spoken.
    pub audio_text: String,
    /// Prompt describing the video. Informational only.
    pub video_prompt: String,
}

impl Description {
    /// Parses the describer's reply.
    ///
    /// The reply must be a JSON object, optionally wrapped in a Markdown
    /// code fence, carrying all three fields as strings. The image prompt
    /// and the spoken text must not be blank. Extra fields are ignored.
    pub fn parse(content: &str) -> Result<Self> {
        let body = strip_code_fence(content);
        let value: serde_json::Value = serde_json::from_str(body)
            .map_err(|e| MiniPresError::InvalidDescription(format!("reply is not JSON: {e}")))?;

        let object = value.as_object().ok_or_else(|| {
            MiniPresError::InvalidDescription("reply is not a JSON object".into())
        })?;

        let image_prompt = string_field(object, "image_prompt")?;
        let audio_text = string_field(object, "audio_text")?;
        let video_prompt = string_field(object, "video_prompt")?;

        if image_prompt.is_empty() {
            return Err(MiniPresError::InvalidDescription(
                "field `image_prompt` is empty".into(),
            ));
        }
        if audio_text.is_empty() {
            return Err(MiniPresError::InvalidDescription(
                "field `audio_text` is empty".into(),
            ));
        }

        Ok(Self {
            image_prompt,
            audio_text,
            video_prompt,
        })
    }
}

fn string_field(object: &serde_json::Map<String, serde_json::Value>, name: &str) -> Result<String> {
    match object.get(name) {
        Some(serde_json::Value::String(s)) => Ok(s.trim().to_string()),
        Some(_) => Err(MiniPresError::InvalidDescription(format!(
            "field `{name}` is not a string"
        ))),
        None => Err(MiniPresError::InvalidDescription(format!(
            "missing field `{name}`"
        ))),
    }
}

/// Removes a surrounding ```` ``` ```` / ```` ```json ```` fence, if any.
fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(inner) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`), which may share a line with the body.
    let (first, body) = inner.split_once('\n').unwrap_or((inner, ""));
    if first.trim().chars().all(|c| c.is_ascii_alphanumeric()) {
        body.trim()
    } else {
        inner
            .trim_start()
            .trim_start_matches(|c: char| c.is_ascii_alphanumeric())
            .trim()
    }
}
