//! Error types for the presentation workflow.

use crate::workflow::Stage;
use std::time::Duration;

/// Maximum length of an upstream error body kept in a message.
const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Errors that can occur while building a presentation.
#[derive(Debug, thiserror::Error)]
pub enum MiniPresError {
    /// API key missing or rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Account has no remaining quota or credit.
    #[error("billing error: {0}")]
    Billing(String),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Rate limit exceeded. Not retried; the hint is only reported.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    /// Content was blocked by safety filters.
    #[error("content blocked: {0}")]
    ContentBlocked(String),

    /// Invalid request parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Network or HTTP error.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Failed to decode base64 or image data.
    #[error("failed to decode: {0}")]
    Decode(String),

    /// I/O error (e.g., writing an artifact).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Response had an unexpected shape.
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// The describer reply was not a usable description object.
    #[error("invalid description: {0}")]
    InvalidDescription(String),

    /// The query was empty or whitespace only.
    #[error("query is empty")]
    EmptyQuery,

    /// Local video composition failed.
    #[error("video composition failed: {0}")]
    Composition(String),

    /// The worker thread could not be started or panicked.
    #[error("worker thread failed: {0}")]
    Worker(String),

    /// A workflow stage failed.
    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<MiniPresError>,
    },
}

impl MiniPresError {
    /// Wraps this error with the stage it occurred in.
    pub fn in_stage(self, stage: Stage) -> Self {
        match self {
            already @ Self::Stage { .. } => already,
            other => Self::Stage {
                stage,
                source: Box::new(other),
            },
        }
    }

    /// Returns the stage this error is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Self::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

/// Result type alias for workflow operations.
pub type Result<T> = std::result::Result<T, MiniPresError>;

/// Masks anything that looks like a secret key and caps the length of an
/// upstream error body.
pub(crate) fn sanitize_error_message(text: &str) -> String {
    let masked: Vec<String> = text
        .split(' ')
        .map(|word| {
            let bare = word.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '-');
            if bare.starts_with("sk-") && bare.len() > 8 {
                word.replace(bare, "sk-***")
            } else {
                word.to_string()
            }
        })
        .collect();
    let joined = masked.join(" ");
    let trimmed = joined.trim();

    if trimmed.chars().count() > MAX_ERROR_MESSAGE_LEN {
        let cut: String = trimmed.chars().take(MAX_ERROR_MESSAGE_LEN).collect();
        format!("{cut}...")
    } else {
        trimmed.to_string()
    }
}

/// Reads a `Retry-After` header expressed in whole seconds.
pub(crate) fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
