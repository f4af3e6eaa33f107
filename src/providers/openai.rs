//! OpenAI backend: chat completions, image generation and speech.

use crate::backend::MediaBackend;
use crate::config::{ApiKey, API_KEY_ENV};
use crate::describe::{ChatModel, DescribeRequest, Description, SYSTEM_INSTRUCTION};
use crate::error::{parse_retry_after, sanitize_error_message, MiniPresError, Result};
use crate::image::{GeneratedImage, ImageModel, ImageRequest};
use crate::speech::{GeneratedSpeech, SpeechModel, SpeechRequest};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const CHAT_PATH: &str = "/chat/completions";
const IMAGES_PATH: &str = "/images/generations";
const SPEECH_PATH: &str = "/audio/speech";

/// Builder for OpenAiBackend.
#[derive(Debug, Clone)]
pub struct OpenAiBackendBuilder {
    api_key: Option<ApiKey>,
    chat_model: ChatModel,
    image_model: ImageModel,
    speech_model: SpeechModel,
    base_url: String,
    json_mode: bool,
    timeout: Option<Duration>,
}

impl Default for OpenAiBackendBuilder {
    fn default() -> Self {
        Self {
            api_key: None,
            chat_model: ChatModel::default(),
            image_model: ImageModel::default(),
            speech_model: SpeechModel::default(),
            base_url: DEFAULT_BASE_URL.to_string(),
            json_mode: false,
            timeout: None,
        }
    }
}

impl OpenAiBackendBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the API key. Falls back to `OPENAI_API_KEY` env var.
    pub fn api_key(mut self, key: ApiKey) -> Self {
        self.api_key = Some(key);
        self
    }

    /// Sets the default chat model for the describer.
    pub fn chat_model(mut self, model: ChatModel) -> Self {
        self.chat_model = model;
        self
    }

    /// Sets the default image model.
    pub fn image_model(mut self, model: ImageModel) -> Self {
        self.image_model = model;
        self
    }

    /// Sets the default speech model.
    pub fn speech_model(mut self, model: SpeechModel) -> Self {
        self.speech_model = model;
        self
    }

    /// Points the backend at an OpenAI-compatible server.
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Asks the chat endpoint for a JSON object response
    /// (`response_format: json_object`).
    pub fn json_mode(mut self, enabled: bool) -> Self {
        self.json_mode = enabled;
        self
    }

    /// Sets a per-request timeout. Requests are unbounded by default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Builds the backend, resolving the API key.
    pub fn build(self) -> Result<OpenAiBackend> {
        let api_key = match self.api_key {
            Some(key) => key,
            None => std::env::var(API_KEY_ENV)
                .ok()
                .and_then(|k| ApiKey::new(k).ok())
                .ok_or_else(|| {
                    MiniPresError::Auth("OPENAI_API_KEY not set and no API key provided".into())
                })?,
        };

        let mut client = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            client = client.timeout(timeout);
        }

        Ok(OpenAiBackend {
            client: client.build()?,
            api_key,
            chat_model: self.chat_model,
            image_model: self.image_model,
            speech_model: self.speech_model,
            base_url: self.base_url,
            json_mode: self.json_mode,
        })
    }
}

/// OpenAI implementation of [`MediaBackend`].
pub struct OpenAiBackend {
    client: reqwest::Client,
    api_key: ApiKey,
    chat_model: ChatModel,
    image_model: ImageModel,
    speech_model: SpeechModel,
    base_url: String,
    json_mode: bool,
}

impl OpenAiBackend {
    /// Creates a new `OpenAiBackendBuilder`.
    pub fn builder() -> OpenAiBackendBuilder {
        OpenAiBackendBuilder::new()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POSTs a JSON body and turns non-2xx replies into errors.
    async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint(path))
            .header("Authorization", format!("Bearer {}", self.api_key.expose()))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let headers = response.headers().clone();
            let text = response.text().await.unwrap_or_default();
            return Err(parse_error(status.as_u16(), &text, &headers));
        }
        Ok(response)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(MiniPresError::Api {
                status: response.status().as_u16(),
                message: "Failed to download image from URL".into(),
            });
        }
        Ok(response.bytes().await?.to_vec())
    }
}

fn parse_error(status: u16, text: &str, headers: &reqwest::header::HeaderMap) -> MiniPresError {
    let text = sanitize_error_message(text);
    if status == 402 {
        return MiniPresError::Billing(text);
    }
    if status == 429 {
        // insufficient_quota is a billing problem, not a transient limit
        if text.contains("insufficient_quota") || text.contains("exceeded your current quota") {
            return MiniPresError::Billing(text);
        }
        let retry_after = parse_retry_after(headers).map(Duration::from_secs);
        return MiniPresError::RateLimited { retry_after };
    }
    if status == 401 || status == 403 {
        return MiniPresError::Auth(text);
    }
    let lower = text.to_lowercase();
    if lower.contains("safety") || lower.contains("content_policy") {
        return MiniPresError::ContentBlocked(text);
    }
    MiniPresError::Api {
        status,
        message: text,
    }
}

#[async_trait]
impl MediaBackend for OpenAiBackend {
    async fn describe(&self, request: &DescribeRequest) -> Result<Description> {
        let start = Instant::now();
        let model = request.model.unwrap_or(self.chat_model);
        let body = ChatRequest::describe(&request.query, model, self.json_mode);

        tracing::debug!(model = model.as_str(), "requesting description");
        let response: ChatResponse = self.post_json(CHAT_PATH, &body).await?.json().await?;
        let content = response.into_content()?;

        let description = Description::parse(&content)?;
        tracing::debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            image_prompt = %description.image_prompt,
            "description complete"
        );
        Ok(description)
    }

    async fn generate_image(&self, request: &ImageRequest) -> Result<GeneratedImage> {
        let start = Instant::now();
        let model = request.model.unwrap_or(self.image_model);
        if !model.supports_square(request.size) {
            return Err(MiniPresError::InvalidRequest(format!(
                "{} does not support {} images",
                model.as_str(),
                request.size_str()
            )));
        }
        let body = ImagesRequest::from_request(request, model);

        tracing::debug!(model = model.as_str(), size = %body.size, "requesting image");
        let response: ImagesResponse = self.post_json(IMAGES_PATH, &body).await?.json().await?;

        let image_data = response.data.into_iter().next().ok_or_else(|| {
            MiniPresError::UnexpectedResponse("No images in OpenAI response".into())
        })?;

        let mut image = if let Some(b64) = image_data.b64_json {
            GeneratedImage::from_base64(&b64)?
        } else if let Some(url) = image_data.url {
            GeneratedImage::from_bytes(self.download(&url).await?)?
        } else {
            return Err(MiniPresError::UnexpectedResponse(
                "OpenAI response contained no image data".into(),
            ));
        };

        image.model = Some(model.as_str().to_string());
        image.revised_prompt = image_data.revised_prompt;
        image.duration_ms = Some(start.elapsed().as_millis() as u64);
        tracing::debug!(
            bytes = image.size(),
            format = image.format.extension(),
            "image generation complete"
        );
        Ok(image)
    }

    async fn synthesize_speech(&self, request: &SpeechRequest) -> Result<GeneratedSpeech> {
        let start = Instant::now();
        let model = request.model.unwrap_or(self.speech_model);
        let body = SpeechBody::from_request(request, model);

        tracing::debug!(model = model.as_str(), voice = %request.voice, "requesting speech");
        let data = self.post_json(SPEECH_PATH, &body).await?.bytes().await?.to_vec();
        if data.is_empty() {
            return Err(MiniPresError::UnexpectedResponse(
                "OpenAI speech response was empty".into(),
            ));
        }

        let mut speech = GeneratedSpeech::new(data);
        speech.model = Some(model.as_str().to_string());
        speech.duration_ms = Some(start.elapsed().as_millis() as u64);
        tracing::debug!(bytes = speech.size(), "speech synthesis complete");
        Ok(speech)
    }

    fn name(&self) -> &str {
        "OpenAI"
    }

    /// Checks the base URL is usable. The key is only judged by the server.
    async fn health_check(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.base_url).map_err(|e| {
            MiniPresError::InvalidRequest(format!("invalid base URL {}: {e}", self.base_url))
        })?;
        match url.scheme() {
            "http" | "https" => Ok(()),
            other => Err(MiniPresError::InvalidRequest(format!(
                "unsupported base URL scheme `{other}`"
            ))),
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

impl ChatRequest {
    fn describe(query: &str, model: ChatModel, json_mode: bool) -> Self {
        Self {
            model: model.as_str().to_string(),
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: SYSTEM_INSTRUCTION.to_string(),
                },
                ChatMessage {
                    role: "user",
                    content: query.to_string(),
                },
            ],
            response_format: json_mode.then_some(ResponseFormat {
                kind: "json_object",
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

impl ChatResponse {
    fn into_content(self) -> Result<String> {
        let reply = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| MiniPresError::UnexpectedResponse("No choices in chat response".into()))?
            .message;

        if let Some(refusal) = reply.refusal {
            return Err(MiniPresError::ContentBlocked(refusal));
        }
        reply
            .content
            .ok_or_else(|| MiniPresError::UnexpectedResponse("Chat reply had no content".into()))
    }
}

#[derive(Debug, Serialize)]
struct ImagesRequest {
    model: String,
    prompt: String,
    n: u32,
    size: String,
    response_format: &'static str,
}

impl ImagesRequest {
    fn from_request(req: &ImageRequest, model: ImageModel) -> Self {
        Self {
            model: model.as_str().to_string(),
            prompt: req.prompt.clone(),
            n: 1,
            size: req.size_str(),
            response_format: "b64_json",
        }
    }
}

#[derive(Debug, Deserialize)]
struct ImagesResponse {
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    revised_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
struct SpeechBody {
    model: String,
    voice: &'static str,
    input: String,
    response_format: &'static str,
}

impl SpeechBody {
    fn from_request(req: &SpeechRequest, model: SpeechModel) -> Self {
        Self {
            model: model.as_str().to_string(),
            voice: req.voice.as_str(),
            input: req.input.clone(),
            response_format: "mp3",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::Voice;

    fn key() -> ApiKey {
        ApiKey::new("sk-test").unwrap()
    }

    #[test]
    fn test_builder_with_explicit_key() {
        let backend = OpenAiBackendBuilder::new().api_key(key()).build();
        assert!(backend.is_ok());
    }

    #[test]
    fn test_builder_models_and_base_url() {
        let backend = OpenAiBackend::builder()
            .api_key(key())
            .chat_model(ChatModel::Gpt4oMini)
            .image_model(ImageModel::DallE3)
            .speech_model(SpeechModel::Tts1Hd)
            .base_url("http://localhost:8080/v1/")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap();
        assert_eq!(backend.chat_model, ChatModel::Gpt4oMini);
        assert_eq!(backend.image_model, ImageModel::DallE3);
        assert_eq!(backend.speech_model, SpeechModel::Tts1Hd);
        assert_eq!(
            backend.endpoint(CHAT_PATH),
            "http://localhost:8080/v1/chat/completions"
        );
    }

    #[test]
    fn test_chat_request_carries_system_instruction() {
        let req = ChatRequest::describe("a cat playing piano", ChatModel::Gpt35Turbo, false);
        let json = serde_json::to_value(&req).unwrap();

        assert_eq!(json["model"], "gpt-3.5-turbo");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], SYSTEM_INSTRUCTION);
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["messages"][1]["content"], "a cat playing piano");
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn test_chat_request_json_mode() {
        let req = ChatRequest::describe("q", ChatModel::Gpt4oMini, true);
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["response_format"]["type"], "json_object");
    }

    #[test]
    fn test_chat_response_content() {
        let json = r#"{"choices":[{"index":0,"message":{"role":"assistant","content":"{\"image_prompt\":\"x\",\"audio_text\":\"y\",\"video_prompt\":\"z\"}"},"finish_reason":"stop"}]}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        let content = resp.into_content().unwrap();
        assert_eq!(Description::parse(&content).unwrap().audio_text, "y");
    }

    #[test]
    fn test_chat_response_without_choices() {
        let resp: ChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(
            resp.into_content(),
            Err(MiniPresError::UnexpectedResponse(_))
        ));
    }

    #[test]
    fn test_chat_response_refusal() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":null,"refusal":"I can't help with that."}}]}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(matches!(
            resp.into_content(),
            Err(MiniPresError::ContentBlocked(_))
        ));
    }

    #[test]
    fn test_images_request_construction() {
        let req = ImageRequest::new("A sunset");
        let body = ImagesRequest::from_request(&req, ImageModel::DallE2);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "dall-e-2");
        assert_eq!(json["prompt"], "A sunset");
        assert_eq!(json["n"], 1);
        assert_eq!(json["size"], "512x512");
        assert_eq!(json["response_format"], "b64_json");
    }

    #[test]
    fn test_images_response_deserialization() {
        let json = r#"{"created": 1, "data": [{"b64_json": "AQID", "revised_prompt": "A red sunset"}]}"#;
        let resp: ImagesResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.data[0].b64_json.as_deref(), Some("AQID"));
        assert!(resp.data[0].url.is_none());
        assert_eq!(resp.data[0].revised_prompt.as_deref(), Some("A red sunset"));
    }

    #[test]
    fn test_speech_body_construction() {
        let req = SpeechRequest::new("Hello there").with_voice(Voice::Nova);
        let body = SpeechBody::from_request(&req, SpeechModel::Tts1);
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["model"], "tts-1");
        assert_eq!(json["voice"], "nova");
        assert_eq!(json["input"], "Hello there");
        assert_eq!(json["response_format"], "mp3");
    }

    #[test]
    fn test_parse_error_mapping() {
        let headers = reqwest::header::HeaderMap::new();
        assert!(matches!(
            parse_error(401, "Incorrect API key provided", &headers),
            MiniPresError::Auth(_)
        ));
        assert!(matches!(
            parse_error(429, r#"{"error":{"code":"insufficient_quota"}}"#, &headers),
            MiniPresError::Billing(_)
        ));
        assert!(matches!(
            parse_error(429, "slow down", &headers),
            MiniPresError::RateLimited { retry_after: None }
        ));
        assert!(matches!(
            parse_error(400, "rejected by our safety system", &headers),
            MiniPresError::ContentBlocked(_)
        ));
        assert!(matches!(
            parse_error(500, "boom", &headers),
            MiniPresError::Api { status: 500, .. }
        ));
    }

    #[test]
    fn test_parse_error_reads_retry_after() {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::RETRY_AFTER, "7".parse().unwrap());
        match parse_error(429, "slow down", &headers) {
            MiniPresError::RateLimited { retry_after } => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unsupported_size_fails_before_request() {
        let backend = OpenAiBackend::builder()
            .api_key(key())
            .base_url("http://127.0.0.1:9")
            .build()
            .unwrap();
        let req = ImageRequest::new("x").with_model(ImageModel::DallE3);
        let err = backend.generate_image(&req).await.unwrap_err();
        assert!(matches!(err, MiniPresError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_health_check_base_url() {
        let backend = OpenAiBackend::builder().api_key(key()).build().unwrap();
        assert!(backend.health_check().await.is_ok());

        let backend = OpenAiBackend::builder()
            .api_key(ApiKey::new("proxy-token").unwrap())
            .base_url("http://localhost:8080/v1")
            .build()
            .unwrap();
        assert!(backend.health_check().await.is_ok());

        let backend = OpenAiBackend::builder()
            .api_key(key())
            .base_url("ftp://example.com")
            .build()
            .unwrap();
        assert!(matches!(
            backend.health_check().await,
            Err(MiniPresError::InvalidRequest(_))
        ));

        let backend = OpenAiBackend::builder()
            .api_key(key())
            .base_url("not a url")
            .build()
            .unwrap();
        assert!(backend.health_check().await.is_err());
    }
}
