//! Boundary to the hosted image model.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde_json::Value;

use crate::error::AppError;
use crate::payload::ImagePayload;
use crate::style::StyleOption;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Single async stylization call. No progress callback, no cancellation.
pub trait GenerationClient: Send + Sync + 'static {
    fn generate(
        &self,
        source: &ImagePayload,
        style: StyleOption,
    ) -> impl Future<Output = Result<ImagePayload, AppError>> + Send;
}

impl<T: GenerationClient> GenerationClient for Arc<T> {
    fn generate(
        &self,
        source: &ImagePayload,
        style: StyleOption,
    ) -> impl Future<Output = Result<ImagePayload, AppError>> + Send {
        (**self).generate(source, style)
    }
}

#[derive(Clone)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

impl fmt::Debug for GeminiSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeminiSettings")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Calls Gemini's `generateContent` with the photo and the style prompt.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    settings: GeminiSettings,
}

impl GeminiClient {
    pub fn new(settings: GeminiSettings) -> Self {
        Self {
            http: reqwest::Client::new(),
            settings,
        }
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn api_key(&self) -> Result<&str, AppError> {
        self.settings
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or(AppError::MissingCredential)
    }

    /// The key travels in `x-goog-api-key`, never in the URL.
    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta/models/{}:generateContent",
            self.settings.base_url.trim_end_matches('/'),
            self.settings.model,
        )
    }
}

impl GenerationClient for GeminiClient {
    async fn generate(
        &self,
        source: &ImagePayload,
        style: StyleOption,
    ) -> Result<ImagePayload, AppError> {
        let api_key = self.api_key()?;
        let payload = build_request(source, style);

        tracing::info!(model = %self.settings.model, ?style, "sending stylization request");

        let response = self
            .http
            .post(self.endpoint())
            .header("Content-Type", "application/json")
            .header(API_KEY_HEADER, api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                AppError::generation(format!("Could not reach the image model: {}", e.without_url()))
            })?;

        let status = response.status();
        let response_text = response
            .text()
            .await
            .map_err(|e| {
                AppError::generation(format!("Could not read model response: {}", e.without_url()))
            })?;

        tracing::debug!(%status, body_len = response_text.len(), "model responded");

        if !status.is_success() {
            return Err(AppError::generation(format!(
                "API Error {}: {}",
                status,
                excerpt(&response_text, 300)
            )));
        }

        let result: Value = serde_json::from_str(&response_text)
            .map_err(|e| AppError::generation(format!("Malformed model response: {e}")))?;
        parse_response(&result)
    }
}

pub fn build_request(source: &ImagePayload, style: StyleOption) -> Value {
    serde_json::json!({
        "contents": [{
            "parts": [
                { "text": style.prompt() },
                {
                    "inline_data": {
                        "mime_type": source.mime_type(),
                        "data": source.base64()
                    }
                }
            ]
        }],
        "generationConfig": {
            "responseModalities": ["TEXT", "IMAGE"]
        }
    })
}

/// Pull the first inline image out of a `generateContent` response.
pub fn parse_response(result: &Value) -> Result<ImagePayload, AppError> {
    if let Some(reason) = result["promptFeedback"]["blockReason"].as_str() {
        return Err(AppError::generation(format!(
            "The request was blocked by the model ({reason})."
        )));
    }

    let parts = result["candidates"]
        .as_array()
        .into_iter()
        .flatten()
        .filter_map(|candidate| candidate["content"]["parts"].as_array())
        .flatten();

    let mut text_reply = None;
    for part in parts {
        let inline = part.get("inlineData").or_else(|| part.get("inline_data"));
        if let Some(inline) = inline {
            let data = inline["data"].as_str().unwrap_or_default();
            if data.is_empty() {
                continue;
            }
            let mime_type = inline
                .get("mimeType")
                .or_else(|| inline.get("mime_type"))
                .and_then(Value::as_str)
                .unwrap_or("image/png");
            return Ok(ImagePayload::new(mime_type, data));
        }
        if text_reply.is_none() {
            text_reply = part["text"].as_str().map(str::to_owned);
        }
    }

    let message = match text_reply {
        Some(text) => format!("The model did not return an image: {}", excerpt(&text, 200)),
        None => "The model did not return an image".to_owned(),
    };
    Err(AppError::generation(message))
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_owned(),
    }
}
