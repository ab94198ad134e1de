use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};

use crate::config::EngineConfig;
use crate::error::ProviderError;
use crate::references::ImagePart;

pub const SCENE_INSTRUCTION: &str = "Create an image of a webtoon scene described as follows.";
const REFUSAL_EXCERPT_CHARS: usize = 100;

#[derive(Debug, Clone)]
pub struct ProviderRequest {
    pub model: String,
    pub prompt: String,
    pub images: Vec<ImagePart>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    pub media_type: String,
}

/// One external image-generation backend.
///
/// `generate` issues at most one network request and returns either image
/// bytes or the reason there are none.
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &str;
    /// False when no credential is available; callers then skip `generate`.
    fn is_configured(&self) -> bool;
    fn generate(&self, request: &ProviderRequest) -> Result<GeneratedImage, ProviderError>;
    /// The outgoing request as recorded in receipts.
    fn describe_request(&self, request: &ProviderRequest) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("provider".to_string(), Value::String(self.name().to_string()));
        out.insert("model".to_string(), Value::String(request.model.clone()));
        out.insert("prompt".to_string(), Value::String(request.prompt.clone()));
        out.insert("images".to_string(), Value::from(request.images.len()));
        out
    }
}

/// Google Gemini `generateContent` image client.
pub struct GeminiProvider {
    api_base: String,
    api_key: Option<String>,
    request_timeout: Duration,
    http: HttpClient,
}

impl GeminiProvider {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            api_base: config.api_base().to_string(),
            api_key: config.api_key().map(str::to_string),
            request_timeout: config.request_timeout(),
            http: HttpClient::new(),
        }
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    /// Text segment first, then every image part in order.
    pub fn build_payload(request: &ProviderRequest) -> Value {
        let mut parts = vec![json!({
            "text": format!("{SCENE_INSTRUCTION}\n\n{}", request.prompt),
        })];
        for image in &request.images {
            parts.push(json!({
                "inlineData": {
                    "mimeType": image.media_type,
                    "data": BASE64.encode(&image.bytes),
                }
            }));
        }
        json!({
            "contents": [{
                "role": "user",
                "parts": parts,
            }],
            "generationConfig": {
                "responseModalities": ["TEXT", "IMAGE"],
                "imageConfig": {
                    "aspectRatio": "1:1",
                    "imageSize": "2K",
                }
            }
        })
    }

    fn transport_error(&self, err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            return ProviderError::Timeout(self.request_timeout);
        }
        ProviderError::Transport(error_chain_text(&err))
    }

    /// First inline image across all candidates wins. Without one, the first
    /// text part becomes the refusal excerpt.
    pub fn extract_image(response: &Value) -> Result<GeneratedImage, ProviderError> {
        let mut first_text: Option<String> = None;
        let candidates = response
            .get("candidates")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        for candidate in candidates {
            let parts = candidate
                .get("content")
                .and_then(|content| content.get("parts"))
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for part in parts {
                if let Some(inline) = part
                    .get("inlineData")
                    .or_else(|| part.get("inline_data"))
                    .and_then(Value::as_object)
                {
                    let data = inline.get("data").and_then(Value::as_str).unwrap_or("");
                    if data.is_empty() {
                        continue;
                    }
                    let bytes = BASE64.decode(data.as_bytes()).map_err(|err| {
                        ProviderError::InvalidResponse(format!("image base64 decode failed: {err}"))
                    })?;
                    let media_type = inline
                        .get("mimeType")
                        .or_else(|| inline.get("mime_type"))
                        .and_then(Value::as_str)
                        .unwrap_or("image/png")
                        .to_string();
                    return Ok(GeneratedImage { bytes, media_type });
                }
                if first_text.is_none() {
                    first_text = part
                        .get("text")
                        .and_then(Value::as_str)
                        .filter(|text| !text.trim().is_empty())
                        .map(str::to_string);
                }
            }
        }

        let excerpt = first_text
            .map(|text| format!("{}...", truncate_chars(&text, REFUSAL_EXCERPT_CHARS)))
            .unwrap_or_else(|| "Unknown".to_string());
        Err(ProviderError::Refusal { excerpt })
    }
}

impl ImageProvider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn generate(&self, request: &ProviderRequest) -> Result<GeneratedImage, ProviderError> {
        let Some(api_key) = self.api_key.as_deref() else {
            return Err(ProviderError::Unavailable);
        };
        let endpoint = self.endpoint_for_model(&request.model);
        let payload = Self::build_payload(request);

        let response = self
            .http
            .post(&endpoint)
            .header("x-goog-api-key", api_key)
            .timeout(self.request_timeout)
            .json(&payload)
            .send()
            .map_err(|err| self.transport_error(err))?;
        let status = response.status();
        let body = response.text().map_err(|err| self.transport_error(err))?;
        if !status.is_success() {
            return Err(ProviderError::Status {
                code: status.as_u16(),
                reason: status.canonical_reason().unwrap_or("").to_string(),
                body,
            });
        }
        let parsed: Value = serde_json::from_str(&body).map_err(|err| {
            ProviderError::InvalidResponse(format!("response was not JSON: {err}"))
        })?;
        Self::extract_image(&parsed)
    }

    fn describe_request(&self, request: &ProviderRequest) -> Map<String, Value> {
        let mut out = Map::new();
        out.insert("provider".to_string(), Value::String(self.name().to_string()));
        out.insert(
            "endpoint".to_string(),
            Value::String(self.endpoint_for_model(&request.model)),
        );
        out.insert(
            "timeout_s".to_string(),
            Value::from(self.request_timeout.as_secs_f64()),
        );
        out.insert("payload".to_string(), Self::build_payload(request));
        out
    }
}

fn error_chain_text(err: &(dyn std::error::Error + 'static)) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut current = Some(err);
    while let Some(cause) = current {
        let text = cause.to_string();
        let trimmed = text.trim();
        if !trimmed.is_empty() && parts.last().map(String::as_str) != Some(trimmed) {
            parts.push(trimmed.to_string());
        }
        current = cause.source();
    }
    parts.join(" | caused by: ")
}

fn truncate_chars(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
