//! Model client for AI inference using an OpenAI-compatible API.

use base64::{engine::general_purpose::STANDARD, Engine};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use std::io::Cursor;
use std::time::Duration;
use thiserror::Error;

/// Substituted when the caller leaves the API key empty (local servers
/// accept any bearer token but reject a missing header).
const EMPTY_API_KEY_PLACEHOLDER: &str = "EMPTY";

/// Screenshots larger than this on their longest side are downscaled when
/// image compression is enabled.
const COMPRESS_MAX_DIMENSION: u32 = 1024;

/// Model client errors.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),
    #[error("API error ({status}): {body}")]
    ApiError { status: u16, body: String },
    #[error("Failed to parse response: {0}")]
    ParseError(String),
}

/// Configuration for the AI model endpoint.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub base_url: String,
    pub api_key: String,
    pub model_name: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
    /// Downsize screenshots before embedding them in messages.
    pub compress_image: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/v1".to_string(),
            api_key: EMPTY_API_KEY_PLACEHOLDER.to_string(),
            model_name: "autoglm-phone-9b".to_string(),
            timeout_secs: 30,
            max_tokens: None,
            temperature: None,
            compress_image: false,
        }
    }
}

impl ModelConfig {
    /// Set the base URL, appending the `/v1` suffix when given a bare host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = normalize_base_url(&base_url.into());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_model_name(mut self, model_name: impl Into<String>) -> Self {
        self.model_name = model_name.into();
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: Option<u32>) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_compress_image(mut self, compress: bool) -> Self {
        self.compress_image = compress;
        self
    }
}

/// Append `/v1` when the caller gave a bare host.
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    if trimmed.ends_with("/v1") {
        trimmed.to_string()
    } else {
        format!("{}/v1", trimmed)
    }
}

/// Response from the AI model.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    pub thinking: String,
    pub action: String,
    pub raw_content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Debug, Deserialize)]
struct Message {
    content: String,
}

/// Client for OpenAI-compatible vision-language models.
///
/// Sends a single non-streaming request per call; errors are surfaced as
/// [`ModelError`] and the agent loop decides whether the task continues.
pub struct ModelClient {
    config: ModelConfig,
    client: Client,
}

impl ModelClient {
    pub fn new(config: ModelConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .unwrap_or_default();
        Self { config, client }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Prepare a screenshot for embedding: downsizes it when image
    /// compression is enabled, otherwise passes it through unchanged.
    pub fn prepare_image(&self, base64_png: &str) -> String {
        if !self.config.compress_image {
            return base64_png.to_string();
        }
        match compress_base64_png(base64_png, COMPRESS_MAX_DIMENSION) {
            Some(compressed) => compressed,
            None => {
                tracing::warn!("image compression failed, sending original frame");
                base64_png.to_string()
            }
        }
    }

    /// Send a message thread to the model.
    pub async fn request(&self, messages: &[Value]) -> Result<ModelResponse, ModelError> {
        let url = format!("{}/chat/completions", self.config.base_url);

        let mut body = json!({
            "messages": messages,
            "model": self.config.model_name,
        });
        if let Value::Object(ref mut map) = body {
            if let Some(max_tokens) = self.config.max_tokens {
                map.insert("max_tokens".to_string(), json!(max_tokens));
            }
            if let Some(temperature) = self.config.temperature {
                map.insert("temperature".to_string(), json!(temperature));
            }
        }

        let api_key = if self.config.api_key.is_empty() {
            EMPTY_API_KEY_PLACEHOLDER
        } else {
            &self.config.api_key
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        let raw_content = completion
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .ok_or_else(|| ModelError::ParseError("no choices in response".to_string()))?;

        let (thinking, action) = split_reply(&raw_content);

        Ok(ModelResponse {
            thinking,
            action,
            raw_content,
        })
    }
}

/// Split a reply into its thinking and action parts.
///
/// The tagged shape is `<think>…</think><answer>…</answer>`; the cut is made
/// at the last `</think>` before the first `<answer>`. A reply without those
/// tags has empty thinking and is all action.
fn split_reply(content: &str) -> (String, String) {
    const ANSWER_OPEN: &str = "<answer>";
    const ANSWER_CLOSE: &str = "</answer>";
    const THINK_OPEN: &str = "<think>";
    const THINK_CLOSE: &str = "</think>";

    let answer_at = match content.find(ANSWER_OPEN) {
        Some(idx) => idx,
        None => return (String::new(), content.trim().to_string()),
    };

    let head = &content[..answer_at];
    let thinking = match head.rfind(THINK_CLOSE) {
        Some(close_at) => head[..close_at].trim_start().trim_start_matches(THINK_OPEN),
        None => head,
    };

    let mut action = &content[answer_at + ANSWER_OPEN.len()..];
    if let Some(close_at) = action.rfind(ANSWER_CLOSE) {
        action = &action[..close_at];
    }

    (thinking.trim().to_string(), action.trim().to_string())
}

/// Downscale a base64 PNG so its longest side is at most `max_dim`.
/// Returns None when the payload is not a decodable image.
fn compress_base64_png(base64_png: &str, max_dim: u32) -> Option<String> {
    let bytes = STANDARD.decode(base64_png).ok()?;
    let img = image::load_from_memory(&bytes).ok()?;

    if img.width().max(img.height()) <= max_dim {
        return Some(base64_png.to_string());
    }

    let resized = img.thumbnail(max_dim, max_dim);
    let mut buffer = Cursor::new(Vec::new());
    resized
        .write_to(&mut buffer, image::ImageFormat::Png)
        .ok()?;
    Some(STANDARD.encode(buffer.into_inner()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_config_default() {
        let config = ModelConfig::default();
        assert_eq!(config.base_url, "http://localhost:8000/v1");
        assert_eq!(config.model_name, "autoglm-phone-9b");
        assert_eq!(config.timeout_secs, 30);
        assert!(!config.compress_image);
    }

    #[test]
    fn test_base_url_v1_suffix() {
        let config = ModelConfig::default().with_base_url("https://api.example.com");
        assert_eq!(config.base_url, "https://api.example.com/v1");

        let config = ModelConfig::default().with_base_url("https://api.example.com/v1");
        assert_eq!(config.base_url, "https://api.example.com/v1");

        let config = ModelConfig::default().with_base_url("https://api.example.com/v1/");
        assert_eq!(config.base_url, "https://api.example.com/v1");
    }

    #[test]
    fn test_split_reply_tagged() {
        let reply = "<think>home</think><answer>do(action=\"Launch\", app=\"微信\")</answer>";
        let (thinking, action) = split_reply(reply);
        assert_eq!(thinking, "home");
        assert_eq!(action, "do(action=\"Launch\", app=\"微信\")");
    }

    #[test]
    fn test_split_reply_without_tags_is_all_action() {
        let (thinking, action) = split_reply("do(action=\"Home\")");
        assert_eq!(thinking, "");
        assert_eq!(action, "do(action=\"Home\")");
    }

    #[test]
    fn test_split_reply_missing_close_tags() {
        // Truncated replies still yield the action text.
        let (thinking, action) =
            split_reply("<think>页面加载中</think><answer>do(action=\"Wait\", duration=\"2 seconds\")");
        assert_eq!(thinking, "页面加载中");
        assert_eq!(action, "do(action=\"Wait\", duration=\"2 seconds\")");
    }

    #[test]
    fn test_split_reply_cuts_at_last_think_close() {
        let reply = "<think>first</think> chatter </think><answer>finish(message=\"done\")</answer>";
        let (thinking, action) = split_reply(reply);
        assert_eq!(thinking, "first</think> chatter");
        assert_eq!(action, "finish(message=\"done\")");
    }

    #[test]
    fn test_split_reply_untagged_thinking_before_answer() {
        let (thinking, action) = split_reply("press back now <answer>do(action=\"Back\")</answer>");
        assert_eq!(thinking, "press back now");
        assert_eq!(action, "do(action=\"Back\")");
    }

    #[test]
    fn test_prepare_image_passthrough_when_disabled() {
        let client = ModelClient::new(ModelConfig::default());
        assert_eq!(client.prepare_image("abc"), "abc");
    }

    #[test]
    fn test_compress_small_image_is_unchanged() {
        // 4x4 image is already under the limit.
        let img = image::DynamicImage::new_rgb8(4, 4);
        let mut buffer = Cursor::new(Vec::new());
        img.write_to(&mut buffer, image::ImageFormat::Png).unwrap();
        let b64 = STANDARD.encode(buffer.into_inner());

        assert_eq!(compress_base64_png(&b64, 1024), Some(b64));
    }

    #[test]
    fn test_compress_invalid_payload() {
        assert_eq!(compress_base64_png("not-base64!!!", 1024), None);
    }
}
