//! Model Backends
//!
//! Defines the backend trait and the Gemini implementation used for receipt
//! extraction.

use async_trait::async_trait;
use serde_json::Value;

use super::types::{BackendError, EncodedImage};

/// Generative model backend
#[async_trait]
pub trait ModelBackend: Send + Sync {
    /// Model identifier, used for logging
    fn model(&self) -> &str;

    /// Send the image and instruction, return the raw text answer
    async fn generate(&self, image: &EncodedImage, prompt: &str) -> Result<String, BackendError>;
}

/// Gemini `generateContent` backend
pub struct GeminiBackend {
    client: reqwest::Client,
    /// API base URL (e.g. https://generativelanguage.googleapis.com/v1beta)
    base_url: String,
    api_key: String,
    /// Model name (e.g. "gemini-1.5-pro")
    model: String,
}

impl GeminiBackend {
    pub fn new(client: reqwest::Client, base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl ModelBackend for GeminiBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, image: &EncodedImage, prompt: &str) -> Result<String, BackendError> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);

        let request = serde_json::json!({
            "contents": [{
                "parts": [
                    {
                        "inline_data": {
                            "mime_type": image.media_type,
                            "data": image.data,
                        }
                    },
                    { "text": prompt }
                ]
            }]
        });

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| BackendError::Transport(format!("Failed to call Gemini: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                return Err(BackendError::QuotaExceeded(body));
            }
            return Err(BackendError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let result: Value = response
            .json()
            .await
            .map_err(|e| BackendError::Transport(format!("Failed to parse response: {}", e)))?;

        let text = candidate_text(&result);
        if text.trim().is_empty() {
            return Err(BackendError::EmptyResponse);
        }

        Ok(text)
    }
}

/// Concatenate the text parts of the first candidate
fn candidate_text(response: &Value) -> String {
    response["candidates"][0]["content"]["parts"]
        .as_array()
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect::<String>()
        })
        .unwrap_or_default()
}

/// Scripted backend for tests
#[cfg(test)]
pub struct MockBackend {
    pub model: String,
    pub response: Result<String, String>,
    pub delay: Option<std::time::Duration>,
    pub calls: std::sync::Arc<std::sync::atomic::AtomicUsize>,
}

#[cfg(test)]
impl MockBackend {
    pub fn ok(model: &str, text: &str) -> Self {
        Self {
            model: model.to_string(),
            response: Ok(text.to_string()),
            delay: None,
            calls: Default::default(),
        }
    }

    pub fn failing(model: &str) -> Self {
        Self {
            model: model.to_string(),
            response: Err("503 model overloaded".to_string()),
            delay: None,
            calls: Default::default(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl ModelBackend for MockBackend {
    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, _image: &EncodedImage, _prompt: &str) -> Result<String, BackendError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone().map_err(|body| BackendError::Api { status: 503, body })
    }
}
