//! Scan Service
//!
//! Runs the ordered model fallback for a single receipt image and turns the
//! outcome into either a normalized result or a classified error.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};

use super::{
    normalize::{fallback_record, normalize, strip_code_fences},
    provider::{GeminiBackend, ModelBackend},
    types::{BackendError, EncodedImage, ExtractionRequest, ExtractionResult},
};
use crate::config::ScanConfig;
use crate::error::{truncate, ScanError};

/// Instruction sent alongside every image
pub const RECEIPT_PROMPT: &str = r#"
Analyze this receipt image and extract the following information in JSON format:
- Total amount (just the number, e.g., 12.99)
- Date (in ISO format YYYY-MM-DD, or today if not readable)
- Description or items purchased (brief summary, max 50 chars)
- Merchant/store name
- Suggested category (one of: housing,transportation,groceries,utilities,entertainment,food,shopping,healthcare,education,personal,travel,insurance,gifts,bills,other-expense)

Only respond with valid JSON in this exact format:
{
  "amount": number,
  "date": "ISO date string",
  "description": "string",
  "merchantName": "string",
  "category": "string"
}

If it is not a receipt, return: {"amount": 0, "date": "", "description": "Not a receipt", "merchantName": "", "category": ""}
"#;

/// Receipt extraction service
pub struct ScanService {
    config: ScanConfig,
    /// Backends in priority order
    backends: Vec<Arc<dyn ModelBackend>>,
}

impl ScanService {
    /// Create a service with one Gemini backend per configured model
    pub fn new(config: ScanConfig) -> Self {
        let backends: Vec<Arc<dyn ModelBackend>> = match &config.api_key {
            Some(api_key) => {
                let client = reqwest::Client::new();
                config
                    .models
                    .iter()
                    .map(|model| {
                        Arc::new(GeminiBackend::new(
                            client.clone(),
                            &config.base_url,
                            api_key,
                            model,
                        )) as Arc<dyn ModelBackend>
                    })
                    .collect()
            }
            None => Vec::new(),
        };

        Self::with_backends(config, backends)
    }

    /// Create a service with explicit backends
    pub fn with_backends(config: ScanConfig, backends: Vec<Arc<dyn ModelBackend>>) -> Self {
        Self { config, backends }
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Model identifiers in the order they are attempted
    pub fn models(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.model()).collect()
    }

    /// Extract structured data from a receipt image
    pub async fn scan(&self, request: &ExtractionRequest) -> Result<ExtractionResult, ScanError> {
        self.scan_on(request, Utc::now().date_naive()).await
    }

    async fn scan_on(
        &self,
        request: &ExtractionRequest,
        today: NaiveDate,
    ) -> Result<ExtractionResult, ScanError> {
        if request.data.is_empty() {
            return Err(ScanError::BadRequest("No file provided".to_string()));
        }

        if self.config.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(ScanError::Misconfigured("GEMINI_API_KEY is not set".to_string()));
        }

        let image = request.encode();

        let Some(text) = self.generate(&image).await else {
            if !self.config.fallback_enabled {
                tracing::error!("All models failed and fallback extraction is disabled");
                return Err(ScanError::BackendUnavailable);
            }
            tracing::warn!("All models failed. Using fallback extraction.");
            return Ok(fallback_record(today));
        };

        let cleaned = strip_code_fences(&text);
        let value: serde_json::Value = serde_json::from_str(&cleaned).map_err(|e| {
            tracing::error!(
                error = %e,
                "Error parsing JSON response. Raw text: {}",
                truncate(&cleaned, 200)
            );
            ScanError::UnparseableResponse
        })?;

        Ok(normalize(&value, today))
    }

    /// Try each backend once, in order, until one answers
    async fn generate(&self, image: &EncodedImage) -> Option<String> {
        for backend in &self.backends {
            let model = backend.model();
            tracing::info!("Attempting model: {}", model);

            let attempt = tokio::time::timeout(
                self.config.backend_timeout,
                backend.generate(image, RECEIPT_PROMPT),
            )
            .await
            .unwrap_or_else(|_| Err(BackendError::Timeout(self.config.backend_timeout.as_secs())));

            match attempt {
                Ok(text) => {
                    tracing::info!("Model {} succeeded", model);
                    return Some(text);
                }
                Err(e) => {
                    let message = e.to_string();
                    tracing::warn!("Model {} failed: {}", model, truncate(&message, 100));
                }
            }
        }

        None
    }
}
