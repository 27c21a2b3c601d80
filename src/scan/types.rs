//! Scan Types
//!
//! Request, result and error types shared by the extraction service and the
//! upload client.

use base64::Engine;
use serde::{Deserialize, Serialize};

/// Upload ceiling enforced by the upload client: 5 MiB
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

/// Longest description kept after normalization
pub const MAX_DESCRIPTION_CHARS: usize = 50;

/// Image submitted for extraction
#[derive(Debug, Clone)]
pub struct ExtractionRequest {
    /// Raw image bytes
    pub data: Vec<u8>,
    /// Declared media type (e.g. `image/jpeg`)
    pub media_type: String,
}

impl ExtractionRequest {
    pub fn new(data: impl Into<Vec<u8>>, media_type: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            media_type: media_type.into(),
        }
    }

    /// Base64 payload paired with its media type, ready for a backend call
    pub fn encode(&self) -> EncodedImage {
        EncodedImage {
            data: base64::engine::general_purpose::STANDARD.encode(&self.data),
            media_type: self.media_type.clone(),
        }
    }
}

/// Transport-safe image payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub data: String,
    pub media_type: String,
}

/// Expense category suggested by the model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Housing,
    Transportation,
    Groceries,
    Utilities,
    Entertainment,
    Food,
    Shopping,
    Healthcare,
    Education,
    Personal,
    Travel,
    Insurance,
    Gifts,
    Bills,
    #[default]
    OtherExpense,
}

impl Category {
    pub const ALL: [Category; 15] = [
        Category::Housing,
        Category::Transportation,
        Category::Groceries,
        Category::Utilities,
        Category::Entertainment,
        Category::Food,
        Category::Shopping,
        Category::Healthcare,
        Category::Education,
        Category::Personal,
        Category::Travel,
        Category::Insurance,
        Category::Gifts,
        Category::Bills,
        Category::OtherExpense,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Housing => "housing",
            Category::Transportation => "transportation",
            Category::Groceries => "groceries",
            Category::Utilities => "utilities",
            Category::Entertainment => "entertainment",
            Category::Food => "food",
            Category::Shopping => "shopping",
            Category::Healthcare => "healthcare",
            Category::Education => "education",
            Category::Personal => "personal",
            Category::Travel => "travel",
            Category::Insurance => "insurance",
            Category::Gifts => "gifts",
            Category::Bills => "bills",
            Category::OtherExpense => "other-expense",
        }
    }

    /// Case-insensitive lookup
    pub fn parse(value: &str) -> Option<Category> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(value))
    }
}

/// Normalized extraction result. Every success response has this shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub amount: f64,
    /// `YYYY-MM-DD`, empty only for the not-a-receipt sentinel
    pub date: String,
    pub description: String,
    pub merchant_name: String,
    /// Category wire name, empty only for the not-a-receipt sentinel
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_fallback: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl ExtractionResult {
    pub fn is_fallback(&self) -> bool {
        self.from_fallback.unwrap_or(false)
    }
}

/// Failure of a single backend attempt
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Backend returned no text")]
    EmptyResponse,
}
