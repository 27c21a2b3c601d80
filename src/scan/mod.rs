//! Scan Module
//!
//! Receipt extraction through generative vision models.
//!
//! Backends are attempted in a fixed priority order, one at a time. The first
//! answer wins; when none answers a placeholder record is returned so the user
//! can still correct the data by hand. Model output is normalized into a fixed
//! [`ExtractionResult`] shape whichever path produced it.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use receipt_scanner::config::ScanConfig;
//! use receipt_scanner::scan::{ExtractionRequest, ScanService};
//!
//! let service = ScanService::new(ScanConfig {
//!     api_key: Some(api_key),
//!     ..ScanConfig::default()
//! });
//!
//! let result = service
//!     .scan(&ExtractionRequest::new(bytes, "image/jpeg"))
//!     .await?;
//! ```

mod normalize;
mod provider;
mod service;
mod types;

pub use normalize::{fallback_record, normalize, strip_code_fences, FALLBACK_WARNING, NOT_A_RECEIPT};
pub use provider::{GeminiBackend, ModelBackend};
pub use service::{ScanService, RECEIPT_PROMPT};
pub use types::{
    BackendError, Category, EncodedImage, ExtractionRequest, ExtractionResult, MAX_IMAGE_BYTES,
};

#[cfg(test)]
pub(crate) use provider::MockBackend;
