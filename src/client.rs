//! Upload client
//!
//! Submits a receipt image to the scan endpoint and delivers exactly one
//! terminal outcome per submission. Oversized files are rejected locally and
//! a busy guard refuses new submissions while one is in flight.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::multipart::{Form, Part};
use serde_json::Value;

use crate::scan::{ExtractionResult, MAX_IMAGE_BYTES};

pub const FILE_TOO_LARGE_MESSAGE: &str = "File size should be less than 5MB";
pub const SUCCESS_MESSAGE: &str = "Receipt extracted successfully";
const SCAN_FAILED_MESSAGE: &str = "Scan failed";
const TRANSPORT_FAILED_MESSAGE: &str = "Failed to scan receipt";

/// Image selected by the user
#[derive(Debug, Clone)]
pub struct ImageFile {
    pub file_name: String,
    pub media_type: String,
    pub data: Vec<u8>,
}

impl ImageFile {
    pub fn new(file_name: impl Into<String>, media_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            media_type: media_type.into(),
            data,
        }
    }

    /// Read an image from disk, guessing the media type from the extension
    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, ClientError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "receipt".to_string());
        let media_type = mime_guess::from_path(path)
            .first_or_octet_stream()
            .essence_str()
            .to_string();

        Ok(Self::new(file_name, media_type, data))
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Failed to read image: {0}")]
    Io(#[from] std::io::Error),
}

/// User-facing notices (toasts in a UI, log lines in a CLI)
pub trait ScanNotifier: Send + Sync {
    fn success(&self, message: &str);
    fn warning(&self, message: &str);
    fn error(&self, message: &str);
}

/// Terminal outcome of one `submit` call
#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// Result handed to the completion handler
    Delivered,
    /// File exceeded the upload ceiling, nothing was sent
    Rejected,
    /// A submission was already in flight, nothing was sent
    Busy,
    /// The request failed; carries the message shown to the user
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    Idle,
    Busy,
}

/// Scan endpoint client
pub struct UploadClient<N> {
    http: reqwest::Client,
    endpoint: String,
    notifier: N,
    busy: AtomicBool,
}

/// Clears the busy flag when dropped
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl<N: ScanNotifier> UploadClient<N> {
    pub fn new(endpoint: impl Into<String>, notifier: N) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(concat!("receipt-scanner/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_default();

        Self {
            http,
            endpoint: endpoint.into(),
            notifier,
            busy: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> ClientState {
        if self.busy.load(Ordering::SeqCst) {
            ClientState::Busy
        } else {
            ClientState::Idle
        }
    }

    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Submit one image. `on_complete` runs at most once, only on success.
    pub async fn submit<F>(&self, file: ImageFile, on_complete: F) -> SubmitOutcome
    where
        F: FnOnce(ExtractionResult),
    {
        if file.size() > MAX_IMAGE_BYTES {
            self.notifier.error(FILE_TOO_LARGE_MESSAGE);
            return SubmitOutcome::Rejected;
        }

        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!("Scan already in progress, ignoring submission");
            return SubmitOutcome::Busy;
        }
        let _guard = BusyGuard(&self.busy);

        match self.request(file).await {
            Ok(result) => {
                if let Some(warning) = &result.warning {
                    self.notifier.warning(warning);
                } else if !result.is_fallback() {
                    self.notifier.success(SUCCESS_MESSAGE);
                }
                on_complete(result);
                SubmitOutcome::Delivered
            }
            Err(message) => {
                self.notifier.error(&message);
                SubmitOutcome::Failed(message)
            }
        }
    }

    async fn request(&self, file: ImageFile) -> Result<ExtractionResult, String> {
        let part = Part::bytes(file.data)
            .file_name(file.file_name)
            .mime_str(&file.media_type)
            .map_err(|e| e.to_string())?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!("Scan request failed: {}", e);
                TRANSPORT_FAILED_MESSAGE.to_string()
            })?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        if !status.is_success() {
            return Err(body["error"]
                .as_str()
                .filter(|m| !m.is_empty())
                .unwrap_or(SCAN_FAILED_MESSAGE)
                .to_string());
        }

        serde_json::from_value(body).map_err(|e| {
            tracing::warn!("Unexpected scan response: {}", e);
            TRANSPORT_FAILED_MESSAGE.to_string()
        })
    }
}
