//! Receipt scan endpoint
//!
//! `POST /api/scan` takes a multipart form with a single `file` field and
//! answers with a normalized extraction result. Requests pass the shield first.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        DefaultBodyLimit, Multipart, State,
    },
    http::StatusCode,
    middleware,
    routing::post,
    Json, Router,
};

use crate::error::ScanError;
use crate::jobs::RECEIPT_SCANNED;
use crate::scan::{ExtractionRequest, ExtractionResult, MAX_IMAGE_BYTES};
use crate::shield::shield_middleware;
use crate::state::AppState;

/// Transport limit: a full-size image plus multipart overhead
const MAX_REQUEST_BYTES: usize = 2 * MAX_IMAGE_BYTES;

/// Create the scan router
pub fn router(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/scan", post(scan_receipt))
        .route_layer(middleware::from_fn_with_state(
            state.shield().clone(),
            shield_middleware,
        ))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BYTES))
}

/// POST /api/scan
async fn scan_receipt(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ExtractionResult>, ScanError> {
    let mut multipart = multipart.map_err(|e| {
        tracing::warn!("Rejected scan request: {}", e);
        ScanError::BadRequest("No file provided".to_string())
    })?;

    let expose = state.config().scan.expose_details;
    let mut request = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| read_error(e, "multipart field", expose))?
    {
        if field.name() != Some("file") {
            continue;
        }

        let media_type = field
            .content_type()
            .map(str::to_string)
            .or_else(|| {
                field
                    .file_name()
                    .and_then(|name| mime_guess::from_path(name).first_raw())
                    .map(str::to_string)
            })
            .unwrap_or_else(|| "application/octet-stream".to_string());

        let data = field
            .bytes()
            .await
            .map_err(|e| read_error(e, "file data", expose))?;

        tracing::debug!(bytes = data.len(), media_type = %media_type, "Received receipt image");
        request = Some(ExtractionRequest::new(data.to_vec(), media_type));
        break;
    }

    let Some(request) = request else {
        tracing::warn!("No file field found in scan upload");
        return Err(ScanError::BadRequest("No file provided".to_string()));
    };

    let result = state.scan_service().scan(&request).await?;

    if let Some(jobs) = state.jobs().filter(|_| !result.is_fallback()) {
        let jobs = jobs.clone();
        let event = result.clone();
        tokio::spawn(async move {
            if let Err(e) = jobs.send(RECEIPT_SCANNED, &event).await {
                tracing::warn!("Failed to publish {} event: {}", RECEIPT_SCANNED, e);
            }
        });
    }

    Ok(Json(result))
}

/// Oversized or malformed uploads are the caller's fault; anything else is ours
fn read_error(err: MultipartError, what: &str, expose: bool) -> ScanError {
    let status = err.status();
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        tracing::warn!("Scan upload exceeds {} bytes", MAX_REQUEST_BYTES);
        return ScanError::BadRequest("File size should be less than 5MB".to_string());
    }
    if status.is_client_error() {
        tracing::warn!("Malformed scan upload: {}", err.body_text());
        return ScanError::BadRequest("No file provided".to_string());
    }
    ScanError::internal(format!("Failed to read {}: {}", what, err.body_text()), expose)
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use axum::{
        body::Body,
        extract::State,
        http::{header, Request, StatusCode},
        routing::post,
        Json, Router,
    };
    use tower::ServiceExt;

    use super::MAX_REQUEST_BYTES;
    use crate::config::{Config, JobsConfig, ScanConfig};
    use crate::jobs::RECEIPT_SCANNED;
    use crate::error::ErrorResponse;
    use crate::routes::app;
    use crate::scan::{ExtractionResult, MockBackend, ModelBackend, ScanService};
    use crate::state::AppState;

    const BOUNDARY: &str = "receipt-test-boundary";
    const BROWSER: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 14_0) AppleWebKit/605.1.15 Safari/605.1.15";
    const GROCERY_JSON: &str = r#"{"amount": 12.99, "date": "2024-03-01", "description": "Weekly groceries", "merchantName": "Example Mart", "category": "groceries"}"#;

    fn scan_config() -> ScanConfig {
        ScanConfig {
            api_key: Some("test-key".to_string()),
            backend_timeout: Duration::from_millis(200),
            ..ScanConfig::default()
        }
    }

    fn test_app(scan: ScanConfig, backends: Vec<Arc<MockBackend>>) -> axum::Router {
        test_app_with_jobs(scan, backends, None)
    }

    fn test_app_with_jobs(
        scan: ScanConfig,
        backends: Vec<Arc<MockBackend>>,
        jobs: Option<JobsConfig>,
    ) -> axum::Router {
        let service = ScanService::with_backends(
            scan.clone(),
            backends
                .into_iter()
                .map(|b| b as Arc<dyn ModelBackend>)
                .collect(),
        );
        let config = Config {
            scan,
            jobs,
            ..Config::default()
        };
        app(AppState::with_scan_service(config, service))
    }

    fn multipart(field: &str, data: &[u8]) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{field}\"; filename=\"receipt.jpg\"\r\nContent-Type: image/jpeg\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn scan_request(body: Vec<u8>, user_agent: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/scan")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(agent) = user_agent {
            builder = builder.header(header::USER_AGENT, agent);
        }
        builder.body(Body::from(body)).unwrap()
    }

    async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_scan_grocery_receipt() {
        let app = test_app(scan_config(), vec![Arc::new(MockBackend::ok("primary", GROCERY_JSON))]);

        let (status, body) = send(app, scan_request(multipart("file", b"jpeg"), Some(BROWSER))).await;

        assert_eq!(status, StatusCode::OK);
        let result: ExtractionResult = serde_json::from_slice(&body).unwrap();
        assert_eq!(result.amount, 12.99);
        assert_eq!(result.date, "2024-03-01");
        assert_eq!(result.merchant_name, "Example Mart");
        assert_eq!(result.category, "groceries");
        assert!(result.from_fallback.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_field_is_bad_request() {
        let backend = Arc::new(MockBackend::ok("primary", GROCERY_JSON));
        let app = test_app(scan_config(), vec![backend.clone()]);

        let (status, body) =
            send(app, scan_request(multipart("attachment", b"jpeg"), Some(BROWSER))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.error, "No file provided");
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_non_multipart_request_is_bad_request() {
        let app = test_app(scan_config(), vec![Arc::new(MockBackend::ok("primary", GROCERY_JSON))]);
        let request = Request::builder()
            .method("POST")
            .uri("/api/scan")
            .header(header::USER_AGENT, BROWSER)
            .body(Body::empty())
            .unwrap();

        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_all_backends_failing_still_succeeds() {
        let app = test_app(
            scan_config(),
            vec![
                Arc::new(MockBackend::failing("primary")),
                Arc::new(MockBackend::failing("secondary")),
            ],
        );

        let (status, body) = send(app, scan_request(multipart("file", b"jpeg"), Some(BROWSER))).await;

        assert_eq!(status, StatusCode::OK);
        let result: ExtractionResult = serde_json::from_slice(&body).unwrap();
        assert_eq!(result.from_fallback, Some(true));
        assert!(!result.warning.unwrap_or_default().is_empty());
    }

    #[tokio::test]
    async fn test_fallback_disabled_returns_429_with_hint() {
        let scan = ScanConfig {
            fallback_enabled: false,
            ..scan_config()
        };
        let app = test_app(scan, vec![Arc::new(MockBackend::failing("primary"))]);

        let (status, body) = send(app, scan_request(multipart("file", b"jpeg"), Some(BROWSER))).await;

        assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(error.hint.is_some());
    }

    #[tokio::test]
    async fn test_missing_credential_is_500() {
        let backend = Arc::new(MockBackend::ok("primary", GROCERY_JSON));
        let scan = ScanConfig {
            api_key: None,
            ..scan_config()
        };
        let app = test_app(scan, vec![backend.clone()]);

        let (status, body) = send(app, scan_request(multipart("file", b"jpeg"), Some(BROWSER))).await;

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(!error.error.contains("test-key"));
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_unparseable_answer_is_400() {
        let app = test_app(
            scan_config(),
            vec![Arc::new(MockBackend::ok("primary", "Sorry, I can't help with that."))],
        );

        let (status, body) = send(app, scan_request(multipart("file", b"jpeg"), Some(BROWSER))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(error.error.contains("try another image"));
        assert!(!error.error.contains("Sorry"));
    }

    #[tokio::test]
    async fn test_bot_is_blocked_before_scan() {
        let backend = Arc::new(MockBackend::ok("primary", GROCERY_JSON));
        let app = test_app(scan_config(), vec![backend.clone()]);

        let (status, _) = send(
            app,
            scan_request(multipart("file", b"jpeg"), Some("python-requests/2.31")),
        )
        .await;

        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(backend.call_count(), 0);
    }

    /// Event sink recording the name of every event it receives
    async fn event_sink() -> (JobsConfig, Arc<Mutex<Vec<String>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route(
                "/e",
                post(
                    |State(events): State<Arc<Mutex<Vec<String>>>>,
                     Json(body): Json<serde_json::Value>| async move {
                        let name = body["name"].as_str().unwrap_or_default().to_string();
                        events.lock().unwrap().push(name);
                        StatusCode::OK
                    },
                ),
            )
            .with_state(events.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let config = JobsConfig {
            app_id: "finance-platform".to_string(),
            event_url: format!("http://{}/e", addr),
            signing_key: None,
        };
        (config, events)
    }

    #[tokio::test]
    async fn test_scan_publishes_event() {
        let (jobs, events) = event_sink().await;
        let app = test_app_with_jobs(
            scan_config(),
            vec![Arc::new(MockBackend::ok("primary", GROCERY_JSON))],
            Some(jobs),
        );

        let (status, _) = send(app, scan_request(multipart("file", b"jpeg"), Some(BROWSER))).await;
        assert_eq!(status, StatusCode::OK);

        // Publishing runs in a detached task
        for _ in 0..100 {
            if !events.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(*events.lock().unwrap(), vec![RECEIPT_SCANNED.to_string()]);
    }

    #[tokio::test]
    async fn test_fallback_record_publishes_nothing() {
        let (jobs, events) = event_sink().await;
        let app = test_app_with_jobs(
            scan_config(),
            vec![
                Arc::new(MockBackend::failing("primary")),
                Arc::new(MockBackend::failing("secondary")),
            ],
            Some(jobs),
        );

        let (status, body) = send(app, scan_request(multipart("file", b"jpeg"), Some(BROWSER))).await;
        assert_eq!(status, StatusCode::OK);
        let result: ExtractionResult = serde_json::from_slice(&body).unwrap();
        assert_eq!(result.from_fallback, Some(true));

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_upload_is_bad_request() {
        let backend = Arc::new(MockBackend::ok("primary", GROCERY_JSON));
        let app = test_app(scan_config(), vec![backend.clone()]);
        let image = vec![0u8; MAX_REQUEST_BYTES + 1];

        let (status, body) = send(app, scan_request(multipart("file", &image), Some(BROWSER))).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        let error: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(error.error, "File size should be less than 5MB");
        assert_eq!(backend.call_count(), 0);
    }

    #[tokio::test]
    async fn test_health() {
        let app = test_app(scan_config(), Vec::new());
        let request = Request::builder()
            .uri("/health")
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
    }
}
