//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::jobs::JobClient;
use crate::scan::ScanService;
use crate::shield::Shield;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    scan_service: ScanService,
    shield: Shield,
    jobs: Option<JobClient>,
}

impl AppState {
    /// Create application state from configuration
    pub fn new(config: Config) -> Self {
        let scan_service = ScanService::new(config.scan.clone());
        Self::with_scan_service(config, scan_service)
    }

    /// Create application state around an existing scan service
    pub fn with_scan_service(config: Config, scan_service: ScanService) -> Self {
        let shield = Shield::new(&config.shield);
        let jobs = config.jobs.as_ref().map(JobClient::new);

        Self {
            inner: Arc::new(AppStateInner {
                config,
                scan_service,
                shield,
                jobs,
            }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the scan service
    pub fn scan_service(&self) -> &ScanService {
        &self.inner.scan_service
    }

    /// Get the request shield
    pub fn shield(&self) -> &Shield {
        &self.inner.shield
    }

    /// Get the background job client, if configured
    pub fn jobs(&self) -> Option<&JobClient> {
        self.inner.jobs.as_ref()
    }
}
