//! Configuration management for the receipt scanner server

use std::env;
use std::time::Duration;

/// Default model priority order
pub const DEFAULT_MODELS: [&str; 2] = ["gemini-1.5-pro", "gemini-pro"];

/// Default Gemini REST endpoint
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Default per-attempt backend timeout
pub const DEFAULT_BACKEND_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub environment: Environment,
    pub scan: ScanConfig,
    pub shield: ShieldConfig,
    pub jobs: Option<JobsConfig>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Deployment environment. Error details are only exposed outside production.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

/// Extraction service configuration
#[derive(Debug, Clone)]
pub struct ScanConfig {
    /// Backend credential. `None` makes every scan fail as misconfigured.
    pub api_key: Option<String>,
    /// Gemini API base URL
    pub base_url: String,
    /// Model identifiers in priority order
    pub models: Vec<String>,
    /// Upper bound for a single backend attempt
    pub backend_timeout: Duration,
    /// Synthesize a placeholder record when every backend fails
    pub fallback_enabled: bool,
    /// Expose internal failure details in responses
    pub expose_details: bool,
}

#[derive(Debug, Clone)]
pub struct ShieldConfig {
    pub enabled: bool,
    /// User agents matched (case-insensitive substring) before the bot patterns
    pub allowed_agents: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct JobsConfig {
    pub app_id: String,
    pub event_url: String,
    pub signing_key: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },

    #[error("{0} must list at least one model")]
    NoModels(&'static str),
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            models: DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
            backend_timeout: Duration::from_secs(DEFAULT_BACKEND_TIMEOUT_SECS),
            fallback_enabled: true,
            expose_details: true,
        }
    }
}

impl Default for ShieldConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            allowed_agents: Vec::new(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            environment: Environment::Development,
            scan: ScanConfig::default(),
            shield: ShieldConfig::default(),
            jobs: None,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let environment = match env::var("APP_ENV")
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
            .as_str()
        {
            "production" | "prod" => Environment::Production,
            "development" | "dev" | "test" => Environment::Development,
            other => {
                return Err(ConfigError::InvalidValue {
                    name: "APP_ENV",
                    value: other.to_string(),
                })
            }
        };

        let port = match env::var("SERVER_PORT") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                name: "SERVER_PORT",
                value: raw,
            })?,
            Err(_) => 3000,
        };

        let models = match env::var("SCAN_MODELS") {
            Ok(raw) => {
                let models = split_list(&raw);
                if models.is_empty() {
                    return Err(ConfigError::NoModels("SCAN_MODELS"));
                }
                models
            }
            Err(_) => DEFAULT_MODELS.iter().map(|m| m.to_string()).collect(),
        };

        let backend_timeout = match env::var("SCAN_BACKEND_TIMEOUT_SECS") {
            Ok(raw) => match raw.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::InvalidValue {
                        name: "SCAN_BACKEND_TIMEOUT_SECS",
                        value: raw,
                    })
                }
            },
            Err(_) => Duration::from_secs(DEFAULT_BACKEND_TIMEOUT_SECS),
        };

        let jobs = env::var("JOBS_EVENT_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(|event_url| JobsConfig {
                app_id: env::var("JOBS_APP_ID").unwrap_or_else(|_| "finance-platform".to_string()),
                event_url,
                signing_key: env::var("JOBS_SIGNING_KEY").ok().filter(|k| !k.is_empty()),
            });

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port,
            },
            environment,
            scan: ScanConfig {
                api_key: env::var("GEMINI_API_KEY").ok().filter(|k| !k.trim().is_empty()),
                base_url: env::var("GEMINI_BASE_URL")
                    .unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string()),
                models,
                backend_timeout,
                fallback_enabled: parse_bool("SCAN_FALLBACK_ENABLED", true)?,
                expose_details: !environment.is_production(),
            },
            shield: ShieldConfig {
                enabled: parse_bool("SHIELD_ENABLED", true)?,
                allowed_agents: env::var("SHIELD_ALLOWED_AGENTS")
                    .map(|raw| split_list(&raw))
                    .unwrap_or_default(),
            },
            jobs,
        })
    }
}

fn parse_bool(name: &'static str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(raw) => match raw.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue { name, value: raw }),
        },
        Err(_) => Ok(default),
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
