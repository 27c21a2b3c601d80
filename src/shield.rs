//! Request shield
//!
//! Rejects automated clients before they reach the scan endpoint. Requests
//! without a `User-Agent`, or whose agent matches a known bot pattern, get a
//! 403 unless the agent is explicitly allow-listed.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::config::ShieldConfig;
use crate::error::ErrorResponse;

// "bot" only counts as a product token ("Googlebot/2.1", "AhrefsBot;"), so
// device names such as "CUBOT" pass
const BOT_PATTERNS: [&str; 11] = [
    "bot/",
    "bot;",
    "bot)",
    "bot-",
    "crawler",
    "spider",
    "scrapy",
    "headless",
    "python-requests",
    "go-http-client",
    "wget",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(&'static str),
}

#[derive(Debug, Clone)]
pub struct Shield {
    enabled: bool,
    allowed_agents: Arc<Vec<String>>,
}

impl Shield {
    pub fn new(config: &ShieldConfig) -> Self {
        Self {
            enabled: config.enabled,
            allowed_agents: Arc::new(
                config
                    .allowed_agents
                    .iter()
                    .map(|a| a.to_lowercase())
                    .collect(),
            ),
        }
    }

    pub fn verdict(&self, user_agent: Option<&str>) -> Verdict {
        if !self.enabled {
            return Verdict::Allow;
        }

        let agent = match user_agent.map(str::trim) {
            Some(agent) if !agent.is_empty() => agent.to_lowercase(),
            _ => return Verdict::Deny("missing user agent"),
        };

        if self.allowed_agents.iter().any(|allowed| agent.contains(allowed.as_str())) {
            return Verdict::Allow;
        }

        match BOT_PATTERNS.into_iter().find(|pattern| agent.contains(pattern)) {
            Some(pattern) => Verdict::Deny(pattern),
            None => Verdict::Allow,
        }
    }
}

/// Middleware entry point, install with `middleware::from_fn_with_state`
pub async fn shield_middleware(
    State(shield): State<Shield>,
    request: Request,
    next: Next,
) -> Response {
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    match shield.verdict(user_agent.as_deref()) {
        Verdict::Allow => next.run(request).await,
        Verdict::Deny(reason) => {
            tracing::warn!(
                user_agent = user_agent.as_deref().unwrap_or(""),
                reason,
                "Request blocked by shield"
            );
            (
                StatusCode::FORBIDDEN,
                Json(ErrorResponse::new("Request blocked")),
            )
                .into_response()
        }
    }
}
