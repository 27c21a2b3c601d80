//! Route modules for the receipt scanner server

pub mod health;
pub mod scan;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// Build the application router
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(health::router())
        .merge(scan::router(&state))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
