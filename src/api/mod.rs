//! HTTPS JSON API in front of the [`JobManager`].
//!
//! All `/jobs` routes require a bearer token; `/healthz` does not.

pub mod handlers;
pub mod middleware;
pub mod server;
pub mod types;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::TokenStore;
use crate::jobs::JobManager;

pub use server::serve;

#[derive(Clone)]
pub struct ApiState {
    pub manager: Arc<JobManager>,
    pub tokens: Arc<TokenStore>,
}

impl ApiState {
    pub fn new(manager: Arc<JobManager>, tokens: TokenStore) -> Self {
        Self {
            manager,
            tokens: Arc::new(tokens),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/jobs", get(handlers::list_jobs))
        .route("/jobs/start", post(handlers::start_job))
        .route("/jobs/{id}", get(handlers::get_status))
        .route("/jobs/{id}/stop", post(handlers::stop_job))
        .route("/jobs/{id}/output", get(handlers::get_output))
        .route_layer(axum::middleware::from_fn_with_state(
            state.tokens.clone(),
            middleware::bearer_auth,
        ))
        // Unauthenticated routes (added after the layer).
        .route("/healthz", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
