use axum::{
    Router,
    http::HeaderValue,
    middleware,
    routing::{delete, get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::Config;
use crate::state::SharedState;

pub mod auth;
mod connections;
mod dependents;
mod error;
mod extract;
mod observability;
mod system;
mod types;
mod voice;

pub use error::ApiError;
pub use extract::{CaregiverAuth, DependentAuth};
pub use types::*;

use metrics_exporter_prometheus::PrometheusHandle;

#[derive(Clone)]
pub struct AppState {
    pub shared: Arc<SharedState>,

    pub start_time: std::time::Instant,

    pub prometheus_handle: Option<PrometheusHandle>,
}

pub fn create_app_state(
    shared: Arc<SharedState>,
    prometheus_handle: Option<PrometheusHandle>,
) -> Arc<AppState> {
    Arc::new(AppState {
        shared,
        start_time: std::time::Instant::now(),
        prometheus_handle,
    })
}

pub async fn create_app_state_from_config(
    config: Config,
    prometheus_handle: Option<PrometheusHandle>,
) -> anyhow::Result<Arc<AppState>> {
    let shared = Arc::new(SharedState::new(config).await?);
    Ok(create_app_state(shared, prometheus_handle))
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors_origins = state.shared.config.server.cors_allowed_origins.clone();

    let api_router = Router::new()
        // Caregiver accounts
        .route("/auth/signup", post(auth::signup))
        .route("/auth/login", post(auth::login))
        .route("/auth/me", get(auth::me))
        // Pairing
        .route("/connections", post(connections::create_code))
        .route("/connections/verify", post(connections::verify_code))
        .route("/connections/accept", post(connections::accept_code))
        .route("/connections/exchange", post(connections::exchange))
        .route("/connections/{code}/status", get(connections::code_status))
        // Caregiver views of dependents
        .route("/dependents/{id}", get(dependents::get_dependent))
        .route("/dependents/{id}", delete(dependents::delete_dependent))
        .route(
            "/dependents/{id}/pairing-code",
            post(dependents::create_pairing_code),
        )
        .route(
            "/dependents/{id}/analyses/latest",
            get(dependents::latest_analysis),
        )
        .route(
            "/dependents/{id}/analyses",
            get(dependents::analysis_history),
        )
        // Device-side voice sessions
        .route("/voice/sessions", post(voice::open_session))
        .route(
            "/voice/sessions/{id}/questions",
            get(voice::list_questions),
        )
        .route(
            "/voice/sessions/{id}/questions/{name}",
            get(voice::get_question),
        )
        .route("/voice/sessions/{id}/answers", post(voice::submit_answers))
        .route("/voice/sessions/{id}", delete(voice::close_session))
        // System
        .route("/system/health/live", get(system::health_live))
        .route("/system/health/ready", get(system::health_ready))
        .route("/metrics", get(observability::get_metrics))
        .with_state(state);

    let cors_layer = if cors_origins.contains(&"*".to_string()) {
        CorsLayer::new().allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> =
            cors_origins.iter().filter_map(|s| s.parse().ok()).collect();
        CorsLayer::new().allow_origin(origins)
    };

    Router::new()
        .nest("/api", api_router)
        .layer(cors_layer.allow_methods(Any).allow_headers(Any))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(observability::logging_middleware))
}
