//! HTTP router assembly.

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use std::any::Any;
use std::sync::Arc;
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::api::admin::admin_router;
use crate::api::dispatcher::dispatch;
use crate::api::handlers::{health, metrics_handler, AppState};
use crate::core::{init_metrics, AppError, MetricsMiddleware};

/// Convert a handler panic into a JSON 500.
fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "Request handler panicked");
    AppError::Internal("request handler panicked".to_string()).into_response()
}

/// Build the full application router.
///
/// `/health` and `/metrics` are always served; the admin API is only
/// mounted when an admin password is configured. Everything else goes to
/// the dispatcher.
pub fn build_router(state: Arc<AppState>) -> Router {
    init_metrics();

    let mut app = Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics_handler))
        .fallback(dispatch)
        .with_state(state.clone());

    if state.admin_password.is_some() {
        app = app.nest("/admin/api", admin_router(state.clone()));
    } else {
        tracing::info!("ADMIN_PASSWORD not set, admin API disabled");
    }

    app.layer(DefaultBodyLimit::max(state.max_body_bytes))
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(middleware::from_fn(MetricsMiddleware::track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}
