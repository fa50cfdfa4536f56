//! Shared application state and the health and metrics handlers.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use prometheus::{Encoder, TextEncoder};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;

use crate::core::{AppConfig, AppError, ProviderRegistry, RequestLog, Result};
use crate::services::{ClientCache, RouteResolver};

/// Application state shared across all request handlers.
pub struct AppState {
    pub registry: Arc<ProviderRegistry>,
    pub clients: Arc<ClientCache>,
    pub resolver: RouteResolver,
    pub request_log: RequestLog,
    /// Bearer password for the admin API; admin routes are not mounted when unset
    pub admin_password: Option<String>,
    /// Env file re-read by the reload endpoint
    pub env_file: Option<PathBuf>,
    pub max_body_bytes: usize,
}

impl AppState {
    /// Build the state and start the cache invalidation listener.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(config: &AppConfig, http_client: reqwest::Client) -> Arc<Self> {
        let registry = Arc::new(ProviderRegistry::new(config.providers.clone()));
        let clients = Arc::new(ClientCache::new(registry.clone(), http_client));
        clients.spawn_invalidation_listener();

        Arc::new(Self {
            resolver: RouteResolver::new(registry.clone()),
            registry,
            clients,
            request_log: RequestLog::new(config.log_buffer_size),
            admin_password: config.admin_password.clone(),
            env_file: config.env_file.clone(),
            max_body_bytes: config.max_body_bytes,
        })
    }
}

/// Liveness probe with the number of registered providers.
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "providers": state.registry.len()
    }))
}

/// Prometheus text exposition.
pub async fn metrics_handler() -> Result<Response> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Ok((
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response())
}
