//! Admin API handlers for runtime management.
//!
//! Mounted under `/admin/api` when `ADMIN_PASSWORD` is set. All endpoints
//! require `Authorization: Bearer <ADMIN_PASSWORD>`.

use axum::{
    extract::{Path, Query, State},
    http::HeaderMap,
    middleware,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;

use crate::api::handlers::AppState;
use crate::core::{admin_logging_middleware, AppConfig, AppError, ApiType, RequestEvent, Result};
use crate::services::KeyPoolStats;

const DEFAULT_LOG_LIMIT: usize = 100;

/// Verify admin authentication.
pub fn verify_admin_auth(headers: &HeaderMap, admin_password: Option<&str>) -> Result<()> {
    let expected = admin_password.ok_or(AppError::Unauthorized)?;

    let provided = headers
        .get("authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    if !constant_time_eq(provided, expected) {
        tracing::warn!("Admin API request with invalid credentials");
        return Err(AppError::Unauthorized);
    }

    Ok(())
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

#[derive(Debug, Serialize)]
pub struct ProviderSummary {
    pub name: String,
    pub api_type: ApiType,
    pub base_url: String,
    pub legacy: bool,
    pub key_count: usize,
    pub masked_keys: Vec<String>,
    /// `None` until the provider has served a request
    pub pool: Option<KeyPoolStats>,
}

#[derive(Debug, Serialize)]
pub struct ProviderListResponse {
    pub version: u64,
    pub providers: Vec<ProviderSummary>,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub version: u64,
    pub providers: usize,
}

#[derive(Debug, Serialize)]
pub struct ResetResponse {
    pub provider: String,
    pub pool: KeyPoolStats,
}

#[derive(Debug, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct LogsResponse {
    pub logs: Vec<RequestEvent>,
}

/// List providers with masked keys and pool state.
pub async fn list_providers(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ProviderListResponse>> {
    verify_admin_auth(&headers, state.admin_password.as_deref())?;

    let snapshot = state.registry.snapshot();
    let providers = snapshot
        .sorted()
        .into_iter()
        .map(|p| ProviderSummary {
            name: p.name.clone(),
            api_type: p.api_type,
            base_url: p.base_url.clone(),
            legacy: p.legacy,
            key_count: p.keys.len(),
            masked_keys: p.masked_keys(),
            pool: state.clients.pool_stats(&p.name),
        })
        .collect();

    Ok(Json(ProviderListResponse {
        version: snapshot.version,
        providers,
    }))
}

/// Re-read the env file and swap in the new provider set.
pub async fn reload_config(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<ReloadResponse>> {
    verify_admin_auth(&headers, state.admin_password.as_deref())?;

    let env_file = state
        .env_file
        .as_deref()
        .ok_or_else(|| AppError::BadRequest("Configuration was not loaded from a file".into()))?;

    let config = AppConfig::load(env_file, true)?;
    config.log_providers();

    let providers = config.providers.len();
    let version = state.registry.replace(config.providers);

    tracing::info!(version = version, "Configuration reloaded via Admin API");

    Ok(Json(ReloadResponse { version, providers }))
}

/// Clear the failure state of one provider's key pool.
pub async fn reset_provider(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(name): Path<String>,
) -> Result<Json<ResetResponse>> {
    verify_admin_auth(&headers, state.admin_password.as_deref())?;

    let provider = state
        .registry
        .lookup(&name)
        .ok_or_else(|| AppError::NotFound(format!("Provider {} not found", name)))?;

    if !state.clients.reset_pool(&provider.name) {
        return Err(AppError::NotFound(format!(
            "Provider {} has not been used yet",
            provider.name
        )));
    }

    let pool = state
        .clients
        .pool_stats(&provider.name)
        .ok_or_else(|| AppError::NotFound(format!("Provider {} not found", provider.name)))?;

    Ok(Json(ResetResponse {
        provider: provider.name.clone(),
        pool,
    }))
}

/// Most recent request events, newest first.
pub async fn recent_logs(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsResponse>> {
    verify_admin_auth(&headers, state.admin_password.as_deref())?;

    let limit = query.limit.unwrap_or(DEFAULT_LOG_LIMIT);
    Ok(Json(LogsResponse {
        logs: state.request_log.recent(limit),
    }))
}

/// Create Admin API router
pub fn admin_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/providers", get(list_providers))
        .route("/providers/:name/reset", post(reset_provider))
        .route("/reload", post(reload_config))
        .route("/logs", get(recent_logs))
        .layer(middleware::from_fn(admin_logging_middleware))
        .with_state(state)
}
