//! Per-request orchestration of the proxy path.
//!
//! Every request not claimed by another route lands here: resolve the
//! provider, fetch its client, run the key-rotating send and relay the
//! buffered upstream response.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use chrono::Utc;
use std::sync::Arc;
use std::time::Instant;

use crate::api::handlers::AppState;
use crate::core::header_policy::{forwardable_headers, is_relayed_response_header};
use crate::core::logging::generate_request_id;
use crate::core::metrics::ActiveRequestGuard;
use crate::core::{AppError, ProviderName, RequestEvent};
use crate::services::route_resolver::RouteMatch;
use crate::services::upstream_client::{RawResponse, UpstreamError};

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Fallback handler that proxies `/{provider}/{rest...}`.
pub async fn dispatch(
    State(state): State<Arc<AppState>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request_id = generate_request_id();
    let start = Instant::now();
    let path = uri.path().to_string();

    let route = state.resolver.resolve(&path, uri.query());
    let provider = route.as_ref().map(|r| r.provider_name.clone());

    let (mut response, attempts) = crate::with_request_context!(
        request_id.clone(),
        provider.clone().unwrap_or_default(),
        async {
            match route {
                Some(route) => forward(&state, &method, route, &headers, body).await,
                None => (AppError::RouteNotFound(path.clone()).into_response(), 0),
            }
        }
    );

    let latency_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    if let Some(provider) = &provider {
        response
            .extensions_mut()
            .insert(ProviderName(provider.clone()));
    }

    tracing::info!(
        request_id = %request_id,
        method = %method,
        path = %path,
        provider = provider.as_deref().unwrap_or("-"),
        status = status,
        attempts = attempts,
        latency_ms = latency_ms,
        "Proxied request"
    );

    state.request_log.record(RequestEvent {
        request_id,
        timestamp: Utc::now(),
        method: method.to_string(),
        path,
        provider,
        status,
        latency_ms,
        attempts,
    });

    response
}

async fn forward(
    state: &AppState,
    method: &Method,
    route: RouteMatch,
    headers: &HeaderMap,
    body: Bytes,
) -> (Response, usize) {
    let client = match state.clients.client_for(&route.provider_name) {
        Ok(client) => client,
        Err(e) => return (e.into_family_response(Some(route.api_type)), 0),
    };

    let active = ActiveRequestGuard::new(&route.provider_name);

    let forwarded = forwardable_headers(route.api_type, headers);
    let result = client
        .send(method.as_str(), &route.upstream_path, body, &forwarded)
        .await;

    drop(active);

    match result {
        Ok(raw) => {
            let attempts = raw.attempts;
            (relay(raw), attempts)
        }
        Err(e @ UpstreamError::Transport { .. }) => {
            let attempts = e.attempts();
            tracing::error!(provider = %route.provider_name, error = %e, "Upstream unreachable");
            (
                AppError::UpstreamTransport.into_family_response(Some(route.api_type)),
                attempts,
            )
        }
        Err(e) => (
            AppError::BadRequest(e.to_string()).into_family_response(Some(route.api_type)),
            0,
        ),
    }
}

/// Turn a buffered upstream response into the caller's response.
fn relay(raw: RawResponse) -> Response {
    let status = StatusCode::from_u16(raw.status).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = Response::new(Body::from(raw.body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    for (name, value) in raw.headers {
        if !is_relayed_response_header(&name) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            headers.append(name, value);
        }
    }

    response
}
