//! HTTP middleware for request metrics and admin request logging.

use crate::core::metrics::get_metrics;
use axum::{extract::Request, middleware::Next, response::Response};
use std::time::Instant;

/// Extension type for storing provider name in response
#[derive(Clone, Debug)]
pub struct ProviderName(pub String);

/// Middleware for logging admin API requests.
///
/// Logs method, path, status and duration for every `/admin/api/*` call.
pub async fn admin_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16();

    tracing::info!(
        "[Admin API] {} {} - status={} duration={:.3}s",
        method,
        path,
        status,
        duration
    );

    response
}

/// Middleware for tracking request metrics.
pub struct MetricsMiddleware;

impl MetricsMiddleware {
    /// Track metrics for proxied requests.
    ///
    /// Requests are only counted once the dispatcher has tagged the response
    /// with a [`ProviderName`]; health, metrics and admin calls are skipped.
    pub async fn track_metrics(request: Request, next: Next) -> Response {
        let endpoint = request.uri().path().to_string();
        let method = request.method().to_string();

        if endpoint == "/metrics" {
            return next.run(request).await;
        }

        let metrics = get_metrics();
        let start = Instant::now();

        let response = next.run(request).await;

        let duration = start.elapsed().as_secs_f64();
        let status_code = response.status().as_u16().to_string();

        if let Some(ProviderName(provider)) = response.extensions().get::<ProviderName>() {
            metrics
                .request_count
                .with_label_values(&[&method, provider, &status_code])
                .inc();
            metrics
                .request_duration
                .with_label_values(&[provider])
                .observe(duration);
        }

        tracing::debug!(
            "{} {} - status={} duration={:.3}s",
            method,
            endpoint,
            status_code,
            duration
        );

        response
    }
}
