//! Upstream request execution with key rotation.
//!
//! [`UpstreamClient::send`] makes one attempt per key, rotating on 429 and on
//! transport failures, and returns the first response that is neither.

use bytes::Bytes;
use reqwest::Url;
use std::sync::Arc;
use thiserror::Error;

use crate::core::config::{ApiType, ProviderConfig};
use crate::core::error::AppError;
use crate::core::error_types::rate_limited_body;
use crate::core::logging::{get_request_id, mask_key};
use crate::core::metrics::{
    record_attempt, record_exhausted, OUTCOME_RATE_LIMITED, OUTCOME_SUCCESS,
    OUTCOME_TRANSPORT_ERROR, OUTCOME_UPSTREAM_ERROR,
};
use crate::services::key_pool::KeyPool;

/// Buffered upstream response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
    /// Number of upstream calls made to produce this response
    pub attempts: usize,
}

impl RawResponse {
    /// Proxy-generated 429 for a provider whose keys are all rate limited.
    pub fn rate_limited(api_type: ApiType, attempts: usize) -> Self {
        Self {
            status: 429,
            headers: vec![("content-type".to_string(), "application/json".to_string())],
            body: Bytes::from(rate_limited_body(api_type).to_string()),
            attempts,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Error, Debug)]
pub enum UpstreamError {
    /// Every attempt ended without a usable response; the URL is stripped
    #[error("Upstream transport error after {attempts} attempt(s): {source}")]
    Transport {
        source: reqwest::Error,
        attempts: usize,
    },

    #[error("Invalid upstream URL: {0}")]
    InvalidUrl(String),

    #[error("Unsupported method: {0}")]
    InvalidMethod(String),
}

impl UpstreamError {
    pub fn attempts(&self) -> usize {
        match self {
            UpstreamError::Transport { attempts, .. } => *attempts,
            _ => 0,
        }
    }
}

/// Client for one provider, owning that provider's key pool.
pub struct UpstreamClient {
    provider: Arc<ProviderConfig>,
    pool: KeyPool,
    http: reqwest::Client,
}

impl UpstreamClient {
    pub fn new(provider: Arc<ProviderConfig>, http: reqwest::Client) -> Result<Self, AppError> {
        if provider.keys.is_empty() {
            return Err(AppError::ProviderUnconfigured(format!(
                "{} has no API keys",
                provider.name
            )));
        }
        if Url::parse(&provider.base_url).is_err() {
            return Err(AppError::ProviderUnconfigured(format!(
                "{} has an invalid base URL",
                provider.name
            )));
        }

        tracing::debug!(
            provider = %provider.name,
            api_type = %provider.api_type,
            keys = provider.keys.len(),
            "Creating upstream client"
        );

        let pool = KeyPool::new(provider.name.clone(), provider.keys.clone());
        Ok(Self {
            provider,
            pool,
            http,
        })
    }

    pub fn provider(&self) -> &Arc<ProviderConfig> {
        &self.provider
    }

    pub fn pool(&self) -> &KeyPool {
        &self.pool
    }

    fn build_url(&self, upstream_path: &str, key: &str) -> Result<Url, UpstreamError> {
        let raw = format!(
            "{}{}",
            self.provider.base_url.trim_end_matches('/'),
            upstream_path
        );
        let mut url =
            Url::parse(&raw).map_err(|_| UpstreamError::InvalidUrl(upstream_path.to_string()))?;
        if self.provider.api_type == ApiType::Gemini {
            url.query_pairs_mut().append_pair("key", key);
        }
        Ok(url)
    }

    fn build_request(
        &self,
        method: &reqwest::Method,
        url: Url,
        key: &str,
        body: &Bytes,
        headers: &[(String, String)],
    ) -> reqwest::RequestBuilder {
        let mut request = self.http.request(method.clone(), url);

        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if !headers
            .iter()
            .any(|(n, _)| n.eq_ignore_ascii_case("content-type"))
        {
            request = request.header("content-type", "application/json");
        }
        if self.provider.api_type == ApiType::OpenAi {
            request = request.header("authorization", format!("Bearer {}", key));
        }
        if *method != reqwest::Method::GET && !body.is_empty() {
            request = request.body(body.clone());
        }

        request
    }

    /// Send a request, rotating keys on 429 and transport failures.
    ///
    /// At most one attempt per key is made. A non-429 status ends the loop
    /// and is returned unchanged.
    pub async fn send(
        &self,
        method: &str,
        upstream_path: &str,
        body: Bytes,
        headers: &[(String, String)],
    ) -> Result<RawResponse, UpstreamError> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .map_err(|_| UpstreamError::InvalidMethod(method.to_string()))?;
        let provider = self.provider.name.as_str();

        self.pool.reset_if_exhausted();

        let max_attempts = self.pool.len();
        let mut attempts = 0;
        let mut last_rate_limited: Option<RawResponse> = None;
        let mut last_transport_error: Option<reqwest::Error> = None;

        while attempts < max_attempts {
            let Some(key) = self.pool.acquire() else {
                break;
            };
            attempts += 1;

            let url = self.build_url(upstream_path, &key)?;
            tracing::debug!(
                request_id = %get_request_id(),
                provider = %provider,
                key = %mask_key(&key),
                attempt = attempts,
                "Sending upstream request"
            );

            let result = self
                .build_request(&method, url, &key, &body, headers)
                .send()
                .await;

            let response = match result {
                Ok(response) => response,
                Err(e) => {
                    let e = e.without_url();
                    tracing::warn!(
                        request_id = %get_request_id(),
                        provider = %provider,
                        key = %mask_key(&key),
                        error = %e,
                        "Upstream transport error, rotating key"
                    );
                    record_attempt(provider, OUTCOME_TRANSPORT_ERROR);
                    self.pool.mark_failed(&key);
                    last_transport_error = Some(e);
                    continue;
                }
            };

            let status = response.status().as_u16();
            let response_headers: Vec<(String, String)> = response
                .headers()
                .iter()
                .filter_map(|(name, value)| {
                    value
                        .to_str()
                        .ok()
                        .map(|v| (name.as_str().to_string(), v.to_string()))
                })
                .collect();

            let body = match response.bytes().await {
                Ok(body) => body,
                Err(e) => {
                    let e = e.without_url();
                    tracing::warn!(
                        request_id = %get_request_id(),
                        provider = %provider,
                        key = %mask_key(&key),
                        error = %e,
                        "Failed to read upstream body, rotating key"
                    );
                    record_attempt(provider, OUTCOME_TRANSPORT_ERROR);
                    self.pool.mark_failed(&key);
                    last_transport_error = Some(e);
                    continue;
                }
            };

            let raw = RawResponse {
                status,
                headers: response_headers,
                body,
                attempts,
            };

            if status == 429 {
                tracing::warn!(
                    request_id = %get_request_id(),
                    provider = %provider,
                    key = %mask_key(&key),
                    "Upstream rate limited key, rotating"
                );
                record_attempt(provider, OUTCOME_RATE_LIMITED);
                self.pool.mark_failed(&key);
                last_rate_limited = Some(raw);
                continue;
            }

            let outcome = if status < 400 {
                OUTCOME_SUCCESS
            } else {
                OUTCOME_UPSTREAM_ERROR
            };
            record_attempt(provider, outcome);
            return Ok(raw);
        }

        if self.pool.is_exhausted() {
            record_exhausted(provider);
            tracing::warn!(
                request_id = %get_request_id(),
                provider = %provider,
                attempts = attempts,
                "All API keys exhausted"
            );
        }

        if let Some(source) = last_transport_error {
            return Err(UpstreamError::Transport { source, attempts });
        }

        match last_rate_limited {
            Some(raw) if !raw.body.is_empty() => Ok(RawResponse { attempts, ..raw }),
            _ => Ok(RawResponse::rate_limited(self.provider.api_type, attempts)),
        }
    }
}
