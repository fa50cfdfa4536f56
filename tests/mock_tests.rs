//! End-to-end proxy tests against mocked upstreams.
//!
//! These tests use wiremock to simulate provider responses and drive the
//! full router with `tower::ServiceExt::oneshot`.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use llm_key_rotator::{
    build_router,
    core::config::{ApiType, AppConfig, ProviderConfig, ServerConfig},
    core::metrics::get_metrics,
    AppState,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;
use wiremock::{
    matchers::{header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn test_config(providers: Vec<ProviderConfig>) -> AppConfig {
    AppConfig {
        server: ServerConfig::default(),
        providers,
        admin_password: Some("admin-secret".to_string()),
        verify_ssl: false,
        request_timeout_secs: 5,
        max_body_bytes: 1024 * 1024,
        log_buffer_size: 50,
        env_file: None,
    }
}

fn keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|k| k.to_string()).collect()
}

/// Create a test app and keep the state for assertions
fn create_test_app(providers: Vec<ProviderConfig>) -> (Router, Arc<AppState>) {
    let config = test_config(providers);
    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(config.request_timeout_secs))
        .build()
        .expect("Failed to build HTTP client");
    let state = AppState::new(&config, http_client);
    (build_router(state.clone()), state)
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_openai_chat_completion_is_proxied() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-first-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "Hello!"},
                "finish_reason": "stop"
            }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (app, _state) = create_test_app(vec![ProviderConfig::new(
        "groq",
        ApiType::OpenAi,
        format!("{}/v1", mock_server.uri()),
        keys(&["sk-first-key", "sk-second-key"]),
    )]);

    let response = app
        .oneshot(post_json(
            "/groq/v1/chat/completions",
            json!({"model": "llama", "messages": [{"role": "user", "content": "hi"}]}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    let body = body_json(response).await;
    assert_eq!(body["choices"][0]["message"]["content"], "Hello!");
}

#[tokio::test]
async fn test_rate_limited_key_is_rotated() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(query_param("key", "K1-gemini-key"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {"code": 429, "message": "quota", "status": "RESOURCE_EXHAUSTED"}
        })))
        .expect(1)
        .mount(&mock_server)
        .await;
    Mock::given(method("POST"))
        .and(query_param("key", "K2-gemini-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"candidates": []})))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (app, state) = create_test_app(vec![ProviderConfig::new(
        "mygemini",
        ApiType::Gemini,
        format!("{}/v1beta", mock_server.uri()),
        keys(&["K1-gemini-key", "K2-gemini-key"]),
    )]);

    let response = app
        .oneshot(post_json(
            "/mygemini/v1beta/models/gemini-pro:generateContent",
            json!({"contents": []}),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await, json!({"candidates": []}));

    let stats = state.clients.pool_stats("mygemini").unwrap();
    assert_eq!(stats.failed, 1);
}

#[tokio::test]
async fn test_all_keys_rate_limited_returns_429() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429))
        .expect(3)
        .mount(&mock_server)
        .await;

    let (app, state) = create_test_app(vec![ProviderConfig::new(
        "groq",
        ApiType::OpenAi,
        mock_server.uri(),
        keys(&["key-aaaa-1", "key-bbbb-2", "key-cccc-3"]),
    )]);

    let response = app
        .oneshot(post_json("/groq/v1/chat/completions", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(
        body_json(response).await,
        json!({
            "error": {
                "message": "All API keys have been rate limited",
                "type": "rate_limit_exceeded",
                "code": "rate_limit_exceeded"
            }
        })
    );
    assert!(state.clients.client_for("groq").unwrap().pool().is_exhausted());
}

#[tokio::test]
async fn test_server_error_is_not_retried() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .expect(1)
        .mount(&mock_server)
        .await;

    let (app, _state) = create_test_app(vec![ProviderConfig::new(
        "groq",
        ApiType::OpenAi,
        mock_server.uri(),
        keys(&["key-aaaa-1", "key-bbbb-2"]),
    )]);

    let response = app
        .oneshot(post_json("/groq/v1/chat/completions", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(&bytes[..], b"upstream exploded");
}

#[tokio::test]
async fn test_client_credentials_are_not_forwarded() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&mock_server)
        .await;

    let (app, _state) = create_test_app(vec![ProviderConfig::new(
        "groq",
        ApiType::OpenAi,
        format!("{}/v1", mock_server.uri()),
        keys(&["sk-provider-key"]),
    )]);

    let request = Request::builder()
        .method("POST")
        .uri("/groq/v1/chat/completions")
        .header("content-type", "application/json")
        .header("authorization", "Bearer client-supplied")
        .header("x-secret", "do-not-leak")
        .header("openai-organization", "org-123")
        .body(Body::from("{}"))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let received = mock_server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    let upstream = &received[0];
    assert!(upstream.headers.get("x-secret").is_none());
    assert_eq!(
        upstream.headers.get("authorization").unwrap(),
        "Bearer sk-provider-key"
    );
    assert_eq!(upstream.headers.get("openai-organization").unwrap(), "org-123");
}

#[tokio::test]
async fn test_gemini_client_key_param_is_replaced() {
    let mock_server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/v1beta/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"models": []})))
        .mount(&mock_server)
        .await;

    let (app, _state) = create_test_app(vec![ProviderConfig::new(
        "gemini",
        ApiType::Gemini,
        mock_server.uri(),
        keys(&["provider-gemini-key"]),
    )
    .legacy()]);

    let request = Request::builder()
        .uri("/gemini/v1beta/models?key=client-key&pageSize=5")
        .header("x-goog-api-key", "client-header-key")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let received = mock_server.received_requests().await.unwrap();
    let url = &received[0].url;
    let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    assert_eq!(
        pairs,
        vec![
            ("pageSize".to_string(), "5".to_string()),
            ("key".to_string(), "provider-gemini-key".to_string()),
        ]
    );
    assert!(received[0].headers.get("x-goog-api-key").is_none());
}

#[tokio::test]
async fn test_unknown_provider_returns_400() {
    let (app, _state) = create_test_app(vec![]);

    let response = app
        .oneshot(post_json("/nowhere/v1/chat/completions", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["status"], "INVALID_ARGUMENT");
}

#[tokio::test]
async fn test_misconfigured_provider_returns_503() {
    let (app, _state) = create_test_app(vec![ProviderConfig::new(
        "bad",
        ApiType::OpenAi,
        "not a url",
        keys(&["sk-bad-provider-key"]),
    )]);

    let response = app
        .oneshot(post_json("/bad/v1/chat/completions", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body = body_json(response).await;
    assert_eq!(body["error"]["type"], "service_unavailable");
    assert_eq!(body["error"]["code"], "service_unavailable");
    assert!(!body.to_string().contains("sk-bad-provider-key"));
}

#[tokio::test]
async fn test_dropped_request_releases_active_gauge() {
    let mock_server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
        .mount(&mock_server)
        .await;

    let (app, _state) = create_test_app(vec![ProviderConfig::new(
        "slowpoke",
        ApiType::OpenAi,
        mock_server.uri(),
        keys(&["sk-slow-key"]),
    )]);

    let gauge = get_metrics()
        .active_requests
        .with_label_values(&["slowpoke"]);

    // The caller gives up before the upstream answers
    let pending = app.oneshot(post_json("/slowpoke/v1/chat/completions", json!({})));
    let result = tokio::time::timeout(Duration::from_millis(200), pending).await;
    assert!(result.is_err());

    assert_eq!(gauge.get(), 0.0);
}

#[tokio::test]
async fn test_transport_failure_returns_500() {
    // Nothing listens on port 1
    let (app, _state) = create_test_app(vec![ProviderConfig::new(
        "offline",
        ApiType::OpenAi,
        "http://127.0.0.1:1",
        keys(&["sk-offline-key"]),
    )]);

    let response = app
        .oneshot(post_json("/offline/v1/chat/completions", json!({})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_json(response).await;
    let message = body["error"]["message"].as_str().unwrap();
    assert!(!message.contains("127.0.0.1"));
    assert!(!message.contains("sk-offline-key"));
    assert_eq!(body["error"]["type"], "api_error");
}

#[tokio::test]
async fn test_health_reports_provider_count() {
    let (app, _state) = create_test_app(vec![ProviderConfig::new(
        "groq",
        ApiType::OpenAi,
        "https://api.groq.com/openai/v1",
        keys(&["k1"]),
    )]);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await,
        json!({"status": "ok", "providers": 1})
    );
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, _state) = create_test_app(vec![]);

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response.headers().get("content-type").unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/plain"));
}
