//! What crosses the proxy boundary in each direction.
//!
//! Inbound headers are allow-listed per upstream family so that client
//! credentials never reach the upstream. Upstream response headers are
//! relayed except for hop-by-hop headers and `content-length`.

use axum::http::HeaderMap;

use crate::core::config::ApiType;

const COMMON_FORWARDED: &[&str] = &["content-type", "accept", "user-agent"];
const GEMINI_FORWARDED: &[&str] = &["x-goog-user-project"];
const OPENAI_FORWARDED: &[&str] = &["openai-organization", "openai-project"];

const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "proxy-connection",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

fn is_forwarded(api_type: ApiType, name: &str) -> bool {
    let family = match api_type {
        ApiType::Gemini => GEMINI_FORWARDED,
        ApiType::OpenAi => OPENAI_FORWARDED,
    };
    COMMON_FORWARDED.contains(&name) || family.contains(&name)
}

/// Collect the inbound headers that may be forwarded upstream.
///
/// Header names come back lowercase. Values that are not visible ASCII
/// are dropped.
pub fn forwardable_headers(api_type: ApiType, headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(name, _)| is_forwarded(api_type, name.as_str()))
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

/// Whether an upstream response header should be relayed to the caller.
pub fn is_relayed_response_header(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    name != "content-length" && !HOP_BY_HOP.contains(&name.as_str())
}

/// Remove every `name` parameter from a raw query string.
///
/// Returns `None` when nothing is left.
pub fn strip_query_param(query: &str, name: &str) -> Option<String> {
    let kept: Vec<&str> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter(|pair| pair.split('=').next() != Some(name))
        .collect();
    if kept.is_empty() {
        None
    } else {
        Some(kept.join("&"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn inbound() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        headers.insert("accept", HeaderValue::from_static("*/*"));
        headers.insert("authorization", HeaderValue::from_static("Bearer client"));
        headers.insert("x-goog-api-key", HeaderValue::from_static("client-key"));
        headers.insert("x-secret", HeaderValue::from_static("s3cr3t"));
        headers.insert("x-goog-user-project", HeaderValue::from_static("proj"));
        headers.insert("openai-organization", HeaderValue::from_static("org-1"));
        headers
    }

    #[test]
    fn test_gemini_allowlist() {
        let forwarded = forwardable_headers(ApiType::Gemini, &inbound());
        let names: Vec<&str> = forwarded.iter().map(|(n, _)| n.as_str()).collect();

        assert!(names.contains(&"content-type"));
        assert!(names.contains(&"accept"));
        assert!(names.contains(&"x-goog-user-project"));
        assert!(!names.contains(&"authorization"));
        assert!(!names.contains(&"x-goog-api-key"));
        assert!(!names.contains(&"x-secret"));
        assert!(!names.contains(&"openai-organization"));
    }

    #[test]
    fn test_openai_allowlist() {
        let forwarded = forwardable_headers(ApiType::OpenAi, &inbound());
        let names: Vec<&str> = forwarded.iter().map(|(n, _)| n.as_str()).collect();

        assert!(names.contains(&"openai-organization"));
        assert!(!names.contains(&"x-goog-user-project"));
        assert!(!names.contains(&"authorization"));
    }

    #[test]
    fn test_response_header_filter() {
        assert!(is_relayed_response_header("content-type"));
        assert!(is_relayed_response_header("content-encoding"));
        assert!(is_relayed_response_header("x-ratelimit-remaining"));
        assert!(!is_relayed_response_header("Content-Length"));
        assert!(!is_relayed_response_header("transfer-encoding"));
        assert!(!is_relayed_response_header("Connection"));
    }

    #[test]
    fn test_strip_query_param() {
        assert_eq!(
            strip_query_param("key=abc&alt=sse", "key"),
            Some("alt=sse".to_string())
        );
        assert_eq!(strip_query_param("key=abc", "key"), None);
        assert_eq!(
            strip_query_param("keyword=x&key", "key"),
            Some("keyword=x".to_string())
        );
        assert_eq!(strip_query_param("", "key"), None);
    }
}
