//! Wire shapes of proxy-generated error bodies for each upstream family.

use serde_json::{json, Value};

use crate::core::config::ApiType;

pub const RATE_LIMITED_MESSAGE: &str = "All API keys have been rate limited";

pub const ERROR_TYPE_API: &str = "api_error";
pub const ERROR_TYPE_INVALID_REQUEST: &str = "invalid_request_error";
pub const ERROR_TYPE_AUTHENTICATION: &str = "authentication_error";
pub const ERROR_TYPE_NOT_FOUND: &str = "not_found_error";
pub const ERROR_TYPE_RATE_LIMIT: &str = "rate_limit_exceeded";
pub const ERROR_TYPE_UNAVAILABLE: &str = "service_unavailable";

/// Canonical Google RPC status name for an HTTP status code.
pub const fn gemini_status(code: u16) -> &'static str {
    match code {
        400 => "INVALID_ARGUMENT",
        401 => "UNAUTHENTICATED",
        403 => "PERMISSION_DENIED",
        404 => "NOT_FOUND",
        429 => "RESOURCE_EXHAUSTED",
        503 => "UNAVAILABLE",
        _ => "INTERNAL",
    }
}

/// OpenAI-style error type for an HTTP status code.
pub const fn openai_error_type(code: u16) -> &'static str {
    match code {
        400 => ERROR_TYPE_INVALID_REQUEST,
        401 => ERROR_TYPE_AUTHENTICATION,
        404 => ERROR_TYPE_NOT_FOUND,
        429 => ERROR_TYPE_RATE_LIMIT,
        503 => ERROR_TYPE_UNAVAILABLE,
        _ => ERROR_TYPE_API,
    }
}

/// `{"error":{"code","message","status"}}`
pub fn gemini_error_body(code: u16, message: &str) -> Value {
    json!({
        "error": {
            "code": code,
            "message": message,
            "status": gemini_status(code)
        }
    })
}

/// `{"error":{"message","type","code"}}`
pub fn openai_error_body(code: u16, message: &str) -> Value {
    let error_type = openai_error_type(code);
    json!({
        "error": {
            "message": message,
            "type": error_type,
            "code": error_type
        }
    })
}

/// Error body in the shape the caller's family expects.
///
/// Without a known family the Gemini shape doubles as the generic envelope.
pub fn error_body(api_type: Option<ApiType>, code: u16, message: &str) -> Value {
    match api_type {
        Some(ApiType::OpenAi) => openai_error_body(code, message),
        Some(ApiType::Gemini) | None => gemini_error_body(code, message),
    }
}

/// Body returned when every key of a provider has been rate limited.
pub fn rate_limited_body(api_type: ApiType) -> Value {
    error_body(Some(api_type), 429, RATE_LIMITED_MESSAGE)
}
