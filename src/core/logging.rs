//! Logging utilities with request context support.
//!
//! Request ids and provider names are carried in tokio task-locals so that
//! log lines deep inside the retry loop can be correlated without threading
//! them through every call.

tokio::task_local! {
    /// Task-local storage for the current provider name.
    pub static PROVIDER_CONTEXT: String;
}

tokio::task_local! {
    /// Task-local storage for the current request ID.
    ///
    /// All logs emitted while serving one inbound request share this id.
    pub static REQUEST_ID: String;
}

/// Get the current provider name from context, if set.
///
/// Returns an empty string if no provider context is set.
pub fn get_provider_context() -> String {
    PROVIDER_CONTEXT
        .try_with(|ctx| ctx.clone())
        .unwrap_or_default()
}

/// Get the current request ID from context, if set.
///
/// Returns an empty string if no request ID is set.
pub fn get_request_id() -> String {
    REQUEST_ID.try_with(|id| id.clone()).unwrap_or_default()
}

/// Generate a new unique request ID using UUID v4.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Mask an API key for display.
///
/// Keys of at least 8 characters keep their first and last four characters;
/// shorter keys are fully hidden.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 8 {
        return "***".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Execute an async block inside the request id and provider scopes.
///
/// ```ignore
/// with_request_context!(request_id, provider_name, async {
///     // handler logic here
/// })
/// ```
#[macro_export]
macro_rules! with_request_context {
    ($request_id:expr, $provider_name:expr, $body:expr) => {
        $crate::core::logging::REQUEST_ID
            .scope($request_id, async {
                $crate::core::logging::PROVIDER_CONTEXT
                    .scope($provider_name, $body)
                    .await
            })
            .await
    };
}
