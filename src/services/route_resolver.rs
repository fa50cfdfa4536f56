//! Inbound path → provider and upstream path.

use reqwest::Url;
use std::sync::Arc;

use crate::core::config::ApiType;
use crate::core::header_policy::strip_query_param;
use crate::core::registry::ProviderRegistry;

/// Result of resolving one inbound request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch {
    pub provider_name: String,
    pub api_type: ApiType,
    /// Path relative to the provider's base URL, with the forwarded query
    pub upstream_path: String,
    pub legacy: bool,
}

pub struct RouteResolver {
    registry: Arc<ProviderRegistry>,
}

impl RouteResolver {
    pub fn new(registry: Arc<ProviderRegistry>) -> Self {
        Self { registry }
    }

    /// Resolve `/{provider}/{rest...}` against the current registry.
    ///
    /// Returns `None` when the provider is unknown, or when a legacy provider
    /// is addressed without one of its version segments.
    pub fn resolve(&self, path: &str, query: Option<&str>) -> Option<RouteMatch> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let (name, rest) = segments.split_first()?;
        let provider = self.registry.lookup(name)?;

        if provider.legacy {
            let version = rest.first()?;
            if !provider.api_type.legacy_versions().contains(version) {
                tracing::debug!(
                    provider = %provider.name,
                    version = %version,
                    "Legacy route without a supported version segment"
                );
                return None;
            }
        }

        let remainder = if rest.is_empty() {
            String::new()
        } else {
            let mut joined = format!("/{}", rest.join("/"));
            if path.ends_with('/') {
                joined.push('/');
            }
            joined
        };

        let mut upstream_path = strip_overlapping_prefix(&provider.base_url, &remainder);

        let query = match provider.api_type {
            ApiType::Gemini => query.and_then(|q| strip_query_param(q, "key")),
            ApiType::OpenAi => query.filter(|q| !q.is_empty()).map(str::to_string),
        };
        if let Some(query) = query {
            upstream_path.push('?');
            upstream_path.push_str(&query);
        }

        Some(RouteMatch {
            provider_name: provider.name.clone(),
            api_type: provider.api_type,
            upstream_path,
            legacy: provider.legacy,
        })
    }
}

/// Drop the leading path segments that the base URL already ends with.
///
/// The longest run of leading `path` segments equal to a trailing run of the
/// base URL's path segments is removed. Host names never take part in the
/// comparison. A trailing slash on `path` is kept; a fully consumed path
/// becomes the empty string.
///
/// ```
/// use llm_key_rotator::services::route_resolver::strip_overlapping_prefix;
///
/// assert_eq!(strip_overlapping_prefix("https://api.x.com/v1", "/v1/models"), "/models");
/// assert_eq!(strip_overlapping_prefix("https://api.x.com", "/v1/models"), "/v1/models");
/// ```
pub fn strip_overlapping_prefix(base_url: &str, path: &str) -> String {
    let base_path = Url::parse(base_url)
        .map(|url| url.path().to_string())
        .unwrap_or_else(|_| base_url.to_string());
    let base_segments: Vec<&str> = base_path.split('/').filter(|s| !s.is_empty()).collect();
    let path_segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let max_overlap = base_segments.len().min(path_segments.len());
    let overlap = (1..=max_overlap)
        .rev()
        .find(|&k| path_segments[..k] == base_segments[base_segments.len() - k..])
        .unwrap_or(0);

    let remaining = &path_segments[overlap..];
    if remaining.is_empty() {
        return String::new();
    }

    let mut result = format!("/{}", remaining.join("/"));
    if path.ends_with('/') {
        result.push('/');
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::ProviderConfig;
    use pretty_assertions::assert_eq;

    fn resolver() -> RouteResolver {
        let providers = vec![
            ProviderConfig::new(
                "groq",
                ApiType::OpenAi,
                "https://api.groq.com/openai/v1",
                vec!["k".to_string()],
            ),
            ProviderConfig::new(
                "mygemini",
                ApiType::Gemini,
                "https://generativelanguage.googleapis.com/v1beta",
                vec!["k".to_string()],
            ),
            ProviderConfig::new(
                "gemini",
                ApiType::Gemini,
                "https://generativelanguage.googleapis.com",
                vec!["k".to_string()],
            )
            .legacy(),
            ProviderConfig::new(
                "openai",
                ApiType::OpenAi,
                "https://api.openai.com",
                vec!["k".to_string()],
            )
            .legacy(),
        ];
        RouteResolver::new(Arc::new(ProviderRegistry::new(providers)))
    }

    #[test]
    fn test_strip_overlapping_prefix() {
        assert_eq!(
            strip_overlapping_prefix("https://api.x.com/v1", "/v1/models"),
            "/models"
        );
        assert_eq!(
            strip_overlapping_prefix("https://api.groq.com/openai/v1", "/openai/v1/chat/completions"),
            "/chat/completions"
        );
        assert_eq!(
            strip_overlapping_prefix("https://api.groq.com/openai/v1", "/v1/chat/completions"),
            "/chat/completions"
        );
        assert_eq!(
            strip_overlapping_prefix("https://api.x.com", "/v1/models"),
            "/v1/models"
        );
        assert_eq!(
            strip_overlapping_prefix("https://api.x.com/v1", "/v2/models"),
            "/v2/models"
        );
    }

    #[test]
    fn test_strip_ignores_host() {
        assert_eq!(
            strip_overlapping_prefix("https://v1.example.com", "/v1/models"),
            "/v1/models"
        );
    }

    #[test]
    fn test_strip_trailing_slash_and_empty() {
        assert_eq!(
            strip_overlapping_prefix("https://api.x.com/v1/", "/v1/models/"),
            "/models/"
        );
        assert_eq!(strip_overlapping_prefix("https://api.x.com/v1", "/v1"), "");
        assert_eq!(strip_overlapping_prefix("https://api.x.com/v1", ""), "");
    }

    #[test]
    fn test_resolve_named_openai() {
        let route = resolver()
            .resolve("/groq/v1/chat/completions", None)
            .unwrap();
        assert_eq!(
            route,
            RouteMatch {
                provider_name: "groq".to_string(),
                api_type: ApiType::OpenAi,
                upstream_path: "/chat/completions".to_string(),
                legacy: false,
            }
        );
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let route = resolver().resolve("/GROQ/models", None).unwrap();
        assert_eq!(route.provider_name, "groq");
        assert_eq!(route.upstream_path, "/models");
    }

    #[test]
    fn test_resolve_gemini_strips_key_param() {
        let route = resolver()
            .resolve(
                "/mygemini/v1beta/models/gemini-pro:streamGenerateContent",
                Some("alt=sse&key=client-key"),
            )
            .unwrap();
        assert_eq!(
            route.upstream_path,
            "/models/gemini-pro:streamGenerateContent?alt=sse"
        );
    }

    #[test]
    fn test_resolve_openai_keeps_query() {
        let route = resolver()
            .resolve("/groq/v1/models", Some("limit=5"))
            .unwrap();
        assert_eq!(route.upstream_path, "/models?limit=5");
    }

    #[test]
    fn test_resolve_legacy_routes() {
        let resolver = resolver();

        let gemini = resolver
            .resolve("/gemini/v1beta/models", Some("key=x"))
            .unwrap();
        assert!(gemini.legacy);
        assert_eq!(gemini.upstream_path, "/v1beta/models");

        let openai = resolver.resolve("/openai/v1/chat/completions", None).unwrap();
        assert!(openai.legacy);
        assert_eq!(openai.upstream_path, "/v1/chat/completions");
    }

    #[test]
    fn test_resolve_legacy_requires_version() {
        let resolver = resolver();
        assert!(resolver.resolve("/gemini/models", None).is_none());
        assert!(resolver.resolve("/openai/v1beta/models", None).is_none());
        assert!(resolver.resolve("/openai", None).is_none());
    }

    #[test]
    fn test_resolve_unknown_provider() {
        let resolver = resolver();
        assert!(resolver.resolve("/unknown/v1/models", None).is_none());
        assert!(resolver.resolve("/", None).is_none());
    }
}
