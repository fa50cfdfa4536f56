//! LLM Key Rotator - An API-key rotating reverse proxy for LLM APIs
//!
//! The proxy fronts OpenAI-compatible and Gemini-style providers. Each
//! provider owns a pool of API keys; when an upstream answers 429 the same
//! request is retried with the next key, so callers only see a rate limit
//! once every key of the provider is exhausted.
//!
//! # Architecture
//!
//! - [`core`]: configuration, provider registry, errors, logging, metrics, middleware
//! - [`services`]: key pool, upstream client, route resolver, client cache
//! - [`api`]: dispatcher, Admin API, router
//!
//! # Configuration
//!
//! Providers are declared in an env file (default `.env`) or the process
//! environment:
//! - `<NAME>_OPENAI_API_KEYS` / `<NAME>_GEMINI_API_KEYS`: comma-separated keys
//! - `<NAME>_OPENAI_BASE_URL` / `<NAME>_GEMINI_BASE_URL`: upstream base URL
//! - `GEMINI_API_KEYS`, `OPENAI_API_KEYS`, `BASE_URL`, `OPENAI_BASE_URL`: legacy providers
//!
//! Optional environment variables:
//! - `HOST`: Server bind address (default: 0.0.0.0)
//! - `PORT`: Server port (default: 8990)
//! - `ADMIN_PASSWORD`: enables the Admin API
//! - `VERIFY_SSL`: Verify SSL certificates for upstream (default: true)
//! - `REQUEST_TIMEOUT_SECS`: Request timeout in seconds (default: 300)

pub mod api;
pub mod core;
pub mod services;

// Re-export commonly used types for convenience
pub use api::{build_router, AppState};
pub use core::{
    admin_logging_middleware, ApiType, AppConfig, AppError, ProviderConfig, ProviderRegistry,
    Result,
};
pub use services::{ClientCache, KeyPool, RouteResolver, UpstreamClient};
