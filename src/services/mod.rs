//! Key-rotating dispatch services.
//!
//! - [`key_pool`]: per-provider key rotation and failure tracking
//! - [`upstream_client`]: the retry loop against one provider
//! - [`route_resolver`]: inbound path to provider and upstream path
//! - [`client_cache`]: lazily built clients that survive registry reloads

pub mod client_cache;
pub mod key_pool;
pub mod route_resolver;
pub mod upstream_client;

// Re-export commonly used types
pub use client_cache::ClientCache;
pub use key_pool::{KeyPool, KeyPoolStats};
pub use route_resolver::{strip_overlapping_prefix, RouteMatch, RouteResolver};
pub use upstream_client::{RawResponse, UpstreamClient, UpstreamError};
