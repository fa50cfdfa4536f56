//! Core functionality for the key-rotating proxy.
//!
//! This module contains fundamental components used throughout the application:
//! - Configuration management
//! - Error handling and error envelopes
//! - Provider registry
//! - Logging context, metrics and middleware
//! - The in-memory request log

pub mod config;
pub mod error;
pub mod error_types;
pub mod header_policy;
pub mod logging;
pub mod metrics;
pub mod middleware;
pub mod registry;
pub mod request_log;

// Re-export commonly used types
pub use config::{ApiType, AppConfig, ProviderConfig, ServerConfig};
pub use error::{AppError, Result};
pub use logging::{generate_request_id, get_provider_context, get_request_id, mask_key};
pub use metrics::{get_metrics, init_metrics, Metrics};
pub use middleware::{admin_logging_middleware, MetricsMiddleware, ProviderName};
pub use registry::{ProviderRegistry, RegistrySnapshot};
pub use request_log::{RequestEvent, RequestLog};
