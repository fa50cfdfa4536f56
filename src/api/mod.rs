//! API layer for the proxy.
//!
//! This module contains the dispatcher, the Admin API, the health and
//! metrics handlers, and router assembly.

pub mod admin;
pub mod dispatcher;
pub mod handlers;
pub mod router;

// Re-export commonly used types
pub use admin::{admin_router, verify_admin_auth};
pub use dispatcher::{dispatch, REQUEST_ID_HEADER};
pub use handlers::{health, metrics_handler, AppState};
pub use router::build_router;
