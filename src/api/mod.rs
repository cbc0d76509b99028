//! API Module
//!
//! HTTP handlers and routing for the administrative surface: cache stats
//! and warmup, invalidation triggers, rate-limit rule management, and
//! metrics/alert export.

pub mod handlers;
pub mod routes;

pub use handlers::AppState;
pub use routes::create_router;
