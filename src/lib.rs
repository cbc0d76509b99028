//! Cachegate - caching, invalidation, rate limiting and performance
//! observability for an AI interview backend.
//!
//! Sits in front of the response-generation pipeline, sharing one remote
//! key-value store across backend instances.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod invalidation;
pub mod models;
pub mod monitor;
pub mod ratelimit;
pub mod store;
pub mod tasks;

pub use api::AppState;
pub use cache::CacheEngine;
pub use config::Config;
pub use error::{CacheError, Result};
pub use invalidation::{InvalidationEngine, InvalidationStrategy};
pub use monitor::PerformanceMonitor;
pub use ratelimit::{RateLimiter, RequestContext};
pub use store::{KeyValueStore, MemoryStore, RedisStore};
pub use tasks::{spawn_cache_sweep_task, spawn_metrics_cleanup_task, spawn_system_sampler_task};
