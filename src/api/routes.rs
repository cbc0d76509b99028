//! API Routes
//!
//! Configures the Axum router with the administrative endpoints.

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use super::handlers::{
    alerts_handler, blacklist_handler, cache_stats_handler, clear_counters_handler,
    clear_handler, create_rule_handler, delete_rule_handler, disable_rule_handler,
    enable_rule_handler, export_metrics_handler, health_handler, invalidate_pattern_handler,
    invalidate_session_handler, invalidate_tag_handler, invalidate_user_handler,
    list_rules_handler, metrics_handler, track_endpoint_metrics, warmup_handler,
    whitelist_handler, AppState,
};

/// Creates the admin router with all endpoints configured.
///
/// # Endpoints
/// - `GET  /health` - Liveness plus store reachability
/// - `GET  /admin/cache/stats` - Aggregate cache statistics
/// - `POST /admin/cache/warmup` - Bulk pre-population
/// - `POST /admin/cache/clear` - Delete keys by glob pattern
/// - `POST /admin/invalidate/tag|pattern` - Invalidation triggers
/// - `POST /admin/invalidate/user/:id`, `.../session/:id` - Scoped wrappers
/// - `GET|POST /admin/ratelimit/rules` plus per-rule mutations
/// - `POST /admin/ratelimit/whitelist|blacklist` - Override lists
/// - `GET  /admin/metrics`, `/admin/metrics/export`, `/admin/alerts`
///
/// # Middleware
/// - CORS: Allows any origin (configurable for production)
/// - Tracing: Logs all requests for debugging
/// - Endpoint metrics: Every request feeds the performance monitor
pub fn create_router(state: AppState) -> Router {
    // Configure CORS middleware
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Build router with all endpoints
    Router::new()
        .route("/health", get(health_handler))
        .route("/admin/cache/stats", get(cache_stats_handler))
        .route("/admin/cache/warmup", post(warmup_handler))
        .route("/admin/cache/clear", post(clear_handler))
        .route("/admin/invalidate/tag", post(invalidate_tag_handler))
        .route("/admin/invalidate/pattern", post(invalidate_pattern_handler))
        .route("/admin/invalidate/user/:id", post(invalidate_user_handler))
        .route(
            "/admin/invalidate/session/:id",
            post(invalidate_session_handler),
        )
        .route(
            "/admin/ratelimit/rules",
            get(list_rules_handler).post(create_rule_handler),
        )
        .route("/admin/ratelimit/rules/:id", delete(delete_rule_handler))
        .route(
            "/admin/ratelimit/rules/:id/enable",
            post(enable_rule_handler),
        )
        .route(
            "/admin/ratelimit/rules/:id/disable",
            post(disable_rule_handler),
        )
        .route(
            "/admin/ratelimit/rules/:id/counters",
            delete(clear_counters_handler),
        )
        .route("/admin/ratelimit/whitelist", post(whitelist_handler))
        .route("/admin/ratelimit/blacklist", post(blacklist_handler))
        .route("/admin/metrics", get(metrics_handler))
        .route("/admin/metrics/export", get(export_metrics_handler))
        .route("/admin/alerts", get(alerts_handler))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            track_endpoint_metrics,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
