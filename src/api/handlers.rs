//! API Handlers
//!
//! HTTP request handlers for the administrative endpoints.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, Query, Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;

use crate::cache::{CacheEngine, CacheStatsReport};
use crate::config::Config;
use crate::error::{CacheError, Result};
use crate::invalidation::InvalidationEngine;
use crate::models::{
    ClearRequest, ClearResponse, HealthResponse, InvalidationResponse, ListEntryRequest,
    MessageResponse, PatternInvalidationRequest, TagInvalidationRequest, WarmupRequest,
    WarmupResponse,
};
use crate::monitor::{ExportFormat, PerformanceAlert, PerformanceMonitor, PerformanceReport};
use crate::ratelimit::{RateLimitRule, RateLimiter};
use crate::store::KeyValueStore;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn KeyValueStore>,
    pub cache: Arc<CacheEngine>,
    pub invalidation: Arc<InvalidationEngine>,
    pub limiter: Arc<RateLimiter>,
    pub monitor: Arc<PerformanceMonitor>,
}

impl AppState {
    /// Wires the full component stack over the given store.
    pub fn with_store(store: Arc<dyn KeyValueStore>, config: &Config) -> Self {
        let monitor = Arc::new(PerformanceMonitor::new(
            store.clone(),
            config.alerts.clone(),
            config.metrics_enabled,
        ));
        let cache = Arc::new(CacheEngine::new(store.clone(), monitor.clone(), config));
        let invalidation = Arc::new(InvalidationEngine::new(cache.clone()));
        let limiter = Arc::new(RateLimiter::new(
            store.clone(),
            monitor.clone(),
            config.rate_limiting_enabled,
        ));
        Self {
            store,
            cache,
            invalidation,
            limiter,
            monitor,
        }
    }
}

// == Request Tracking Middleware ==
/// Times every admin request and folds it into the endpoint aggregates.
pub async fn track_endpoint_metrics(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    let method = request.method().to_string();
    let started = Instant::now();
    let response = next.run(request).await;
    let is_error = response.status().is_client_error() || response.status().is_server_error();
    state
        .monitor
        .record_endpoint_metric(
            &path,
            &method,
            started.elapsed().as_secs_f64() * 1000.0,
            is_error,
        )
        .await;
    response
}

// == Health ==
/// Handler for GET /health
pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let store_connected = state.store.ping().await.is_ok();
    Json(HealthResponse::new(store_connected))
}

// == Cache ==
/// Handler for GET /admin/cache/stats
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<CacheStatsReport> {
    Json(state.cache.get_stats().await)
}

/// Handler for POST /admin/cache/warmup
pub async fn warmup_handler(
    State(state): State<AppState>,
    Json(req): Json<WarmupRequest>,
) -> Result<Json<WarmupResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }
    let stored = state.cache.warmup(&req.entries).await;
    Ok(Json(WarmupResponse { stored }))
}

/// Handler for POST /admin/cache/clear
pub async fn clear_handler(
    State(state): State<AppState>,
    Json(req): Json<ClearRequest>,
) -> Result<Json<ClearResponse>> {
    if let Some(error_msg) = req.validate() {
        return Err(CacheError::InvalidRequest(error_msg));
    }
    let deleted = state.cache.clear(&req.pattern).await;
    Ok(Json(ClearResponse { deleted }))
}

// == Invalidation ==
/// Handler for POST /admin/invalidate/tag
pub async fn invalidate_tag_handler(
    State(state): State<AppState>,
    Json(req): Json<TagInvalidationRequest>,
) -> Json<InvalidationResponse> {
    let invalidated = state
        .invalidation
        .invalidate_by_tag(&req.tag, req.cascade)
        .await;
    Json(InvalidationResponse { invalidated })
}

/// Handler for POST /admin/invalidate/pattern
pub async fn invalidate_pattern_handler(
    State(state): State<AppState>,
    Json(req): Json<PatternInvalidationRequest>,
) -> Json<InvalidationResponse> {
    let invalidated = state.invalidation.invalidate_by_pattern(&req.pattern).await;
    Json(InvalidationResponse { invalidated })
}

/// Handler for POST /admin/invalidate/user/:id
pub async fn invalidate_user_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<InvalidationResponse> {
    let invalidated = state.invalidation.invalidate_user_context(&user_id).await;
    Json(InvalidationResponse { invalidated })
}

/// Handler for POST /admin/invalidate/session/:id
pub async fn invalidate_session_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Json<InvalidationResponse> {
    let invalidated = state.invalidation.invalidate_session(&session_id).await;
    Json(InvalidationResponse { invalidated })
}

// == Rate Limit Rules ==
/// Handler for GET /admin/ratelimit/rules
pub async fn list_rules_handler(State(state): State<AppState>) -> Json<Vec<RateLimitRule>> {
    Json(state.limiter.list_rules().await)
}

/// Handler for POST /admin/ratelimit/rules
pub async fn create_rule_handler(
    State(state): State<AppState>,
    Json(rule): Json<RateLimitRule>,
) -> Result<Json<MessageResponse>> {
    let id = rule.id.clone();
    state.limiter.register_rule(rule).await?;
    Ok(Json(MessageResponse::new(format!(
        "Rule '{}' registered",
        id
    ))))
}

/// Handler for POST /admin/ratelimit/rules/:id/enable
pub async fn enable_rule_handler(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.limiter.set_rule_enabled(&rule_id, true).await?;
    Ok(Json(MessageResponse::new(format!(
        "Rule '{}' enabled",
        rule_id
    ))))
}

/// Handler for POST /admin/ratelimit/rules/:id/disable
pub async fn disable_rule_handler(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.limiter.set_rule_enabled(&rule_id, false).await?;
    Ok(Json(MessageResponse::new(format!(
        "Rule '{}' disabled",
        rule_id
    ))))
}

/// Handler for DELETE /admin/ratelimit/rules/:id
pub async fn delete_rule_handler(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
) -> Result<Json<MessageResponse>> {
    state.limiter.remove_rule(&rule_id).await?;
    Ok(Json(MessageResponse::new(format!(
        "Rule '{}' removed",
        rule_id
    ))))
}

/// Handler for DELETE /admin/ratelimit/rules/:id/counters
pub async fn clear_counters_handler(
    State(state): State<AppState>,
    Path(rule_id): Path<String>,
) -> Json<ClearResponse> {
    let deleted = state.limiter.clear_counters(&rule_id).await;
    Json(ClearResponse { deleted })
}

/// Handler for POST /admin/ratelimit/whitelist
pub async fn whitelist_handler(
    State(state): State<AppState>,
    Json(req): Json<ListEntryRequest>,
) -> Result<Json<MessageResponse>> {
    if state.limiter.add_to_whitelist(&req.identifier, req.ttl).await {
        Ok(Json(MessageResponse::new(format!(
            "'{}' whitelisted",
            req.identifier
        ))))
    } else {
        Err(CacheError::StoreUnavailable(
            "Whitelist update failed".to_string(),
        ))
    }
}

/// Handler for POST /admin/ratelimit/blacklist
pub async fn blacklist_handler(
    State(state): State<AppState>,
    Json(req): Json<ListEntryRequest>,
) -> Result<Json<MessageResponse>> {
    if state.limiter.add_to_blacklist(&req.identifier, req.ttl).await {
        Ok(Json(MessageResponse::new(format!(
            "'{}' blacklisted",
            req.identifier
        ))))
    } else {
        Err(CacheError::StoreUnavailable(
            "Blacklist update failed".to_string(),
        ))
    }
}

// == Metrics ==
/// Handler for GET /admin/metrics
pub async fn metrics_handler(State(state): State<AppState>) -> Json<PerformanceReport> {
    Json(state.monitor.report().await)
}

/// Query parameters for GET /admin/metrics/export
#[derive(Debug, Deserialize)]
pub struct ExportQuery {
    #[serde(default)]
    pub format: Option<String>,
}

/// Handler for GET /admin/metrics/export
pub async fn export_metrics_handler(
    State(state): State<AppState>,
    Query(query): Query<ExportQuery>,
) -> Result<Response> {
    let format = match query.format.as_deref() {
        None => ExportFormat::Json,
        Some(raw) => raw.parse().map_err(CacheError::InvalidRequest)?,
    };
    let body = state.monitor.export(format).await;
    let content_type = match format {
        ExportFormat::Json => "application/json",
        ExportFormat::Text => "text/plain; charset=utf-8",
    };
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// Handler for GET /admin/alerts
pub async fn alerts_handler(State(state): State<AppState>) -> Json<Vec<PerformanceAlert>> {
    Json(state.monitor.alerts().await)
}
