//! Rate Limiter Module
//!
//! Evaluates named fixed-window rules against the store's counters. Two
//! evaluation paths exist: the simple read-then-increment path, which is
//! two round trips and only advisory-correct under concurrent callers, and
//! the distributed path built on the store's atomic check-and-increment,
//! which is safe for strict enforcement when multiple backend instances
//! share one store.
//!
//! Any store failure during a check fails open: availability is prioritized
//! over strict limiting.

mod rules;

pub use rules::{default_rules, KeyStrategy, RateLimitRule, RequestContext};

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::cache::current_timestamp_ms;
use crate::error::{CacheError, Result};
use crate::monitor::PerformanceMonitor;
use crate::store::KeyValueStore;

/// Store set holding identifiers that bypass all rule evaluation.
const WHITELIST_SET: &str = "ratelimit:whitelist";

/// Store set holding identifiers denied before any rule evaluation.
const BLACKLIST_SET: &str = "ratelimit:blacklist";

/// Load factors outside this band trigger quota scaling.
const LOAD_RELAX_BELOW: f64 = 0.7;
const LOAD_TIGHTEN_ABOVE: f64 = 0.9;

// == Decision ==
/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    /// Requests left in the current window; `u64::MAX` when no limit applies
    pub remaining: u64,
    /// Unix millisecond timestamp at which the current window rolls
    pub reset_at: u64,
    /// Seconds until the window rolls; zero when allowed
    pub retry_after_secs: u64,
}

impl RateLimitDecision {
    fn unlimited() -> Self {
        Self {
            allowed: true,
            remaining: u64::MAX,
            reset_at: 0,
            retry_after_secs: 0,
        }
    }

    fn denied(reset_at: u64, now: u64) -> Self {
        Self {
            allowed: false,
            remaining: 0,
            reset_at,
            retry_after_secs: (reset_at.saturating_sub(now)).div_ceil(1000).max(1),
        }
    }
}

/// Pre-rule gate outcome: either an immediate decision (disabled, listed,
/// unknown rule) or a rule to evaluate counters against.
enum Gate {
    Decided(RateLimitDecision),
    Evaluate(RateLimitRule),
}

// == Rate Limiter ==
/// Rule-based request limiter over the shared store.
pub struct RateLimiter {
    store: Arc<dyn KeyValueStore>,
    monitor: Arc<PerformanceMonitor>,
    rules: RwLock<HashMap<String, RateLimitRule>>,
    enabled: bool,
}

impl RateLimiter {
    // == Constructor ==
    /// Creates a limiter seeded with the default rule set.
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        monitor: Arc<PerformanceMonitor>,
        enabled: bool,
    ) -> Self {
        let rules = default_rules()
            .into_iter()
            .map(|rule| (rule.id.clone(), rule))
            .collect();
        Self {
            store,
            monitor,
            rules: RwLock::new(rules),
            enabled,
        }
    }

    fn counter_key(rule_id: &str, subject: &str, window_start: u64) -> String {
        format!("ratelimit:{}:{}:{}", rule_id, subject, window_start)
    }

    // == Gate ==
    /// Shared pre-checks: global switch, blacklist, whitelist, rule lookup.
    async fn gate(&self, rule_id: &str, request: &RequestContext) -> Gate {
        if !self.enabled {
            return Gate::Decided(RateLimitDecision::unlimited());
        }

        if self.is_listed(BLACKLIST_SET, request).await {
            self.monitor.record_rate_limit("blacklist", false).await;
            return Gate::Decided(RateLimitDecision::denied(0, 0));
        }
        if self.is_listed(WHITELIST_SET, request).await {
            return Gate::Decided(RateLimitDecision::unlimited());
        }

        match self.rules.read().await.get(rule_id) {
            Some(rule) if rule.enabled => Gate::Evaluate(rule.clone()),
            _ => Gate::Decided(RateLimitDecision::unlimited()),
        }
    }

    /// Membership check for either override list; store errors count as
    /// not listed so an outage cannot lock everyone out.
    async fn is_listed(&self, set: &str, request: &RequestContext) -> bool {
        for subject in [request.ip.as_deref(), request.user_id.as_deref()]
            .into_iter()
            .flatten()
        {
            match self.store.sismember(set, subject).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(err) => warn!("Membership check on {} failed: {}", set, err),
            }
        }
        false
    }

    // == Simple Check ==
    /// Evaluates a rule with the read-then-increment path.
    ///
    /// With `increment` false the counter is only inspected. Only safe for
    /// single-instance, advisory limiting; concurrent callers across
    /// processes can slip past the quota between the read and the write.
    pub async fn check(
        &self,
        rule_id: &str,
        request: &RequestContext,
        increment: bool,
    ) -> RateLimitDecision {
        let rule = match self.gate(rule_id, request).await {
            Gate::Decided(decision) => return decision,
            Gate::Evaluate(rule) => rule,
        };

        let now = current_timestamp_ms();
        let window_start = now - now % rule.window_ms;
        let reset_at = window_start + rule.window_ms;
        let subject = rule.key_strategy.extract(request);
        let key = Self::counter_key(&rule.id, &subject, window_start);

        let decision = match self.check_counter(&key, &rule, increment, now, reset_at).await {
            Ok(decision) => decision,
            Err(err) => {
                warn!("Rate limit check '{}' failed open: {}", rule_id, err);
                RateLimitDecision {
                    allowed: true,
                    remaining: rule.max_requests,
                    reset_at,
                    retry_after_secs: 0,
                }
            }
        };
        self.monitor
            .record_rate_limit(&rule.id, decision.allowed)
            .await;
        decision
    }

    async fn check_counter(
        &self,
        key: &str,
        rule: &RateLimitRule,
        increment: bool,
        now: u64,
        reset_at: u64,
    ) -> Result<RateLimitDecision> {
        let count: u64 = match self.store.get(key).await? {
            Some(bytes) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.parse().ok())
                .ok_or_else(|| {
                    CacheError::Serialization(format!("Counter '{}' is not an integer", key))
                })?,
            None => 0,
        };

        if count >= rule.max_requests {
            return Ok(RateLimitDecision::denied(reset_at, now));
        }

        if increment {
            let new_count = self.store.incr(key).await? as u64;
            // Expiry is applied only when the counter is first created so
            // repeat hits do not slide the window.
            if new_count == 1 {
                self.store.expire(key, rule.window_ms).await?;
            }
            Ok(RateLimitDecision {
                allowed: true,
                remaining: rule.max_requests.saturating_sub(new_count),
                reset_at,
                retry_after_secs: 0,
            })
        } else {
            Ok(RateLimitDecision {
                allowed: true,
                remaining: rule.max_requests.saturating_sub(count),
                reset_at,
                retry_after_secs: 0,
            })
        }
    }

    // == Distributed Check ==
    /// Evaluates a rule with the store's atomic check-and-increment.
    ///
    /// This is the path to use whenever multiple backend instances share
    /// the same counters: the compare and increment happen in one
    /// server-side operation, so the quota holds under concurrency.
    pub async fn check_distributed(
        &self,
        rule_id: &str,
        request: &RequestContext,
    ) -> RateLimitDecision {
        let rule = match self.gate(rule_id, request).await {
            Gate::Decided(decision) => return decision,
            Gate::Evaluate(rule) => rule,
        };

        let now = current_timestamp_ms();
        let window_start = now - now % rule.window_ms;
        let reset_at = window_start + rule.window_ms;
        let subject = rule.key_strategy.extract(request);
        let key = Self::counter_key(&rule.id, &subject, window_start);

        let decision = match self
            .store
            .check_and_incr(&key, rule.max_requests, rule.window_ms)
            .await
        {
            Ok(outcome) if outcome.allowed => RateLimitDecision {
                allowed: true,
                remaining: rule.max_requests.saturating_sub(outcome.count),
                reset_at,
                retry_after_secs: 0,
            },
            Ok(_) => RateLimitDecision::denied(reset_at, now),
            Err(err) => {
                warn!(
                    "Distributed rate limit check '{}' failed open: {}",
                    rule_id, err
                );
                RateLimitDecision {
                    allowed: true,
                    remaining: rule.max_requests,
                    reset_at,
                    retry_after_secs: 0,
                }
            }
        };
        self.monitor
            .record_rate_limit(&rule.id, decision.allowed)
            .await;
        decision
    }

    // == Override Lists ==
    /// Adds an identifier to the whitelist, optionally refreshing the
    /// list's TTL. The TTL applies to the whole list, the finest grain the
    /// store's sets offer.
    pub async fn add_to_whitelist(&self, identifier: &str, ttl_secs: Option<u64>) -> bool {
        self.add_to_list(WHITELIST_SET, identifier, ttl_secs).await
    }

    /// Adds an identifier to the blacklist, optionally refreshing the
    /// list's TTL.
    pub async fn add_to_blacklist(&self, identifier: &str, ttl_secs: Option<u64>) -> bool {
        self.add_to_list(BLACKLIST_SET, identifier, ttl_secs).await
    }

    async fn add_to_list(&self, set: &str, identifier: &str, ttl_secs: Option<u64>) -> bool {
        let result: Result<()> = async {
            self.store.sadd(set, identifier).await?;
            if let Some(secs) = ttl_secs {
                self.store.expire(set, secs * 1000).await?;
            }
            Ok(())
        }
        .await;
        match result {
            Ok(()) => true,
            Err(err) => {
                warn!("Could not add '{}' to {}: {}", identifier, set, err);
                false
            }
        }
    }

    // == Rule Administration ==
    /// Registers or replaces a rule after validation.
    pub async fn register_rule(&self, rule: RateLimitRule) -> Result<()> {
        let rule = rule.validated()?;
        info!(
            "Registered rate limit rule '{}': {}/{} ms",
            rule.id, rule.max_requests, rule.window_ms
        );
        self.rules.write().await.insert(rule.id.clone(), rule);
        Ok(())
    }

    /// Updates an existing rule's window and/or quota.
    pub async fn update_rule(
        &self,
        rule_id: &str,
        window_ms: Option<u64>,
        max_requests: Option<u64>,
    ) -> Result<()> {
        let mut rules = self.rules.write().await;
        let rule = rules
            .get_mut(rule_id)
            .ok_or_else(|| CacheError::NotFound(format!("Rule '{}' does not exist", rule_id)))?;
        if let Some(window) = window_ms {
            rule.window_ms = window;
        }
        if let Some(max) = max_requests {
            rule.max_requests = max;
        }
        Ok(())
    }

    /// Removes a rule.
    pub async fn remove_rule(&self, rule_id: &str) -> Result<()> {
        self.rules
            .write()
            .await
            .remove(rule_id)
            .map(|_| ())
            .ok_or_else(|| CacheError::NotFound(format!("Rule '{}' does not exist", rule_id)))
    }

    /// Enables or disables a rule.
    pub async fn set_rule_enabled(&self, rule_id: &str, enabled: bool) -> Result<()> {
        let mut rules = self.rules.write().await;
        let rule = rules
            .get_mut(rule_id)
            .ok_or_else(|| CacheError::NotFound(format!("Rule '{}' does not exist", rule_id)))?;
        rule.enabled = enabled;
        Ok(())
    }

    /// Returns all rules, sorted by id.
    pub async fn list_rules(&self) -> Vec<RateLimitRule> {
        let mut rules: Vec<RateLimitRule> = self.rules.read().await.values().cloned().collect();
        rules.sort_by(|a, b| a.id.cmp(&b.id));
        rules
    }

    /// Deletes every live counter for a rule. Returns counters removed.
    pub async fn clear_counters(&self, rule_id: &str) -> u64 {
        let result: Result<u64> = async {
            let keys = self
                .store
                .keys(&format!("ratelimit:{}:*", rule_id))
                .await?;
            let mut removed = 0;
            for batch in keys.chunks(crate::cache::CLEAR_BATCH) {
                removed += self.store.del(batch).await?;
            }
            Ok(removed)
        }
        .await;
        match result {
            Ok(removed) => removed,
            Err(err) => {
                warn!("Could not clear counters for '{}': {}", rule_id, err);
                0
            }
        }
    }

    // == Load Adjustment ==
    /// Open-loop admission control: scales every enabled rule's quota by
    /// +20% when load is low and -20% when load is high. Quotas never drop
    /// below one request per window.
    pub async fn adjust_to_load(&self, load_factor: f64) {
        let scale = if load_factor < LOAD_RELAX_BELOW {
            1.2
        } else if load_factor > LOAD_TIGHTEN_ABOVE {
            0.8
        } else {
            return;
        };
        let mut rules = self.rules.write().await;
        for rule in rules.values_mut().filter(|rule| rule.enabled) {
            rule.max_requests = ((rule.max_requests as f64 * scale).round() as u64).max(1);
        }
        info!(
            "Scaled rate limit quotas by {:.0}% at load factor {:.2}",
            (scale - 1.0) * 100.0,
            load_factor
        );
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AlertThresholds;
    use crate::store::MemoryStore;

    fn limiter_with(enabled: bool) -> RateLimiter {
        let store = Arc::new(MemoryStore::new());
        let monitor = Arc::new(PerformanceMonitor::new(
            store.clone(),
            AlertThresholds::default(),
            true,
        ));
        RateLimiter::new(store, monitor, enabled)
    }

    fn limiter() -> RateLimiter {
        limiter_with(true)
    }

    #[tokio::test]
    async fn test_boundary_allows_n_then_denies() {
        let limiter = limiter();
        let request = RequestContext::from_ip("10.0.0.1");

        let mut previous_remaining = u64::MAX;
        for _ in 0..5 {
            let decision = limiter.check("auth-login", &request, true).await;
            assert!(decision.allowed);
            assert!(decision.remaining < previous_remaining);
            previous_remaining = decision.remaining;
        }
        assert_eq!(previous_remaining, 0);

        let denied = limiter.check("auth-login", &request, true).await;
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert!(denied.retry_after_secs > 0);
    }

    #[tokio::test]
    async fn test_distributed_boundary() {
        let limiter = limiter();
        let request = RequestContext::from_ip("10.0.0.2");

        for expected_remaining in (0..5).rev() {
            let decision = limiter.check_distributed("auth-login", &request).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }
        let denied = limiter.check_distributed("auth-login", &request).await;
        assert!(!denied.allowed);
        assert!(denied.retry_after_secs > 0);
    }

    #[tokio::test]
    async fn test_subjects_counted_separately() {
        let limiter = limiter();
        for _ in 0..5 {
            assert!(
                limiter
                    .check("auth-login", &RequestContext::from_ip("10.0.0.1"), true)
                    .await
                    .allowed
            );
        }
        // A different IP still has its full quota.
        let other = limiter
            .check("auth-login", &RequestContext::from_ip("10.0.0.9"), true)
            .await;
        assert!(other.allowed);
        assert_eq!(other.remaining, 4);
    }

    #[tokio::test]
    async fn test_non_incrementing_check_does_not_consume() {
        let limiter = limiter();
        let request = RequestContext::from_ip("10.0.0.1");
        for _ in 0..3 {
            let decision = limiter.check("auth-login", &request, false).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, 5);
        }
    }

    #[tokio::test]
    async fn test_globally_disabled_allows_unlimited() {
        let limiter = limiter_with(false);
        let request = RequestContext::from_ip("10.0.0.1");
        for _ in 0..10 {
            let decision = limiter.check("auth-login", &request, true).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, u64::MAX);
        }
    }

    #[tokio::test]
    async fn test_unknown_or_disabled_rule_allows() {
        let limiter = limiter();
        let request = RequestContext::from_ip("10.0.0.1");
        assert!(limiter.check("no-such-rule", &request, true).await.allowed);

        limiter.set_rule_enabled("auth-login", false).await.unwrap();
        for _ in 0..10 {
            assert!(limiter.check("auth-login", &request, true).await.allowed);
        }
    }

    #[tokio::test]
    async fn test_blacklist_denies_before_rules() {
        let limiter = limiter();
        assert!(limiter.add_to_blacklist("10.0.0.66", None).await);
        let denied = limiter
            .check("auth-login", &RequestContext::from_ip("10.0.0.66"), true)
            .await;
        assert!(!denied.allowed);
    }

    #[tokio::test]
    async fn test_whitelist_bypasses_quota() {
        let limiter = limiter();
        assert!(limiter.add_to_whitelist("u42", Some(60)).await);
        let request = RequestContext::from_user("u42");
        for _ in 0..30 {
            let decision = limiter.check("transcription", &request, true).await;
            assert!(decision.allowed);
            assert_eq!(decision.remaining, u64::MAX);
        }
    }

    #[tokio::test]
    async fn test_window_rolls_over() {
        const WINDOW_MS: u64 = 200;
        let limiter = limiter();
        limiter
            .register_rule(RateLimitRule::new("burst", WINDOW_MS, 2, KeyStrategy::Ip))
            .await
            .unwrap();
        let request = RequestContext::from_ip("10.0.0.1");

        // Align just past a window boundary so the burst below cannot
        // straddle two windows.
        let into_window = current_timestamp_ms() % WINDOW_MS;
        tokio::time::sleep(std::time::Duration::from_millis(WINDOW_MS - into_window + 5)).await;

        assert!(limiter.check("burst", &request, true).await.allowed);
        assert!(limiter.check("burst", &request, true).await.allowed);
        assert!(!limiter.check("burst", &request, true).await.allowed);

        tokio::time::sleep(std::time::Duration::from_millis(WINDOW_MS + 20)).await;
        assert!(limiter.check("burst", &request, true).await.allowed);
    }

    #[tokio::test]
    async fn test_clear_counters_resets_quota() {
        let limiter = limiter();
        let request = RequestContext::from_ip("10.0.0.1");
        for _ in 0..5 {
            limiter.check("auth-login", &request, true).await;
        }
        assert!(!limiter.check("auth-login", &request, true).await.allowed);

        assert_eq!(limiter.clear_counters("auth-login").await, 1);
        let fresh = limiter.check("auth-login", &request, true).await;
        assert!(fresh.allowed);
        assert_eq!(fresh.remaining, 4);
    }

    #[tokio::test]
    async fn test_rule_administration() {
        let limiter = limiter();
        limiter
            .register_rule(RateLimitRule::new("custom", 1000, 7, KeyStrategy::User))
            .await
            .unwrap();
        limiter
            .update_rule("custom", None, Some(9))
            .await
            .unwrap();
        let rules = limiter.list_rules().await;
        let custom = rules.iter().find(|r| r.id == "custom").unwrap();
        assert_eq!(custom.max_requests, 9);

        limiter.remove_rule("custom").await.unwrap();
        assert!(matches!(
            limiter.remove_rule("custom").await,
            Err(CacheError::NotFound(_))
        ));
        assert!(matches!(
            limiter.update_rule("ghost", Some(1), None).await,
            Err(CacheError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_register_rejects_empty_id() {
        let limiter = limiter();
        let result = limiter
            .register_rule(RateLimitRule::new("", 1000, 1, KeyStrategy::Ip))
            .await;
        assert!(matches!(result, Err(CacheError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_adjust_to_load() {
        let limiter = limiter();
        limiter.adjust_to_load(0.5).await;
        let relaxed = limiter.list_rules().await;
        assert_eq!(
            relaxed.iter().find(|r| r.id == "auth-login").unwrap().max_requests,
            6
        );

        limiter.adjust_to_load(0.95).await;
        let tightened = limiter.list_rules().await;
        assert_eq!(
            tightened.iter().find(|r| r.id == "auth-login").unwrap().max_requests,
            5
        );

        // Mid-band load changes nothing.
        limiter.adjust_to_load(0.8).await;
        assert_eq!(
            limiter
                .list_rules()
                .await
                .iter()
                .find(|r| r.id == "auth-login")
                .unwrap()
                .max_requests,
            5
        );
    }

    // == Fail-Open Behaviour ==
    use crate::store::test_support::DownStore;

    #[tokio::test]
    async fn test_fail_open_when_store_unreachable() {
        let store = Arc::new(DownStore);
        let monitor = Arc::new(PerformanceMonitor::new(
            store.clone(),
            AlertThresholds::default(),
            true,
        ));
        let limiter = RateLimiter::new(store, monitor, true);
        let request = RequestContext::from_ip("10.0.0.1");

        let simple = limiter.check("auth-login", &request, true).await;
        assert!(simple.allowed);
        let distributed = limiter.check_distributed("auth-login", &request).await;
        assert!(distributed.allowed);
    }
}
