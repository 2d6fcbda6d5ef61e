//! Per-tenant circuit breaker.
//!
//! Counts consecutive failures for each tenant. Once the count reaches the
//! threshold the breaker is open, and the engine pauses for the cooldown and
//! resets it before the next attempt against that tenant.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use herald_core::config::BreakerConfig;
use herald_core::types::TenantId;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Failure accounting for one tenant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerState {
    pub consecutive_failures: u32,
    /// After this instant the streak is stale and the next failure starts a new one.
    pub window_expires_at: Instant,
}

/// Keyed breaker store. Instantiate one per engine (or share one across
/// engines that target the same tenants).
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    window: Duration,
    states: Mutex<HashMap<TenantId, BreakerState>>,
}

impl CircuitBreaker {
    pub fn new(config: &BreakerConfig) -> Self {
        Self {
            threshold: config.failure_threshold.max(1),
            cooldown: config.cooldown(),
            window: config.failure_window(),
            states: Mutex::new(HashMap::new()),
        }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn cooldown(&self) -> Duration {
        self.cooldown
    }

    // A panic while holding the lock cannot leave a half-written counter.
    fn states(&self) -> MutexGuard<'_, HashMap<TenantId, BreakerState>> {
        match self.states.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Current streak for `tenant`, zero if none or stale.
    pub fn failures(&self, tenant: &TenantId) -> u32 {
        let now = Instant::now();
        self.states()
            .get(tenant)
            .filter(|s| now < s.window_expires_at)
            .map(|s| s.consecutive_failures)
            .unwrap_or(0)
    }

    pub fn is_open(&self, tenant: &TenantId) -> bool {
        self.failures(tenant) >= self.threshold
    }

    /// Count one failure and return the new streak length.
    pub fn record_failure(&self, tenant: &TenantId) -> u32 {
        let now = Instant::now();
        let mut states = self.states();
        let state = states.entry(tenant.clone()).or_insert(BreakerState {
            consecutive_failures: 0,
            window_expires_at: now,
        });
        if now >= state.window_expires_at {
            state.consecutive_failures = 0;
        }
        state.consecutive_failures = state.consecutive_failures.saturating_add(1);
        state.window_expires_at = now + self.window;

        let count = state.consecutive_failures;
        if count == self.threshold {
            warn!(tenant = %tenant, failures = count, "Circuit breaker opened");
        } else {
            debug!(tenant = %tenant, failures = count, "Recorded action failure");
        }
        count
    }

    /// A success ends the streak.
    pub fn record_success(&self, tenant: &TenantId) {
        if let Some(state) = self.states().get_mut(tenant) {
            state.consecutive_failures = 0;
        }
    }

    /// Close the breaker after its cooldown.
    pub fn reset(&self, tenant: &TenantId) {
        if self.states().remove(tenant).is_some() {
            debug!(tenant = %tenant, "Circuit breaker reset");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(&BreakerConfig::default())
    }

    #[tokio::test]
    async fn test_opens_at_threshold() {
        let breaker = breaker();
        let tenant = TenantId::new("g1");
        for i in 1..5 {
            assert_eq!(breaker.record_failure(&tenant), i);
            assert!(!breaker.is_open(&tenant));
        }
        assert_eq!(breaker.record_failure(&tenant), 5);
        assert!(breaker.is_open(&tenant));
    }

    #[tokio::test]
    async fn test_reset_closes_and_zeroes() {
        let breaker = breaker();
        let tenant = TenantId::new("g1");
        for _ in 0..5 {
            breaker.record_failure(&tenant);
        }
        breaker.reset(&tenant);
        assert!(!breaker.is_open(&tenant));
        assert_eq!(breaker.failures(&tenant), 0);
    }

    #[tokio::test]
    async fn test_success_breaks_the_streak() {
        let breaker = breaker();
        let tenant = TenantId::new("g1");
        for _ in 0..4 {
            breaker.record_failure(&tenant);
        }
        breaker.record_success(&tenant);
        assert_eq!(breaker.record_failure(&tenant), 1);
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let breaker = breaker();
        let a = TenantId::new("a");
        let b = TenantId::new("b");
        for _ in 0..5 {
            breaker.record_failure(&a);
        }
        assert!(breaker.is_open(&a));
        assert!(!breaker.is_open(&b));
        assert_eq!(breaker.failures(&b), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_streak_starts_over() {
        let breaker = breaker();
        let tenant = TenantId::new("g1");
        for _ in 0..4 {
            breaker.record_failure(&tenant);
        }
        tokio::time::advance(BreakerConfig::default().failure_window() + Duration::from_secs(1))
            .await;
        assert_eq!(breaker.failures(&tenant), 0);
        assert_eq!(breaker.record_failure(&tenant), 1);
    }

    #[test]
    fn test_zero_threshold_is_clamped() {
        let config = BreakerConfig {
            failure_threshold: 0,
            ..BreakerConfig::default()
        };
        assert_eq!(CircuitBreaker::new(&config).threshold(), 1);
    }
}
