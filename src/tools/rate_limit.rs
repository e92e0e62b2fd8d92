//! Per-tool soft rate limiting (§4.1). Default: 3 invocations per step
//! window. A "window" is scoped by the caller (a step id, or a
//! `skill:tool` pair for skill-invoked tools per §4.8).

use dashmap::DashMap;
use std::sync::atomic::{AtomicU32, Ordering};

pub struct RateLimiter {
    limit: u32,
    counters: DashMap<(String, String), AtomicU32>,
}

impl RateLimiter {
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            counters: DashMap::new(),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Increments the counter for (scope, tool) and returns whether the call
    /// is still within budget.
    pub fn try_acquire(&self, scope: &str, tool_name: &str) -> bool {
        let key = (scope.to_string(), tool_name.to_string());
        let entry = self
            .counters
            .entry(key)
            .or_insert_with(|| AtomicU32::new(0));
        let prev = entry.fetch_add(1, Ordering::SeqCst);
        prev < self.limit
    }

    pub fn reset_scope(&self, scope: &str) {
        self.counters.retain(|(s, _), _| s != scope);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allows_up_to_limit_then_rejects() {
        let limiter = RateLimiter::new(3);
        assert!(limiter.try_acquire("step-1", "web_fetch"));
        assert!(limiter.try_acquire("step-1", "web_fetch"));
        assert!(limiter.try_acquire("step-1", "web_fetch"));
        assert!(!limiter.try_acquire("step-1", "web_fetch"));
    }

    #[test]
    fn scopes_are_independent() {
        let limiter = RateLimiter::new(1);
        assert!(limiter.try_acquire("step-1", "web_fetch"));
        assert!(limiter.try_acquire("step-2", "web_fetch"));
    }
}
