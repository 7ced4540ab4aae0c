//! Negative-Cache Policy
//!
//! A fixed table mapping an error kind to how long a "this lookup fails"
//! result should be cached, and whether a miss on that kind should trigger
//! background warmup (spec §4.6).

use std::sync::Arc;

/// How long a negative entry survives, and whether a miss should kick off
/// background warmup.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NegativePolicyEntry {
    pub ttl_seconds: i64,
    pub warmup: bool,
}

/// Looks up the fixed policy for an error kind. Unknown kinds fall back to
/// a 60s TTL with no warmup (spec §4.6).
pub fn policy_for(error_type: &str) -> NegativePolicyEntry {
    match error_type {
        "symbol-not-found" => NegativePolicyEntry { ttl_seconds: 60, warmup: false },
        "backend-unavailable" => NegativePolicyEntry { ttl_seconds: 15, warmup: false },
        "workspace-not-ready" => NegativePolicyEntry { ttl_seconds: 10, warmup: true },
        "timeout" => NegativePolicyEntry { ttl_seconds: 5, warmup: false },
        "index-not-found" => NegativePolicyEntry { ttl_seconds: 60, warmup: false },
        "parse-error" => NegativePolicyEntry { ttl_seconds: 60, warmup: false },
        _ => NegativePolicyEntry { ttl_seconds: 60, warmup: false },
    }
}

/// Callback invoked after a negative-cache entry whose policy sets
/// `warmup = true` has been persisted. Invocation is fire-and-forget: the
/// store never waits on it (spec §6).
pub trait WarmupSink: Send + Sync {
    fn warm(&self, error_type: &str, key: &str, state_id: &str);
}

pub type SharedWarmupSink = Arc<dyn WarmupSink>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_error_kind_still_gets_a_policy() {
        let entry = policy_for("something_nobody_registered");
        assert_eq!(entry.ttl_seconds, 60);
        assert!(!entry.warmup);
    }

    #[test]
    fn only_workspace_not_ready_requests_warmup() {
        assert!(policy_for("workspace-not-ready").warmup);
        assert!(!policy_for("symbol-not-found").warmup);
        assert!(!policy_for("backend-unavailable").warmup);
        assert!(!policy_for("timeout").warmup);
        assert!(!policy_for("index-not-found").warmup);
        assert!(!policy_for("parse-error").warmup);
    }

    #[test]
    fn ttls_match_the_fixed_table() {
        assert_eq!(policy_for("symbol-not-found").ttl_seconds, 60);
        assert_eq!(policy_for("backend-unavailable").ttl_seconds, 15);
        assert_eq!(policy_for("workspace-not-ready").ttl_seconds, 10);
        assert_eq!(policy_for("timeout").ttl_seconds, 5);
        assert_eq!(policy_for("index-not-found").ttl_seconds, 60);
        assert_eq!(policy_for("parse-error").ttl_seconds, 60);
    }
}
