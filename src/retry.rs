//! Retry policy and error classification.
//!
//! Pure, dependency-free: the server consults this to answer worker error
//! reports with a retry directive, and conceptually the orchestrator consults
//! the same classifier when deciding whether to relaunch a worker.

use std::collections::HashSet;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Recoverable,
    NonRecoverable,
}

static RECOVERABLE_ERRORS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "network_error",
        "rate_limit",
        "test_flake",
        "dependency_timeout",
        "resource_unavailable",
    ]
    .into_iter()
    .collect()
});

static NON_RECOVERABLE_ERRORS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "test_failure",
        "build_failure",
        "merge_conflict",
        "invalid_manifest",
        "authentication_failed",
        "validation_error",
        "missing_dependency",
    ]
    .into_iter()
    .collect()
});

/// Classify an error kind. Unknown kinds default to non-recoverable (fail-safe) —
/// never parameterize this default away.
pub fn classify_error(error_type: &str) -> ErrorCategory {
    if RECOVERABLE_ERRORS.contains(error_type) {
        ErrorCategory::Recoverable
    } else {
        ErrorCategory::NonRecoverable
    }
}

/// Exponential backoff policy for retry attempts.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub backoff_base_secs: u64,
    pub backoff_multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            backoff_base_secs: 30,
            backoff_multiplier: 2,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &crate::config::RetrySection) -> Self {
        Self {
            max_retries: cfg.max_retries,
            backoff_base_secs: cfg.base_secs,
            backoff_multiplier: cfg.multiplier,
        }
    }

    /// Delay in seconds for a 1-indexed retry attempt, or 0 once attempts are exhausted.
    ///
    /// delay(attempt) = base * multiplier^(attempt-1), for 1 <= attempt <= max_retries.
    pub fn retry_delay_secs(&self, attempt: u32) -> u64 {
        if attempt == 0 || attempt > self.max_retries {
            return 0;
        }
        self.backoff_base_secs * self.backoff_multiplier.pow(attempt - 1) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_kinds_classify_as_recoverable() {
        for kind in [
            "network_error",
            "rate_limit",
            "test_flake",
            "dependency_timeout",
            "resource_unavailable",
        ] {
            assert_eq!(classify_error(kind), ErrorCategory::Recoverable, "{kind}");
        }
    }

    #[test]
    fn non_recoverable_kinds_classify_as_non_recoverable() {
        for kind in [
            "test_failure",
            "build_failure",
            "merge_conflict",
            "invalid_manifest",
            "authentication_failed",
            "validation_error",
            "missing_dependency",
        ] {
            assert_eq!(classify_error(kind), ErrorCategory::NonRecoverable, "{kind}");
        }
    }

    #[test]
    fn unknown_kind_defaults_to_non_recoverable() {
        assert_eq!(classify_error("something_new"), ErrorCategory::NonRecoverable);
    }

    #[test]
    fn default_backoff_matches_documented_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retry_delay_secs(1), 30);
        assert_eq!(policy.retry_delay_secs(2), 60);
        assert_eq!(policy.retry_delay_secs(3), 0);
    }

    #[test]
    fn zero_attempt_has_no_delay() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.retry_delay_secs(0), 0);
    }

    #[test]
    fn custom_policy_scales_with_multiplier() {
        let policy = RetryPolicy {
            max_retries: 3,
            backoff_base_secs: 10,
            backoff_multiplier: 3,
        };
        assert_eq!(policy.retry_delay_secs(1), 10);
        assert_eq!(policy.retry_delay_secs(2), 30);
        assert_eq!(policy.retry_delay_secs(3), 90);
        assert_eq!(policy.retry_delay_secs(4), 0);
    }
}
