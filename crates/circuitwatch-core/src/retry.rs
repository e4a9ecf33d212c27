//! Bounded retry policy for write-path calls.
//!
//! I/O calls report an explicit [`WriteOutcome`] instead of relying on error
//! propagation to short-circuit retries. The async driver lives with the
//! caller; this module only decides.

use std::time::Duration;

/// Default number of attempts for a write.
pub const DEFAULT_WRITE_ATTEMPTS: u32 = 2;

/// Default fixed delay between attempts (milliseconds).
pub const DEFAULT_WRITE_BACKOFF_MS: u64 = 300;

/// Result of one write attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome<T, E> {
    Success(T),
    /// Worth retrying (network, timeout, 5xx, rate limit).
    Transient(E),
    /// Retrying cannot help (rejected request, bad schema).
    Terminal(E),
}

impl<T, E> WriteOutcome<T, E> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// What to do after an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Done,
    RetryAfter(Duration),
    GiveUp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first (clamped to at least 1).
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_WRITE_ATTEMPTS,
            backoff: Duration::from_millis(DEFAULT_WRITE_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// Decide after attempt number `attempt` (1-based) produced `outcome`.
    pub fn decide<T, E>(&self, attempt: u32, outcome: &WriteOutcome<T, E>) -> RetryDecision {
        match outcome {
            WriteOutcome::Success(_) => RetryDecision::Done,
            WriteOutcome::Terminal(_) => RetryDecision::GiveUp,
            WriteOutcome::Transient(_) if attempt < self.attempts.max(1) => {
                RetryDecision::RetryAfter(self.backoff)
            }
            WriteOutcome::Transient(_) => RetryDecision::GiveUp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type Outcome = WriteOutcome<(), &'static str>;

    #[test]
    fn default_policy_is_two_attempts_300ms() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.attempts, 2);
        assert_eq!(policy.backoff, Duration::from_millis(300));
    }

    #[test]
    fn transient_retries_until_exhausted() {
        let policy = RetryPolicy::default();
        let outcome: Outcome = WriteOutcome::Transient("timeout");
        assert_eq!(
            policy.decide(1, &outcome),
            RetryDecision::RetryAfter(Duration::from_millis(300))
        );
        assert_eq!(policy.decide(2, &outcome), RetryDecision::GiveUp);
    }

    #[test]
    fn terminal_never_retries() {
        let policy = RetryPolicy::default();
        let outcome: Outcome = WriteOutcome::Terminal("rejected");
        assert_eq!(policy.decide(1, &outcome), RetryDecision::GiveUp);
    }

    #[test]
    fn success_is_done() {
        let outcome: Outcome = WriteOutcome::Success(());
        assert!(outcome.is_success());
        assert_eq!(RetryPolicy::default().decide(1, &outcome), RetryDecision::Done);
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let policy = RetryPolicy {
            attempts: 0,
            backoff: Duration::ZERO,
        };
        let outcome: Outcome = WriteOutcome::Transient("x");
        assert_eq!(policy.decide(1, &outcome), RetryDecision::GiveUp);
    }
}
