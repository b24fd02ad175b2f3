/// Retry policy for bet and cash-out actions
/// Pure mapping from (attempt count, error class) to a retry decision

use std::time::Duration;

use crate::error::ErrorClass;
use crate::settings::{BET_MAX_RETRIES, BET_RETRY_DELAY, CASHOUT_MAX_RETRIES, CASHOUT_RETRY_DELAY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryAfter(Duration),
    GiveUp,
}

/// Bounded fixed-delay retry of timing errors only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Additional attempts after the first one
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const PLACE_BET: RetryPolicy = RetryPolicy {
        max_retries: BET_MAX_RETRIES,
        delay: BET_RETRY_DELAY,
    };

    pub const CASHOUT: RetryPolicy = RetryPolicy {
        max_retries: CASHOUT_MAX_RETRIES,
        delay: CASHOUT_RETRY_DELAY,
    };

    /// `attempt` is the number of attempts already made (1 after the first failure)
    pub fn decide(&self, attempt: u32, class: ErrorClass) -> RetryDecision {
        if class != ErrorClass::Timing {
            return RetryDecision::GiveUp;
        }
        if attempt == 0 || attempt > self.max_retries {
            return RetryDecision::GiveUp;
        }
        RetryDecision::RetryAfter(self.delay)
    }

    /// Upper bound on attempts, including the first
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bet_timing_retried_twice() {
        let policy = RetryPolicy::PLACE_BET;
        assert_eq!(
            policy.decide(1, ErrorClass::Timing),
            RetryDecision::RetryAfter(Duration::from_millis(500))
        );
        assert_eq!(
            policy.decide(2, ErrorClass::Timing),
            RetryDecision::RetryAfter(Duration::from_millis(500))
        );
        assert_eq!(policy.decide(3, ErrorClass::Timing), RetryDecision::GiveUp);
        assert_eq!(policy.max_attempts(), 3);
    }

    #[test]
    fn test_cashout_uses_tighter_delay() {
        assert_eq!(
            RetryPolicy::CASHOUT.decide(1, ErrorClass::Timing),
            RetryDecision::RetryAfter(Duration::from_millis(200))
        );
        assert_eq!(RetryPolicy::CASHOUT.decide(3, ErrorClass::Timing), RetryDecision::GiveUp);
    }

    #[test]
    fn test_non_timing_errors_never_retried() {
        for class in [
            ErrorClass::TransientNetwork,
            ErrorClass::Validation,
            ErrorClass::DataCorruption,
            ErrorClass::TerminalConnectivity,
            ErrorClass::Rejected,
        ] {
            assert_eq!(RetryPolicy::PLACE_BET.decide(1, class), RetryDecision::GiveUp);
            assert_eq!(RetryPolicy::CASHOUT.decide(1, class), RetryDecision::GiveUp);
        }
    }

    #[test]
    fn test_attempt_zero_gives_up() {
        assert_eq!(RetryPolicy::PLACE_BET.decide(0, ErrorClass::Timing), RetryDecision::GiveUp);
    }
}
