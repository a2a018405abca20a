//! Retry and failure-budget policies shared by the driver and the monitors.

use std::time::Duration;

/// Delay schedule between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// Same delay after every failed attempt.
    Fixed(Duration),
    /// Delay doubles after each failed attempt, capped at `max`.
    Exponential { initial: Duration, max: Duration },
}

/// Bounded retry policy for a single platform operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first one. Never less than 1.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Fixed(delay),
        }
    }

    pub fn exponential(max_attempts: u32, initial: Duration, max: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff: Backoff::Exponential { initial, max },
        }
    }

    /// Retry immediately. Used by tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::fixed(max_attempts, Duration::ZERO)
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        match self.backoff {
            Backoff::Fixed(delay) => delay,
            Backoff::Exponential { initial, max } => {
                let shift = attempt.saturating_sub(1).min(16);
                initial.saturating_mul(1u32 << shift).min(max)
            }
        }
    }

    /// Attempt numbers `1..=max_attempts`.
    pub fn attempts(&self) -> impl Iterator<Item = u32> {
        1..=self.max_attempts.max(1)
    }

    pub fn is_last(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(3, Duration::from_millis(50))
    }
}

/// Outcome of recording a failure against a [`FailureBudget`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetState {
    Within { consecutive: u32 },
    Exhausted,
}

/// Counts consecutive failures; any success resets the count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureBudget {
    limit: u32,
    consecutive: u32,
}

impl FailureBudget {
    pub fn new(limit: u32) -> Self {
        Self {
            limit: limit.max(1),
            consecutive: 0,
        }
    }

    pub fn record_failure(&mut self) -> BudgetState {
        self.consecutive = self.consecutive.saturating_add(1);
        if self.consecutive >= self.limit {
            BudgetState::Exhausted
        } else {
            BudgetState::Within {
                consecutive: self.consecutive,
            }
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}
