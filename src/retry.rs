use std::time::Duration;

/// How often to retry something and when to give up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, delay: Duration) -> Self {
        RetryPolicy { max_attempts, delay }
    }

    /// True once `attempts` has used up the budget.
    pub fn exhausted(&self, attempts: u32) -> bool {
        attempts >= self.max_attempts
    }

    /// Total time the policy may spend waiting.
    pub fn budget(&self) -> Duration {
        self.delay * self.max_attempts
    }
}
