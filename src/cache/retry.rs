use std::time::Duration;

/// Bounded retry with linear backoff: attempt `n` waits `base_delay * n`
/// before attempt `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  max_attempts: u32,
  base_delay: Duration,
}

impl RetryPolicy {
  /// `max_attempts` counts the first try; values below 1 are raised to 1.
  pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
    Self {
      max_attempts: max_attempts.max(1),
      base_delay,
    }
  }

  /// A single attempt.
  pub fn none() -> Self {
    Self::new(1, Duration::ZERO)
  }

  /// Retries without sleeping in between.
  pub fn immediate(max_attempts: u32) -> Self {
    Self::new(max_attempts, Duration::ZERO)
  }

  pub fn max_attempts(&self) -> u32 {
    self.max_attempts
  }

  /// Delay after the failed attempt number `attempt` (1-based).
  pub fn delay_after(&self, attempt: u32) -> Duration {
    self.base_delay * attempt
  }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self::new(3, Duration::from_millis(500))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_linear_backoff() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.max_attempts(), 3);
    assert_eq!(policy.delay_after(1), Duration::from_millis(500));
    assert_eq!(policy.delay_after(2), Duration::from_secs(1));
  }

  #[test]
  fn test_at_least_one_attempt() {
    assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    assert_eq!(RetryPolicy::none().max_attempts(), 1);
    assert_eq!(RetryPolicy::immediate(4).delay_after(3), Duration::ZERO);
  }
}
