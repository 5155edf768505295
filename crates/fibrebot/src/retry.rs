use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::errors::AutomationError;

/// Bounded retry with exponential backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub multiplier: f64,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            multiplier,
        }
    }

    /// Project search: 3 attempts, waiting 5s, 10s, 20s after each failure.
    pub fn search(base_delay: Duration) -> Self {
        Self::new(3, base_delay, 2.0)
    }

    /// In-place click retries against transient page races.
    pub fn click(delay: Duration) -> Self {
        Self::new(3, delay, 1.0)
    }

    /// Delay after the failed attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.base_delay.mul_f64(self.multiplier.powi(exponent))
    }

    /// Run `op` until it succeeds, `should_retry` rejects the error, or the
    /// attempts run out. Returns the last error.
    pub async fn run<T, F, Fut, P>(
        &self,
        label: &str,
        should_retry: P,
        mut op: F,
    ) -> Result<T, AutomationError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, AutomationError>>,
        P: Fn(&AutomationError) -> bool,
    {
        let mut attempt = 1;
        loop {
            match op(attempt).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("{} succeeded on attempt {}", label, attempt);
                    }
                    return Ok(value);
                }
                Err(e) if attempt < self.max_attempts && should_retry(&e) => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{} attempt {}/{} failed: {}. Retrying in {:?}",
                        label, attempt, self.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}
