use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::config::RetryConfig;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    exponential_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_delay: config.initial_delay,
            max_delay: config.max_delay.max(config.initial_delay),
            exponential_base: config.exponential_base.max(1.0),
        }
    }
}

impl RetryPolicy {
    /// Same delay between every attempt.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: delay,
            max_delay: delay,
            exponential_base: 1.0,
        }
    }

    pub fn exponential(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: max_delay.max(initial_delay),
            exponential_base: 2.0,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay slept after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.exponential_base.powi(attempt.saturating_sub(1) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        std::cmp::min(self.max_delay, Duration::from_secs_f64(delay))
    }

    /// Runs `operation` until it succeeds or `max_attempts` attempts have failed,
    /// returning the last error in that case.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 1;

        loop {
            match operation().await {
                Ok(result) => return Ok(result),
                Err(err) if attempt >= self.max_attempts => {
                    warn!("Operation failed after {} attempts: {}", self.max_attempts, err);
                    return Err(err);
                }
                Err(err) => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        "Operation failed (attempt {}/{}): {}, retrying in {:?}",
                        attempt, self.max_attempts, err, delay
                    );
                    sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}
