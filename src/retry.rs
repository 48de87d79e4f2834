//! Retry and pacing policies
//!
//! `RetryPolicy` describes the whole-run retry budget for discovery: a
//! bounded number of attempts with a backoff drawn uniformly from a range
//! that widens on every attempt (e.g. [10s,15s], then [10s,20s]).
//! `Pacing` is the mandatory jittered delay between pairs that keeps the
//! crawl under the source's rate limits.

use rand::Rng;
use std::time::Duration;
use tokio::time::sleep;

/// Uniformly sample a duration in `[min, max]`
pub fn jitter_between(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let millis = rand::thread_rng().gen_range(min.as_millis() as u64..=max.as_millis() as u64);
    Duration::from_millis(millis)
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first
    pub max_attempts: u32,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    /// Added to the top of the range on each subsequent attempt
    pub backoff_spread: Duration,
}

impl RetryPolicy {
    /// Backoff window before retry number `attempt` (0-based)
    pub fn backoff_range(&self, attempt: u32) -> (Duration, Duration) {
        (self.backoff_min, self.backoff_max + self.backoff_spread * attempt)
    }
}

#[derive(Debug)]
pub struct MaxRetriesExceeded;

impl std::fmt::Display for MaxRetriesExceeded {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Maximum retry attempts exceeded")
    }
}

impl std::error::Error for MaxRetriesExceeded {}

/// Stateful retry bookkeeping over a `RetryPolicy`
#[derive(Debug)]
pub struct RetrySchedule {
    policy: RetryPolicy,
    current_attempt: u32,
}

impl RetrySchedule {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            current_attempt: 0,
        }
    }

    /// Backoffs performed so far
    pub fn retries_made(&self) -> u32 {
        self.current_attempt
    }

    /// Sleep for the next jittered backoff window, or fail once another
    /// attempt would exceed the policy budget.
    pub async fn sleep(&mut self) -> Result<(), MaxRetriesExceeded> {
        if self.current_attempt + 1 >= self.policy.max_attempts {
            return Err(MaxRetriesExceeded);
        }

        let (min, max) = self.policy.backoff_range(self.current_attempt);
        let delay = jitter_between(min, max);

        log::warn!(
            "⏳ Retry {} of {} in {:.1}s",
            self.current_attempt + 1,
            self.policy.max_attempts - 1,
            delay.as_secs_f64()
        );

        sleep(delay).await;
        self.current_attempt += 1;
        Ok(())
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }
}

/// Mandatory jittered delay applied after each pair
#[derive(Debug, Clone)]
pub struct Pacing {
    pub min: Duration,
    pub max: Duration,
}

impl Pacing {
    pub async fn pause(&self) {
        let delay = jitter_between(self.min, self.max);
        log::debug!("Pacing for {}ms", delay.as_millis());
        sleep(delay).await;
    }
}
