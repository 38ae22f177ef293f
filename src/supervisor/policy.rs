use std::time::Duration;

use rand::Rng;

/// When and how often a dead encoder is started again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartPolicy {
    /// Delay before the first restart after an exit.
    pub base_delay: Duration,
    /// Delay used while an input file is missing.
    pub asset_retry_delay: Duration,
    /// `0` keeps the delay constant at `base_delay`.
    pub max_backoff_exponent: u32,
    pub max_delay: Duration,
    /// Equal jitter: half the delay plus a random share of the other half.
    pub jitter: bool,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
    /// A child that stayed live this long resets the attempt counter.
    pub stable_after: Duration,
}

impl Default for RestartPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            asset_retry_delay: Duration::from_secs(10),
            max_backoff_exponent: 0,
            max_delay: Duration::from_secs(300),
            jitter: false,
            max_attempts: None,
            stable_after: Duration::from_secs(60),
        }
    }
}

impl RestartPolicy {
    /// Delay = base_delay * 2^min(attempt, max_backoff_exponent), capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(self.max_backoff_exponent));
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if self.jitter {
            equal_jitter(delay)
        } else {
            delay
        }
    }

    pub const fn has_exceeded_max_attempts(&self, attempts: u32) -> bool {
        if let Some(max_attempts) = self.max_attempts {
            attempts >= max_attempts
        } else {
            false
        }
    }
}

fn equal_jitter(delay: Duration) -> Duration {
    let half = delay / 2;
    let spread = u64::try_from(half.as_millis()).unwrap_or(u64::MAX);
    half + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}
