//! Exponential backoff for reconnection attempts
//!
//! The delay starts at the configured minimum, is multiplied by the growth
//! factor after every scheduled attempt, and never exceeds the maximum.
//! A successful open resets it to the minimum.
//!
//! ```rust
//! use mopidy_client::ExponentialBackoff;
//! use std::time::Duration;
//!
//! let mut backoff = ExponentialBackoff::new(Duration::from_secs(1), Duration::from_secs(4));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(1));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(2));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(4));
//! assert_eq!(backoff.next_delay(), Duration::from_secs(4));
//!
//! backoff.reset();
//! assert_eq!(backoff.next_delay(), Duration::from_secs(1));
//! ```

use std::time::Duration;

/// Exponential backoff with an optional jitter
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    min_delay: Duration,
    max_delay: Duration,
    factor: u32,
    jitter: bool,
    current: Duration,
}

impl ExponentialBackoff {
    /// Doubling backoff between `min_delay` and `max_delay`
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay,
            factor: 2,
            jitter: false,
            current: min_delay,
        }
    }

    /// Set the growth factor applied after each attempt
    pub fn with_factor(mut self, factor: u32) -> Self {
        self.factor = factor;
        self
    }

    /// Add up to 25% random delay to each attempt to spread out clients
    ///
    /// The stored progression is unaffected; only the returned delay varies.
    pub fn with_jitter(mut self) -> Self {
        self.jitter = true;
        self
    }

    /// Delay to use for the attempt being scheduled now, then grow
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self
            .current
            .checked_mul(self.factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay);

        if self.jitter {
            use rand::Rng;
            let spread = delay.as_millis() as u64 / 4;
            let extra = rand::thread_rng().gen_range(0..=spread);
            return delay + Duration::from_millis(extra);
        }
        delay
    }

    /// Delay the next attempt would use, without advancing
    pub fn peek(&self) -> Duration {
        self.current
    }

    pub fn reset(&mut self) {
        self.current = self.min_delay;
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    pub fn max_delay(&self) -> Duration {
        self.max_delay
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(1000), Duration::from_millis(64000))
    }
}
