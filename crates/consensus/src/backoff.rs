//! Capped exponential backoff

use rand::Rng;
use std::time::Duration;

/// Delay generator for reconnects and fetch retries
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    jitter: f64,
    current: Duration,
    attempts: u32,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64, jitter: f64) -> Self {
        Self {
            initial,
            max,
            multiplier: multiplier.max(1.0),
            jitter: jitter.clamp(0.0, 1.0),
            current: initial,
            attempts: 0,
        }
    }

    /// Delay to wait now; advances the schedule
    pub fn next_delay(&mut self) -> Duration {
        let base = self.current.min(self.max);
        self.attempts += 1;
        self.current = base.mul_f64(self.multiplier).min(self.max);

        if self.jitter > 0.0 {
            let spread = rand::thread_rng().gen_range(0.0..=self.jitter);
            base.mul_f64(1.0 + spread).min(self.max)
        } else {
            base
        }
    }

    /// Delays handed out since the last reset
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn reset(&mut self) {
        self.current = self.initial;
        self.attempts = 0;
    }
}
