use std::time::Duration;

/// Capped exponential delay sequence with an optional attempt budget
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    max_attempts: Option<u32>,
    current_attempt: u32,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            multiplier: 2.0,
            max_attempts: None,
            current_attempt: 0,
        }
    }

    /// Constant interval polling
    pub fn fixed(interval: Duration) -> Self {
        Self::new(interval, interval).with_multiplier(1.0)
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = if self.current_attempt == 0 {
            self.initial.min(self.max)
        } else {
            let factor = self.multiplier.powi(self.current_attempt as i32);
            let delay_ms = (self.initial.as_millis() as f64 * factor).min(self.max.as_millis() as f64);
            Duration::from_millis(delay_ms as u64)
        };

        self.current_attempt = self.current_attempt.saturating_add(1);
        delay
    }

    /// No attempts left in the budget
    pub fn is_exhausted(&self) -> bool {
        self.max_attempts
            .map(|max| self.current_attempt >= max)
            .unwrap_or(false)
    }

    pub fn reset(&mut self) {
        self.current_attempt = 0;
    }

    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_millis(500), Duration::from_secs(10))
    }
}
