use std::time;

#[derive(Copy, Clone, Debug)]
/// The polling policy the launcher uses to space out readiness probe attempts.
pub struct PollPolicy {
    /// Coefficient to multiply initial_interval with for every failed attempt. 1 keeps the delay fixed.
    backoff_coefficient: u32,
    /// The delay after the first failed attempt.
    initial_interval: time::Duration,
    /// The maximum possible delay between attempts.
    maximum_interval: Option<time::Duration>,
    /// How long the launcher may wait overall before giving up. None waits forever.
    deadline: Option<time::Duration>,
}

impl PollPolicy {
    pub fn new(
        backoff_coefficient: u32,
        initial_interval: time::Duration,
        maximum_interval: Option<time::Duration>,
        deadline: Option<time::Duration>,
    ) -> Self {
        Self {
            backoff_coefficient,
            initial_interval,
            maximum_interval,
            deadline,
        }
    }

    /// A fixed delay between attempts and no deadline.
    pub fn fixed(interval: time::Duration) -> Self {
        Self::new(1, interval, None, None)
    }

    pub fn with_deadline(self, deadline: time::Duration) -> Self {
        Self {
            deadline: Some(deadline),
            ..self
        }
    }

    pub fn deadline(&self) -> Option<time::Duration> {
        self.deadline
    }

    /// Calculate the delay to wait after the given failed attempt (1-based).
    pub fn interval_for(&self, attempt: u32) -> time::Duration {
        let exponent = attempt.saturating_sub(1);
        let candidate_interval = self
            .backoff_coefficient
            .checked_pow(exponent)
            .and_then(|factor| self.initial_interval.checked_mul(factor));

        match (candidate_interval, self.maximum_interval) {
            (Some(interval), Some(max_interval)) => std::cmp::min(interval, max_interval),
            (Some(interval), None) => interval,
            (None, Some(max_interval)) => max_interval,
            (None, None) => time::Duration::MAX,
        }
    }

    /// Whether `elapsed` has reached the deadline. Always false without one.
    pub fn deadline_passed(&self, elapsed: time::Duration) -> bool {
        match self.deadline {
            Some(deadline) => elapsed >= deadline,
            None => false,
        }
    }

    /// Time left until the deadline, or None when waiting forever.
    pub fn remaining(&self, elapsed: time::Duration) -> Option<time::Duration> {
        self.deadline.map(|deadline| deadline.saturating_sub(elapsed))
    }

    /// Shorten `duration` so it ends no later than the deadline.
    pub fn clamp_to_deadline(
        &self,
        elapsed: time::Duration,
        duration: time::Duration,
    ) -> time::Duration {
        match self.remaining(elapsed) {
            Some(remaining) => std::cmp::min(duration, remaining),
            None => duration,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::fixed(time::Duration::from_secs(1))
    }
}
