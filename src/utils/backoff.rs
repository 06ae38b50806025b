use std::time::Duration;

/// Budget for waiting on an externally resolved condition.
#[derive(Clone, Debug, PartialEq)]
pub struct PollConfig {
    /// Total time allowed before giving up
    pub timeout: Duration,
    /// Delay after the first unresolved read
    pub initial_interval: Duration,
    /// Upper bound for the delay between reads
    pub max_interval: Duration,
    /// Multiplier applied to the delay after each unresolved read
    pub multiplier: f64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(120),
            initial_interval: Duration::from_millis(500),
            max_interval: Duration::from_secs(5),
            multiplier: 2.0,
        }
    }
}

impl PollConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff {
            next: self.initial_interval,
            max: self.max_interval,
            multiplier: self.multiplier.max(1.0),
        }
    }
}

/// Exponential delay sequence capped at `max`.
#[derive(Clone, Debug)]
pub struct Backoff {
    next: Duration,
    max: Duration,
    multiplier: f64,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next.min(self.max);
        self.next = Duration::from_secs_f64(
            (self.next.as_secs_f64() * self.multiplier).min(self.max.as_secs_f64()),
        );
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_grow_and_cap() {
        let config = PollConfig {
            timeout: Duration::from_secs(10),
            initial_interval: Duration::from_millis(100),
            max_interval: Duration::from_millis(350),
            multiplier: 2.0,
        };
        let delays: Vec<_> = config.backoff().take(4).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(350),
                Duration::from_millis(350),
            ]
        );
    }

    #[test]
    fn multiplier_below_one_does_not_shrink_delays() {
        let config = PollConfig {
            multiplier: 0.5,
            ..PollConfig::default()
        };
        let delays: Vec<_> = config.backoff().take(3).collect();
        assert!(delays.iter().all(|d| *d == config.initial_interval));
    }
}
