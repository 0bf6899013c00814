use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Delay inserted between transcript fetch attempts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackoffPolicy {
    /// Same pause for every attempt
    Fixed { seconds: f64 },
    /// `base_seconds * attempt`, e.g. 5s, 10s, 15s
    Linear { base_seconds: f64 },
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        BackoffPolicy::Fixed { seconds: 1.0 }
    }
}

impl BackoffPolicy {
    /// Delay associated with a 1-based attempt number
    pub fn delay(&self, attempt: u32) -> Duration {
        let seconds = match *self {
            BackoffPolicy::Fixed { seconds } => seconds,
            BackoffPolicy::Linear { base_seconds } => base_seconds * f64::from(attempt),
        };

        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::ZERO)
    }

    /// Sum of the delays for attempts `1..=attempts`
    pub fn total(&self, attempts: u32) -> Duration {
        (1..=attempts).map(|attempt| self.delay(attempt)).sum()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let value = match *self {
            BackoffPolicy::Fixed { seconds } => seconds,
            BackoffPolicy::Linear { base_seconds } => base_seconds,
        };

        if !value.is_finite() || value < 0.0 {
            anyhow::bail!("Backoff delay must be a non-negative number of seconds, got {}", value);
        }

        Ok(())
    }
}

impl std::fmt::Display for BackoffPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackoffPolicy::Fixed { seconds } => write!(f, "fixed {}s", seconds),
            BackoffPolicy::Linear { base_seconds } => write!(f, "linear {}s * attempt", base_seconds),
        }
    }
}
