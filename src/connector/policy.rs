/// Reconnect policy
///
/// `Fixed` retries forever at a constant delay. `Exponential` grows the delay
/// per consecutive failed attempt, randomizes it by a jitter fraction and can
/// give up after a number of failures.
use std::time::Duration;

use rand::Rng;

use crate::config::ConnectorConfig;

#[derive(Debug, Clone, PartialEq)]
pub enum ReconnectPolicy {
    Fixed(Duration),
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
        /// Fraction of the delay randomized in both directions
        jitter: f64,
        /// Give up after this many consecutive failed attempts
        max_attempts: Option<u32>,
    },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy::Fixed(Duration::from_secs(5))
    }
}

impl ReconnectPolicy {
    pub fn from_config(cfg: &ConnectorConfig) -> Self {
        if !cfg.backoff.enabled {
            return ReconnectPolicy::Fixed(cfg.reconnect_delay());
        }
        ReconnectPolicy::Exponential {
            initial: cfg.reconnect_delay(),
            max: Duration::from_millis(cfg.backoff.max_delay_ms),
            multiplier: cfg.backoff.multiplier,
            jitter: cfg.backoff.jitter,
            max_attempts: match cfg.backoff.max_attempts {
                0 => None,
                n => Some(n),
            },
        }
    }

    /// Delay before the next attempt, `None` to give up
    ///
    /// `failures` counts consecutive failed attempts since the last
    /// successful connect (0 right after an established session dropped).
    pub fn next_delay(&self, failures: u32) -> Option<Duration> {
        match self {
            ReconnectPolicy::Fixed(delay) => Some(*delay),
            ReconnectPolicy::Exponential {
                initial,
                max,
                multiplier,
                jitter,
                max_attempts,
            } => {
                if let Some(limit) = max_attempts {
                    if failures >= *limit {
                        return None;
                    }
                }

                let exponent = failures.min(i32::MAX as u32) as i32;
                let base = initial.as_secs_f64() * multiplier.powi(exponent);
                let capped = base.min(max.as_secs_f64());

                let jittered = if *jitter > 0.0 {
                    let spread = capped * jitter;
                    rand::thread_rng().gen_range((capped - spread)..=(capped + spread))
                } else {
                    capped
                };

                Some(Duration::from_secs_f64(jittered.clamp(0.0, max.as_secs_f64())))
            }
        }
    }
}
