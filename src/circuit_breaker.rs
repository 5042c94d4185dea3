// Per-provider circuit breaker. A provider that keeps failing is skipped for a
// cool-down period instead of being called on every search.

use std::time::Duration;

use serde::Deserialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub success_threshold: u32,
    pub open_duration_ms: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            open_duration_ms: 30_000,
        }
    }
}

pub struct CircuitBreaker {
    provider: String,
    failure_threshold: u32,
    success_threshold: u32,
    open_duration: Duration,
    state: State,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen { successes: u32 },
}

impl CircuitBreaker {
    pub fn new(provider: &str, config: &CircuitBreakerConfig) -> Self {
        Self {
            provider: provider.to_string(),
            failure_threshold: config.failure_threshold.max(1),
            success_threshold: config.success_threshold.max(1),
            open_duration: Duration::from_millis(config.open_duration_ms),
            state: State::Closed { failures: 0 },
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, State::Closed { .. })
    }

    pub fn is_open(&self) -> bool {
        matches!(self.state, State::Open { .. })
    }

    /// Whether the provider may be called now. An open breaker whose
    /// cool-down has elapsed lets a trial call through.
    pub fn should_allow_call(&mut self) -> bool {
        let State::Open { opened_at } = self.state else {
            return true;
        };

        if opened_at.elapsed() < self.open_duration {
            return false;
        }

        debug!(provider = %self.provider, "circuit half-open, allowing a trial call");
        self.state = State::HalfOpen { successes: 0 };
        true
    }

    pub fn success(&mut self) {
        self.state = match self.state {
            State::HalfOpen { successes } if successes + 1 >= self.success_threshold => {
                info!(provider = %self.provider, "circuit closed, provider recovered");
                State::Closed { failures: 0 }
            }
            State::HalfOpen { successes } => State::HalfOpen {
                successes: successes + 1,
            },
            State::Closed { .. } => State::Closed { failures: 0 },
            open @ State::Open { .. } => open,
        };
    }

    pub fn fail(&mut self) {
        self.state = match self.state {
            State::Closed { failures } if failures + 1 < self.failure_threshold => State::Closed {
                failures: failures + 1,
            },
            State::Closed { .. } | State::HalfOpen { .. } => {
                warn!(
                    provider = %self.provider,
                    cool_down_ms = self.open_duration.as_millis() as u64,
                    "circuit opened"
                );
                State::Open {
                    opened_at: Instant::now(),
                }
            }
            open @ State::Open { .. } => open,
        };
    }
}
