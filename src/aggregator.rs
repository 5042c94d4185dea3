// Scatter-gather across all registered providers under one shared deadline.
// A provider failure never fails the search; it is recorded in the metadata.

use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::{
    task::JoinSet,
    time::{timeout_at, Duration, Instant},
};
use tracing::{debug, error, warn};

use crate::{
    circuit_breaker::CircuitBreaker,
    config::AggregatorConfig,
    model::{Flight, Metadata, ProviderFailure, SearchCriteria},
    providers::{FlightProvider, ProviderError},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregatorError {
    #[error("no flight providers registered")]
    NoProviders,
}

// Flights merged in provider registration order, plus the fan-out summary
#[derive(Debug, Clone, PartialEq)]
pub struct AggregatedFlights {
    pub flights: Vec<Flight>,
    pub metadata: Metadata,
}

pub struct Aggregator {
    providers: Vec<Arc<dyn FlightProvider>>,
    breakers: Vec<Option<Mutex<CircuitBreaker>>>,
    timeout: Duration,
}

impl Aggregator {
    pub fn new(
        providers: Vec<Arc<dyn FlightProvider>>,
        config: &AggregatorConfig,
    ) -> Result<Self, AggregatorError> {
        if providers.is_empty() {
            return Err(AggregatorError::NoProviders);
        }

        let breakers = providers
            .iter()
            .map(|provider| {
                config
                    .circuit_breaker
                    .as_ref()
                    .map(|cfg| Mutex::new(CircuitBreaker::new(provider.name(), cfg)))
            })
            .collect();

        Ok(Self {
            providers,
            breakers,
            timeout: config.timeout(),
        })
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// Query every provider concurrently and merge what arrives before the
    /// deadline. Providers still running at the deadline are cancelled and
    /// reported as timeouts.
    pub async fn search(&self, criteria: &SearchCriteria) -> AggregatedFlights {
        let started = Instant::now();
        let deadline = started + self.timeout;

        let mut slots: Vec<Option<Result<Vec<Flight>, ProviderError>>> =
            (0..self.providers.len()).map(|_| None).collect();
        let mut join_set = JoinSet::new();

        for (index, provider) in self.providers.iter().enumerate() {
            if !self.allow_call(index) {
                slots[index] = Some(Err(ProviderError::CircuitOpen {
                    provider: provider.name().to_string(),
                }));
                continue;
            }

            let provider = Arc::clone(provider);
            let criteria = criteria.clone();
            join_set.spawn(async move {
                let result = match timeout_at(deadline, provider.search(&criteria)).await {
                    Ok(result) => result,
                    Err(_) => Err(ProviderError::DeadlineExceeded {
                        provider: provider.name().to_string(),
                    }),
                };
                (index, result)
            });
        }

        // Every task is bounded by the deadline, so draining the set cannot outlive it
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!(error = %e, "provider task did not complete"),
            }
        }

        let mut flights = Vec::new();
        let mut provider_errors = Vec::new();
        let mut providers_succeeded = 0;

        for (index, slot) in slots.into_iter().enumerate() {
            let name = self.providers[index].name();
            let result = slot.unwrap_or_else(|| {
                Err(ProviderError::TaskFailed {
                    provider: name.to_string(),
                    reason: "task panicked or was cancelled".to_string(),
                })
            });

            match result {
                Ok(mut found) => {
                    self.record_outcome(index, true);
                    debug!(provider = name, flights = found.len(), "provider succeeded");
                    providers_succeeded += 1;
                    flights.append(&mut found);
                }
                Err(err) => {
                    if !matches!(err, ProviderError::CircuitOpen { .. }) {
                        self.record_outcome(index, false);
                    }
                    warn!(
                        provider = name,
                        code = err.code().as_str(),
                        error = %err,
                        "provider failed"
                    );
                    provider_errors.push(ProviderFailure {
                        provider: name.to_string(),
                        code: err.code(),
                    });
                }
            }
        }

        let metadata = Metadata {
            total_results: flights.len(),
            providers_queried: self.providers.len(),
            providers_succeeded,
            providers_failed: provider_errors.len(),
            provider_errors,
            search_time_ms: started.elapsed().as_millis() as u64,
            cache_hit: false,
            cache_key: String::new(),
        };

        AggregatedFlights { flights, metadata }
    }

    fn allow_call(&self, index: usize) -> bool {
        match &self.breakers[index] {
            Some(breaker) => breaker.lock().should_allow_call(),
            None => true,
        }
    }

    fn record_outcome(&self, index: usize, succeeded: bool) {
        if let Some(breaker) = &self.breakers[index] {
            let mut breaker = breaker.lock();
            if succeeded {
                breaker.success();
            } else {
                breaker.fail();
            }
        }
    }
}
