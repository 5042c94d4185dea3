// Cache-first search service. Serves merged results from the cache when
// present, otherwise fans out to the providers and repopulates the cache in
// the background.

use std::sync::Arc;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::{
    aggregator::{AggregatedFlights, Aggregator, AggregatorError},
    cache::{cache_key, CacheError, CacheStore},
    config::ServiceConfig,
    filter::apply_filters,
    model::{AggregationResult, FilterRequest, SearchCriteria, ValidationError},
    providers::{default_providers, http_client},
    sort::apply_sort,
};

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("invalid search: {0}")]
    Validation(#[from] ValidationError),

    #[error("flight fetch failed: {0}")]
    Fetch(#[from] AggregatorError),

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("failed to build http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}

impl SearchError {
    // Stable code for a transport layer to put on the wire
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::Validation(_) => "VALIDATION_ERROR",
            SearchError::Fetch(_) | SearchError::Cache(_) | SearchError::HttpClient(_) => {
                "INTERNAL_FAILURE"
            }
        }
    }
}

pub struct FlightSearchService {
    aggregator: Arc<Aggregator>,
    cache: Arc<dyn CacheStore>,
    config: ServiceConfig,
}

impl FlightSearchService {
    pub fn new(aggregator: Arc<Aggregator>, cache: Arc<dyn CacheStore>, config: ServiceConfig) -> Self {
        Self {
            aggregator,
            cache,
            config,
        }
    }

    /// Wire the four production backends behind one shared HTTP client.
    pub fn from_config(config: ServiceConfig, cache: Arc<dyn CacheStore>) -> Result<Self, SearchError> {
        let client = http_client(config.http_timeout())?;
        let providers = default_providers(&config.endpoints, client);
        let aggregator = Aggregator::new(providers, &config.aggregator)?;

        info!(
            providers = ?aggregator.provider_names(),
            timeout_ms = config.aggregator.timeout_ms,
            "flight search service ready"
        );

        Ok(Self::new(Arc::new(aggregator), cache, config))
    }

    pub async fn search(&self, criteria: &SearchCriteria) -> Result<AggregationResult, SearchError> {
        criteria.validate()?;
        self.get_or_fetch(criteria).await
    }

    /// Search, then narrow and order the merged catalog. Metadata counts the
    /// flights that survived filtering and times this request alone.
    pub async fn filter_flights(&self, request: &FilterRequest) -> Result<AggregationResult, SearchError> {
        let started = Instant::now();
        request.criteria.validate()?;

        let mut result = self.get_or_fetch(&request.criteria).await?;

        if let Some(filters) = &request.filters {
            result.flights = apply_filters(&result.flights, filters);
        }
        if let Some(sort) = &request.sort {
            result.flights = apply_sort(&result.flights, sort);
        }

        result.metadata.total_results = result.flights.len();
        result.metadata.search_time_ms = started.elapsed().as_millis() as u64;

        Ok(result)
    }

    /// Serve from cache when possible. A cache that errors or holds an
    /// unreadable entry is treated as a miss.
    pub async fn get_or_fetch(&self, criteria: &SearchCriteria) -> Result<AggregationResult, SearchError> {
        let started = Instant::now();
        let key = cache_key(criteria);

        match self.cache.get(&key).await {
            Ok(Some(raw)) => match serde_json::from_str::<AggregationResult>(&raw) {
                Ok(mut cached) => {
                    info!(cache_key = %key, "cache hit");
                    // The key ignores airport case; echo this request's criteria
                    cached.search_criteria = criteria.clone();
                    cached.metadata.cache_hit = true;
                    cached.metadata.cache_key = key;
                    return Ok(cached);
                }
                Err(e) => {
                    warn!(cache_key = %key, error = %e, "discarding unreadable cache entry");
                }
            },
            Ok(None) => info!(cache_key = %key, "cache miss"),
            Err(e) => warn!(cache_key = %key, error = %e, "cache read failed, fetching fresh"),
        }

        let AggregatedFlights { flights, mut metadata } = self.aggregator.search(criteria).await;
        metadata.search_time_ms = started.elapsed().as_millis() as u64;
        metadata.cache_hit = false;
        metadata.cache_key = key.clone();

        let result = AggregationResult {
            search_criteria: criteria.clone(),
            metadata,
            flights,
        };

        self.write_back(key, &result);

        Ok(result)
    }

    pub async fn invalidate_cache(&self, criteria: &SearchCriteria) -> Result<bool, SearchError> {
        let key = cache_key(criteria);
        let removed = self.cache.delete(&key).await?;
        info!(cache_key = %key, removed, "cache invalidated");
        Ok(removed)
    }

    // Detached from the caller so a dropped request still populates the
    // cache, but bounded by its own timeout.
    fn write_back(&self, key: String, result: &AggregationResult) {
        let payload = match serde_json::to_string(result) {
            Ok(payload) => payload,
            Err(e) => {
                error!(cache_key = %key, error = %e, "failed to serialize search result");
                return;
            }
        };

        let cache = Arc::clone(&self.cache);
        let ttl = self.config.cache_ttl();
        let write_timeout = self.config.cache_write_timeout();
        let flights = result.flights.len();

        tokio::spawn(async move {
            match tokio::time::timeout(write_timeout, cache.set(&key, payload, ttl)).await {
                Ok(Ok(())) => debug!(
                    cache_key = %key,
                    ttl_secs = ttl.as_secs(),
                    flights,
                    "cached search result"
                ),
                Ok(Err(e)) => error!(cache_key = %key, error = %e, "failed to write search result to cache"),
                Err(_) => error!(cache_key = %key, "cache write timed out"),
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::{CacheConfig, TtlCache},
        config::AggregatorConfig,
        mock_provider::{sample_flight, MockProvider, ServerMode},
        model::{CabinClass, ErrorCode, FilterOptions, SortBy, SortOptions, SortOrder},
        providers::FlightProvider,
    };
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration, Utc};
    use std::time::Duration;

    fn criteria() -> SearchCriteria {
        // Always in the future so validation passes regardless of the clock
        let departure = (Utc::now() + ChronoDuration::days(30)).date_naive();
        SearchCriteria::one_way("CGK", "DPS", departure, 1, CabinClass::Economy)
    }

    fn departure(raw: &str) -> DateTime<chrono::FixedOffset> {
        DateTime::parse_from_rfc3339(raw).unwrap()
    }

    fn providers() -> (Arc<MockProvider>, Arc<MockProvider>) {
        let garuda = MockProvider::with_flights(
            "Garuda Indonesia",
            vec![
                sample_flight("Garuda Indonesia", "GA", "GA400", 1_250_000, 110, 0, departure("2025-12-15T06:00:00+07:00")),
                sample_flight("Garuda Indonesia", "GA", "GA315", 1_850_000, 260, 1, departure("2025-12-15T14:00:00+07:00")),
            ],
        );
        let lion = MockProvider::with_flights(
            "Lion Air",
            vec![
                sample_flight("Lion Air", "JT", "JT740", 950_000, 105, 0, departure("2025-12-15T05:30:00+07:00")),
                sample_flight("Lion Air", "JT", "JT650", 780_000, 230, 1, departure("2025-12-15T16:20:00+07:00")),
            ],
        );
        (garuda, lion)
    }

    fn registered(list: Vec<Arc<MockProvider>>) -> Vec<Arc<dyn FlightProvider>> {
        list.into_iter()
            .map(|p| p as Arc<dyn FlightProvider>)
            .collect()
    }

    fn service_with(
        providers: Vec<Arc<dyn FlightProvider>>,
        cache: Arc<dyn CacheStore>,
        config: ServiceConfig,
    ) -> FlightSearchService {
        let aggregator = Aggregator::new(providers, &config.aggregator).unwrap();
        FlightSearchService::new(Arc::new(aggregator), cache, config)
    }

    fn config(ttl_minutes: u64) -> ServiceConfig {
        ServiceConfig {
            cache_ttl_minutes: ttl_minutes,
            aggregator: AggregatorConfig {
                timeout_ms: 1_000,
                circuit_breaker: None,
            },
            ..Default::default()
        }
    }

    // Poll until the detached write-back task has landed
    async fn wait_for_entry(cache: &TtlCache, key: &str) {
        for _ in 0..100 {
            if cache.stats().items_count > 0 && cache.get(key).await.unwrap().is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("cache entry {} was never written", key);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_hit_then_expiry_refetches() {
        let (garuda, lion) = providers();
        let cache = Arc::new(TtlCache::new(CacheConfig::default()));
        let service = service_with(
            registered(vec![garuda.clone(), lion.clone()]),
            cache.clone(),
            config(5),
        );

        let first = service.search(&criteria()).await.unwrap();
        assert!(!first.metadata.cache_hit);
        assert_eq!(first.flights.len(), 4);
        wait_for_entry(&cache, &first.metadata.cache_key).await;

        tokio::time::advance(Duration::from_secs(4 * 60)).await;
        let second = service.search(&criteria()).await.unwrap();
        assert!(second.metadata.cache_hit);
        assert_eq!(second.metadata.cache_key, first.metadata.cache_key);
        assert_eq!(second.flights, first.flights);
        assert_eq!(garuda.request_count(), 1);

        tokio::time::advance(Duration::from_secs(2 * 60)).await;
        let third = service.search(&criteria()).await.unwrap();
        assert!(!third.metadata.cache_hit);
        assert_eq!(garuda.request_count(), 2);
        assert_eq!(lion.request_count(), 2);
    }

    #[tokio::test]
    async fn test_validation_rejects_before_any_call() {
        let (garuda, lion) = providers();
        let cache = Arc::new(TtlCache::default());
        let service = service_with(registered(vec![garuda.clone(), lion]), cache.clone(), config(15));

        let mut bad = criteria();
        bad.destination = "CGK".to_string();
        let err = service.search(&bad).await.unwrap_err();
        assert!(matches!(err, SearchError::Validation(_)));
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let mut bad = criteria();
        bad.passengers = 0;
        tokio_test::assert_err!(service.search(&bad).await);

        assert_eq!(garuda.request_count(), 0);
        assert_eq!(cache.stats().miss_count, 0);
        assert_eq!(cache.stats().hit_count, 0);
    }

    #[tokio::test]
    async fn test_partial_failure_is_cached_as_success() {
        let (garuda, lion) = providers();
        lion.set_mode(ServerMode::CompleteOutage);
        let cache = Arc::new(TtlCache::default());
        let service = service_with(registered(vec![garuda, lion]), cache.clone(), config(15));

        let result = service.search(&criteria()).await.unwrap();
        assert_eq!(result.flights.len(), 2);
        assert_eq!(result.metadata.providers_failed, 1);
        assert_eq!(result.metadata.provider_errors[0].code, ErrorCode::InternalFailure);

        wait_for_entry(&cache, &result.metadata.cache_key).await;
        let cached = service.search(&criteria()).await.unwrap();
        assert!(cached.metadata.cache_hit);
        assert_eq!(cached.metadata.provider_errors, result.metadata.provider_errors);
    }

    struct BrokenCache;

    #[async_trait]
    impl CacheStore for BrokenCache {
        async fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }

        async fn delete(&self, _key: &str) -> Result<bool, CacheError> {
            Err(CacheError::Unavailable("connection refused".to_string()))
        }
    }

    // Delegates to an in-memory cache after sleeping on every write
    struct SlowCache {
        inner: Arc<TtlCache>,
        write_delay: Duration,
    }

    #[async_trait]
    impl CacheStore for SlowCache {
        async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), CacheError> {
            tokio::time::sleep(self.write_delay).await;
            self.inner.set(key, value, ttl).await
        }

        async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> Result<bool, CacheError> {
            self.inner.delete(key).await
        }
    }

    fn slow_cache(write_delay: Duration) -> (Arc<TtlCache>, Arc<SlowCache>) {
        let inner = Arc::new(TtlCache::default());
        let slow = Arc::new(SlowCache {
            inner: inner.clone(),
            write_delay,
        });
        (inner, slow)
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_cache_write_does_not_delay_response() {
        let (garuda, lion) = providers();
        let (inner, slow) = slow_cache(Duration::from_secs(2));
        let service = service_with(registered(vec![garuda, lion]), slow, config(15));

        let started = Instant::now();
        let result = service.search(&criteria()).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(inner.fetch(&result.metadata.cache_key).is_none());

        // The write outlives the service that started it
        drop(service);
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(inner.fetch(&result.metadata.cache_key).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cache_write_past_its_timeout_is_abandoned() {
        let (garuda, lion) = providers();
        let (inner, slow) = slow_cache(Duration::from_secs(10));
        let config = ServiceConfig {
            cache_write_timeout_secs: 1,
            ..config(15)
        };
        let service = service_with(registered(vec![garuda.clone(), lion]), slow, config);

        let result = service.search(&criteria()).await.unwrap();
        tokio::time::sleep(Duration::from_secs(15)).await;

        assert!(inner.fetch(&result.metadata.cache_key).is_none());
        assert_eq!(inner.stats().items_count, 0);

        let again = service.search(&criteria()).await.unwrap();
        assert!(!again.metadata.cache_hit);
        assert_eq!(garuda.request_count(), 2);
    }

    #[tokio::test]
    async fn test_cache_hit_echoes_request_criteria() {
        let (garuda, lion) = providers();
        let cache = Arc::new(TtlCache::default());
        let service = service_with(registered(vec![garuda.clone(), lion]), cache.clone(), config(15));

        let first = service.search(&criteria()).await.unwrap();
        wait_for_entry(&cache, &first.metadata.cache_key).await;

        let mut lowercase = criteria();
        lowercase.origin = "cgk".to_string();
        lowercase.destination = "dps".to_string();

        let hit = service.search(&lowercase).await.unwrap();
        assert!(hit.metadata.cache_hit);
        assert_eq!(hit.metadata.cache_key, first.metadata.cache_key);
        assert_eq!(hit.search_criteria, lowercase);
        assert_eq!(garuda.request_count(), 1);
    }

    #[tokio::test]
    async fn test_cache_failures_degrade_to_fresh_fetch() {
        let (garuda, lion) = providers();
        let service = service_with(registered(vec![garuda.clone(), lion]), Arc::new(BrokenCache), config(15));

        let first = service.search(&criteria()).await.unwrap();
        let second = service.search(&criteria()).await.unwrap();
        assert!(!first.metadata.cache_hit);
        assert!(!second.metadata.cache_hit);
        assert_eq!(second.flights.len(), 4);
        assert_eq!(garuda.request_count(), 2);

        let err = service.invalidate_cache(&criteria()).await.unwrap_err();
        assert_eq!(err.code(), "INTERNAL_FAILURE");
    }

    #[tokio::test]
    async fn test_unreadable_cache_entry_is_a_miss() {
        let (garuda, lion) = providers();
        let cache = Arc::new(TtlCache::default());
        let key = cache_key(&criteria());
        cache
            .set(&key, "{not json".to_string(), Duration::from_secs(60))
            .await
            .unwrap();

        let service = service_with(registered(vec![garuda.clone(), lion]), cache, config(15));
        let result = service.search(&criteria()).await.unwrap();
        assert!(!result.metadata.cache_hit);
        assert_eq!(garuda.request_count(), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch() {
        let (garuda, lion) = providers();
        let cache = Arc::new(TtlCache::default());
        let service = service_with(registered(vec![garuda.clone(), lion]), cache.clone(), config(15));

        let first = service.search(&criteria()).await.unwrap();
        wait_for_entry(&cache, &first.metadata.cache_key).await;

        assert!(service.invalidate_cache(&criteria()).await.unwrap());
        assert!(!service.invalidate_cache(&criteria()).await.unwrap());

        let again = service.search(&criteria()).await.unwrap();
        assert!(!again.metadata.cache_hit);
        assert_eq!(garuda.request_count(), 2);
    }

    #[tokio::test]
    async fn test_filter_request_reports_total_after_filtering() {
        let (garuda, lion) = providers();
        let cache = Arc::new(TtlCache::default());
        let service = service_with(registered(vec![garuda, lion]), cache, config(15));

        let request = FilterRequest {
            criteria: criteria(),
            filters: Some(FilterOptions {
                max_stops: Some(0),
                ..Default::default()
            }),
            sort: Some(SortOptions {
                by: SortBy::BestValue,
                order: SortOrder::Desc,
            }),
        };

        let result = service.filter_flights(&request).await.unwrap();
        assert_eq!(result.metadata.total_results, 2);
        assert_eq!(result.metadata.providers_succeeded, 2);
        let numbers: Vec<&str> = result.flights.iter().map(|f| f.flight_number.as_str()).collect();
        assert_eq!(numbers, vec!["JT740", "GA400"]);
        assert!(result.flights.iter().all(|f| f.best_value_score.is_some()));
    }

    #[test]
    fn test_from_config_registers_production_backends() {
        let service =
            FlightSearchService::from_config(ServiceConfig::default(), Arc::new(TtlCache::default())).unwrap();
        assert_eq!(
            service.aggregator.provider_names(),
            vec!["Garuda Indonesia", "Lion Air", "Batik Air", "AirAsia"]
        );
    }

    #[tokio::test]
    async fn test_filter_request_without_modifiers_returns_catalog() {
        let (garuda, lion) = providers();
        let service = service_with(registered(vec![garuda, lion]), Arc::new(TtlCache::default()), config(15));

        let request = FilterRequest {
            criteria: criteria(),
            filters: None,
            sort: None,
        };
        let result = service.filter_flights(&request).await.unwrap();
        assert_eq!(result.metadata.total_results, 4);
        assert!(result.flights.iter().all(|f| f.best_value_score.is_none()));
    }
}
