// Flight availability aggregation: provider adapters, scatter-gather fan-out,
// a TTL cache in front of it, and filter/sort over the merged catalog.

pub mod aggregator;
pub mod cache;
pub mod circuit_breaker;
pub mod config;
pub mod filter;
pub mod mock_provider;
pub mod model;
pub mod providers;
pub mod service;
pub mod sort;
pub mod time_format;

// Re-export key types for convenience
pub use aggregator::{AggregatedFlights, Aggregator, AggregatorError};
pub use cache::{cache_key, CacheConfig, CacheError, CacheStats, CacheStore, TtlCache};
pub use crate::config::{AggregatorConfig, ConfigError, ProviderEndpoints, ServiceConfig};
pub use filter::apply_filters;
pub use model::{
    AggregationResult, CabinClass, ErrorCode, FilterOptions, FilterRequest, Flight, Metadata,
    SearchCriteria, SortBy, SortOptions, SortOrder,
};
pub use providers::{FlightProvider, ProviderError};
pub use service::{FlightSearchService, SearchError};
pub use sort::{apply_sort, score_best_value};
