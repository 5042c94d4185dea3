// Backend adapters. Each adapter owns its wire format and hands back flights
// already normalized; the aggregator only ever sees `Flight` values.

pub mod airasia;
pub mod batik;
pub mod garuda;
pub mod lionair;

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::{
    config::ProviderEndpoints,
    model::{ErrorCode, Flight, SearchCriteria},
    time_format::TimeFormatError,
};

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("{provider}: request failed: {source}")]
    Http {
        provider: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider}: backend returned status {status}")]
    Status { provider: String, status: u16 },

    #[error("{provider}: search rejected: {reason}")]
    Rejected { provider: String, reason: String },

    #[error("{provider}: failed to decode response: {source}")]
    Decode {
        provider: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{provider}: bad timestamp on flight {flight}: {source}")]
    Timestamp {
        provider: String,
        flight: String,
        #[source]
        source: TimeFormatError,
    },

    #[error("{provider}: invalid {field} on flight {flight}")]
    InvalidField {
        provider: String,
        flight: String,
        field: &'static str,
    },

    #[error("{provider}: no answer before the aggregation deadline")]
    DeadlineExceeded { provider: String },

    #[error("{provider}: circuit breaker open")]
    CircuitOpen { provider: String },

    #[error("{provider}: search task failed: {reason}")]
    TaskFailed { provider: String, reason: String },
}

impl ProviderError {
    /// Public classification reported in search metadata.
    pub fn code(&self) -> ErrorCode {
        match self {
            ProviderError::DeadlineExceeded { .. } => ErrorCode::Timeout,
            ProviderError::Http { source, .. } if source.is_timeout() => ErrorCode::Timeout,
            _ => ErrorCode::InternalFailure,
        }
    }

    pub fn provider(&self) -> &str {
        match self {
            ProviderError::Http { provider, .. }
            | ProviderError::Status { provider, .. }
            | ProviderError::Rejected { provider, .. }
            | ProviderError::Decode { provider, .. }
            | ProviderError::Timestamp { provider, .. }
            | ProviderError::InvalidField { provider, .. }
            | ProviderError::DeadlineExceeded { provider }
            | ProviderError::CircuitOpen { provider }
            | ProviderError::TaskFailed { provider, .. } => provider,
        }
    }
}

/// A flight-inventory backend.
///
/// `search` must never return a partially normalized flight: a record that
/// cannot be normalized fails the whole call.
#[async_trait]
pub trait FlightProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Flight>, ProviderError>;
}

pub fn http_client(timeout: Duration) -> Result<reqwest::Client, reqwest::Error> {
    reqwest::Client::builder().timeout(timeout).build()
}

// The four production backends in registration order
pub fn default_providers(
    endpoints: &ProviderEndpoints,
    client: reqwest::Client,
) -> Vec<Arc<dyn FlightProvider>> {
    vec![
        Arc::new(garuda::GarudaProvider::new(
            client.clone(),
            &endpoints.garuda_base_url,
        )),
        Arc::new(lionair::LionAirProvider::new(
            client.clone(),
            &endpoints.lionair_base_url,
        )),
        Arc::new(batik::BatikProvider::new(
            client.clone(),
            &endpoints.batik_base_url,
        )),
        Arc::new(airasia::AirAsiaProvider::new(
            client,
            &endpoints.airasia_base_url,
        )),
    ]
}

// Query parameters for the GET-style backends
pub(crate) fn search_query(criteria: &SearchCriteria) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("origin", criteria.origin.to_ascii_uppercase()),
        ("destination", criteria.destination.to_ascii_uppercase()),
        ("departure_date", criteria.departure_date.to_string()),
        ("passengers", criteria.passengers.to_string()),
        ("cabin_class", criteria.cabin_class.as_str().to_string()),
    ];
    if let Some(return_date) = criteria.return_date {
        query.push(("return_date", return_date.to_string()));
    }
    query
}

pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: &str,
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ProviderError::Status {
            provider: provider.to_string(),
            status: status.as_u16(),
        });
    }

    let body = response.text().await.map_err(|source| ProviderError::Http {
        provider: provider.to_string(),
        source,
    })?;

    serde_json::from_str(&body).map_err(|source| ProviderError::Decode {
        provider: provider.to_string(),
        source,
    })
}

pub(crate) fn transport_error(provider: &str, source: reqwest::Error) -> ProviderError {
    ProviderError::Http {
        provider: provider.to_string(),
        source,
    }
}

pub(crate) fn flight_id(flight_number: &str, airline_name: &str) -> String {
    format!("{}_{}", flight_number, airline_name)
}

pub(crate) fn normalize_cabin(raw: &str) -> String {
    raw.trim().to_ascii_lowercase()
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::NaiveDate;

    use crate::model::{CabinClass, SearchCriteria};

    pub fn criteria() -> SearchCriteria {
        SearchCriteria::one_way(
            "CGK",
            "DPS",
            NaiveDate::from_ymd_opt(2025, 12, 15).unwrap(),
            1,
            CabinClass::Economy,
        )
    }
}
