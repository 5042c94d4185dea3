// Normalized flight search types shared by the adapters, the aggregator and the query service

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::time_format;

pub const MIN_PASSENGERS: u32 = 1;
pub const MAX_PASSENGERS: u32 = 9;

// Rejections raised before any cache or backend call is made
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid {field} airport code: {value:?} (expected 3 letters)")]
    InvalidAirportCode { field: &'static str, value: String },

    #[error("origin and destination must differ: {0}")]
    SameOriginAndDestination(String),

    #[error("departure date {date} is before {today}")]
    DepartureInPast { date: NaiveDate, today: NaiveDate },

    #[error("return date {return_date} is before departure date {departure_date}")]
    ReturnBeforeDeparture {
        departure_date: NaiveDate,
        return_date: NaiveDate,
    },

    #[error("passenger count {0} is outside 1..=9")]
    PassengersOutOfRange(u32),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CabinClass {
    #[default]
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl CabinClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            CabinClass::Economy => "economy",
            CabinClass::PremiumEconomy => "premium_economy",
            CabinClass::Business => "business",
            CabinClass::First => "first",
        }
    }
}

/// One inbound search. Never mutated after construction; it is both the
/// query input and the seed of the cache key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    pub origin: String,
    pub destination: String,
    pub departure_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_date: Option<NaiveDate>,
    pub passengers: u32,
    #[serde(default)]
    pub cabin_class: CabinClass,
}

impl SearchCriteria {
    pub fn one_way(
        origin: &str,
        destination: &str,
        departure_date: NaiveDate,
        passengers: u32,
        cabin_class: CabinClass,
    ) -> Self {
        Self {
            origin: origin.to_string(),
            destination: destination.to_string(),
            departure_date,
            return_date: None,
            passengers,
            cabin_class,
        }
    }

    pub fn with_return(mut self, return_date: NaiveDate) -> Self {
        self.return_date = Some(return_date);
        self
    }

    // Validate against the current UTC calendar date
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_at(Utc::now().date_naive())
    }

    pub fn validate_at(&self, today: NaiveDate) -> Result<(), ValidationError> {
        check_airport_code("origin", &self.origin)?;
        check_airport_code("destination", &self.destination)?;

        if self.origin.eq_ignore_ascii_case(&self.destination) {
            return Err(ValidationError::SameOriginAndDestination(
                self.origin.to_ascii_uppercase(),
            ));
        }

        if self.departure_date < today {
            return Err(ValidationError::DepartureInPast {
                date: self.departure_date,
                today,
            });
        }

        if let Some(return_date) = self.return_date {
            if return_date < self.departure_date {
                return Err(ValidationError::ReturnBeforeDeparture {
                    departure_date: self.departure_date,
                    return_date,
                });
            }
        }

        if !(MIN_PASSENGERS..=MAX_PASSENGERS).contains(&self.passengers) {
            return Err(ValidationError::PassengersOutOfRange(self.passengers));
        }

        Ok(())
    }
}

fn check_airport_code(field: &'static str, code: &str) -> Result<(), ValidationError> {
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(())
    } else {
        Err(ValidationError::InvalidAirportCode {
            field,
            value: code.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Airline {
    pub name: String,
    pub code: String,
}

// An airport plus the absolute instant, kept in the offset the provider reported
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationTime {
    pub airport: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub city: Option<String>,
    pub datetime: DateTime<FixedOffset>,
    pub timestamp: i64,
}

impl LocationTime {
    pub fn new(airport: &str, city: Option<&str>, datetime: DateTime<FixedOffset>) -> Self {
        Self {
            airport: airport.to_string(),
            city: city.filter(|c| !c.is_empty()).map(str::to_string),
            datetime,
            timestamp: datetime.timestamp(),
        }
    }

    // Local wall-clock time at the airport
    pub fn local_time(&self) -> NaiveTime {
        self.datetime.time()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightDuration {
    pub total_minutes: u32,
    pub formatted: String,
}

impl FlightDuration {
    pub fn from_minutes(total_minutes: u32) -> Self {
        Self {
            total_minutes,
            formatted: time_format::format_minutes(total_minutes),
        }
    }
}

// Amount in minor units of the currency
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Price {
    pub amount: u64,
    pub currency: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Baggage {
    #[serde(default)]
    pub carry_on: String,
    #[serde(default)]
    pub checked: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Flight {
    pub id: String,
    pub provider: String,
    pub airline: Airline,
    pub flight_number: String,
    pub departure: LocationTime,
    pub arrival: LocationTime,
    pub duration: FlightDuration,
    pub stops: u32,
    pub price: Price,
    pub available_seats: u32,
    pub cabin_class: String,
    #[serde(default)]
    pub aircraft: String,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub baggage: Baggage,
    // Only populated when sorting by best value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub best_value_score: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Timeout,
    InternalFailure,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::InternalFailure => "INTERNAL_FAILURE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: String,
    pub code: ErrorCode,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub total_results: usize,
    pub providers_queried: usize,
    pub providers_succeeded: usize,
    pub providers_failed: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provider_errors: Vec<ProviderFailure>,
    #[serde(default)]
    pub search_time_ms: u64,
    #[serde(default)]
    pub cache_hit: bool,
    #[serde(default)]
    pub cache_key: String,
}

/// The merged payload of one search. This is the unit written to the cache;
/// a refresh replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationResult {
    pub search_criteria: SearchCriteria,
    pub metadata: Metadata,
    pub flights: Vec<Flight>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub low: u64,
    pub high: u64,
}

// Inclusive local time-of-day window, written as "HH:MM" on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    #[serde(with = "time_format::hhmm")]
    pub from: NaiveTime,
    #[serde(with = "time_format::hhmm")]
    pub to: NaiveTime,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_range: Option<PriceRange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_stops: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub departure_time: Option<TimeWindow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arrival_time: Option<TimeWindow>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub airlines: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    Price,
    Duration,
    DepartureTime,
    ArrivalTime,
    BestValue,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortOptions {
    pub by: SortBy,
    #[serde(default)]
    pub order: SortOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterRequest {
    #[serde(flatten)]
    pub criteria: SearchCriteria,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filters: Option<FilterOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<SortOptions>,
}
