use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{flight_id, normalize_cabin, read_json, transport_error, FlightProvider, ProviderError};
use crate::{
    model::{Airline, Baggage, Flight, FlightDuration, LocationTime, Price, SearchCriteria},
    time_format::parse_provider_time,
};

pub const PROVIDER_NAME: &str = "Garuda Indonesia";
const SEARCH_PATH: &str = "/garuda/v1/flights/search";

#[derive(Debug, Deserialize)]
pub struct GarudaResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub flights: Vec<GarudaFlight>,
}

#[derive(Debug, Deserialize)]
pub struct GarudaFlight {
    pub flight_id: String,
    pub airline: String,
    pub airline_code: String,
    pub departure: GarudaLocation,
    pub arrival: GarudaLocation,
    pub duration_minutes: u32,
    #[serde(default)]
    pub stops: u32,
    #[serde(default)]
    pub aircraft: String,
    pub price: GarudaPrice,
    pub available_seats: u32,
    pub fare_class: String,
    #[serde(default)]
    pub baggage: GarudaBaggage,
    #[serde(default)]
    pub amenities: Vec<String>,
    #[serde(default)]
    pub segments: Vec<GarudaSegment>,
}

#[derive(Debug, Deserialize)]
pub struct GarudaLocation {
    pub airport: String,
    #[serde(default)]
    pub city: String,
    pub time: String,
    #[serde(default)]
    pub terminal: String,
}

#[derive(Debug, Deserialize)]
pub struct GarudaPrice {
    pub amount: u64,
    pub currency: String,
}

// Allowances in kilograms
#[derive(Debug, Default, Deserialize)]
pub struct GarudaBaggage {
    #[serde(default)]
    pub carry_on: u32,
    #[serde(default)]
    pub checked: u32,
}

#[derive(Debug, Deserialize)]
pub struct GarudaSegment {
    pub flight_number: String,
    pub departure: GarudaLocation,
    pub arrival: GarudaLocation,
}

pub struct GarudaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl GarudaProvider {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FlightProvider for GarudaProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Flight>, ProviderError> {
        let url = format!("{}{}", self.base_url, SEARCH_PATH);

        let response = self
            .client
            .post(&url)
            .json(criteria)
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER_NAME, e))?;

        let body: GarudaResponse = read_json(PROVIDER_NAME, response).await?;
        let flights = map_response(body)?;
        debug!(provider = PROVIDER_NAME, flights = flights.len(), "normalized flights");
        Ok(flights)
    }
}

pub fn map_response(response: GarudaResponse) -> Result<Vec<Flight>, ProviderError> {
    if let Some(status) = response.status.as_deref() {
        if !status.eq_ignore_ascii_case("success") {
            return Err(ProviderError::Rejected {
                provider: PROVIDER_NAME.to_string(),
                reason: format!("status {}", status),
            });
        }
    }

    response.flights.iter().map(map_flight).collect()
}

fn map_flight(raw: &GarudaFlight) -> Result<Flight, ProviderError> {
    let timestamp = |source| ProviderError::Timestamp {
        provider: PROVIDER_NAME.to_string(),
        flight: raw.flight_id.clone(),
        source,
    };

    // Multi-leg itineraries end where the last segment lands
    let final_arrival = raw
        .segments
        .last()
        .map(|segment| &segment.arrival)
        .unwrap_or(&raw.arrival);

    let departure_at = parse_provider_time(&raw.departure.time, None).map_err(timestamp)?;
    let arrival_at = parse_provider_time(&final_arrival.time, None).map_err(timestamp)?;

    let stops = raw
        .stops
        .max(raw.segments.len().saturating_sub(1) as u32);

    Ok(Flight {
        id: flight_id(&raw.flight_id, &raw.airline),
        provider: PROVIDER_NAME.to_string(),
        airline: Airline {
            name: raw.airline.clone(),
            code: raw.airline_code.clone(),
        },
        flight_number: raw.flight_id.clone(),
        departure: LocationTime::new(
            &raw.departure.airport,
            Some(&raw.departure.city),
            departure_at,
        ),
        arrival: LocationTime::new(
            &final_arrival.airport,
            Some(&final_arrival.city),
            arrival_at,
        ),
        duration: FlightDuration::from_minutes(raw.duration_minutes),
        stops,
        price: Price {
            amount: raw.price.amount,
            currency: raw.price.currency.clone(),
        },
        available_seats: raw.available_seats,
        cabin_class: normalize_cabin(&raw.fare_class),
        aircraft: raw.aircraft.clone(),
        amenities: raw.amenities.clone(),
        baggage: Baggage {
            carry_on: format!("Cabin: {} kg", raw.baggage.carry_on),
            checked: format!("Checked: {} kg", raw.baggage.checked),
        },
        best_value_score: None,
    })
}
