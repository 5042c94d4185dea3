use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{flight_id, normalize_cabin, read_json, transport_error, FlightProvider, ProviderError};
use crate::{
    model::{Airline, Baggage, Flight, FlightDuration, LocationTime, Price, SearchCriteria},
    time_format::parse_provider_time,
};

pub const PROVIDER_NAME: &str = "AirAsia";
const SEARCH_PATH: &str = "/airasia/v1/flights/search";

#[derive(Debug, Deserialize)]
pub struct AirAsiaResponse {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub flights: Vec<AirAsiaFlight>,
}

#[derive(Debug, Deserialize)]
pub struct AirAsiaFlight {
    pub flight_code: String,
    pub airline: String,
    pub from_airport: String,
    pub to_airport: String,
    pub depart_time: String,
    pub arrive_time: String,
    pub duration_hours: f64,
    pub direct_flight: bool,
    pub price_idr: u64,
    pub seats: u32,
    pub cabin_class: String,
    #[serde(default)]
    pub baggage_note: String,
    #[serde(default)]
    pub stops: Vec<AirAsiaStop>,
}

#[derive(Debug, Deserialize)]
pub struct AirAsiaStop {
    pub airport: String,
}

pub struct AirAsiaProvider {
    client: reqwest::Client,
    base_url: String,
}

impl AirAsiaProvider {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FlightProvider for AirAsiaProvider {
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

        let body: AirAsiaResponse = read_json(PROVIDER_NAME, response).await?;
        let flights = map_response(body)?;
        debug!(provider = PROVIDER_NAME, flights = flights.len(), "normalized flights");
        Ok(flights)
    }
}

pub fn map_response(response: AirAsiaResponse) -> Result<Vec<Flight>, ProviderError> {
    // Older deployments omit the status field entirely
    if let Some(status) = response.status.as_deref() {
        if !status.eq_ignore_ascii_case("ok") {
            return Err(ProviderError::Rejected {
                provider: PROVIDER_NAME.to_string(),
                reason: format!("status {}", status),
            });
        }
    }

    response.flights.iter().map(map_flight).collect()
}

fn map_flight(raw: &AirAsiaFlight) -> Result<Flight, ProviderError> {
    let invalid = |field: &'static str| ProviderError::InvalidField {
        provider: PROVIDER_NAME.to_string(),
        flight: raw.flight_code.clone(),
        field,
    };
    let timestamp = |source| ProviderError::Timestamp {
        provider: PROVIDER_NAME.to_string(),
        flight: raw.flight_code.clone(),
        source,
    };

    // Carrier code is the flight code's two-character prefix (QZ7510 -> QZ)
    let airline_code = raw
        .flight_code
        .get(..2)
        .filter(|code| code.chars().all(|c| c.is_ascii_alphanumeric()))
        .ok_or_else(|| invalid("flight_code"))?;

    if !raw.duration_hours.is_finite() || raw.duration_hours < 0.0 {
        return Err(invalid("duration_hours"));
    }
    let total_minutes = (raw.duration_hours * 60.0).round() as u32;

    let departure = parse_provider_time(&raw.depart_time, None).map_err(timestamp)?;
    let arrival = parse_provider_time(&raw.arrive_time, None).map_err(timestamp)?;

    // A non-direct flight with no stop list still has at least one stop
    let stops = if raw.direct_flight {
        0
    } else {
        (raw.stops.len() as u32).max(1)
    };

    Ok(Flight {
        id: flight_id(&raw.flight_code, &raw.airline),
        provider: PROVIDER_NAME.to_string(),
        airline: Airline {
            name: raw.airline.clone(),
            code: airline_code.to_ascii_uppercase(),
        },
        flight_number: raw.flight_code.clone(),
        departure: LocationTime::new(&raw.from_airport, None, departure),
        arrival: LocationTime::new(&raw.to_airport, None, arrival),
        duration: FlightDuration::from_minutes(total_minutes),
        stops,
        price: Price {
            amount: raw.price_idr,
            currency: "IDR".to_string(),
        },
        available_seats: raw.seats,
        cabin_class: normalize_cabin(&raw.cabin_class),
        aircraft: String::new(),
        amenities: Vec::new(),
        baggage: Baggage {
            carry_on: String::new(),
            checked: raw.baggage_note.clone(),
        },
        best_value_score: None,
    })
}
