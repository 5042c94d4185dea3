use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{
    flight_id, normalize_cabin, read_json, search_query, transport_error, FlightProvider,
    ProviderError,
};
use crate::{
    model::{Airline, Baggage, CabinClass, Flight, FlightDuration, LocationTime, Price, SearchCriteria},
    time_format::{parse_provider_time, parse_travel_time},
};

pub const PROVIDER_NAME: &str = "Batik Air";
const SEARCH_PATH: &str = "/batikair/v1/flights/search";

#[derive(Debug, Deserialize)]
pub struct BatikResponse {
    pub code: u16,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub results: Vec<BatikFlight>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatikFlight {
    pub flight_number: String,
    pub airline_name: String,
    #[serde(rename = "airlineIATA")]
    pub airline_iata: String,
    pub origin: String,
    pub destination: String,
    pub departure_date_time: String,
    pub arrival_date_time: String,
    #[serde(default)]
    pub travel_time: String,
    #[serde(default)]
    pub number_of_stops: u32,
    pub fare: BatikFare,
    pub seats_available: u32,
    #[serde(default)]
    pub aircraft_model: String,
    #[serde(default)]
    pub baggage_info: String,
    #[serde(default)]
    pub onboard_services: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatikFare {
    #[serde(default)]
    pub base_price: u64,
    #[serde(default)]
    pub taxes: u64,
    pub total_price: u64,
    pub currency_code: String,
    pub class: String,
}

pub struct BatikProvider {
    client: reqwest::Client,
    base_url: String,
}

impl BatikProvider {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FlightProvider for BatikProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn search(&self, criteria: &SearchCriteria) -> Result<Vec<Flight>, ProviderError> {
        let url = format!("{}{}", self.base_url, SEARCH_PATH);

        let response = self
            .client
            .get(&url)
            .query(&search_query(criteria))
            .send()
            .await
            .map_err(|e| transport_error(PROVIDER_NAME, e))?;

        let body: BatikResponse = read_json(PROVIDER_NAME, response).await?;
        let flights = map_response(body)?;
        debug!(provider = PROVIDER_NAME, flights = flights.len(), "normalized flights");
        Ok(flights)
    }
}

pub fn map_response(response: BatikResponse) -> Result<Vec<Flight>, ProviderError> {
    if response.code != 200 {
        return Err(ProviderError::Rejected {
            provider: PROVIDER_NAME.to_string(),
            reason: format!("code {}: {}", response.code, response.message),
        });
    }

    response.results.iter().map(map_flight).collect()
}

// Batik reports IATA booking class codes rather than cabin names
fn fare_class_cabin(class: &str) -> String {
    let cabin = match class.trim().to_ascii_uppercase().as_str() {
        "Y" => CabinClass::Economy,
        "W" => CabinClass::PremiumEconomy,
        "C" | "J" => CabinClass::Business,
        "F" => CabinClass::First,
        _ => return normalize_cabin(class),
    };
    cabin.as_str().to_string()
}

fn map_flight(raw: &BatikFlight) -> Result<Flight, ProviderError> {
    let timestamp = |source| ProviderError::Timestamp {
        provider: PROVIDER_NAME.to_string(),
        flight: raw.flight_number.clone(),
        source,
    };

    let departure = parse_provider_time(&raw.departure_date_time, None).map_err(timestamp)?;
    let arrival = parse_provider_time(&raw.arrival_date_time, None).map_err(timestamp)?;

    // Fall back to the scheduled block time when travelTime is missing or odd
    let total_minutes = match parse_travel_time(&raw.travel_time) {
        Some(minutes) => minutes,
        None => {
            let minutes = (arrival - departure).num_minutes();
            u32::try_from(minutes).map_err(|_| ProviderError::InvalidField {
                provider: PROVIDER_NAME.to_string(),
                flight: raw.flight_number.clone(),
                field: "travelTime",
            })?
        }
    };

    Ok(Flight {
        id: flight_id(&raw.flight_number, &raw.airline_name),
        provider: PROVIDER_NAME.to_string(),
        airline: Airline {
            name: raw.airline_name.clone(),
            code: raw.airline_iata.clone(),
        },
        flight_number: raw.flight_number.clone(),
        departure: LocationTime::new(&raw.origin, None, departure),
        arrival: LocationTime::new(&raw.destination, None, arrival),
        duration: FlightDuration::from_minutes(total_minutes),
        stops: raw.number_of_stops,
        price: Price {
            amount: raw.fare.total_price,
            currency: raw.fare.currency_code.clone(),
        },
        available_seats: raw.seats_available,
        cabin_class: fare_class_cabin(&raw.fare.class),
        aircraft: raw.aircraft_model.clone(),
        amenities: raw.onboard_services.clone(),
        baggage: Baggage {
            carry_on: String::new(),
            checked: raw.baggage_info.clone(),
        },
        best_value_score: None,
    })
}
