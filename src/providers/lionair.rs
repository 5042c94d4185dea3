use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{normalize_cabin, read_json, search_query, transport_error, FlightProvider, ProviderError};
use crate::{
    model::{Airline, Baggage, Flight, FlightDuration, LocationTime, Price, SearchCriteria},
    time_format::parse_provider_time,
};

pub const PROVIDER_NAME: &str = "Lion Air";
const SEARCH_PATH: &str = "/lionair/v1/flights/search";

#[derive(Debug, Deserialize)]
pub struct LionAirResponse {
    pub success: bool,
    #[serde(default)]
    pub data: LionAirData,
}

#[derive(Debug, Default, Deserialize)]
pub struct LionAirData {
    #[serde(default)]
    pub available_flights: Vec<LionAirFlight>,
}

#[derive(Debug, Deserialize)]
pub struct LionAirFlight {
    pub id: String,
    pub carrier: LionAirCarrier,
    pub route: LionAirRoute,
    pub schedule: LionAirSchedule,
    pub flight_time: u32,
    pub is_direct: bool,
    #[serde(default)]
    pub stop_count: Option<u32>,
    #[serde(default)]
    pub layovers: Vec<LionAirLayover>,
    pub pricing: LionAirPricing,
    pub seats_left: u32,
    #[serde(default)]
    pub plane_type: String,
    #[serde(default)]
    pub services: LionAirServices,
}

#[derive(Debug, Deserialize)]
pub struct LionAirCarrier {
    pub name: String,
    pub iata: String,
}

#[derive(Debug, Deserialize)]
pub struct LionAirRoute {
    pub from: LionAirLocation,
    pub to: LionAirLocation,
}

#[derive(Debug, Deserialize)]
pub struct LionAirLocation {
    pub code: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub city: String,
}

// Local wall-clock times; the zone fields say where they are local to
#[derive(Debug, Deserialize)]
pub struct LionAirSchedule {
    pub departure: String,
    pub departure_timezone: String,
    pub arrival: String,
    pub arrival_timezone: String,
}

#[derive(Debug, Deserialize)]
pub struct LionAirLayover {
    pub airport: String,
    #[serde(default)]
    pub duration_minutes: u32,
}

#[derive(Debug, Deserialize)]
pub struct LionAirPricing {
    pub total: u64,
    pub currency: String,
    pub fare_type: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct LionAirServices {
    #[serde(default)]
    pub wifi_available: bool,
    #[serde(default)]
    pub meals_included: bool,
    #[serde(default)]
    pub baggage_allowance: LionAirBaggage,
}

#[derive(Debug, Default, Deserialize)]
pub struct LionAirBaggage {
    #[serde(default)]
    pub cabin: String,
    #[serde(default)]
    pub hold: String,
}

pub struct LionAirProvider {
    client: reqwest::Client,
    base_url: String,
}

impl LionAirProvider {
    pub fn new(client: reqwest::Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl FlightProvider for LionAirProvider {
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

        let body: LionAirResponse = read_json(PROVIDER_NAME, response).await?;
        let flights = map_response(body)?;
        debug!(provider = PROVIDER_NAME, flights = flights.len(), "normalized flights");
        Ok(flights)
    }
}

pub fn map_response(response: LionAirResponse) -> Result<Vec<Flight>, ProviderError> {
    if !response.success {
        return Err(ProviderError::Rejected {
            provider: PROVIDER_NAME.to_string(),
            reason: "success flag is false".to_string(),
        });
    }

    response.data.available_flights.iter().map(map_flight).collect()
}

fn map_flight(raw: &LionAirFlight) -> Result<Flight, ProviderError> {
    let departure = parse_provider_time(
        &raw.schedule.departure,
        Some(&raw.schedule.departure_timezone),
    )
    .map_err(|source| {
        warn!(
            flight = %raw.id,
            timezone = %raw.schedule.departure_timezone,
            error = %source,
            "failed to resolve lion air departure time"
        );
        ProviderError::Timestamp {
            provider: PROVIDER_NAME.to_string(),
            flight: raw.id.clone(),
            source,
        }
    })?;

    let arrival = parse_provider_time(&raw.schedule.arrival, Some(&raw.schedule.arrival_timezone))
        .map_err(|source| {
            warn!(
                flight = %raw.id,
                timezone = %raw.schedule.arrival_timezone,
                error = %source,
                "failed to resolve lion air arrival time"
            );
            ProviderError::Timestamp {
                provider: PROVIDER_NAME.to_string(),
                flight: raw.id.clone(),
                source,
            }
        })?;

    let mut amenities = Vec::new();
    if raw.services.wifi_available {
        amenities.push("Wi-Fi".to_string());
    }
    if raw.services.meals_included {
        amenities.push("Meal".to_string());
    }

    Ok(Flight {
        id: raw.id.clone(),
        provider: PROVIDER_NAME.to_string(),
        airline: Airline {
            name: raw.carrier.name.clone(),
            code: raw.carrier.iata.clone(),
        },
        flight_number: raw.id.clone(),
        departure: LocationTime::new(&raw.route.from.code, Some(&raw.route.from.city), departure),
        arrival: LocationTime::new(&raw.route.to.code, Some(&raw.route.to.city), arrival),
        duration: FlightDuration::from_minutes(raw.flight_time),
        stops: stop_count(raw),
        price: Price {
            amount: raw.pricing.total,
            currency: raw.pricing.currency.clone(),
        },
        available_seats: raw.seats_left,
        cabin_class: normalize_cabin(&raw.pricing.fare_type),
        aircraft: raw.plane_type.clone(),
        amenities,
        baggage: Baggage {
            carry_on: raw.services.baggage_allowance.cabin.clone(),
            checked: raw.services.baggage_allowance.hold.clone(),
        },
        best_value_score: None,
    })
}

// Explicit count first, then layovers; an indirect flight with neither is
// reported as one stop, which undercounts true multi-stop itineraries.
fn stop_count(raw: &LionAirFlight) -> u32 {
    if raw.is_direct {
        return 0;
    }
    match raw.stop_count {
        Some(count) if count > 0 => count,
        _ if !raw.layovers.is_empty() => raw.layovers.len() as u32,
        _ => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{model::ErrorCode, providers::test_support::criteria};
    use chrono::Utc;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const BODY: &str = r#"{
        "success": true,
        "data": {
            "available_flights": [
                {
                    "id": "JT740",
                    "carrier": {"name": "Lion Air", "iata": "JT"},
                    "route": {
                        "from": {"code": "CGK", "name": "Soekarno-Hatta International", "city": "Jakarta"},
                        "to": {"code": "DPS", "name": "Ngurah Rai International", "city": "Denpasar"}
                    },
                    "schedule": {
                        "departure": "2025-12-15T05:30:00",
                        "departure_timezone": "Asia/Jakarta",
                        "arrival": "2025-12-15T08:15:00",
                        "arrival_timezone": "Asia/Makassar"
                    },
                    "flight_time": 105,
                    "is_direct": true,
                    "pricing": {"total": 950000, "currency": "IDR", "fare_type": "ECONOMY"},
                    "seats_left": 45,
                    "plane_type": "Boeing 737-900ER",
                    "services": {
                        "wifi_available": false,
                        "meals_included": false,
                        "baggage_allowance": {"cabin": "7 kg", "hold": "20 kg"}
                    }
                },
                {
                    "id": "JT650",
                    "carrier": {"name": "Lion Air", "iata": "JT"},
                    "route": {
                        "from": {"code": "CGK", "city": "Jakarta"},
                        "to": {"code": "DPS", "city": "Denpasar"}
                    },
                    "schedule": {
                        "departure": "2025-12-15T16:20:00",
                        "departure_timezone": "Asia/Jakarta",
                        "arrival": "2025-12-15T21:10:00",
                        "arrival_timezone": "Asia/Makassar"
                    },
                    "flight_time": 230,
                    "is_direct": false,
                    "layovers": [{"airport": "SUB", "duration_minutes": 75}],
                    "pricing": {"total": 780000, "currency": "IDR", "fare_type": "ECONOMY"},
                    "seats_left": 52,
                    "plane_type": "Boeing 737-800",
                    "services": {
                        "wifi_available": true,
                        "meals_included": true,
                        "baggage_allowance": {"cabin": "7 kg", "hold": "20 kg"}
                    }
                }
            ]
        }
    }"#;

    #[test]
    fn test_map_response_applies_airport_timezones() {
        let response: LionAirResponse = serde_json::from_str(BODY).unwrap();
        let flights = map_response(response).unwrap();
        assert_eq!(flights.len(), 2);

        let direct = &flights[0];
        assert_eq!(direct.id, "JT740");
        assert_eq!(direct.cabin_class, "economy");
        assert_eq!(
            direct.departure.datetime.with_timezone(&Utc).to_rfc3339(),
            "2025-12-14T22:30:00+00:00"
        );
        assert_eq!(direct.arrival.datetime.offset().local_minus_utc(), 8 * 3600);
        assert_eq!(direct.arrival.local_time().to_string(), "08:15:00");
        assert!(direct.amenities.is_empty());
        assert_eq!(direct.baggage.checked, "20 kg");
    }

    #[test]
    fn test_layovers_and_amenities() {
        let response: LionAirResponse = serde_json::from_str(BODY).unwrap();
        let flights = map_response(response).unwrap();

        let connecting = &flights[1];
        assert_eq!(connecting.stops, 1);
        assert_eq!(connecting.amenities, vec!["Wi-Fi", "Meal"]);
        assert_eq!(connecting.duration.formatted, "3h 50m");
    }

    #[test]
    fn test_stop_count_inference() {
        let response: LionAirResponse = serde_json::from_str(BODY).unwrap();
        let mut raw = response.data.available_flights.into_iter().nth(1).unwrap();

        raw.stop_count = Some(2);
        assert_eq!(stop_count(&raw), 2);

        // Indirect with nothing else to go on is approximated as one stop
        raw.stop_count = None;
        raw.layovers.clear();
        assert_eq!(stop_count(&raw), 1);

        raw.is_direct = true;
        assert_eq!(stop_count(&raw), 0);
    }

    #[test]
    fn test_unknown_timezone_fails_the_batch() {
        let body = BODY.replace("Asia/Makassar", "Asia/Bali");
        let response: LionAirResponse = serde_json::from_str(&body).unwrap();
        assert!(matches!(
            map_response(response),
            Err(ProviderError::Timestamp { .. })
        ));
    }

    #[test]
    fn test_unsuccessful_response_is_rejected() {
        let response: LionAirResponse = serde_json::from_str(r#"{"success": false}"#).unwrap();
        let err = map_response(response).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InternalFailure);
    }

    #[tokio::test]
    async fn test_search_against_backend() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .and(query_param("cabin_class", "economy"))
            .respond_with(ResponseTemplate::new(200).set_body_string(BODY))
            .expect(1)
            .mount(&mock_server)
            .await;

        let provider = LionAirProvider::new(reqwest::Client::new(), &mock_server.uri());
        let flights = provider.search(&criteria()).await.unwrap();
        assert_eq!(flights.len(), 2);
        assert!(flights.iter().all(|f| f.provider == PROVIDER_NAME));
    }

    #[tokio::test]
    async fn test_slow_backend_hits_client_timeout() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path(SEARCH_PATH))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(BODY)
                    .set_delay(std::time::Duration::from_millis(500)),
            )
            .mount(&mock_server)
            .await;

        let client = crate::providers::http_client(std::time::Duration::from_millis(50)).unwrap();
        let provider = LionAirProvider::new(client, &mock_server.uri());
        let err = provider.search(&criteria()).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Timeout);
    }
}
