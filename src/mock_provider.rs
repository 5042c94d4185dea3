// Scriptable in-process flight backend for tests and benchmarks

use std::{
    sync::{
        atomic::{AtomicU8, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use parking_lot::Mutex;

use crate::{
    model::{Airline, Baggage, Flight, FlightDuration, LocationTime, Price, SearchCriteria},
    providers::{FlightProvider, ProviderError},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerMode {
    Normal,
    CompleteOutage,
    // Every call panics inside the provider task
    Crashing,
}

impl ServerMode {
    fn as_u8(self) -> u8 {
        match self {
            ServerMode::Normal => 0,
            ServerMode::CompleteOutage => 1,
            ServerMode::Crashing => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => ServerMode::CompleteOutage,
            2 => ServerMode::Crashing,
            _ => ServerMode::Normal,
        }
    }
}

pub struct MockProvider {
    name: String,
    mode: AtomicU8,
    request_count: AtomicUsize,
    fail_next_requests: AtomicUsize,
    delay_ms: AtomicUsize,
    flights: Mutex<Vec<Flight>>,
}

impl MockProvider {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mode: AtomicU8::new(ServerMode::Normal.as_u8()),
            request_count: AtomicUsize::new(0),
            fail_next_requests: AtomicUsize::new(0),
            delay_ms: AtomicUsize::new(0),
            flights: Mutex::new(Vec::new()),
        }
    }

    pub fn with_flights(name: &str, flights: Vec<Flight>) -> Arc<Self> {
        let provider = Self::new(name);
        provider.set_flights(flights);
        Arc::new(provider)
    }

    pub fn set_mode(&self, mode: ServerMode) {
        self.mode.store(mode.as_u8(), Ordering::SeqCst);
    }

    pub fn mode(&self) -> ServerMode {
        ServerMode::from_u8(self.mode.load(Ordering::SeqCst))
    }

    pub fn set_delay(&self, delay_ms: usize) {
        self.delay_ms.store(delay_ms, Ordering::SeqCst);
    }

    pub fn fail_next_requests(&self, count: usize) {
        self.fail_next_requests.store(count, Ordering::SeqCst);
    }

    pub fn set_flights(&self, flights: Vec<Flight>) {
        *self.flights.lock() = flights;
    }

    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    fn unavailable(&self, reason: &str) -> ProviderError {
        ProviderError::Rejected {
            provider: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl FlightProvider for MockProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn search(&self, _criteria: &SearchCriteria) -> Result<Vec<Flight>, ProviderError> {
        self.request_count.fetch_add(1, Ordering::SeqCst);

        match self.mode() {
            ServerMode::CompleteOutage => return Err(self.unavailable("service unavailable")),
            ServerMode::Crashing => panic!("{} crashed while searching", self.name),
            ServerMode::Normal => {}
        }

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay as u64)).await;
        }

        let fail_count = self.fail_next_requests.load(Ordering::SeqCst);
        if fail_count > 0 {
            self.fail_next_requests
                .store(fail_count - 1, Ordering::SeqCst);
            return Err(ProviderError::Status {
                provider: self.name.clone(),
                status: 500,
            });
        }

        Ok(self.flights.lock().clone())
    }
}

/// A minimal normalized flight for fixtures: arrival is derived from the
/// departure instant plus `total_minutes`, in the same offset.
pub fn sample_flight(
    provider: &str,
    airline_code: &str,
    flight_number: &str,
    price: u64,
    total_minutes: u32,
    stops: u32,
    departure: DateTime<FixedOffset>,
) -> Flight {
    let arrival = departure + chrono::Duration::minutes(i64::from(total_minutes));

    Flight {
        id: format!("{}_{}", flight_number, provider),
        provider: provider.to_string(),
        airline: Airline {
            name: provider.to_string(),
            code: airline_code.to_string(),
        },
        flight_number: flight_number.to_string(),
        departure: LocationTime::new("CGK", Some("Jakarta"), departure),
        arrival: LocationTime::new("DPS", Some("Denpasar"), arrival),
        duration: FlightDuration::from_minutes(total_minutes),
        stops,
        price: Price {
            amount: price,
            currency: "IDR".to_string(),
        },
        available_seats: 30,
        cabin_class: "economy".to_string(),
        aircraft: String::new(),
        amenities: Vec::new(),
        baggage: Baggage::default(),
        best_value_score: None,
    }
}
