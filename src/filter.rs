use chrono::{NaiveTime, Timelike};

use crate::model::{FilterOptions, Flight, TimeWindow};

// Window bounds as seconds since local midnight
#[derive(Debug, Clone, Copy)]
struct SecondsWindow {
    from: u32,
    to: u32,
}

impl SecondsWindow {
    fn new(window: &TimeWindow) -> Self {
        Self {
            from: window.from.num_seconds_from_midnight(),
            to: window.to.num_seconds_from_midnight(),
        }
    }

    // Inclusive; a window whose start is after its end wraps past midnight
    fn contains(&self, time: NaiveTime) -> bool {
        let seconds = time.num_seconds_from_midnight();
        if self.from <= self.to {
            seconds >= self.from && seconds <= self.to
        } else {
            seconds >= self.from || seconds <= self.to
        }
    }
}

/// Filter options with everything that needs parsing or normalizing done once
/// up front, so the per-flight check is plain comparisons.
pub struct FilterContext<'a> {
    options: &'a FilterOptions,
    departure_window: Option<SecondsWindow>,
    arrival_window: Option<SecondsWindow>,
    airlines: Vec<String>,
}

impl<'a> FilterContext<'a> {
    pub fn new(options: &'a FilterOptions) -> Self {
        Self {
            options,
            departure_window: options.departure_time.as_ref().map(SecondsWindow::new),
            arrival_window: options.arrival_time.as_ref().map(SecondsWindow::new),
            airlines: options
                .airlines
                .iter()
                .map(|a| a.trim().to_lowercase())
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }

    // True only if every active predicate passes. Numeric checks run first,
    // the airline string match last.
    pub fn matches(&self, flight: &Flight) -> bool {
        if let Some(range) = &self.options.price_range {
            if flight.price.amount < range.low || flight.price.amount > range.high {
                return false;
            }
        }

        if let Some(max_stops) = self.options.max_stops {
            if flight.stops > max_stops {
                return false;
            }
        }

        if let Some(max_duration) = self.options.max_duration {
            if flight.duration.total_minutes > max_duration {
                return false;
            }
        }

        if let Some(window) = &self.departure_window {
            if !window.contains(flight.departure.local_time()) {
                return false;
            }
        }

        if let Some(window) = &self.arrival_window {
            if !window.contains(flight.arrival.local_time()) {
                return false;
            }
        }

        if !self.airlines.is_empty() {
            let code = flight.airline.code.to_lowercase();
            let name = flight.airline.name.to_lowercase();
            if !self.airlines.iter().any(|a| *a == code || *a == name) {
                return false;
            }
        }

        true
    }
}

pub fn apply_filters(flights: &[Flight], options: &FilterOptions) -> Vec<Flight> {
    let context = FilterContext::new(options);

    flights
        .iter()
        .filter(|flight| context.matches(flight))
        .cloned()
        .collect()
}
