use std::cmp::Ordering;

use crate::model::{Flight, SortBy, SortOptions, SortOrder};

pub const PRICE_WEIGHT: f64 = 0.45;
pub const DURATION_WEIGHT: f64 = 0.35;
pub const STOPS_WEIGHT: f64 = 0.20;

/// Return a sorted copy of `flights`. Every key uses a stable sort so equal
/// flights keep their incoming order in either direction.
pub fn apply_sort(flights: &[Flight], options: &SortOptions) -> Vec<Flight> {
    let mut sorted = flights.to_vec();

    match options.by {
        SortBy::Price => sort_by_key(&mut sorted, options.order, |f| f.price.amount),
        SortBy::Duration => sort_by_key(&mut sorted, options.order, |f| f.duration.total_minutes),
        SortBy::DepartureTime => sort_by_key(&mut sorted, options.order, |f| f.departure.timestamp),
        SortBy::ArrivalTime => sort_by_key(&mut sorted, options.order, |f| f.arrival.timestamp),
        SortBy::BestValue => {
            score_best_value(&mut sorted);
            sorted.sort_by(|a, b| {
                let (a, b) = (score(a), score(b));
                let ordering = a.partial_cmp(&b).unwrap_or(Ordering::Equal);
                directed(ordering, options.order)
            });
        }
    }

    sorted
}

fn sort_by_key<K, F>(flights: &mut [Flight], order: SortOrder, key: F)
where
    K: Ord,
    F: Fn(&Flight) -> K,
{
    flights.sort_by(|a, b| directed(key(a).cmp(&key(b)), order));
}

// Reversing the comparison, not the output, keeps ties in input order
fn directed(ordering: Ordering, order: SortOrder) -> Ordering {
    match order {
        SortOrder::Asc => ordering,
        SortOrder::Desc => ordering.reverse(),
    }
}

fn score(flight: &Flight) -> f64 {
    flight.best_value_score.unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy)]
struct Bounds {
    min: f64,
    max: f64,
}

impl Bounds {
    fn of(values: impl Iterator<Item = f64>) -> Option<Self> {
        values.fold(None, |acc, v| match acc {
            None => Some(Bounds { min: v, max: v }),
            Some(b) => Some(Bounds {
                min: b.min.min(v),
                max: b.max.max(v),
            }),
        })
    }

    // Lower is better: the minimum scores 1.0, the maximum 0.0
    fn normalize(&self, value: f64) -> f64 {
        if self.max == self.min {
            1.0
        } else {
            1.0 - (value - self.min) / (self.max - self.min)
        }
    }
}

/// Annotate each flight with its composite best-value score. Bounds are taken
/// over exactly the flights passed in, so the score is only meaningful
/// relative to this candidate set.
pub fn score_best_value(flights: &mut [Flight]) {
    let price = Bounds::of(flights.iter().map(|f| f.price.amount as f64));
    let duration = Bounds::of(flights.iter().map(|f| f64::from(f.duration.total_minutes)));
    let stops = Bounds::of(flights.iter().map(|f| f64::from(f.stops)));

    let (Some(price), Some(duration), Some(stops)) = (price, duration, stops) else {
        return;
    };

    for flight in flights.iter_mut() {
        let composite = PRICE_WEIGHT * price.normalize(flight.price.amount as f64)
            + DURATION_WEIGHT * duration.normalize(f64::from(flight.duration.total_minutes))
            + STOPS_WEIGHT * stops.normalize(f64::from(flight.stops));
        flight.best_value_score = Some(composite);
    }
}
