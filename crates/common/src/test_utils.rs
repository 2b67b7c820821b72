//! Fixtures shared by the workspace's tests. Enabled with the `test-utils` feature.

use crate::book::{BookLevel, OrderBookSnapshot};
use crate::events::EngineEvent;
use crate::traits::Observer;
use crate::types::{ExchangeId, Pair, Price, Quantity};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;

/// Observer that keeps every event in arrival order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().clone()
    }

    pub fn count(&self, predicate: impl Fn(&EngineEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl Observer for RecordingObserver {
    fn record(&self, event: EngineEvent) {
        self.events.lock().push(event);
    }
}

/// Builds a pair from `exchange` and a `BASE/QUOTE` symbol. Panics on a bad symbol.
pub fn pair(exchange: &str, symbol: &str) -> Pair {
    Pair::parse(ExchangeId::from(exchange), symbol).expect("test pair symbol")
}

/// A fixed instant `secs` seconds after the epoch.
pub fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().expect("valid timestamp")
}

/// A snapshot with one bid and one ask level.
pub fn book(
    pair: &Pair,
    bid: (Decimal, Decimal),
    ask: (Decimal, Decimal),
    last_updated: DateTime<Utc>,
) -> OrderBookSnapshot {
    OrderBookSnapshot::new(
        pair.clone(),
        vec![BookLevel::new(Price(bid.0), Quantity(bid.1))],
        vec![BookLevel::new(Price(ask.0), Quantity(ask.1))],
        last_updated,
    )
}

/// A snapshot with arbitrary levels, unchecked.
pub fn book_with_levels(
    pair: &Pair,
    bids: &[(Decimal, Decimal)],
    asks: &[(Decimal, Decimal)],
    last_updated: DateTime<Utc>,
) -> OrderBookSnapshot {
    let to_levels = |levels: &[(Decimal, Decimal)]| {
        levels
            .iter()
            .map(|(p, v)| BookLevel::new(Price(*p), Quantity(*v)))
            .collect()
    };
    OrderBookSnapshot::new(pair.clone(), to_levels(bids), to_levels(asks), last_updated)
}
