use chrono::{DateTime, Utc};
use common::{Currency, ExchangeId, OrderType, Pair, PairKey, Price, Quantity};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod state;

pub use state::PairGraph;

/// A copyable currency identifier for use as DiGraphMap node
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CurrencyId(u32);

impl CurrencyId {
    pub fn new(id: u32) -> Self {
        CurrencyId(id)
    }

    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// One tradeable direction of one venue: converting `from` into `to` by
/// placing `order_type` on `pair` at the best opposing level.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphEdge {
    pub from: Currency,
    pub to: Currency,
    pub pair: Pair,
    pub order_type: OrderType,
    /// Limit price in the pair's quote per base.
    pub price: Price,
    /// `to` units received per `from` unit, before fees.
    pub rate: Decimal,
    pub fee: Decimal,
    /// Best-level volume in base units.
    pub volume: Quantity,
    /// Most `from` units the best level absorbs.
    pub capacity: Quantity,
    pub last_updated: DateTime<Utc>,
    /// `multiplier()` as f64, for the search.
    pub weight: f64,
}

impl GraphEdge {
    pub fn key(&self) -> PairKey {
        self.pair.key()
    }

    /// Output units per input unit after fees.
    pub fn multiplier(&self) -> Decimal {
        (Decimal::ONE - self.fee) * self.rate
    }

    /// Base-unit order amount for an input of `input` `from` units.
    pub fn order_amount(&self, input: Decimal) -> Decimal {
        match self.order_type {
            OrderType::Sell => input,
            OrderType::Buy => input / self.price.0,
        }
    }
}

/// Per-exchange taker fee rates.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeeSchedule {
    default_rate: Decimal,
    rates: HashMap<ExchangeId, Decimal>,
}

impl FeeSchedule {
    pub fn new(default_rate: Decimal) -> Self {
        FeeSchedule {
            default_rate,
            rates: HashMap::new(),
        }
    }

    pub fn with_rate(mut self, exchange: ExchangeId, rate: Decimal) -> Self {
        self.rates.insert(exchange, rate);
        self
    }

    pub fn rate(&self, exchange: &ExchangeId) -> Decimal {
        self.rates.get(exchange).copied().unwrap_or(self.default_rate)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct GraphConfig {
    /// Edges whose best-level volume (base units) is below this are not traversed.
    pub dust_threshold: Decimal,
}
