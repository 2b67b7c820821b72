//! Seed data for paper trading.

use crate::ConfigError;
use common::{CommonError, Currency, ExchangeId, Pair};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

fn default_feed_interval_ms() -> u64 {
    1_000
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PaperConfig {
    #[serde(default)]
    pub balances: Vec<BalanceSeed>,
    #[serde(default)]
    pub books: Vec<BookSeed>,
    /// How often the seed books are republished with fresh timestamps.
    #[serde(default = "default_feed_interval_ms")]
    pub feed_interval_ms: u64,
    /// Relative random move applied to each republished book, e.g. `0.0005`.
    #[serde(default)]
    pub jitter: Decimal,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BalanceSeed {
    pub exchange: ExchangeId,
    pub currency: Currency,
    pub amount: Decimal,
}

/// A one-level book.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BookSeed {
    pub exchange: ExchangeId,
    pub pair: String,
    pub bid: Decimal,
    pub ask: Decimal,
    pub volume: Decimal,
}

impl BookSeed {
    pub fn pair(&self) -> Result<Pair, CommonError> {
        Pair::parse(self.exchange.clone(), &self.pair)
    }
}

impl Default for PaperConfig {
    fn default() -> Self {
        PaperConfig {
            balances: Vec::new(),
            books: Vec::new(),
            feed_interval_ms: default_feed_interval_ms(),
            jitter: Decimal::ZERO,
        }
    }
}

impl PaperConfig {
    pub(crate) fn validate(
        &self,
        exchanges: &HashSet<&ExchangeId>,
        currencies: &HashSet<Currency>,
    ) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));
        if self.feed_interval_ms == 0 {
            return invalid("Paper feed interval must be greater than 0".to_string());
        }
        if self.jitter < Decimal::ZERO || self.jitter >= Decimal::ONE {
            return invalid("Paper jitter must be in [0, 1)".to_string());
        }
        for seed in &self.balances {
            if !exchanges.contains(&seed.exchange) {
                return invalid(format!("Balance seeded for unknown exchange '{}'", seed.exchange));
            }
            if !currencies.contains(&seed.currency) {
                return invalid(format!("Balance seeded for untraded currency {}", seed.currency));
            }
            if seed.amount < Decimal::ZERO {
                return invalid(format!(
                    "Seed balance of {} on '{}' is negative",
                    seed.currency, seed.exchange
                ));
            }
        }
        for seed in &self.books {
            if !exchanges.contains(&seed.exchange) {
                return invalid(format!("Book seeded for unknown exchange '{}'", seed.exchange));
            }
            seed.pair()
                .map_err(|e| ConfigError::ValidationError(format!("Seed book: {}", e)))?;
            if seed.bid <= Decimal::ZERO || seed.ask <= seed.bid || seed.volume <= Decimal::ZERO {
                return invalid(format!(
                    "Seed book {} on '{}' needs 0 < bid < ask and positive volume",
                    seed.pair, seed.exchange
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn paper() -> PaperConfig {
        PaperConfig {
            balances: vec![BalanceSeed {
                exchange: ExchangeId::from("kraken"),
                currency: Currency::from("BTC"),
                amount: dec!(1),
            }],
            books: vec![BookSeed {
                exchange: ExchangeId::from("kraken"),
                pair: "BTC/USD".into(),
                bid: dec!(50000),
                ask: dec!(50010),
                volume: dec!(2),
            }],
            feed_interval_ms: 500,
            jitter: dec!(0.0005),
        }
    }

    #[test]
    fn test_seed_validation() {
        let kraken = ExchangeId::from("kraken");
        let exchanges: HashSet<&ExchangeId> = [&kraken].into_iter().collect();
        let currencies: HashSet<Currency> =
            [Currency::from("BTC"), Currency::from("USD")].into_iter().collect();

        paper().validate(&exchanges, &currencies).unwrap();

        let mut crossed = paper();
        crossed.books[0].ask = dec!(49000);
        assert!(crossed.validate(&exchanges, &currencies).is_err());

        let mut unknown = paper();
        unknown.balances[0].exchange = ExchangeId::from("gemini");
        assert!(unknown.validate(&exchanges, &currencies).is_err());

        let mut untraded = paper();
        untraded.balances[0].currency = Currency::from("ETH");
        assert!(untraded.validate(&exchanges, &currencies).is_err());
    }

    #[test]
    fn test_defaults_apply() {
        let parsed: PaperConfig = serde_yaml::from_str("books: []").unwrap();
        assert!(parsed.balances.is_empty());
        assert_eq!(parsed.feed_interval_ms, 1_000);
        assert_eq!(parsed.jitter, Decimal::ZERO);
        assert_eq!(parsed, PaperConfig::default());
    }
}
