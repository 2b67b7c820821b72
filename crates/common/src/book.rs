//! Order-book snapshot types shared by the store, the graph and the adapters.

use crate::errors::CommonError;
use crate::types::{Pair, Price, Quantity, Side};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One price level: `volume` base units available at `price`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookLevel {
    pub price: Price,
    pub volume: Quantity,
}

impl BookLevel {
    pub fn new(price: Price, volume: Quantity) -> Self {
        BookLevel { price, volume }
    }
}

/// Levels of one side, best first.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderBookSide {
    levels: Vec<BookLevel>,
}

impl OrderBookSide {
    pub fn new(levels: Vec<BookLevel>) -> Self {
        OrderBookSide { levels }
    }

    pub fn best(&self) -> Option<&BookLevel> {
        self.levels.first()
    }

    pub fn levels(&self) -> &[BookLevel] {
        &self.levels
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    /// Checks positivity and strict monotonicity away from the best level.
    pub fn validate(&self, side: Side) -> Result<(), CommonError> {
        for level in &self.levels {
            if level.price.0.is_sign_negative() || level.price.0.is_zero() {
                return Err(CommonError::InvalidBook(format!(
                    "{} price {} is not positive",
                    side, level.price
                )));
            }
            if level.volume.0.is_sign_negative() || level.volume.0.is_zero() {
                return Err(CommonError::InvalidBook(format!(
                    "{} volume {} at {} is not positive",
                    side, level.volume, level.price
                )));
            }
        }
        for window in self.levels.windows(2) {
            let ordered = match side {
                Side::Bid => window[0].price > window[1].price,
                Side::Ask => window[0].price < window[1].price,
            };
            if !ordered {
                return Err(CommonError::InvalidBook(format!(
                    "{} prices not strictly monotonic at {}",
                    side, window[1].price
                )));
            }
        }
        Ok(())
    }
}

/// A point-in-time view of one pair's book as reported by its exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBookSnapshot {
    pub pair: Pair,
    pub bids: OrderBookSide,
    pub asks: OrderBookSide,
    pub last_updated: DateTime<Utc>,
}

impl OrderBookSnapshot {
    pub fn new(
        pair: Pair,
        bids: Vec<BookLevel>,
        asks: Vec<BookLevel>,
        last_updated: DateTime<Utc>,
    ) -> Self {
        OrderBookSnapshot {
            pair,
            bids: OrderBookSide::new(bids),
            asks: OrderBookSide::new(asks),
            last_updated,
        }
    }

    pub fn best_bid(&self) -> Option<&BookLevel> {
        self.bids.best()
    }

    pub fn best_ask(&self) -> Option<&BookLevel> {
        self.asks.best()
    }

    /// Rejects books that are unordered, non-positive or crossed.
    pub fn validate(&self) -> Result<(), CommonError> {
        if self.pair.base == self.pair.quote {
            return Err(CommonError::InvalidBook(format!(
                "pair {} trades a currency against itself",
                self.pair
            )));
        }
        self.bids.validate(Side::Bid)?;
        self.asks.validate(Side::Ask)?;
        if let (Some(bid), Some(ask)) = (self.best_bid(), self.best_ask()) {
            if bid.price >= ask.price {
                return Err(CommonError::InvalidBook(format!(
                    "book for {} is crossed: bid {} >= ask {}",
                    self.pair, bid.price, ask.price
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Currency, ExchangeId};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn level(price: rust_decimal::Decimal, volume: rust_decimal::Decimal) -> BookLevel {
        BookLevel::new(Price(price), Quantity(volume))
    }

    fn pair() -> Pair {
        Pair::new(
            ExchangeId::from("kraken"),
            Currency::from("BTC"),
            Currency::from("USD"),
        )
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_valid_book_passes() {
        let book = OrderBookSnapshot::new(
            pair(),
            vec![level(dec!(100), dec!(1)), level(dec!(99), dec!(2))],
            vec![level(dec!(101), dec!(1)), level(dec!(102), dec!(3))],
            at(1),
        );
        assert!(book.validate().is_ok());
        assert_eq!(book.best_bid().unwrap().price, Price(dec!(100)));
        assert_eq!(book.best_ask().unwrap().price, Price(dec!(101)));
    }

    #[test]
    fn test_one_sided_book_is_valid() {
        let book = OrderBookSnapshot::new(pair(), vec![level(dec!(100), dec!(1))], vec![], at(1));
        assert!(book.validate().is_ok());
        assert!(book.best_ask().is_none());
    }

    #[test]
    fn test_unordered_bids_rejected() {
        let book = OrderBookSnapshot::new(
            pair(),
            vec![level(dec!(99), dec!(1)), level(dec!(100), dec!(1))],
            vec![],
            at(1),
        );
        assert!(matches!(book.validate(), Err(CommonError::InvalidBook(_))));
    }

    #[test]
    fn test_equal_ask_levels_rejected() {
        let book = OrderBookSnapshot::new(
            pair(),
            vec![],
            vec![level(dec!(101), dec!(1)), level(dec!(101), dec!(1))],
            at(1),
        );
        assert!(book.validate().is_err());
    }

    #[test]
    fn test_non_positive_values_rejected() {
        let zero_price =
            OrderBookSnapshot::new(pair(), vec![level(dec!(0), dec!(1))], vec![], at(1));
        assert!(zero_price.validate().is_err());

        let negative_volume =
            OrderBookSnapshot::new(pair(), vec![], vec![level(dec!(5), dec!(-1))], at(1));
        assert!(negative_volume.validate().is_err());
    }

    #[test]
    fn test_crossed_book_rejected() {
        let book = OrderBookSnapshot::new(
            pair(),
            vec![level(dec!(101), dec!(1))],
            vec![level(dec!(100), dec!(1))],
            at(1),
        );
        let err = book.validate().unwrap_err();
        assert!(format!("{}", err).contains("crossed"));
    }
}
