//! # Arb Bot Common Crate
//!
//! This crate provides the domain types, order-book snapshots, error taxonomy and
//! observer interface used across the `arb-bot` workspace.

pub mod book;

/// Module for common error types.
pub mod errors;

pub mod events;
pub mod traits;

/// Module for common data structures and types.
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export key items for easier access.
pub use book::{BookLevel, OrderBookSide, OrderBookSnapshot};
pub use errors::{AdapterError, AdapterResult, CommonError, ErrorKind};
pub use events::EngineEvent;
pub use traits::{NoopObserver, Observer};
pub use types::{
    Currency, ExchangeId, OrderId, OrderRequest, OrderStatus, OrderType, Pair, PairKey, Price,
    Quantity, Side,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_re_exports_exist() {
        let _currency = Currency::from("TEST");
        let _price = Price(rust_decimal_macros::dec!(1.0));
        let _quantity = Quantity(rust_decimal_macros::dec!(100.0));
        let _exchange_id = ExchangeId("EXCHANGE_TEST".to_string());
        let _pair = Pair::new(
            ExchangeId::from("x"),
            Currency::from("BASE"),
            Currency::from("QUOTE"),
        );
        let _err = CommonError::ParseError("test".to_string());
        NoopObserver.record(EngineEvent::PlanStatusChanged {
            plan_id: 1,
            status: "Proposed".into(),
        });
    }

    #[test]
    fn test_recording_observer_keeps_order() {
        let observer = test_utils::RecordingObserver::new();
        for id in 0..3 {
            observer.record(EngineEvent::PlanStatusChanged {
                plan_id: id,
                status: "Proposed".into(),
            });
        }
        let ids: Vec<_> = observer.events().iter().filter_map(|e| e.plan_id()).collect();
        assert_eq!(ids, vec![0, 1, 2]);
    }
}
