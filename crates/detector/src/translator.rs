use crate::graph::GraphEdge;
use common::{OrderBookSnapshot, OrderType, Quantity};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Projects the best levels of a snapshot onto at most two directed edges.
///
/// The sell edge (base to quote) trades against the best bid; the buy edge
/// (quote to base) trades against the best ask at the inverse rate. Each side
/// carries its own fee term. A missing side yields no edge.
pub fn snapshot_to_edges(snapshot: &OrderBookSnapshot, fee: Decimal) -> Vec<GraphEdge> {
    let pair = &snapshot.pair;
    let mut edges = Vec::with_capacity(2);

    if let Some(bid) = snapshot.best_bid() {
        let rate = bid.price.0;
        if let Some(edge) = build(
            snapshot,
            fee,
            OrderType::Sell,
            bid.price,
            rate,
            bid.volume,
            bid.volume,
        ) {
            edges.push(edge);
        }
    }

    if let Some(ask) = snapshot.best_ask() {
        // Unrepresentable rates or capacities drop the edge.
        let inverse = Decimal::ONE
            .checked_div(ask.price.0)
            .zip(ask.volume.0.checked_mul(ask.price.0));
        if let Some((rate, capacity)) = inverse {
            if let Some(edge) = build(
                snapshot,
                fee,
                OrderType::Buy,
                ask.price,
                rate,
                ask.volume,
                Quantity(capacity),
            ) {
                edges.push(edge);
            }
        }
    }

    if edges.is_empty() {
        log::debug!("Snapshot for {} produced no edges", pair);
    }
    edges
}

fn build(
    snapshot: &OrderBookSnapshot,
    fee: Decimal,
    order_type: OrderType,
    price: common::Price,
    rate: Decimal,
    volume: Quantity,
    capacity: Quantity,
) -> Option<GraphEdge> {
    let pair = &snapshot.pair;
    let (from, to) = match order_type {
        OrderType::Sell => (pair.base.clone(), pair.quote.clone()),
        OrderType::Buy => (pair.quote.clone(), pair.base.clone()),
    };
    let weight = (Decimal::ONE - fee).checked_mul(rate)?.to_f64()?;
    if !weight.is_finite() || weight <= 0.0 {
        return None;
    }
    Some(GraphEdge {
        from,
        to,
        pair: pair.clone(),
        order_type,
        price,
        rate,
        fee,
        volume,
        capacity,
        last_updated: snapshot.last_updated,
        weight,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{at, book, book_with_levels, pair};
    use common::{Currency, Price};
    use rust_decimal_macros::dec;

    #[test]
    fn test_two_sided_book_yields_sell_and_buy_edges() {
        let btc_usd = pair("kraken", "BTC/USD");
        let snapshot = book(&btc_usd, (dec!(50000), dec!(2)), (dec!(50100), dec!(3)), at(7));
        let edges = snapshot_to_edges(&snapshot, dec!(0.001));
        assert_eq!(edges.len(), 2);

        let sell = &edges[0];
        assert_eq!(sell.order_type, OrderType::Sell);
        assert_eq!(sell.from, Currency::from("BTC"));
        assert_eq!(sell.to, Currency::from("USD"));
        assert_eq!(sell.rate, dec!(50000));
        assert_eq!(sell.capacity, Quantity(dec!(2)));
        assert_eq!(sell.multiplier(), dec!(49950));
        assert_eq!(sell.last_updated, at(7));

        let buy = &edges[1];
        assert_eq!(buy.order_type, OrderType::Buy);
        assert_eq!(buy.from, Currency::from("USD"));
        assert_eq!(buy.to, Currency::from("BTC"));
        assert_eq!(buy.price, Price(dec!(50100)));
        assert_eq!(buy.rate, Decimal::ONE / dec!(50100));
        assert_eq!(buy.volume, Quantity(dec!(3)));
        assert_eq!(buy.capacity, Quantity(dec!(150300)));
        assert_eq!(buy.order_amount(dec!(100200)), dec!(2));
        assert!((buy.weight - 0.999 / 50100.0).abs() < 1e-15);
    }

    #[test]
    fn test_one_sided_book_yields_one_edge() {
        let btc_usd = pair("kraken", "BTC/USD");
        let snapshot = book_with_levels(&btc_usd, &[], &[(dec!(50100), dec!(1))], at(1));
        let edges = snapshot_to_edges(&snapshot, dec!(0));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].order_type, OrderType::Buy);

        let empty = book_with_levels(&btc_usd, &[], &[], at(1));
        assert!(snapshot_to_edges(&empty, dec!(0)).is_empty());
    }

    #[test]
    fn test_unrepresentable_capacity_drops_only_that_edge() {
        let btc_usd = pair("kraken", "BTC/USD");
        let snapshot = book(
            &btc_usd,
            (dec!(50000), dec!(1)),
            (dec!(50100), Decimal::MAX),
            at(1),
        );
        let edges = snapshot_to_edges(&snapshot, dec!(0.001));
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].order_type, OrderType::Sell);
    }
}
