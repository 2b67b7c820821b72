//! Loop sizing against best-level liquidity.

use crate::graph::GraphEdge;
use rust_decimal::Decimal;

/// Largest starting amount (in the loop's base currency) that every leg's
/// best level can absorb.
///
/// For leg `i` the input is `x * prefix_i`, where `prefix_i` is the product of
/// the multipliers of the legs before it, so the bound is `capacity_i / prefix_i`.
/// A bound too large to represent constrains nothing; a prefix too large to
/// represent leaves no tradeable volume.
pub fn deliverable_volume<'a, I>(edges: I) -> Decimal
where
    I: IntoIterator<Item = &'a GraphEdge>,
{
    let mut prefix = Decimal::ONE;
    let mut volume: Option<Decimal> = None;
    let mut legs = 0usize;
    for edge in edges {
        legs += 1;
        if prefix.is_zero() {
            return Decimal::ZERO;
        }
        if let Some(bound) = edge.capacity.0.checked_div(prefix) {
            volume = Some(match volume {
                Some(v) => v.min(bound),
                None => bound,
            });
        }
        prefix = match prefix.checked_mul(edge.multiplier()) {
            Some(next) => next,
            None => return Decimal::ZERO,
        };
    }
    match volume {
        Some(v) => v,
        // Every bound overflowed.
        None if legs > 0 => Decimal::MAX,
        None => Decimal::ZERO,
    }
}

/// Expected input of every leg for a starting amount, followed by the final output.
pub fn leg_amounts<'a, I>(edges: I, start: Decimal) -> Vec<Decimal>
where
    I: IntoIterator<Item = &'a GraphEdge>,
{
    let mut amounts = vec![start];
    let mut current = start;
    for edge in edges {
        current *= edge.multiplier();
        amounts.push(current);
    }
    amounts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::translator::snapshot_to_edges;
    use common::test_utils::{at, book, pair};
    use common::OrderType;
    use rust_decimal_macros::dec;

    fn sell_edge(symbol: &str, bid: Decimal, volume: Decimal) -> GraphEdge {
        let snapshot = book(&pair("kraken", symbol), (bid, volume), (bid * dec!(2), volume), at(1));
        snapshot_to_edges(&snapshot, dec!(0))
            .into_iter()
            .find(|e| e.order_type == OrderType::Sell)
            .unwrap()
    }

    #[test]
    fn test_volume_is_tightest_leg_in_base_units() {
        let edges = vec![
            sell_edge("BTC/USD", dec!(50000), dec!(2)),
            // 60000 USD absorbed, i.e. 1.2 BTC worth.
            sell_edge("USD/EUR", dec!(0.9), dec!(60000)),
            sell_edge("EUR/BTC", dec!(0.00002), dec!(1000000)),
        ];
        assert_eq!(deliverable_volume(&edges), dec!(1.2));
    }

    #[test]
    fn test_first_leg_bound_applies_directly() {
        let edges = vec![
            sell_edge("BTC/USD", dec!(50000), dec!(0.5)),
            sell_edge("USD/BTC", dec!(0.00002), dec!(1000000)),
        ];
        assert_eq!(deliverable_volume(&edges), dec!(0.5));
        assert_eq!(deliverable_volume(Vec::<&GraphEdge>::new()), Decimal::ZERO);
    }

    #[test]
    fn test_extreme_prices_do_not_overflow() {
        let tiny = dec!(0.0000000000000000000000000001);
        let edges = vec![
            sell_edge("BTC/SHIB", tiny, dec!(1)),
            sell_edge("SHIB/BTC", dec!(1000), Decimal::MAX),
        ];
        // The second leg's bound is unrepresentable and drops out.
        assert_eq!(deliverable_volume(&edges), dec!(1));

        let huge = dec!(10000000000000000000000000000);
        let edges = vec![
            sell_edge("BTC/SHIB", huge, Decimal::MAX / dec!(10)),
            sell_edge("SHIB/DOGE", huge, dec!(1)),
            sell_edge("DOGE/BTC", tiny, dec!(1)),
        ];
        assert_eq!(deliverable_volume(&edges), Decimal::ZERO);
    }

    #[test]
    fn test_leg_amounts_chain_multipliers() {
        let edges = vec![
            sell_edge("BTC/USD", dec!(50000), dec!(2)),
            sell_edge("USD/EUR", dec!(0.9), dec!(100000)),
        ];
        assert_eq!(
            leg_amounts(&edges, dec!(0.1)),
            vec![dec!(0.1), dec!(5000), dec!(4500)]
        );
    }
}
