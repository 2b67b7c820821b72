//! Risk management implementations.

use anyhow::Result;
use async_trait::async_trait;
use config::RiskConfig;
use detector::{IsRiskManager, Loop};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Approves loops that are large enough and expected to earn enough.
#[derive(Debug, Clone)]
pub struct ThresholdRiskManager {
    /// Minimum deliverable volume, in the loop's base currency.
    pub min_volume: Decimal,
    /// Minimum expected gain, in the loop's base currency.
    pub min_expected_profit: Decimal,
    /// Largest starting amount a plan will commit.
    pub max_volume: Decimal,
}

impl ThresholdRiskManager {
    pub fn new(risk: &RiskConfig, max_volume: Decimal) -> Self {
        Self {
            min_volume: risk.min_volume,
            min_expected_profit: risk.min_expected_profit,
            max_volume,
        }
    }

    /// Expected gain of trading `candidate` at the committed size.
    pub fn expected_profit(&self, candidate: &Loop) -> Option<Decimal> {
        let size = candidate.volume().0.min(self.max_volume);
        let multiplier = Decimal::from_f64(candidate.multiplier())?;
        Some(size * (multiplier - Decimal::ONE))
    }
}

#[async_trait]
impl IsRiskManager for ThresholdRiskManager {
    async fn assess_risk(&self, candidate: &Loop) -> Result<bool> {
        if candidate.volume().0 < self.min_volume {
            log::warn!(
                "Risk assessment REJECTED: volume {} < {} for {}",
                candidate.volume(),
                self.min_volume,
                candidate
            );
            return Ok(false);
        }
        let Some(profit) = self.expected_profit(candidate) else {
            anyhow::bail!("multiplier {} of {} is not representable", candidate.multiplier(), candidate);
        };
        let approved = profit >= self.min_expected_profit;
        if approved {
            log::info!(
                "Risk assessment APPROVED: expected_profit = {} >= {}",
                profit,
                self.min_expected_profit
            );
        } else {
            log::warn!(
                "Risk assessment REJECTED: expected_profit = {} < {}",
                profit,
                self.min_expected_profit
            );
        }
        Ok(approved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{at, book, pair};
    use common::Currency;
    use detector::{FeeSchedule, FinderConfig, LoopFinder, PairGraph};
    use rust_decimal_macros::dec;

    /// Two venues quoting BTC/USD apart: sell at 110 on one, buy at 100 on the other.
    fn create_test_loop(volume: Decimal) -> Loop {
        let mut graph = PairGraph::new(FeeSchedule::new(dec!(0)), dec!(0));
        graph.upsert_snapshot(&book(&pair("a", "BTC/USD"), (dec!(110), volume), (dec!(111), volume), at(1)));
        graph.upsert_snapshot(&book(&pair("b", "BTC/USD"), (dec!(99), volume), (dec!(100), volume), at(1)));
        LoopFinder::new(FinderConfig {
            max_depth: 2,
            margin: 0.0,
        })
        .best_loop(&graph, &Currency::from("BTC"))
        .unwrap()
    }

    fn manager(min_volume: Decimal, min_profit: Decimal) -> ThresholdRiskManager {
        ThresholdRiskManager::new(
            &RiskConfig {
                min_volume,
                min_expected_profit: min_profit,
            },
            dec!(1),
        )
    }

    #[tokio::test]
    async fn test_threshold_risk_manager_approval() {
        let candidate = create_test_loop(dec!(2));
        // 1.1x on a size capped at 1 BTC.
        let profit = manager(dec!(0), dec!(0)).expected_profit(&candidate).unwrap();
        assert!((profit - dec!(0.1)).abs() < dec!(0.000001));
        assert!(manager(dec!(0.5), dec!(0.05)).assess_risk(&candidate).await.unwrap());
    }

    #[tokio::test]
    async fn test_threshold_risk_manager_rejection() {
        let candidate = create_test_loop(dec!(0.1));
        assert!(!manager(dec!(0.5), dec!(0)).assess_risk(&candidate).await.unwrap());
        assert!(!manager(dec!(0), dec!(0.5)).assess_risk(&candidate).await.unwrap());
    }
}
