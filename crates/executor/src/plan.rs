//! Execution plans and their state machine.

use crate::error::ExecutionError;
use chrono::{DateTime, Utc};
use common::{Currency, ExchangeId, OrderRequest, OrderType, Pair, Price, Quantity};
use detector::sizing;
use detector::Loop;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStatus {
    Proposed,
    Validated,
    /// The order of this step is on the exchange.
    Executing(usize),
    Completed,
    PartiallyFilled,
    Failed,
    Reconciled,
}

impl PlanStatus {
    pub fn can_transition_to(&self, next: PlanStatus) -> bool {
        use PlanStatus::*;
        match (*self, next) {
            (Proposed, Validated) | (Proposed, Failed) => true,
            (Validated, Executing(0)) | (Validated, Failed) => true,
            (Executing(i), Executing(j)) => j == i + 1,
            (Executing(_), Completed | PartiallyFilled | Failed) => true,
            (Completed | PartiallyFilled | Failed, Reconciled) => true,
            _ => false,
        }
    }

    /// Terminal for active execution; only reconciliation may follow.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PlanStatus::Completed | PlanStatus::PartiallyFilled | PlanStatus::Failed
        )
    }
}

impl fmt::Display for PlanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStatus::Executing(step) => write!(f, "Executing({})", step),
            other => write!(f, "{:?}", other),
        }
    }
}

/// One order of a plan.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeStep {
    pub index: usize,
    pub exchange: ExchangeId,
    pub pair: Pair,
    pub order_type: OrderType,
    pub limit_price: Price,
    /// Order size in base units.
    pub amount: Quantity,
    pub from: Currency,
    pub to: Currency,
    /// `from` units consumed.
    pub input: Decimal,
    /// `to` units expected after fees.
    pub expected_output: Decimal,
    pub fee: Decimal,
}

impl TradeStep {
    pub fn order_request(&self) -> OrderRequest {
        OrderRequest {
            pair: self.pair.clone(),
            order_type: self.order_type,
            limit_price: self.limit_price,
            amount: self.amount,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutionPlan {
    id: u64,
    candidate: Loop,
    steps: Vec<TradeStep>,
    status: PlanStatus,
    created_at: DateTime<Utc>,
}

impl ExecutionPlan {
    /// Sizes every leg of `candidate` for a starting amount of `start` base-currency units.
    pub fn from_loop(id: u64, candidate: &Loop, start: Decimal) -> Self {
        let amounts = sizing::leg_amounts(candidate.edges(), start);
        let steps = candidate
            .edges()
            .iter()
            .enumerate()
            .map(|(index, edge)| TradeStep {
                index,
                exchange: edge.pair.exchange.clone(),
                pair: edge.pair.clone(),
                order_type: edge.order_type,
                limit_price: edge.price,
                amount: Quantity(edge.order_amount(amounts[index])),
                from: edge.from.clone(),
                to: edge.to.clone(),
                input: amounts[index],
                expected_output: amounts[index + 1],
                fee: edge.fee,
            })
            .collect();
        ExecutionPlan {
            id,
            candidate: candidate.clone(),
            steps,
            status: PlanStatus::Proposed,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn candidate(&self) -> &Loop {
        &self.candidate
    }

    pub fn steps(&self) -> &[TradeStep] {
        &self.steps
    }

    pub fn status(&self) -> PlanStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Starting amount in the loop's base currency.
    pub fn start_amount(&self) -> Decimal {
        self.steps.first().map(|s| s.input).unwrap_or(Decimal::ZERO)
    }

    pub fn expected_return(&self) -> Decimal {
        self.steps
            .last()
            .map(|s| s.expected_output)
            .unwrap_or(Decimal::ZERO)
    }

    /// The only mutation a plan allows.
    pub fn advance(&mut self, next: PlanStatus) -> Result<(), ExecutionError> {
        if !self.status.can_transition_to(next) {
            return Err(ExecutionError::InvalidTransition {
                plan_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// Every (exchange, currency) balance the plan touches, sorted by exchange then currency.
    pub fn balance_keys(&self) -> BTreeSet<(ExchangeId, Currency)> {
        self.steps
            .iter()
            .flat_map(|s| {
                [
                    (s.exchange.clone(), s.pair.base.clone()),
                    (s.exchange.clone(), s.pair.quote.clone()),
                ]
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::scenario_loop;
    use rust_decimal_macros::dec;

    #[test]
    fn test_transitions() {
        use PlanStatus::*;
        assert!(Proposed.can_transition_to(Validated));
        assert!(Proposed.can_transition_to(Failed));
        assert!(!Proposed.can_transition_to(Executing(0)));
        assert!(Validated.can_transition_to(Executing(0)));
        assert!(!Validated.can_transition_to(Executing(1)));
        assert!(Executing(0).can_transition_to(Executing(1)));
        assert!(!Executing(0).can_transition_to(Executing(2)));
        assert!(Executing(2).can_transition_to(PartiallyFilled));
        assert!(Failed.can_transition_to(Reconciled));
        assert!(!Completed.can_transition_to(Failed));
        assert!(!Reconciled.can_transition_to(Proposed));
    }

    #[test]
    fn test_plan_steps_follow_the_loop() {
        let candidate = scenario_loop();
        let plan = ExecutionPlan::from_loop(1, &candidate, dec!(0.1));
        assert_eq!(plan.status(), PlanStatus::Proposed);
        assert_eq!(plan.steps().len(), 3);

        let first = &plan.steps()[0];
        assert_eq!(first.order_type, OrderType::Sell);
        assert_eq!(first.amount, Quantity(dec!(0.1)));
        assert_eq!(first.expected_output, dec!(0.1) * dec!(50000) * dec!(0.999));
        for pair in plan.steps().windows(2) {
            assert_eq!(pair[0].expected_output, pair[1].input);
            assert_eq!(pair[0].to, pair[1].from);
        }
        assert_eq!(plan.start_amount(), dec!(0.1));
        assert!(plan.expected_return() > dec!(0.1));
    }

    #[test]
    fn test_illegal_advance_keeps_status() {
        let mut plan = ExecutionPlan::from_loop(9, &scenario_loop(), dec!(0.1));
        let err = plan.advance(PlanStatus::Completed).unwrap_err();
        assert!(matches!(
            err,
            ExecutionError::InvalidTransition { plan_id: 9, .. }
        ));
        assert_eq!(plan.status(), PlanStatus::Proposed);

        plan.advance(PlanStatus::Validated).unwrap();
        plan.advance(PlanStatus::Executing(0)).unwrap();
        plan.advance(PlanStatus::Executing(1)).unwrap();
        plan.advance(PlanStatus::PartiallyFilled).unwrap();
        plan.advance(PlanStatus::Reconciled).unwrap();
    }

    #[test]
    fn test_balance_keys_sorted_and_unique() {
        let plan = ExecutionPlan::from_loop(1, &scenario_loop(), dec!(0.1));
        let keys: Vec<String> = plan
            .balance_keys()
            .into_iter()
            .map(|(ex, c)| format!("{}:{}", ex, c))
            .collect();
        assert_eq!(keys, vec!["kraken:BTC", "kraken:EUR", "kraken:USD"]);
    }
}
