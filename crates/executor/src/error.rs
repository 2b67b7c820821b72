use crate::plan::PlanStatus;
use common::ErrorKind;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("plan {plan_id}: illegal transition {from} -> {to}")]
    InvalidTransition {
        plan_id: u64,
        from: PlanStatus,
        to: PlanStatus,
    },

    #[error("plan {plan_id} ended {status}: {reason}")]
    Unsuccessful {
        plan_id: u64,
        status: PlanStatus,
        reason: FailureReason,
    },
}

/// Why a plan did not complete.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureReason {
    /// A pre-flight check failed; nothing was placed.
    Validation(String),
    /// The exchange refused the step's order or reported a permanent error.
    Rejected { step: usize, reason: String },
    /// Transient failures persisted past the retry budget.
    RetriesExhausted { step: usize, reason: String },
    /// The step's order did not fill before its deadline.
    Timeout { step: usize },
    /// The order closed with less than the completion threshold filled.
    PartialFill {
        step: usize,
        filled: Decimal,
        amount: Decimal,
    },
}

impl FailureReason {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FailureReason::Validation(_) => ErrorKind::ValidationFailure,
            FailureReason::Rejected { .. } => ErrorKind::Permanent,
            FailureReason::RetriesExhausted { .. } | FailureReason::Timeout { .. } => {
                ErrorKind::Transient
            }
            FailureReason::PartialFill { .. } => ErrorKind::PartialExecution,
        }
    }

    pub fn step(&self) -> Option<usize> {
        match self {
            FailureReason::Validation(_) => None,
            FailureReason::Rejected { step, .. }
            | FailureReason::RetriesExhausted { step, .. }
            | FailureReason::Timeout { step }
            | FailureReason::PartialFill { step, .. } => Some(*step),
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Validation(reason) => write!(f, "validation failed: {}", reason),
            FailureReason::Rejected { step, reason } => {
                write!(f, "step {} rejected: {}", step, reason)
            }
            FailureReason::RetriesExhausted { step, reason } => {
                write!(f, "step {} gave up after retries: {}", step, reason)
            }
            FailureReason::Timeout { step } => write!(f, "step {} timed out", step),
            FailureReason::PartialFill {
                step,
                filled,
                amount,
            } => write!(f, "step {} filled {} of {}", step, filled, amount),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_reason_kinds() {
        assert_eq!(
            FailureReason::Validation("stale".into()).kind(),
            ErrorKind::ValidationFailure
        );
        assert_eq!(FailureReason::Timeout { step: 1 }.kind(), ErrorKind::Transient);
        let partial = FailureReason::PartialFill {
            step: 2,
            filled: dec!(0.4),
            amount: dec!(1),
        };
        assert_eq!(partial.kind(), ErrorKind::PartialExecution);
        assert_eq!(partial.step(), Some(2));
        assert_eq!(partial.to_string(), "step 2 filled 0.4 of 1");
    }

    #[test]
    fn test_unsuccessful_message_names_plan_and_state() {
        let err = ExecutionError::Unsuccessful {
            plan_id: 3,
            status: PlanStatus::PartiallyFilled,
            reason: FailureReason::Timeout { step: 1 },
        };
        assert_eq!(err.to_string(), "plan 3 ended PartiallyFilled: step 1 timed out");
    }
}
