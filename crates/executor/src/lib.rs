//! Trade coordination: turns a detected loop into an execution plan and drives
//! it step by step against the exchanges, recording every fill.

pub mod coordinator;
pub mod error;
pub mod locks;
pub mod plan;
pub mod retry;

pub use coordinator::{CoordinatorConfig, ExecutionReport, StepFill, TradeCoordinator};
pub use error::{ExecutionError, FailureReason};
pub use locks::{BalanceGuard, BalanceKey, BalanceLocks};
pub use plan::{ExecutionPlan, PlanStatus, TradeStep};
pub use retry::{RetryError, RetryPolicy};
