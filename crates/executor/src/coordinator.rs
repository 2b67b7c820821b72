//! Drives execution plans through their state machine against live exchanges.

use crate::error::{ExecutionError, FailureReason};
use crate::locks::{BalanceGuard, BalanceLocks};
use crate::plan::{ExecutionPlan, PlanStatus, TradeStep};
use crate::retry::{RetryError, RetryPolicy};
use async_trait::async_trait;
use common::{
    AdapterError, EngineEvent, ErrorKind, Observer, OrderId, OrderStatus, OrderType, Price,
    Quantity,
};
use detector::translator::snapshot_to_edges;
use detector::{IsExecutor, Loop};
use exchange_adapter_trait::{ExchangeAdapter, ExchangeAdapters};
use ledger::{Ack, LedgerError, TransferRecord, TransferSink};
use market_data::OrderBookStore;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CoordinatorConfig {
    /// Fraction of a step's amount that counts as filled.
    pub completion_threshold: Decimal,
    pub step_timeout_ms: u64,
    pub poll_interval_ms: u64,
    /// Largest relative price move since detection that still passes validation.
    pub revalidation_tolerance: Decimal,
    /// The recomputed multiplier must still exceed `1 + margin`.
    pub margin: f64,
    /// Cap on the starting amount, in the loop's base currency.
    pub max_plan_volume: Decimal,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl CoordinatorConfig {
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// What one step actually did on its exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct StepFill {
    pub step: usize,
    pub order_id: OrderId,
    pub filled: Quantity,
    pub average_price: Price,
}

/// Outcome of one plan.
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub plan: ExecutionPlan,
    /// The terminal execution state, kept after the plan moves on to `Reconciled`.
    pub outcome: PlanStatus,
    pub fills: Vec<StepFill>,
    pub records: Vec<TransferRecord>,
    pub failure: Option<FailureReason>,
    /// Balances stay locked until `release_quarantine` is called for this plan.
    pub quarantined: bool,
}

impl ExecutionReport {
    pub fn is_success(&self) -> bool {
        self.outcome == PlanStatus::Completed
    }

    pub fn is_reconciled(&self) -> bool {
        self.plan.status() == PlanStatus::Reconciled
    }

    pub fn error_kind(&self) -> Option<ErrorKind> {
        match self.outcome {
            PlanStatus::Completed => None,
            PlanStatus::PartiallyFilled => Some(ErrorKind::PartialExecution),
            _ => self.failure.as_ref().map(FailureReason::kind),
        }
    }
}

enum StepOutcome {
    Filled {
        fill: StepFill,
        /// An open remainder whose cancel was not acknowledged.
        unacknowledged: bool,
    },
    /// Closed below the completion threshold.
    Partial(StepFill),
    Failed {
        fill: Option<StepFill>,
        reason: FailureReason,
        /// The order may still be live on the exchange.
        unacknowledged: bool,
    },
}

/// Executes loops one plan at a time per set of balances.
pub struct TradeCoordinator {
    config: CoordinatorConfig,
    adapters: ExchangeAdapters,
    store: Arc<OrderBookStore>,
    sink: Arc<dyn TransferSink>,
    observer: Arc<dyn Observer>,
    locks: BalanceLocks,
    quarantine: Mutex<HashMap<u64, BalanceGuard>>,
    next_plan_id: AtomicU64,
}

impl TradeCoordinator {
    pub fn new(
        config: CoordinatorConfig,
        adapters: ExchangeAdapters,
        store: Arc<OrderBookStore>,
        sink: Arc<dyn TransferSink>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        TradeCoordinator {
            config,
            adapters,
            store,
            sink,
            observer,
            locks: BalanceLocks::new(),
            quarantine: Mutex::new(HashMap::new()),
            next_plan_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    pub fn locks(&self) -> &BalanceLocks {
        &self.locks
    }

    /// Plans whose balances are held pending reconciliation.
    pub fn quarantined_plans(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self.quarantine.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Frees the balances of a quarantined plan once its orders are known to be settled.
    pub fn release_quarantine(&self, plan_id: u64) -> bool {
        match self.quarantine.lock().remove(&plan_id) {
            Some(guard) => {
                log::info!(
                    "Plan {} released from quarantine ({} balances)",
                    plan_id,
                    guard.keys().len()
                );
                true
            }
            None => false,
        }
    }

    /// Runs `candidate` from proposal to its terminal state and, when possible, reconciliation.
    pub async fn execute(&self, candidate: &Loop) -> Result<ExecutionReport, ExecutionError> {
        let plan_id = self.next_plan_id.fetch_add(1, Ordering::SeqCst);
        let start = candidate.volume().0.min(self.config.max_plan_volume);
        let mut plan = ExecutionPlan::from_loop(plan_id, candidate, start);
        self.report_status(&plan);
        log::info!(
            "Plan {} proposed for {} starting with {} {}",
            plan_id,
            candidate,
            start,
            candidate.base()
        );

        let guard = self.locks.acquire(&plan.balance_keys()).await;

        if let Err(reason) = self.validate(&plan).await {
            log::warn!("Plan {} failed validation: {}", plan_id, reason);
            self.transition(&mut plan, PlanStatus::Failed)?;
            let report = ExecutionReport {
                plan,
                outcome: PlanStatus::Failed,
                fills: Vec::new(),
                records: Vec::new(),
                failure: Some(reason),
                quarantined: false,
            };
            self.report_finished(&report);
            return Ok(report);
        }
        self.transition(&mut plan, PlanStatus::Validated)?;

        let mut fills = Vec::new();
        let mut failure = None;
        let mut unacknowledged = false;
        let mut outcome = PlanStatus::Completed;

        for step in plan.steps().to_vec() {
            self.transition(&mut plan, PlanStatus::Executing(step.index))?;
            match self.run_step(plan_id, &step).await {
                StepOutcome::Filled {
                    fill,
                    unacknowledged: live,
                } => {
                    fills.push(fill);
                    unacknowledged |= live;
                }
                StepOutcome::Partial(fill) => {
                    failure = Some(FailureReason::PartialFill {
                        step: step.index,
                        filled: fill.filled.0,
                        amount: step.amount.0,
                    });
                    fills.push(fill);
                    outcome = PlanStatus::PartiallyFilled;
                    break;
                }
                StepOutcome::Failed {
                    fill,
                    reason,
                    unacknowledged: live,
                } => {
                    outcome = if fills.is_empty() {
                        PlanStatus::Failed
                    } else {
                        PlanStatus::PartiallyFilled
                    };
                    fills.extend(fill);
                    failure = Some(reason);
                    unacknowledged |= live;
                    break;
                }
            }
        }
        self.transition(&mut plan, outcome)?;

        match failure.as_ref().map(|f| f.to_string()) {
            None => log::info!("Plan {} completed", plan_id),
            Some(detail) => log::warn!("Plan {} ended {}: {}", plan_id, outcome, detail),
        }

        let records: Vec<TransferRecord> = fills
            .iter()
            .map(|fill| {
                let step = &plan.steps()[fill.step];
                TransferRecord::new(
                    plan_id,
                    fill.step,
                    step.exchange.clone(),
                    step.order_type,
                    step.pair.base.clone(),
                    fill.filled,
                    fill.average_price,
                )
            })
            .collect();
        let acknowledged = self.deliver(plan_id, &records).await;

        if unacknowledged {
            log::error!(
                "Plan {} has an unacknowledged cancel; quarantining {} balances",
                plan_id,
                guard.keys().len()
            );
            self.quarantine.lock().insert(plan_id, guard);
        } else {
            drop(guard);
            if acknowledged {
                self.transition(&mut plan, PlanStatus::Reconciled)?;
            }
        }

        let report = ExecutionReport {
            plan,
            outcome,
            fills,
            records,
            failure,
            quarantined: unacknowledged,
        };
        self.report_finished(&report);
        Ok(report)
    }

    fn adapter(&self, step: &TradeStep) -> Option<&Arc<dyn ExchangeAdapter>> {
        self.adapters.get(&step.exchange)
    }

    /// Pre-flight checks. Nothing is placed when any of them fails.
    async fn validate(&self, plan: &ExecutionPlan) -> Result<(), FailureReason> {
        let fail = |reason: String| FailureReason::Validation(reason);
        if plan.start_amount() <= Decimal::ZERO {
            return Err(fail("loop has no deliverable volume".into()));
        }

        let mut reached = BTreeSet::new();
        for step in plan.steps() {
            let adapter = self
                .adapter(step)
                .ok_or_else(|| fail(format!("no adapter for exchange {}", step.exchange)))?;
            if step.index > 0 && reached.contains(&step.exchange) {
                continue;
            }
            let balance = self
                .config
                .retry
                .run("get_balance", AdapterError::is_transient, || {
                    adapter.get_balance(&step.from)
                })
                .await
                .map_err(|e| fail(format!("{} unreachable: {}", step.exchange, e.into_inner())))?;
            reached.insert(step.exchange.clone());
            if step.index == 0 && balance.0 < step.input {
                return Err(fail(format!(
                    "insufficient {} on {}: need {}, have {}",
                    step.from, step.exchange, step.input, balance
                )));
            }
        }

        let mut current = 1.0_f64;
        for step in plan.steps() {
            let snapshot = self
                .store
                .get(&step.pair.key())
                .ok_or_else(|| fail(format!("{} is unavailable", step.pair)))?;
            let level = match step.order_type {
                OrderType::Sell => snapshot.best_bid(),
                OrderType::Buy => snapshot.best_ask(),
            }
            .ok_or_else(|| fail(format!("{} has an empty side", step.pair)))?;

            let moved = ((level.price.0 - step.limit_price.0) / step.limit_price.0).abs();
            if moved > self.config.revalidation_tolerance {
                return Err(fail(format!(
                    "{} moved from {} to {}",
                    step.pair, step.limit_price, level.price
                )));
            }

            let edge = snapshot_to_edges(&snapshot, step.fee)
                .into_iter()
                .find(|e| e.from == step.from)
                .ok_or_else(|| fail(format!("{} no longer trades {}", step.pair, step.from)))?;
            current *= edge.weight;
        }
        let threshold = 1.0 + self.config.margin;
        if current <= threshold {
            return Err(fail(format!(
                "multiplier fell to {:.6}, needs more than {:.6}",
                current, threshold
            )));
        }
        Ok(())
    }

    async fn run_step(&self, plan_id: u64, step: &TradeStep) -> StepOutcome {
        let Some(adapter) = self.adapter(step) else {
            return StepOutcome::Failed {
                fill: None,
                reason: FailureReason::Rejected {
                    step: step.index,
                    reason: format!("no adapter for exchange {}", step.exchange),
                },
                unacknowledged: false,
            };
        };
        let request = step.order_request();
        let placed = self
            .config
            .retry
            .run("place_order", AdapterError::is_transient, || {
                adapter.place_order(&request)
            })
            .await;
        let order_id = match placed {
            Ok(order_id) => order_id,
            Err(RetryError::Permanent(e)) => {
                return StepOutcome::Failed {
                    fill: None,
                    reason: FailureReason::Rejected {
                        step: step.index,
                        reason: e.to_string(),
                    },
                    unacknowledged: false,
                }
            }
            Err(RetryError::Exhausted { last, .. }) => {
                return StepOutcome::Failed {
                    fill: None,
                    reason: FailureReason::RetriesExhausted {
                        step: step.index,
                        reason: last.to_string(),
                    },
                    unacknowledged: false,
                }
            }
        };
        log::info!(
            "Plan {} step {}: placed {} {} {} @ {} as {}",
            plan_id,
            step.index,
            step.order_type,
            step.amount,
            step.pair,
            step.limit_price,
            order_id
        );

        let required = step.amount.0 * self.config.completion_threshold;
        let deadline = Instant::now() + self.config.step_timeout();
        let mut last_seen: Option<OrderStatus> = None;

        let reason = loop {
            match adapter.get_order_status(&order_id).await {
                Ok(status) => {
                    if status.filled_quantity.0 >= required && status.filled_quantity.0 > Decimal::ZERO {
                        let acknowledged =
                            !status.is_open || Self::cancel(adapter, &order_id).await;
                        if !acknowledged {
                            log::warn!(
                                "Plan {} step {}: remainder of {} may still execute",
                                plan_id,
                                step.index,
                                order_id
                            );
                        }
                        return StepOutcome::Filled {
                            fill: self.fill(step, &order_id, &status),
                            unacknowledged: !acknowledged,
                        };
                    }
                    if !status.is_open {
                        if status.filled_quantity.0 > Decimal::ZERO {
                            return StepOutcome::Partial(self.fill(step, &order_id, &status));
                        }
                        return StepOutcome::Failed {
                            fill: None,
                            reason: FailureReason::Rejected {
                                step: step.index,
                                reason: format!("order {} closed unfilled", order_id),
                            },
                            unacknowledged: false,
                        };
                    }
                    last_seen = Some(status);
                }
                Err(e) if e.is_transient() => {
                    log::warn!("Plan {} step {}: status poll failed: {}", plan_id, step.index, e);
                }
                Err(e) => {
                    break FailureReason::Rejected {
                        step: step.index,
                        reason: e.to_string(),
                    };
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break FailureReason::Timeout { step: step.index };
            }
            tokio::time::sleep(self.config.poll_interval().min(deadline - now)).await;
        };

        log::warn!("Plan {} step {}: {}; cancelling {}", plan_id, step.index, reason, order_id);
        let acknowledged = Self::cancel(adapter, &order_id).await;
        if let Ok(status) = adapter.get_order_status(&order_id).await {
            last_seen = Some(status);
        }
        let fill = last_seen
            .filter(|status| status.filled_quantity.0 > Decimal::ZERO)
            .map(|status| self.fill(step, &order_id, &status));

        StepOutcome::Failed {
            fill,
            reason,
            unacknowledged: !acknowledged,
        }
    }

    /// Whether the exchange acknowledged cancelling `order_id`. Errors count as not.
    async fn cancel(adapter: &Arc<dyn ExchangeAdapter>, order_id: &OrderId) -> bool {
        match adapter.cancel_order(order_id).await {
            Ok(acknowledged) => acknowledged,
            Err(e) => {
                log::warn!("Cancel of {} failed: {}", order_id, e);
                false
            }
        }
    }

    fn fill(&self, step: &TradeStep, order_id: &OrderId, status: &OrderStatus) -> StepFill {
        StepFill {
            step: step.index,
            order_id: order_id.clone(),
            filled: status.filled_quantity,
            average_price: status.average_price.unwrap_or(step.limit_price),
        }
    }

    /// Hands every record to the sink. Returns `true` once all are acknowledged.
    async fn deliver(&self, plan_id: u64, records: &[TransferRecord]) -> bool {
        let mut all_acknowledged = true;
        for record in records {
            let sent = self
                .config
                .retry
                .run("record_transfer", LedgerError::is_transient, || {
                    self.sink.record(record.clone())
                })
                .await;
            match sent {
                Ok(ack) => {
                    self.observer.record(EngineEvent::TransferRecorded {
                        plan_id,
                        transaction_id: record.transaction_id.clone(),
                        duplicate: ack == Ack::Duplicate,
                    });
                }
                Err(e) => {
                    log::error!(
                        "Plan {}: transfer {} not recorded: {}",
                        plan_id,
                        record.transaction_id,
                        e.into_inner()
                    );
                    all_acknowledged = false;
                }
            }
        }
        all_acknowledged
    }

    fn transition(&self, plan: &mut ExecutionPlan, next: PlanStatus) -> Result<(), ExecutionError> {
        plan.advance(next)?;
        self.report_status(plan);
        Ok(())
    }

    fn report_status(&self, plan: &ExecutionPlan) {
        log::debug!("Plan {} -> {}", plan.id(), plan.status());
        self.observer.record(EngineEvent::PlanStatusChanged {
            plan_id: plan.id(),
            status: plan.status().to_string(),
        });
    }

    fn report_finished(&self, report: &ExecutionReport) {
        self.observer.record(EngineEvent::PlanFinished {
            plan_id: report.plan.id(),
            status: report.outcome.to_string(),
            kind: report.error_kind(),
            detail: report.failure.as_ref().map(|f| f.to_string()),
        });
    }
}

#[async_trait]
impl IsExecutor for TradeCoordinator {
    async fn execute_loop(&self, candidate: &Loop) -> anyhow::Result<()> {
        let report = self.execute(candidate).await?;
        if report.is_success() {
            log::info!(
                "Plan {} completed: {} {} in, about {} expected back",
                report.plan.id(),
                report.plan.start_amount(),
                candidate.base(),
                report.plan.expected_return()
            );
            return Ok(());
        }
        let reason = report
            .failure
            .clone()
            .unwrap_or_else(|| FailureReason::Validation("unknown".into()));
        Err(ExecutionError::Unsuccessful {
            plan_id: report.plan.id(),
            status: report.outcome,
            reason,
        }
        .into())
    }
}
