//! Funds transfer tracking: one immutable record per filled trade step,
//! delivered to a sink that is idempotent on the transaction id.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Currency, ExchangeId, OrderType, Price, Quantity};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// A completed movement of funds on one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: Uuid,
    /// Deterministic per plan step, so re-delivery is detectable.
    pub transaction_id: String,
    pub plan_id: u64,
    pub exchange: ExchangeId,
    pub direction: OrderType,
    pub currency: Currency,
    pub amount: Quantity,
    pub price: Price,
    pub created_at: DateTime<Utc>,
}

impl TransferRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        plan_id: u64,
        step: usize,
        exchange: ExchangeId,
        direction: OrderType,
        currency: Currency,
        amount: Quantity,
        price: Price,
    ) -> Self {
        TransferRecord {
            id: Uuid::new_v4(),
            transaction_id: transaction_id(plan_id, step),
            plan_id,
            exchange,
            direction,
            currency,
            amount,
            price,
            created_at: Utc::now(),
        }
    }
}

pub fn transaction_id(plan_id: u64, step: usize) -> String {
    format!("plan-{}-step-{}", plan_id, step)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Stored,
    /// A record with the same transaction id was already stored; nothing changed.
    Duplicate,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("ledger unavailable: {0}")]
    Unavailable(String),

    #[error("record rejected: {0}")]
    Rejected(String),
}

impl LedgerError {
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Unavailable(_))
    }
}

#[async_trait]
pub trait TransferSink: Send + Sync {
    async fn record(&self, record: TransferRecord) -> Result<Ack, LedgerError>;
}

/// Sink that keeps records in memory, keyed by transaction id.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    records: DashMap<String, TransferRecord>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, transaction_id: &str) -> Option<TransferRecord> {
        self.records.get(transaction_id).map(|r| r.value().clone())
    }

    /// All stored records ordered by transaction id.
    pub fn records(&self) -> Vec<TransferRecord> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by(|a, b| a.transaction_id.cmp(&b.transaction_id));
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl TransferSink for InMemoryLedger {
    async fn record(&self, record: TransferRecord) -> Result<Ack, LedgerError> {
        if record.amount.0.is_sign_negative() {
            return Err(LedgerError::Rejected(format!(
                "{} has negative amount {}",
                record.transaction_id, record.amount
            )));
        }
        match self.records.entry(record.transaction_id.clone()) {
            Entry::Occupied(_) => {
                log::debug!("Transfer {} already recorded", record.transaction_id);
                Ok(Ack::Duplicate)
            }
            Entry::Vacant(slot) => {
                log::info!(
                    "Recorded transfer {}: {} {} {} on {} @ {}",
                    record.transaction_id,
                    record.direction,
                    record.amount,
                    record.currency,
                    record.exchange,
                    record.price
                );
                slot.insert(record);
                Ok(Ack::Stored)
            }
        }
    }
}
