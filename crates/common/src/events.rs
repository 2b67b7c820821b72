//! Domain events reported to the [`Observer`](crate::traits::Observer).

use crate::errors::ErrorKind;
use crate::types::{PairKey, Quantity};
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    /// An update was not newer than the snapshot already held.
    StaleUpdateDropped {
        pair: PairKey,
        received: DateTime<Utc>,
        current: DateTime<Utc>,
    },
    /// A snapshot failed validation and never reached the store.
    SnapshotRejected { pair: PairKey, reason: String },
    PairPruned { pair: PairKey },
    LoopDetected {
        route: String,
        multiplier: f64,
        volume: Quantity,
    },
    LoopRejected { route: String, reason: String },
    PlanStatusChanged { plan_id: u64, status: String },
    PlanFinished {
        plan_id: u64,
        status: String,
        kind: Option<ErrorKind>,
        detail: Option<String>,
    },
    TransferRecorded {
        plan_id: u64,
        transaction_id: String,
        duplicate: bool,
    },
}

impl EngineEvent {
    /// The failure class carried by the event, if it reports one.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            EngineEvent::StaleUpdateDropped { .. } => Some(ErrorKind::StaleData),
            EngineEvent::SnapshotRejected { .. } => Some(ErrorKind::ValidationFailure),
            EngineEvent::PlanFinished { kind, .. } => *kind,
            _ => None,
        }
    }

    pub fn plan_id(&self) -> Option<u64> {
        match self {
            EngineEvent::PlanStatusChanged { plan_id, .. }
            | EngineEvent::PlanFinished { plan_id, .. }
            | EngineEvent::TransferRecorded { plan_id, .. } => Some(*plan_id),
            _ => None,
        }
    }
}
