use common::{EngineEvent, Observer};

/// Writes every engine event to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl Observer for TracingObserver {
    fn record(&self, event: EngineEvent) {
        match event {
            EngineEvent::StaleUpdateDropped {
                pair,
                received,
                current,
            } => log::debug!("stale update for {} dropped ({} <= {})", pair, received, current),
            EngineEvent::SnapshotRejected { pair, reason } => {
                log::warn!("snapshot for {} rejected: {}", pair, reason)
            }
            EngineEvent::PairPruned { pair } => log::info!("pair {} pruned", pair),
            EngineEvent::LoopDetected {
                route,
                multiplier,
                volume,
            } => log::info!("loop {} x{:.6} volume {}", route, multiplier, volume),
            EngineEvent::LoopRejected { route, reason } => {
                log::info!("loop {} rejected: {}", route, reason)
            }
            EngineEvent::PlanStatusChanged { plan_id, status } => {
                log::debug!("plan {} is {}", plan_id, status)
            }
            EngineEvent::PlanFinished {
                plan_id,
                status,
                kind: None,
                ..
            } => log::info!("plan {} finished {}", plan_id, status),
            EngineEvent::PlanFinished {
                plan_id,
                status,
                kind: Some(kind),
                detail,
            } => log::warn!(
                "plan {} finished {} [{}]: {}",
                plan_id,
                status,
                kind,
                detail.unwrap_or_default()
            ),
            EngineEvent::TransferRecorded {
                plan_id,
                transaction_id,
                duplicate,
            } => log::info!(
                "plan {} transfer {} recorded{}",
                plan_id,
                transaction_id,
                if duplicate { " (duplicate)" } else { "" }
            ),
        }
    }
}
