//! Shared collaborator traits.

use crate::events::EngineEvent;

/// Receives domain events from every service. Passed explicitly to each
/// component that reports.
pub trait Observer: Send + Sync {
    fn record(&self, event: EngineEvent);
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl Observer for NoopObserver {
    fn record(&self, _event: EngineEvent) {}
}
