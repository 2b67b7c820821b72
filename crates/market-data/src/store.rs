//! Latest order book per venue, with change notifications.

use chrono::{DateTime, Utc};
use common::{EngineEvent, ErrorKind, Observer, OrderBookSnapshot, PairKey};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Change notification published by the store.
#[derive(Debug, Clone)]
pub enum BookEvent {
    Updated(Arc<OrderBookSnapshot>),
    Pruned(PairKey),
}

impl BookEvent {
    pub fn key(&self) -> PairKey {
        match self {
            BookEvent::Updated(snapshot) => snapshot.pair.key(),
            BookEvent::Pruned(key) => key.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// Not newer than the snapshot already held; nothing changed.
    Stale,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("malformed snapshot for {pair}: {reason}")]
    Malformed { pair: PairKey, reason: String },
}

impl MarketDataError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::ValidationFailure
    }
}

/// A pair's slot. A pruned pair keeps the timestamp of its last book so
/// that late, older snapshots stay rejected.
#[derive(Debug, Clone)]
enum Slot {
    Live(Arc<OrderBookSnapshot>),
    Pruned(DateTime<Utc>),
}

impl Slot {
    fn last_updated(&self) -> DateTime<Utc> {
        match self {
            Slot::Live(snapshot) => snapshot.last_updated,
            Slot::Pruned(last_updated) => *last_updated,
        }
    }

    fn live(&self) -> Option<&Arc<OrderBookSnapshot>> {
        match self {
            Slot::Live(snapshot) => Some(snapshot),
            Slot::Pruned(_) => None,
        }
    }
}

/// Holds exactly one snapshot per [`PairKey`]. Updates are applied under the
/// key's entry lock and the matching event is published before it is released.
pub struct OrderBookStore {
    books: DashMap<PairKey, Slot>,
    tx: broadcast::Sender<BookEvent>,
    observer: Arc<dyn Observer>,
}

impl OrderBookStore {
    pub fn new(channel_capacity: usize, observer: Arc<dyn Observer>) -> Self {
        let (tx, _) = broadcast::channel(channel_capacity.max(1));
        OrderBookStore {
            books: DashMap::new(),
            tx,
            observer,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BookEvent> {
        self.tx.subscribe()
    }

    /// Stores `snapshot` if it is strictly newer than anything seen for its pair,
    /// including books that have since been pruned.
    pub fn update(&self, snapshot: OrderBookSnapshot) -> Result<UpdateOutcome, MarketDataError> {
        let key = snapshot.pair.key();
        if let Err(e) = snapshot.validate() {
            warn!(pair = %key, error = %e, "Rejected malformed order book");
            self.observer.record(EngineEvent::SnapshotRejected {
                pair: key.clone(),
                reason: e.to_string(),
            });
            return Err(MarketDataError::Malformed {
                pair: key,
                reason: e.to_string(),
            });
        }

        let snapshot = Arc::new(snapshot);
        match self.books.entry(key.clone()) {
            Entry::Occupied(mut held) => {
                let current = held.get().last_updated();
                if snapshot.last_updated <= current {
                    drop(held);
                    debug!(
                        pair = %key,
                        received = %snapshot.last_updated,
                        current = %current,
                        "Dropped stale order book"
                    );
                    self.observer.record(EngineEvent::StaleUpdateDropped {
                        pair: key,
                        received: snapshot.last_updated,
                        current,
                    });
                    return Ok(UpdateOutcome::Stale);
                }
                held.insert(Slot::Live(snapshot.clone()));
                // No receivers is fine.
                let _ = self.tx.send(BookEvent::Updated(snapshot));
            }
            Entry::Vacant(slot) => {
                slot.insert(Slot::Live(snapshot.clone()));
                let _ = self.tx.send(BookEvent::Updated(snapshot));
            }
        }
        Ok(UpdateOutcome::Applied)
    }

    pub fn get(&self, key: &PairKey) -> Option<Arc<OrderBookSnapshot>> {
        self.books.get(key).and_then(|s| s.value().live().cloned())
    }

    pub fn snapshots(&self) -> Vec<Arc<OrderBookSnapshot>> {
        self.books
            .iter()
            .filter_map(|s| s.value().live().cloned())
            .collect()
    }

    /// Removes snapshots older than `staleness` relative to now.
    pub fn prune(&self, staleness: Duration) -> Vec<PairKey> {
        let cutoff = chrono::Duration::from_std(staleness)
            .ok()
            .and_then(|age| Utc::now().checked_sub_signed(age));
        match cutoff {
            Some(cutoff) => self.prune_older_than(cutoff),
            None => Vec::new(),
        }
    }

    /// Removes snapshots last updated before `cutoff` and returns their keys.
    pub fn prune_older_than(&self, cutoff: DateTime<Utc>) -> Vec<PairKey> {
        let candidates: Vec<PairKey> = self
            .books
            .iter()
            .filter(|s| matches!(s.value().live(), Some(book) if book.last_updated < cutoff))
            .map(|s| s.key().clone())
            .collect();

        let mut pruned = Vec::with_capacity(candidates.len());
        for key in candidates {
            // Re-checked under the entry lock; a fresh update may have landed since.
            if let Entry::Occupied(mut held) = self.books.entry(key.clone()) {
                let Some(last_updated) = held.get().live().map(|b| b.last_updated) else {
                    continue;
                };
                if last_updated < cutoff {
                    let _ = self.tx.send(BookEvent::Pruned(key.clone()));
                    held.insert(Slot::Pruned(last_updated));
                    pruned.push(key);
                }
            }
        }
        for key in &pruned {
            debug!(pair = %key, "Pruned stale order book");
            self.observer
                .record(EngineEvent::PairPruned { pair: key.clone() });
        }
        pruned
    }

    /// Number of pairs with a live book.
    pub fn len(&self) -> usize {
        self.books.iter().filter(|s| s.value().live().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
