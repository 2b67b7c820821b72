use common::{Currency, ExchangeId};
use dashmap::DashMap;
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

pub type BalanceKey = (ExchangeId, Currency);

/// Exclusive locks on (exchange, currency) balances.
#[derive(Default)]
pub struct BalanceLocks {
    locks: DashMap<BalanceKey, Arc<Mutex<()>>>,
}

/// Holds a set of balances until dropped.
pub struct BalanceGuard {
    keys: Vec<BalanceKey>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl BalanceGuard {
    pub fn keys(&self) -> &[BalanceKey] {
        &self.keys
    }
}

impl BalanceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires every key in sorted order. Concurrent callers with overlapping
    /// sets therefore cannot deadlock.
    pub async fn acquire(&self, keys: &BTreeSet<BalanceKey>) -> BalanceGuard {
        let mut guards = Vec::with_capacity(keys.len());
        for key in keys {
            let lock = self.lock_for(key);
            guards.push(lock.lock_owned().await);
        }
        BalanceGuard {
            keys: keys.iter().cloned().collect(),
            _guards: guards,
        }
    }

    /// Whether some guard currently holds `key`.
    pub fn is_locked(&self, key: &BalanceKey) -> bool {
        self.locks
            .get(key)
            .map(|lock| lock.try_lock().is_err())
            .unwrap_or(false)
    }

    fn lock_for(&self, key: &BalanceKey) -> Arc<Mutex<()>> {
        // Cloned out so no map shard stays borrowed across the await.
        self.locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}
