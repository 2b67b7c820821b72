use crate::config::MarketDataConfig;
use crate::store::{OrderBookStore, UpdateOutcome};
use anyhow::{bail, Result};
use common::{OrderBookSnapshot, Pair};
use exchange_adapter_trait::{ExchangeAdapter, ExchangeAdapters};
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Feeds adapter order-book streams into the store and prunes stale books.
pub struct MarketDataIngestor {
    store: Arc<OrderBookStore>,
    subscriptions: Vec<(Arc<dyn ExchangeAdapter>, Pair)>,
    config: MarketDataConfig,
}

impl MarketDataIngestor {
    /// Fails if a pair names an exchange without an adapter.
    pub fn new(
        store: Arc<OrderBookStore>,
        adapters: &ExchangeAdapters,
        pairs: Vec<Pair>,
        config: MarketDataConfig,
    ) -> Result<Self> {
        let mut subscriptions = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let Some(adapter) = adapters.get(&pair.exchange) else {
                bail!("no adapter registered for exchange '{}'", pair.exchange);
            };
            subscriptions.push((adapter.clone(), pair));
        }
        Ok(Self {
            store,
            subscriptions,
            config,
        })
    }

    /// Starts one worker per subscription plus the pruner. All stop when
    /// `shutdown` flips to `true` or its sender is dropped.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!(
            subscriptions = self.subscriptions.len(),
            "Starting market data ingestion"
        );
        let mut handles: Vec<JoinHandle<()>> = self
            .subscriptions
            .iter()
            .map(|(adapter, pair)| {
                tokio::spawn(run_subscription(
                    adapter.clone(),
                    pair.clone(),
                    self.store.clone(),
                    self.config.clone(),
                    shutdown.clone(),
                ))
            })
            .collect();
        handles.push(tokio::spawn(run_pruner(
            self.store.clone(),
            self.config.prune_interval(),
            self.config.staleness(),
            shutdown,
        )));
        handles
    }
}

fn ingest(store: &OrderBookStore, snapshot: OrderBookSnapshot) {
    let pair = snapshot.pair.clone();
    match store.update(snapshot) {
        Ok(UpdateOutcome::Applied) => debug!(pair = %pair, "Applied order book"),
        Ok(UpdateOutcome::Stale) => {}
        Err(e) => warn!(pair = %pair, error = %e, "Discarded malformed order book"),
    }
}

async fn run_subscription(
    adapter: Arc<dyn ExchangeAdapter>,
    pair: Pair,
    store: Arc<OrderBookStore>,
    config: MarketDataConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut attempt: u32 = 0;
    loop {
        if *shutdown.borrow() {
            return;
        }
        match adapter.subscribe_order_book(&pair).await {
            Ok(mut feed) => {
                info!(pair = %pair, "Subscribed to order book");
                loop {
                    tokio::select! {
                        _ = shutdown.changed() => return,
                        item = feed.next() => match item {
                            Some(Ok(snapshot)) => {
                                attempt = 0;
                                ingest(&store, snapshot);
                            }
                            Some(Err(e)) if e.is_transient() => {
                                warn!(pair = %pair, error = %e, "Skipped order book feed error");
                            }
                            Some(Err(e)) => {
                                warn!(pair = %pair, error = %e, "Order book feed failed");
                                break;
                            }
                            None => {
                                info!(pair = %pair, "Order book feed ended");
                                break;
                            }
                        }
                    }
                }
            }
            Err(e) => {
                warn!(pair = %pair, error = %e, attempt = attempt, "Order book subscription failed");
            }
        }

        let delay = config.reconnect_delay(attempt);
        attempt = attempt.saturating_add(1);
        debug!(pair = %pair, delay_ms = delay.as_millis() as u64, "Resubscribing");
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(delay) => {}
        }
    }
}

async fn run_pruner(
    store: Arc<OrderBookStore>,
    interval: Duration,
    staleness: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                let pruned = store.prune(staleness);
                if !pruned.is_empty() {
                    info!(count = pruned.len(), "Pruned stale order books");
                }
            }
        }
    }
    debug!("Pruner stopped");
}
