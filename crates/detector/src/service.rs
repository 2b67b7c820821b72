use crate::deduplicator::LoopDeduplicator;
use crate::finder::{FinderConfig, Loop, LoopFinder};
use crate::graph::PairGraph;
use crate::traits::{IsExecutor, IsRiskManager};
use anyhow::Result;
use common::{Currency, EngineEvent, Observer};
use market_data::OrderBookStore;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::{broadcast, watch};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

/// Configuration for the detector service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DetectorConfig {
    /// Currency every loop starts and ends in.
    pub base_currency: Currency,
    pub scan_interval_ms: u64,
    /// A route is not handed on again within this window.
    pub dedup_ttl_ms: u64,
    pub finder: FinderConfig,
}

/// Keeps the pair graph in step with the store and hands profitable loops
/// to the executor.
pub struct DetectorService {
    config: DetectorConfig,
    finder: LoopFinder,
    graph: Arc<RwLock<PairGraph>>,
    store: Arc<OrderBookStore>,
    risk_manager: Arc<dyn IsRiskManager>,
    executor: Arc<dyn IsExecutor>,
    observer: Arc<dyn Observer>,
    deduplicator: LoopDeduplicator,
    executions: JoinSet<()>,
}

impl DetectorService {
    /// Creates a new `DetectorService`.
    pub fn new(
        config: DetectorConfig,
        graph: PairGraph,
        store: Arc<OrderBookStore>,
        risk_manager: Arc<dyn IsRiskManager>,
        executor: Arc<dyn IsExecutor>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            finder: LoopFinder::new(config.finder.clone()),
            deduplicator: LoopDeduplicator::new(Duration::from_millis(config.dedup_ttl_ms)),
            config,
            graph: Arc::new(RwLock::new(graph)),
            store,
            risk_manager,
            executor,
            observer,
            executions: JoinSet::new(),
        }
    }

    /// Shared read access to the graph.
    pub fn graph(&self) -> Arc<RwLock<PairGraph>> {
        self.graph.clone()
    }

    /// Starts the main detection loop. Returns after shutdown once every
    /// in-flight execution has finished.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        let mut events = self.store.subscribe();
        self.resync();

        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.scan_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!(
            "DetectorService started (base {}, max depth {}, margin {})",
            self.config.base_currency,
            self.config.finder.max_depth,
            self.config.finder.margin
        );

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    log::info!("DetectorService shutting down.");
                    break;
                }
                received = events.recv() => match received {
                    Ok(event) => {
                        self.graph.write().apply(&event);
                        if !self.drain(&mut events) {
                            break;
                        }
                        self.scan().await;
                    }
                    Err(RecvError::Lagged(missed)) => {
                        log::warn!("Missed {} book events; rebuilding graph", missed);
                        self.resync();
                        self.scan().await;
                    }
                    Err(RecvError::Closed) => {
                        log::info!("Book event channel closed; stopping detector.");
                        break;
                    }
                },
                _ = ticker.tick() => self.scan().await,
                Some(joined) = self.executions.join_next(), if !self.executions.is_empty() => {
                    if let Err(e) = joined {
                        log::error!("Execution task failed: {}", e);
                    }
                }
            }
        }

        while let Some(joined) = self.executions.join_next().await {
            if let Err(e) = joined {
                log::error!("Execution task failed: {}", e);
            }
        }
        Ok(())
    }

    /// Applies every event already queued. Returns `false` if the channel closed.
    fn drain(&mut self, events: &mut broadcast::Receiver<crate::BookEvent>) -> bool {
        loop {
            match events.try_recv() {
                Ok(event) => self.graph.write().apply(&event),
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Lagged(missed)) => {
                    log::warn!("Missed {} book events; rebuilding graph", missed);
                    self.resync();
                }
                Err(TryRecvError::Closed) => return false,
            }
        }
    }

    fn resync(&self) {
        let snapshots = self.store.snapshots();
        self.graph.write().rebuild(snapshots);
    }

    async fn scan(&mut self) {
        let candidate = {
            let graph = self.graph.read();
            self.finder.best_loop(&graph, &self.config.base_currency)
        };
        let Some(candidate) = candidate else {
            return;
        };
        if self.deduplicator.is_duplicate(&candidate) {
            log::debug!("Skipping recently seen loop {}", candidate);
            return;
        }

        log::info!(
            "Found loop {} (multiplier {:.6}, volume {})",
            candidate,
            candidate.multiplier(),
            candidate.volume()
        );
        self.observer.record(EngineEvent::LoopDetected {
            route: candidate.route(),
            multiplier: candidate.multiplier(),
            volume: candidate.volume(),
        });

        match self.risk_manager.assess_risk(&candidate).await {
            Ok(true) => self.dispatch(candidate),
            Ok(false) => {
                log::info!("Risk manager rejected loop {}", candidate);
                self.observer.record(EngineEvent::LoopRejected {
                    route: candidate.route(),
                    reason: "risk limits".to_string(),
                });
            }
            Err(e) => {
                log::error!("Risk assessment failed for {}: {}", candidate, e);
                self.observer.record(EngineEvent::LoopRejected {
                    route: candidate.route(),
                    reason: e.to_string(),
                });
            }
        }
    }

    fn dispatch(&mut self, candidate: Loop) {
        let executor = self.executor.clone();
        self.executions.spawn(async move {
            if let Err(e) = executor.execute_loop(&candidate).await {
                log::warn!("Loop {} did not complete: {:#}", candidate, e);
            }
        });
    }
}
