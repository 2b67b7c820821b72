//! Wires the store, ingestion, detector and coordinator together.

use crate::risk_manager::ThresholdRiskManager;
use anyhow::{Context, Result};
use common::Observer;
use config::EngineConfig;
use detector::{DetectorService, PairGraph};
use exchange_adapter_trait::ExchangeAdapters;
use executor::TradeCoordinator;
use ledger::TransferSink;
use market_data::{MarketDataIngestor, OrderBookStore};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// A fully wired engine, not yet running.
pub struct Engine {
    store: Arc<OrderBookStore>,
    ingestor: MarketDataIngestor,
    detector: DetectorService,
    coordinator: Arc<TradeCoordinator>,
}

/// A running engine.
pub struct EngineHandle {
    store: Arc<OrderBookStore>,
    coordinator: Arc<TradeCoordinator>,
    graph: Arc<RwLock<PairGraph>>,
    shutdown: watch::Sender<bool>,
    ingestion: Vec<JoinHandle<()>>,
    detector: JoinHandle<Result<()>>,
}

impl Engine {
    /// Builds every service from `config`. Fails on configuration the adapters cannot serve.
    pub fn new(
        config: &EngineConfig,
        adapters: ExchangeAdapters,
        sink: Arc<dyn TransferSink>,
        observer: Arc<dyn Observer>,
    ) -> Result<Self> {
        config.validate().context("invalid engine configuration")?;

        let store = Arc::new(OrderBookStore::new(
            config.market_data.channel_capacity,
            observer.clone(),
        ));
        let ingestor = MarketDataIngestor::new(
            store.clone(),
            &adapters,
            config.pairs()?,
            config.market_data.clone(),
        )?;

        let coordinator = Arc::new(TradeCoordinator::new(
            config.coordinator.clone(),
            adapters,
            store.clone(),
            sink,
            observer.clone(),
        ));
        let risk_manager = Arc::new(ThresholdRiskManager::new(
            &config.risk,
            config.coordinator.max_plan_volume,
        ));
        let detector = DetectorService::new(
            config.detector.clone(),
            PairGraph::new(config.fee_schedule(), config.graph.dust_threshold),
            store.clone(),
            risk_manager,
            coordinator.clone(),
            observer,
        );

        Ok(Engine {
            store,
            ingestor,
            detector,
            coordinator,
        })
    }

    pub fn store(&self) -> Arc<OrderBookStore> {
        self.store.clone()
    }

    pub fn coordinator(&self) -> Arc<TradeCoordinator> {
        self.coordinator.clone()
    }

    /// Spawns ingestion and detection on the current runtime.
    pub fn start(self) -> EngineHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let graph = self.detector.graph();
        let ingestion = self.ingestor.spawn(shutdown_rx.clone());
        let detector = tokio::spawn(self.detector.run(shutdown_rx));
        log::info!("Engine started with {} ingestion tasks", ingestion.len());
        EngineHandle {
            store: self.store,
            coordinator: self.coordinator,
            graph,
            shutdown,
            ingestion,
            detector,
        }
    }
}

impl EngineHandle {
    pub fn store(&self) -> &Arc<OrderBookStore> {
        &self.store
    }

    pub fn coordinator(&self) -> &Arc<TradeCoordinator> {
        &self.coordinator
    }

    /// The detector's live view of the market.
    pub fn graph(&self) -> &Arc<RwLock<PairGraph>> {
        &self.graph
    }

    /// Signals every task to stop and waits for them, including in-flight executions.
    pub async fn shutdown(self) -> Result<()> {
        // Receivers may already be gone if every task exited on its own.
        let _ = self.shutdown.send(true);
        for handle in self.ingestion {
            handle.await.context("ingestion task panicked")?;
        }
        self.detector.await.context("detector task panicked")??;
        log::info!("Engine stopped");
        Ok(())
    }
}
