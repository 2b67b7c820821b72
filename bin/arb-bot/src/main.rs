use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use common::{BookLevel, ExchangeId, OrderBookSnapshot, Price, Quantity};
use config::{load_config_from_path, BookSeed, EngineConfig, PaperConfig};
use engine::{Engine, TracingObserver};
use exchange_adapter_trait::{registry, ExchangeAdapter};
use exchange_adapters::PaperExchange;
use ledger::InMemoryLedger;
use rand::Rng;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Command line arguments for arb-bot.
#[derive(Parser, Debug)]
struct Args {
    /// Path to the engine configuration YAML
    #[arg(long, default_value = "config/paper.yml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
    let args = Args::parse();

    let config = load_config_from_path(&args.config)
        .await
        .with_context(|| format!("loading {}", args.config))?;
    config.validate()?;
    let paper = config.paper.clone().unwrap_or_default();

    let exchanges = paper_exchanges(&config, &paper)?;
    let ledger = Arc::new(InMemoryLedger::new());
    let engine = Engine::new(
        &config,
        registry(
            exchanges
                .values()
                .map(|ex| ex.clone() as Arc<dyn ExchangeAdapter>),
        ),
        ledger.clone(),
        Arc::new(TracingObserver),
    )?;
    let handle = engine.start();

    let (feeder_shutdown_tx, feeder_shutdown_rx) = watch::channel(false);
    let feeder = spawn_feeder(exchanges.clone(), paper, feeder_shutdown_rx);
    info!(
        exchanges = exchanges.len(),
        pairs = handle.store().len(),
        "Paper trading started"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    feeder_shutdown_tx.send(true).ok();
    if let Err(e) = feeder.await {
        error!(error = %e, "Book feeder task failed");
    }
    if let Err(e) = handle.shutdown().await {
        error!(error = %e, "Engine exited with error");
    }

    for (id, exchange) in &exchanges {
        info!(exchange = %id, orders = exchange.placed_orders().len(), "Exchange summary");
    }
    info!(transfers = ledger.len(), "Ledger summary");
    Ok(())
}

/// One paper exchange per configured exchange, funded and quoted from the seed data.
fn paper_exchanges(
    config: &EngineConfig,
    paper: &PaperConfig,
) -> Result<HashMap<ExchangeId, Arc<PaperExchange>>> {
    let mut exchanges = HashMap::new();
    for ex in &config.exchanges {
        let exchange = paper
            .balances
            .iter()
            .filter(|seed| seed.exchange == ex.name)
            .fold(PaperExchange::new(ex.name.clone(), ex.fee_rate), |exchange, seed| {
                exchange.with_balance(seed.currency.clone(), seed.amount)
            });
        exchanges.insert(ex.name.clone(), Arc::new(exchange));
    }
    for seed in &paper.books {
        if let Some(exchange) = exchanges.get(&seed.exchange) {
            exchange.set_book(seed_book(seed, Decimal::ZERO)?);
        }
    }
    Ok(exchanges)
}

/// The seed book moved by `shift`, stamped now.
fn seed_book(seed: &BookSeed, shift: Decimal) -> Result<OrderBookSnapshot> {
    let factor = Decimal::ONE + shift;
    Ok(OrderBookSnapshot::new(
        seed.pair()?,
        vec![BookLevel::new(Price(seed.bid * factor), Quantity(seed.volume))],
        vec![BookLevel::new(Price(seed.ask * factor), Quantity(seed.volume))],
        Utc::now(),
    ))
}

/// Republishes every seed book on each tick so the books never go stale.
fn spawn_feeder(
    exchanges: HashMap<ExchangeId, Arc<PaperExchange>>,
    paper: PaperConfig,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_millis(paper.feed_interval_ms));
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {
                    for seed in &paper.books {
                        let Some(exchange) = exchanges.get(&seed.exchange) else {
                            continue;
                        };
                        match seed_book(seed, random_shift(paper.jitter)) {
                            Ok(book) => exchange.set_book(book),
                            Err(e) => warn!(pair = %seed.pair, error = %e, "Skipping seed book"),
                        }
                    }
                }
            }
        }
    })
}

fn random_shift(jitter: Decimal) -> Decimal {
    if jitter.is_zero() {
        return Decimal::ZERO;
    }
    let unit: f64 = rand::thread_rng().gen_range(-1.0..=1.0);
    Decimal::from_f64(unit).map_or(Decimal::ZERO, |u| u * jitter)
}
