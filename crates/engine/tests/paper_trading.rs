//! End-to-end run of the engine against the paper exchange.

use chrono::Utc;
use common::test_utils::{book, pair, RecordingObserver};
use common::{Currency, EngineEvent, ExchangeId};
use config::EngineConfig;
use engine::{Engine, TracingObserver};
use exchange_adapter_trait::{registry, ExchangeAdapter};
use exchange_adapters::PaperExchange;
use ledger::InMemoryLedger;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

const CONFIG: &str = r#"
exchanges:
  - name: kraken
    fee_rate: "0.001"
    pairs: ["BTC/USD", "USD/EUR", "EUR/BTC"]
market_data:
  staleness_ms: 60000
  prune_interval_ms: 1000
  channel_capacity: 64
graph:
  dust_threshold: "0"
detector:
  base_currency: BTC
  scan_interval_ms: 20
  dedup_ttl_ms: 60000
  finder:
    max_depth: 3
    margin: 0.001
coordinator:
  completion_threshold: "0.99"
  step_timeout_ms: 500
  poll_interval_ms: 10
  revalidation_tolerance: "0.01"
  margin: 0.001
  max_plan_volume: "0.1"
  retry:
    max_attempts: 3
    base_delay_ms: 1
    max_delay_ms: 5
risk:
  min_volume: "0.01"
  min_expected_profit: "0"
"#;

fn paper_exchange() -> Arc<PaperExchange> {
    let paper = Arc::new(
        PaperExchange::new(ExchangeId::from("kraken"), dec!(0.001))
            .with_balance(Currency::from("BTC"), dec!(1))
            .with_balance(Currency::from("USD"), dec!(100000))
            .with_balance(Currency::from("EUR"), dec!(100000)),
    );
    let now = Utc::now();
    for (symbol, bid, volume) in [
        ("BTC/USD", dec!(50000), dec!(2)),
        ("USD/EUR", dec!(0.90), dec!(200000)),
        ("EUR/BTC", dec!(1.005) / dec!(45000), dec!(200000)),
    ] {
        paper.set_book(book(
            &pair("kraken", symbol),
            (bid, volume),
            (bid * dec!(1.01), volume),
            now,
        ));
    }
    paper
}

#[tokio::test]
async fn test_engine_trades_the_scenario_loop_once() {
    let config = EngineConfig::from_yaml(CONFIG).unwrap();
    let paper = paper_exchange();
    let ledger = Arc::new(InMemoryLedger::new());
    let observer = Arc::new(RecordingObserver::new());

    let engine = Engine::new(
        &config,
        registry([paper.clone() as Arc<dyn ExchangeAdapter>]),
        ledger.clone(),
        observer.clone(),
    )
    .unwrap();
    let handle = engine.start();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while ledger.len() < 3 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    // Give a second dispatch a chance to show up if dedup were broken.
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(handle.store().len(), 3);
    assert_eq!(handle.graph().read().edge_count(), 6);
    handle.shutdown().await.unwrap();

    assert_eq!(ledger.len(), 3);
    assert_eq!(paper.placed_orders().len(), 3);
    assert!(paper.balance(&Currency::from("BTC")) > dec!(1));
    assert_eq!(
        observer.count(|e| matches!(e, EngineEvent::PlanFinished { kind: None, .. })),
        1
    );
}

#[tokio::test]
async fn test_engine_rejects_unknown_exchange() {
    let config = EngineConfig::from_yaml(CONFIG).unwrap();
    let other = Arc::new(PaperExchange::new(ExchangeId::from("gemini"), dec!(0.001)));
    let result = Engine::new(
        &config,
        registry([other as Arc<dyn ExchangeAdapter>]),
        Arc::new(InMemoryLedger::new()),
        Arc::new(TracingObserver),
    );
    assert!(result.is_err());
}

#[tokio::test]
async fn test_engine_refuses_invalid_config() {
    let mut config = EngineConfig::from_yaml(CONFIG).unwrap();
    config.detector.finder.max_depth = 1;
    let result = Engine::new(
        &config,
        registry([paper_exchange() as Arc<dyn ExchangeAdapter>]),
        Arc::new(InMemoryLedger::new()),
        Arc::new(TracingObserver),
    );
    let err = result.err().unwrap();
    assert!(format!("{:#}", err).contains("depth"));
}
