pub mod config;
pub mod ingestor;
pub mod store;

pub use config::MarketDataConfig;
pub use ingestor::MarketDataIngestor;
pub use store::{BookEvent, MarketDataError, OrderBookStore, UpdateOutcome};
