//! # Arbitrage Detector Crate
//!
//! Maintains a currency graph built from order book snapshots and searches it
//! for profitable closed loops. The [`DetectorService`] follows the book store's
//! change notifications and hands accepted loops to an executor.

pub mod deduplicator;
pub mod finder;
pub mod graph;
pub mod service;
pub mod sizing;
pub mod traits;
pub mod translator;

pub use finder::{FinderConfig, Loop, LoopFinder, LoopSearch};
pub use graph::{FeeSchedule, GraphConfig, GraphEdge, PairGraph};
pub use market_data::BookEvent;
pub use service::{DetectorConfig, DetectorService};
pub use traits::{IsExecutor, IsRiskManager};
