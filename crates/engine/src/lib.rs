//! Orchestration and dependency injection.

pub mod engine;
pub mod observer;
pub mod risk_manager;

pub use engine::{Engine, EngineHandle};
pub use observer::TracingObserver;
pub use risk_manager::ThresholdRiskManager;
