use crate::finder::Loop;
use anyhow::Result;
use async_trait::async_trait;

/// A trait for a service that assesses the risk of a candidate loop.
#[async_trait]
pub trait IsRiskManager: Send + Sync {
    /// Returns `true` if the loop is safe to execute, `false` otherwise.
    async fn assess_risk(&self, candidate: &Loop) -> Result<bool>;
}

/// A trait for a service that trades a loop.
#[async_trait]
pub trait IsExecutor: Send + Sync {
    /// Runs the loop to a terminal state. Anything short of full completion is an error.
    async fn execute_loop(&self, candidate: &Loop) -> Result<()>;
}
