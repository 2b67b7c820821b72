//! YAML configuration for the whole engine.

use common::{Currency, ExchangeId, Pair};
use detector::{DetectorConfig, FeeSchedule, GraphConfig};
use executor::CoordinatorConfig;
use market_data::MarketDataConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub mod paper;

pub use paper::{BalanceSeed, BookSeed, PaperConfig};

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EngineConfig {
    pub exchanges: Vec<ExchangeConfig>,
    pub market_data: MarketDataConfig,
    pub graph: GraphConfig,
    pub detector: DetectorConfig,
    pub coordinator: CoordinatorConfig,
    pub risk: RiskConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paper: Option<PaperConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ExchangeConfig {
    pub name: ExchangeId,
    /// Taker fee applied to every fill on this exchange.
    pub fee_rate: Decimal,
    /// Symbols in `BASE/QUOTE` form.
    pub pairs: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RiskConfig {
    /// Smallest deliverable volume, in the base currency, worth trading.
    pub min_volume: Decimal,
    /// Smallest expected gain, in the base currency.
    pub min_expected_profit: Decimal,
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content =
            serde_yaml::to_string(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        std::fs::write(path.as_ref(), content)?;
        Ok(())
    }

    pub fn exchange(&self, name: &str) -> Option<&ExchangeConfig> {
        self.exchanges.iter().find(|ex| ex.name.0 == name)
    }

    /// Every configured pair, parsed.
    pub fn pairs(&self) -> Result<Vec<Pair>, ConfigError> {
        let mut pairs = Vec::new();
        for exchange in &self.exchanges {
            for symbol in &exchange.pairs {
                let pair = Pair::parse(exchange.name.clone(), symbol).map_err(|e| {
                    ConfigError::ValidationError(format!(
                        "pair '{}' on '{}': {}",
                        symbol, exchange.name, e
                    ))
                })?;
                pairs.push(pair);
            }
        }
        Ok(pairs)
    }

    pub fn fee_schedule(&self) -> FeeSchedule {
        self.exchanges
            .iter()
            .fold(FeeSchedule::new(Decimal::ZERO), |fees, ex| {
                fees.with_rate(ex.name.clone(), ex.fee_rate)
            })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::ValidationError(msg));

        if self.exchanges.is_empty() {
            return invalid("No exchanges configured".to_string());
        }
        let mut names = HashSet::new();
        for exchange in &self.exchanges {
            if exchange.name.0.trim().is_empty() {
                return invalid("Exchange name cannot be empty".to_string());
            }
            if !names.insert(&exchange.name) {
                return invalid(format!("Exchange '{}' is configured twice", exchange.name));
            }
            if exchange.fee_rate < Decimal::ZERO || exchange.fee_rate >= Decimal::ONE {
                return invalid(format!(
                    "Fee rate for '{}' must be in [0, 1)",
                    exchange.name
                ));
            }
            if exchange.pairs.is_empty() {
                return invalid(format!("No pairs configured for exchange '{}'", exchange.name));
            }
        }
        let pairs = self.pairs()?;
        let base = &self.detector.base_currency;
        if !pairs.iter().any(|p| &p.base == base || &p.quote == base) {
            return invalid(format!("Base currency {} is not traded on any pair", base));
        }

        let md = &self.market_data;
        if md.staleness_ms == 0 || md.prune_interval_ms == 0 {
            return invalid("Staleness and prune interval must be greater than 0".to_string());
        }
        if md.channel_capacity == 0 {
            return invalid("Channel capacity must be greater than 0".to_string());
        }
        if md.reconnect_base_ms == 0 || md.reconnect_base_ms > md.reconnect_max_ms {
            return invalid("Reconnect backoff must satisfy 0 < base <= max".to_string());
        }

        if self.graph.dust_threshold < Decimal::ZERO {
            return invalid("Dust threshold cannot be negative".to_string());
        }

        let finder = &self.detector.finder;
        if finder.max_depth < 2 {
            return invalid("Loop depth limit must be at least 2".to_string());
        }
        if !finder.margin.is_finite() || finder.margin < 0.0 {
            return invalid("Finder margin must be a non-negative number".to_string());
        }
        if self.detector.scan_interval_ms == 0 {
            return invalid("Detector scan interval must be greater than 0".to_string());
        }

        let co = &self.coordinator;
        if co.completion_threshold <= Decimal::ZERO || co.completion_threshold > Decimal::ONE {
            return invalid("Completion threshold must be in (0, 1]".to_string());
        }
        if co.step_timeout_ms == 0 || co.poll_interval_ms == 0 {
            return invalid("Step timeout and poll interval must be greater than 0".to_string());
        }
        if co.revalidation_tolerance < Decimal::ZERO {
            return invalid("Revalidation tolerance cannot be negative".to_string());
        }
        if !co.margin.is_finite() || co.margin < 0.0 {
            return invalid("Coordinator margin must be a non-negative number".to_string());
        }
        if co.max_plan_volume <= Decimal::ZERO {
            return invalid("Maximum plan volume must be positive".to_string());
        }
        if co.retry.max_attempts == 0 {
            return invalid("Retry policy needs at least one attempt".to_string());
        }

        if self.risk.min_volume < Decimal::ZERO || self.risk.min_expected_profit < Decimal::ZERO {
            return invalid("Risk limits cannot be negative".to_string());
        }

        if let Some(paper) = &self.paper {
            paper.validate(&names, &Self::traded_currencies(&pairs))?;
        }
        Ok(())
    }

    fn traded_currencies(pairs: &[Pair]) -> HashSet<Currency> {
        pairs
            .iter()
            .flat_map(|p| [p.base.clone(), p.quote.clone()])
            .collect()
    }
}

pub async fn load_config_from_path(path: &str) -> Result<EngineConfig, ConfigError> {
    let content = tokio::fs::read_to_string(path).await?;
    EngineConfig::from_yaml(&content)
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}
