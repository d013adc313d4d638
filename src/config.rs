//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs. Every
//! section falls back to its defaults, so a partial file (or an empty one)
//! is valid.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::EngineSettings;
use crate::feed::FeedConfig;
use crate::strategy::kelly::KellyConfig;
use crate::strategy::pricing::FairValueModel;
use crate::strategy::risk::RiskConfig;
use crate::strategy::safety::SafetyConfig;
use crate::strategy::TradingConfig;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub trading: TradingConfig,
    pub safety: SafetyConfig,
    pub risk: RiskConfig,
    pub kelly: KellyConfig,
    pub feed: FeedConfig,
    pub dashboard: DashboardConfig,
}

/// Which fair-value model the engine prices with.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Fixed,
    BlackScholes,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub tick_interval_ms: u64,
    /// Length of one trading window; expiry is set this far after startup.
    pub session_minutes: i64,
    pub symbol: String,
    pub fair_value_model: ModelKind,
    /// YES probability under the fixed model.
    pub fixed_fair_value: f64,
    /// Strike under the Black-Scholes model.
    pub strike: f64,
    pub risk_free_rate: f64,
    pub fill_poll_interval_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            session_minutes: 15,
            symbol: "btcusdt".to_string(),
            fair_value_model: ModelKind::Fixed,
            fixed_fair_value: 0.5,
            strike: 100_000.0,
            risk_free_rate: 0.0,
            fill_poll_interval_ms: 1000,
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn fill_poll_interval(&self) -> Duration {
        Duration::from_millis(self.fill_poll_interval_ms)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::from_toml(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// The configured fair-value model.
    pub fn fair_value_model(&self) -> FairValueModel {
        match self.engine.fair_value_model {
            ModelKind::Fixed => FairValueModel::Fixed {
                yes: self.engine.fixed_fair_value,
            },
            ModelKind::BlackScholes => FairValueModel::BlackScholes {
                strike: self.engine.strike,
                volatility: self.trading.volatility,
                risk_free_rate: self.engine.risk_free_rate,
            },
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            symbol: self.engine.symbol.to_lowercase(),
            model: self.fair_value_model(),
            trading: self.trading.clone(),
            safety: self.safety.clone(),
            risk: self.risk.clone(),
        }
    }
}
