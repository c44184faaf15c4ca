//! Strategy and backtest configuration
//!
//! Configuration is loaded from JSON files and validated before any bar is
//! processed; the engine itself never reads raw untyped configuration.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::EngineError;
use crate::types::{Symbol, Timeframe};

/// Parameters of the EMA-crossover + RSI strategy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    /// Short EMA period (default: 12)
    #[serde(default = "default_ema_short_period")]
    pub ema_short_period: usize,

    /// Long EMA period, must exceed the short period (default: 26)
    #[serde(default = "default_ema_long_period")]
    pub ema_long_period: usize,

    /// RSI period (default: 14)
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    /// RSI level treated as overbought (default: 70)
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,

    /// RSI level treated as oversold (default: 30)
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,

    /// Minimum signal confidence required to act, 0-100 (default: 60)
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,

    /// Share of the balance committed per trade, in percent (default: 10)
    #[serde(default = "default_trade_amount_percent")]
    pub trade_amount_percent: f64,

    /// Absolute cap on the per-trade quote amount
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_trade_amount: Option<f64>,

    /// Stop loss distance below entry, in percent (default: 2)
    #[serde(default = "default_stop_loss_percent")]
    pub stop_loss_percent: f64,

    /// Take profit distance above entry, in percent (default: 4)
    #[serde(default = "default_take_profit_percent")]
    pub take_profit_percent: f64,

    /// Cooldown between trades, in seconds (default: 300)
    #[serde(default = "default_min_time_between_trades")]
    pub min_time_between_trades: u64,
}

fn default_ema_short_period() -> usize {
    12
}
fn default_ema_long_period() -> usize {
    26
}
fn default_rsi_period() -> usize {
    14
}
fn default_rsi_overbought() -> f64 {
    70.0
}
fn default_rsi_oversold() -> f64 {
    30.0
}
fn default_min_confidence() -> f64 {
    60.0
}
fn default_trade_amount_percent() -> f64 {
    10.0
}
fn default_stop_loss_percent() -> f64 {
    2.0
}
fn default_take_profit_percent() -> f64 {
    4.0
}
fn default_min_time_between_trades() -> u64 {
    300
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            ema_short_period: default_ema_short_period(),
            ema_long_period: default_ema_long_period(),
            rsi_period: default_rsi_period(),
            rsi_overbought: default_rsi_overbought(),
            rsi_oversold: default_rsi_oversold(),
            min_confidence: default_min_confidence(),
            trade_amount_percent: default_trade_amount_percent(),
            max_trade_amount: None,
            stop_loss_percent: default_stop_loss_percent(),
            take_profit_percent: default_take_profit_percent(),
            min_time_between_trades: default_min_time_between_trades(),
        }
    }
}

impl StrategyConfig {
    /// Load strategy parameters from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;
        let config: StrategyConfig =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        Ok(config)
    }

    /// Check all field constraints, before any bar is processed
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.ema_short_period < 2 {
            return Err(EngineError::InvalidConfig(format!(
                "ema_short_period must be >= 2, got {}",
                self.ema_short_period
            )));
        }
        if self.ema_long_period < 2 {
            return Err(EngineError::InvalidConfig(format!(
                "ema_long_period must be >= 2, got {}",
                self.ema_long_period
            )));
        }
        if self.ema_short_period >= self.ema_long_period {
            return Err(EngineError::InvalidConfig(format!(
                "ema_short_period ({}) must be less than ema_long_period ({})",
                self.ema_short_period, self.ema_long_period
            )));
        }
        if self.rsi_period < 2 {
            return Err(EngineError::InvalidConfig(format!(
                "rsi_period must be >= 2, got {}",
                self.rsi_period
            )));
        }
        if self.rsi_overbought <= self.rsi_oversold {
            return Err(EngineError::InvalidConfig(format!(
                "rsi_overbought ({}) must exceed rsi_oversold ({})",
                self.rsi_overbought, self.rsi_oversold
            )));
        }
        if !(0.0..=100.0).contains(&self.min_confidence) {
            return Err(EngineError::InvalidConfig(format!(
                "min_confidence must be within 0-100, got {}",
                self.min_confidence
            )));
        }
        if self.trade_amount_percent <= 0.0 || self.trade_amount_percent > 100.0 {
            return Err(EngineError::InvalidConfig(format!(
                "trade_amount_percent must be within (0, 100], got {}",
                self.trade_amount_percent
            )));
        }
        if let Some(cap) = self.max_trade_amount {
            if cap <= 0.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "max_trade_amount must be positive, got {}",
                    cap
                )));
            }
        }
        if self.stop_loss_percent <= 0.0 || self.stop_loss_percent >= 100.0 {
            return Err(EngineError::InvalidConfig(format!(
                "stop_loss_percent must be within (0, 100), got {}",
                self.stop_loss_percent
            )));
        }
        if self.take_profit_percent <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "take_profit_percent must be positive, got {}",
                self.take_profit_percent
            )));
        }
        Ok(())
    }

    /// Bars consumed before the first indicator point exists.
    ///
    /// RSI needs `rsi_period + 1` bars (the first delta exists on the second
    /// bar), the long EMA needs `ema_long_period`.
    pub fn warm_up_bars(&self) -> usize {
        self.ema_long_period.max(self.rsi_period + 1)
    }
}

/// Inputs of a single backtest run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub symbol: Symbol,
    pub timeframe: Timeframe,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    #[serde(default = "default_initial_balance")]
    pub initial_balance: f64,
    #[serde(default)]
    pub strategy: StrategyConfig,
}

fn default_initial_balance() -> f64 {
    1000.0
}

impl BacktestRequest {
    /// Check the request, including the embedded strategy config
    pub fn validate(&self) -> Result<(), EngineError> {
        self.strategy.validate()?;

        if self.start >= self.end {
            return Err(EngineError::InvalidRange(format!(
                "start ({}) must be before end ({})",
                self.start, self.end
            )));
        }
        if self.initial_balance <= 0.0 {
            return Err(EngineError::InvalidConfig(format!(
                "initial_balance must be positive, got {}",
                self.initial_balance
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_default_config_is_valid() {
        assert!(StrategyConfig::default().validate().is_ok());
    }

    #[test]
    fn test_ema_periods_must_be_ordered() {
        let config = StrategyConfig {
            ema_short_period: 30,
            ema_long_period: 20,
            ..Default::default()
        };

        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rsi_thresholds_must_be_ordered() {
        let config = StrategyConfig {
            rsi_overbought: 30.0,
            rsi_oversold: 70.0,
            ..Default::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_trade_amount_percent_bounds() {
        let mut config = StrategyConfig {
            trade_amount_percent: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config.trade_amount_percent = 150.0;
        assert!(config.validate().is_err());

        config.trade_amount_percent = 100.0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_warm_up_bars() {
        let config = StrategyConfig::default();
        // long EMA (26) dominates RSI (14 + 1)
        assert_eq!(config.warm_up_bars(), 26);

        let config = StrategyConfig {
            ema_long_period: 10,
            rsi_period: 14,
            ema_short_period: 5,
            ..Default::default()
        };
        assert_eq!(config.warm_up_bars(), 15);
    }

    #[test]
    fn test_request_range_must_be_increasing() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let request = BacktestRequest {
            symbol: Symbol::new("BTCUSDT"),
            timeframe: Timeframe::H1,
            start: at,
            end: at,
            initial_balance: 1000.0,
            strategy: StrategyConfig::default(),
        };

        assert!(matches!(
            request.validate(),
            Err(EngineError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_config_defaults_from_empty_json() {
        let config: StrategyConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, StrategyConfig::default());
    }
}
