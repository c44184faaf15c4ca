//! Core data types used across the signal engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// OHLCV price bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// Rejected by [`Bar::new`] when OHLCV fields are inconsistent
#[derive(Debug, Clone, Error)]
pub enum BarValidationError {
    #[error("high ({high}) < low ({low})")]
    HighBelowLow { high: f64, low: f64 },
    #[error("non-positive close ({0})")]
    NonPositiveClose(f64),
    #[error("negative volume ({0})")]
    NegativeVolume(f64),
}

impl Bar {
    /// Construct a bar, rejecting inconsistent OHLCV values
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, BarValidationError> {
        if high < low {
            return Err(BarValidationError::HighBelowLow { high, low });
        }
        if close <= 0.0 || !close.is_finite() {
            return Err(BarValidationError::NonPositiveClose(close));
        }
        if volume < 0.0 {
            return Err(BarValidationError::NegativeVolume(volume));
        }
        Ok(Bar {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        })
    }
}

/// Trading pair symbol
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Symbol(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Candle interval of a bar series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn as_str(&self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }

    /// Bar count per year, used to annualize the Sharpe ratio.
    /// Crypto markets trade 365 days a year.
    pub fn bars_per_year(&self) -> f64 {
        match self {
            Timeframe::M1 => 525_600.0,
            Timeframe::M5 => 105_120.0,
            Timeframe::M15 => 35_040.0,
            Timeframe::M30 => 17_520.0,
            Timeframe::H1 => 8_760.0,
            Timeframe::H4 => 2_190.0,
            Timeframe::D1 => 365.0,
        }
    }
}

impl std::str::FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            _ => Err(format!(
                "unknown timeframe: {}. Use 1m, 5m, 15m, 30m, 1h, 4h or 1d",
                s
            )),
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trade direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Buy => write!(f, "buy"),
            Direction::Sell => write!(f, "sell"),
        }
    }
}

/// Signal strength classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalStrength {
    Weak,
    Moderate,
    Strong,
}

impl std::fmt::Display for SignalStrength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SignalStrength::Weak => write!(f, "weak"),
            SignalStrength::Moderate => write!(f, "moderate"),
            SignalStrength::Strong => write!(f, "strong"),
        }
    }
}

/// Indicator values for one bar, emitted once warm-up is complete
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndicatorPoint {
    pub timestamp: DateTime<Utc>,
    pub ema_short: f64,
    pub ema_long: f64,
    pub rsi: f64,
}

/// Trading signal, immutable once created
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub strength: SignalStrength,
    /// Confidence score in [0, 100]
    pub confidence: f64,
    /// Close price of the bar the signal fired on
    pub reference_price: f64,
    pub ema_short: f64,
    pub ema_long: f64,
    pub rsi: f64,
    pub message: String,
}

/// Open position. At most one per strategy instance; the engine is long-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub opened_at: DateTime<Utc>,
    pub direction: Direction,
    pub entry_price: f64,
    /// Base-asset quantity
    pub size: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
}

impl Position {
    /// Quote value of the position at the given price
    pub fn value_at(&self, price: f64) -> f64 {
        self.size * price
    }

    pub fn unrealized_pnl(&self, current_price: f64) -> f64 {
        (current_price - self.entry_price) * self.size
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    Signal,
    StopLoss,
    TakeProfit,
    EndOfData,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::Signal => write!(f, "signal"),
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::EndOfData => write!(f, "end_of_data"),
        }
    }
}

/// Completed round-trip trade
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub opened_at: DateTime<Utc>,
    pub direction: Direction,
    pub entry_price: f64,
    pub size: f64,
    pub stop_loss_price: f64,
    pub take_profit_price: f64,
    pub exited_at: DateTime<Utc>,
    pub exit_price: f64,
    pub exit_reason: ExitReason,
    pub profit: f64,
    pub profit_percent: f64,
}

impl Trade {
    /// Close out a position at the given price
    pub fn close(
        position: &Position,
        exited_at: DateTime<Utc>,
        exit_price: f64,
        exit_reason: ExitReason,
    ) -> Self {
        let profit = (exit_price - position.entry_price) * position.size;
        let profit_percent = (exit_price - position.entry_price) / position.entry_price * 100.0;

        Trade {
            opened_at: position.opened_at,
            direction: position.direction,
            entry_price: position.entry_price,
            size: position.size,
            stop_loss_price: position.stop_loss_price,
            take_profit_price: position.take_profit_price,
            exited_at,
            exit_price,
            exit_reason,
            profit,
            profit_percent,
        }
    }
}

/// One point of the equity curve, recorded after every bar
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub balance: f64,
}

/// Summary statistics derived from the equity curve and trade ledger
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub final_balance: f64,
    pub total_return: f64,
    pub total_return_percent: f64,
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    /// Winning share of closed trades, in percent; 0 when no trades
    pub win_rate: f64,
    /// Most negative peak-to-trough excursion, in percent (value <= 0)
    pub max_drawdown_percent: f64,
    pub sharpe_ratio: f64,
    pub profit_factor: f64,
    pub total_profit: f64,
    pub total_loss: f64,
    pub average_profit: f64,
    pub average_loss: f64,
}

/// Everything a backtest run produces
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub stats: PerformanceStats,
}
