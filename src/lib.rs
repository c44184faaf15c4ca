//! EMA/RSI Trading Signal Engine
//!
//! Turns an ordered price series into EMA-crossover + RSI trade signals with
//! a deterministic confidence score, gates them through risk management
//! (confidence floor, cooldown, position sizing, protective levels), and
//! replays strategies over historical bars to produce an equity curve, a
//! trade ledger and summary statistics.
//!
//! The engine is deterministic and single-threaded per strategy instance;
//! independent instances (different symbols or configurations) run in
//! parallel with no shared state. Market data and order execution are
//! collaborator contracts (see [`exchange`]); the engine never fetches data
//! or places real orders itself.
//!
//! # Backtest Example
//! ```no_run
//! use ema_rsi_engine::backtest::Backtester;
//! use ema_rsi_engine::config::{BacktestRequest, StrategyConfig};
//! use ema_rsi_engine::data;
//! use ema_rsi_engine::types::{Symbol, Timeframe};
//!
//! fn main() -> anyhow::Result<()> {
//!     let bars = data::load_csv("data/BTCUSDT_1h.csv")?;
//!     let request = BacktestRequest {
//!         symbol: Symbol::new("BTCUSDT"),
//!         timeframe: Timeframe::H1,
//!         start: data::parse_date("2024-01-01")?,
//!         end: data::parse_date("2024-06-01")?,
//!         initial_balance: 1000.0,
//!         strategy: StrategyConfig::default(),
//!     };
//!
//!     let result = Backtester::new(request)?.run(&bars)?;
//!     println!("{} trades, final balance {:.2}",
//!         result.stats.total_trades, result.stats.final_balance);
//!     Ok(())
//! }
//! ```

pub mod backtest;
pub mod config;
pub mod data;
pub mod error;
pub mod exchange;
pub mod indicators;
pub mod live;
pub mod metrics;
pub mod risk;
pub mod signal;
pub mod types;

pub use backtest::{Backtester, CancelToken};
pub use config::{BacktestRequest, StrategyConfig};
pub use error::{EngineError, ExecutionError};
pub use types::*;
