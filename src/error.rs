//! Engine error taxonomy
//!
//! Validation errors (`InvalidConfig`, `InvalidRange`) are raised before any
//! bar is processed and abort the run entirely. Data errors abort the single
//! run they belong to. Execution errors in live mode are surfaced per signal;
//! the engine keeps evaluating subsequent bars.

use thiserror::Error;

/// Errors produced by the signal/backtest engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Not enough history for the requested indicator periods or backtest range
    #[error("insufficient data: {required} bars required, {actual} available")]
    InsufficientData { required: usize, actual: usize },

    /// Malformed date range or non-increasing bar timestamps
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Strategy configuration constraint violation
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Live order placement failure, surfaced per signal
    #[error("execution failed: {0}")]
    Execution(#[from] ExecutionError),

    /// The market data source cannot serve the requested range
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Backtest cancelled at a bar boundary
    #[error("backtest cancelled")]
    Cancelled,
}

/// Order placement failure reported by an execution adapter.
///
/// Retry policy belongs to the adapter; the engine never retries.
#[derive(Debug, Clone, Error)]
pub enum ExecutionError {
    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("insufficient balance: need {required:.2}, have {available:.2}")]
    InsufficientBalance { required: f64, available: f64 },

    #[error("exchange unavailable: {0}")]
    Unavailable(String),
}
