//! Collaborator contracts for market data and order execution
//!
//! The engine consumes bars and emits orders through these traits; concrete
//! exchange connectivity lives outside the engine. A CSV-backed provider is
//! in `crate::data`, and [`PaperExecutionAdapter`] simulates fills in memory
//! for paper trading and tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::{EngineError, ExecutionError};
use crate::types::{Bar, Direction, Symbol, Timeframe};

/// Serves historical bars for a symbol and timeframe
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Ordered bar series covering `[start, end]`; fails with
    /// `DataUnavailable` when the range cannot be served.
    async fn bars(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, EngineError>;
}

/// Fill confirmation returned by an execution adapter
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub direction: Direction,
    pub price: f64,
    pub size: f64,
    pub fee: f64,
}

/// Places orders and reports balances; live mode only
#[async_trait]
pub trait ExecutionAdapter: Send {
    async fn place_order(
        &mut self,
        direction: Direction,
        size: f64,
        price: f64,
    ) -> Result<Fill, ExecutionError>;

    /// Per-asset balances
    async fn balances(&self) -> Result<HashMap<String, f64>, ExecutionError>;
}

/// In-memory execution adapter: every order fills at the requested price
/// minus a flat taker fee. Used for paper trading and tests.
#[derive(Debug, Clone)]
pub struct PaperExecutionAdapter {
    quote_asset: String,
    base_asset: String,
    quote_balance: f64,
    base_balance: f64,
    taker_fee: f64,
}

impl PaperExecutionAdapter {
    pub fn new(quote_asset: impl Into<String>, base_asset: impl Into<String>, quote_balance: f64) -> Self {
        PaperExecutionAdapter {
            quote_asset: quote_asset.into(),
            base_asset: base_asset.into(),
            quote_balance,
            base_balance: 0.0,
            taker_fee: 0.001, // 0.1%
        }
    }

    pub fn with_taker_fee(mut self, taker_fee: f64) -> Self {
        self.taker_fee = taker_fee;
        self
    }

    pub fn quote_balance(&self) -> f64 {
        self.quote_balance
    }

    pub fn base_balance(&self) -> f64 {
        self.base_balance
    }
}

#[async_trait]
impl ExecutionAdapter for PaperExecutionAdapter {
    async fn place_order(
        &mut self,
        direction: Direction,
        size: f64,
        price: f64,
    ) -> Result<Fill, ExecutionError> {
        if size <= 0.0 {
            return Err(ExecutionError::Rejected(format!(
                "non-positive order size: {}",
                size
            )));
        }

        match direction {
            Direction::Buy => {
                let cost = size * price;
                let fee = cost * self.taker_fee;
                if self.quote_balance < cost + fee {
                    return Err(ExecutionError::InsufficientBalance {
                        required: cost + fee,
                        available: self.quote_balance,
                    });
                }
                self.quote_balance -= cost + fee;
                self.base_balance += size;

                tracing::debug!(price, size, fee, "paper buy filled");
                Ok(Fill {
                    direction,
                    price,
                    size,
                    fee,
                })
            }
            Direction::Sell => {
                if self.base_balance < size {
                    return Err(ExecutionError::InsufficientBalance {
                        required: size,
                        available: self.base_balance,
                    });
                }
                let proceeds = size * price;
                let fee = proceeds * self.taker_fee;
                self.base_balance -= size;
                self.quote_balance += proceeds - fee;

                tracing::debug!(price, size, fee, "paper sell filled");
                Ok(Fill {
                    direction,
                    price,
                    size,
                    fee,
                })
            }
        }
    }

    async fn balances(&self) -> Result<HashMap<String, f64>, ExecutionError> {
        let mut balances = HashMap::new();
        balances.insert(self.quote_asset.clone(), self.quote_balance);
        balances.insert(self.base_asset.clone(), self.base_balance);
        Ok(balances)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[tokio::test]
    async fn test_paper_buy_then_sell_round_trip() {
        let mut adapter = PaperExecutionAdapter::new("USDT", "BTC", 1000.0).with_taker_fee(0.0);

        let buy = adapter
            .place_order(Direction::Buy, 2.0, 100.0)
            .await
            .unwrap();
        assert_relative_eq!(buy.price, 100.0);
        assert_relative_eq!(adapter.quote_balance(), 800.0);
        assert_relative_eq!(adapter.base_balance(), 2.0);

        adapter
            .place_order(Direction::Sell, 2.0, 110.0)
            .await
            .unwrap();
        assert_relative_eq!(adapter.quote_balance(), 1020.0);
        assert_relative_eq!(adapter.base_balance(), 0.0);
    }

    #[tokio::test]
    async fn test_paper_fee_deducted() {
        let mut adapter = PaperExecutionAdapter::new("USDT", "BTC", 1000.0);

        let fill = adapter
            .place_order(Direction::Buy, 1.0, 100.0)
            .await
            .unwrap();
        assert_relative_eq!(fill.fee, 0.1);
        assert_relative_eq!(adapter.quote_balance(), 899.9);
    }

    #[tokio::test]
    async fn test_paper_rejects_overdraft() {
        let mut adapter = PaperExecutionAdapter::new("USDT", "BTC", 50.0);

        let result = adapter.place_order(Direction::Buy, 1.0, 100.0).await;
        assert!(matches!(
            result,
            Err(ExecutionError::InsufficientBalance { .. })
        ));

        let result = adapter.place_order(Direction::Sell, 1.0, 100.0).await;
        assert!(matches!(
            result,
            Err(ExecutionError::InsufficientBalance { .. })
        ));
    }

    #[tokio::test]
    async fn test_balances_report_both_assets() {
        let adapter = PaperExecutionAdapter::new("USDT", "BTC", 500.0);
        let balances = adapter.balances().await.unwrap();

        assert_relative_eq!(balances["USDT"], 500.0);
        assert_relative_eq!(balances["BTC"], 0.0);
    }
}
