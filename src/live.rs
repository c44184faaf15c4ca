//! Live trading loop
//!
//! Drives the same indicator/signal/risk pipeline as the backtester, one bar
//! at a time, but routes fills through an [`ExecutionAdapter`]. An order
//! failure is surfaced in the bar outcome and leaves the engine state
//! untouched; evaluation continues on the next bar.

use tracing::{info, warn};

use crate::config::StrategyConfig;
use crate::error::{EngineError, ExecutionError};
use crate::exchange::ExecutionAdapter;
use crate::indicators::IndicatorEngine;
use crate::risk::{RejectReason, RiskDecision, RiskManager};
use crate::signal::SignalGenerator;
use crate::types::{Bar, Direction, ExitReason, Position, Symbol, Trade};

/// What happened on one bar
#[derive(Debug, Clone)]
pub enum BarOutcome {
    /// Indicators still warming up
    WarmingUp,
    /// No crossover on this bar
    NoSignal,
    /// A signal fired but the risk gate refused it
    SignalRejected(RejectReason),
    /// A position was opened
    Opened(Position),
    /// A position was closed
    Closed(Trade),
    /// The adapter refused the order; engine state is unchanged
    ExecutionFailed(ExecutionError),
}

/// Live strategy instance trading one symbol through an execution adapter
pub struct LiveTrader<A: ExecutionAdapter> {
    symbol: Symbol,
    indicators: IndicatorEngine,
    signals: SignalGenerator,
    risk: RiskManager,
    adapter: A,
    position: Option<Position>,
    quote_balance: f64,
}

impl<A: ExecutionAdapter> LiveTrader<A> {
    pub fn new(
        symbol: Symbol,
        config: StrategyConfig,
        adapter: A,
        initial_balance: f64,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        Ok(LiveTrader {
            symbol,
            indicators: IndicatorEngine::new(&config),
            signals: SignalGenerator::new(&config),
            risk: RiskManager::new(config),
            adapter,
            position: None,
            quote_balance: initial_balance,
        })
    }

    pub fn position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn quote_balance(&self) -> f64 {
        self.quote_balance
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    /// Process the next bar: protective exits first, then signal evaluation.
    pub async fn on_bar(&mut self, bar: &Bar) -> BarOutcome {
        let maybe_signal = self
            .indicators
            .next(bar)
            .map(|point| self.signals.on_point(&point, bar.close));

        // Stop loss / take profit outrank any signal on the same bar.
        if let Some(position) = self.position.clone() {
            let crossed = if bar.low <= position.stop_loss_price {
                Some((position.stop_loss_price, ExitReason::StopLoss))
            } else if bar.high >= position.take_profit_price {
                Some((position.take_profit_price, ExitReason::TakeProfit))
            } else {
                None
            };

            if let Some((exit_price, reason)) = crossed {
                return self.close_position(&position, bar, exit_price, reason).await;
            }
        }

        let signal = match maybe_signal {
            None => return BarOutcome::WarmingUp,
            Some(None) => return BarOutcome::NoSignal,
            Some(Some(signal)) => signal,
        };

        info!(
            symbol = %self.symbol,
            direction = %signal.direction,
            strength = %signal.strength,
            confidence = signal.confidence,
            message = %signal.message,
            "signal"
        );

        match self
            .risk
            .evaluate(&signal, self.position.as_ref(), self.quote_balance)
        {
            RiskDecision::OpenLong(position) => {
                match self
                    .adapter
                    .place_order(Direction::Buy, position.size, position.entry_price)
                    .await
                {
                    Ok(fill) => {
                        self.quote_balance -= fill.size * fill.price + fill.fee;
                        info!(
                            symbol = %self.symbol,
                            price = fill.price,
                            size = fill.size,
                            "opened long"
                        );
                        self.position = Some(position.clone());
                        BarOutcome::Opened(position)
                    }
                    Err(e) => {
                        warn!(symbol = %self.symbol, error = %e, "entry order failed");
                        BarOutcome::ExecutionFailed(e)
                    }
                }
            }
            RiskDecision::CloseLong => {
                let position = self
                    .position
                    .clone()
                    .expect("risk manager only closes when a position is open");
                self.close_position(&position, bar, bar.close, ExitReason::Signal)
                    .await
            }
            RiskDecision::Rejected(reason) => {
                info!(symbol = %self.symbol, %reason, "signal rejected");
                BarOutcome::SignalRejected(reason)
            }
        }
    }

    async fn close_position(
        &mut self,
        position: &Position,
        bar: &Bar,
        exit_price: f64,
        reason: ExitReason,
    ) -> BarOutcome {
        match self
            .adapter
            .place_order(Direction::Sell, position.size, exit_price)
            .await
        {
            Ok(fill) => {
                self.quote_balance += fill.size * fill.price - fill.fee;
                self.risk.mark_trade(bar.timestamp);
                self.position = None;

                let trade = Trade::close(position, bar.timestamp, exit_price, reason);
                info!(
                    symbol = %self.symbol,
                    price = exit_price,
                    reason = %reason,
                    pnl = trade.profit,
                    "closed long"
                );
                BarOutcome::Closed(trade)
            }
            Err(e) => {
                // keep the position; the exit re-triggers on a later bar
                warn!(symbol = %self.symbol, error = %e, "exit order failed");
                BarOutcome::ExecutionFailed(e)
            }
        }
    }
}
