//! Backtesting engine
//!
//! Replays a historical bar series through the indicator, signal and risk
//! layers, simulating fills and accumulating an equity curve and trade
//! ledger. The position lifecycle is an explicit two-state machine
//! (flat / in position), so a second concurrent entry is unrepresentable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::config::BacktestRequest;
use crate::error::EngineError;
use crate::indicators::IndicatorEngine;
use crate::metrics;
use crate::risk::{RiskDecision, RiskManager};
use crate::signal::SignalGenerator;
use crate::types::{Bar, BacktestResult, EquityPoint, ExitReason, Position, Trade};

/// Cooperative cancellation flag, checked at every bar boundary
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Position lifecycle of a single strategy instance
#[derive(Debug, Clone)]
enum TradeState {
    Flat,
    InPosition(Position),
}

/// Backtest engine for one symbol and one strategy configuration
pub struct Backtester {
    request: BacktestRequest,
    indicators: IndicatorEngine,
    signals: SignalGenerator,
    risk: RiskManager,
    cancel: CancelToken,
}

impl Backtester {
    /// Validate the request and build the engine. Configuration and range
    /// errors surface here, before any bar is touched.
    pub fn new(request: BacktestRequest) -> Result<Self, EngineError> {
        request.validate()?;

        let indicators = IndicatorEngine::new(&request.strategy);
        let signals = SignalGenerator::new(&request.strategy);
        let risk = RiskManager::new(request.strategy.clone());

        Ok(Backtester {
            request,
            indicators,
            signals,
            risk,
            cancel: CancelToken::new(),
        })
    }

    /// Attach a cancellation token. Cancelling aborts the run at the next
    /// bar boundary with no partial result.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replay the bar series and produce the full result.
    ///
    /// Bars outside the requested date range are ignored. Fails when the
    /// remaining series cannot cover the strategy's warm-up plus one
    /// tradable bar, or when timestamps are not strictly increasing.
    pub fn run(mut self, bars: &[Bar]) -> Result<BacktestResult, EngineError> {
        let bars: Vec<&Bar> = bars
            .iter()
            .filter(|bar| bar.timestamp >= self.request.start && bar.timestamp <= self.request.end)
            .collect();

        for window in bars.windows(2) {
            if window[1].timestamp <= window[0].timestamp {
                return Err(EngineError::InvalidRange(format!(
                    "bar timestamps not strictly increasing at {}",
                    window[1].timestamp
                )));
            }
        }

        let required = self.request.strategy.warm_up_bars() + 1;
        if bars.len() < required {
            return Err(EngineError::InsufficientData {
                required,
                actual: bars.len(),
            });
        }

        tracing::info!(
            symbol = %self.request.symbol,
            timeframe = %self.request.timeframe,
            bars = bars.len(),
            "starting backtest"
        );

        let mut state = TradeState::Flat;
        let mut cash = self.request.initial_balance;
        let mut trades: Vec<Trade> = Vec::new();
        let mut equity_curve: Vec<EquityPoint> = Vec::with_capacity(bars.len());

        for bar in &bars {
            if self.cancel.is_cancelled() {
                tracing::warn!(symbol = %self.request.symbol, "backtest cancelled");
                return Err(EngineError::Cancelled);
            }

            // The crossover detector advances every bar, even when a
            // protective exit consumes the bar.
            let maybe_signal = self
                .indicators
                .next(bar)
                .and_then(|point| self.signals.on_point(&point, bar.close));

            // Protective exits take priority over new signals within the
            // same bar; when both levels are crossed intrabar, the stop
            // loss is assumed to trigger first.
            let mut acted = false;
            if let TradeState::InPosition(position) = &state {
                if let Some((exit_price, reason)) = protective_exit(position, bar) {
                    let trade = Trade::close(position, bar.timestamp, exit_price, reason);
                    cash += position.size * exit_price;
                    self.risk.mark_trade(bar.timestamp);

                    tracing::info!(
                        timestamp = %bar.timestamp,
                        exit_price,
                        reason = %reason,
                        pnl = trade.profit,
                        "position closed"
                    );

                    trades.push(trade);
                    state = TradeState::Flat;
                    acted = true;
                }
            }

            if !acted {
                if let Some(signal) = maybe_signal {
                    let open_position = match &state {
                        TradeState::InPosition(position) => Some(position),
                        TradeState::Flat => None,
                    };

                    match self.risk.evaluate(&signal, open_position, cash) {
                        RiskDecision::OpenLong(position) => {
                            cash -= position.size * position.entry_price;
                            tracing::info!(
                                timestamp = %bar.timestamp,
                                entry_price = position.entry_price,
                                size = position.size,
                                confidence = signal.confidence,
                                "position opened"
                            );
                            state = TradeState::InPosition(position);
                        }
                        RiskDecision::CloseLong => {
                            if let TradeState::InPosition(position) =
                                std::mem::replace(&mut state, TradeState::Flat)
                            {
                                let trade = Trade::close(
                                    &position,
                                    bar.timestamp,
                                    bar.close,
                                    ExitReason::Signal,
                                );
                                cash += position.size * bar.close;
                                tracing::info!(
                                    timestamp = %bar.timestamp,
                                    exit_price = bar.close,
                                    pnl = trade.profit,
                                    "position closed on signal"
                                );
                                trades.push(trade);
                            }
                        }
                        RiskDecision::Rejected(reason) => {
                            tracing::debug!(
                                timestamp = %bar.timestamp,
                                %reason,
                                "signal rejected"
                            );
                        }
                    }
                }
            }

            let equity = match &state {
                TradeState::InPosition(position) => cash + position.value_at(bar.close),
                TradeState::Flat => cash,
            };
            equity_curve.push(EquityPoint {
                timestamp: bar.timestamp,
                balance: equity,
            });
        }

        // Any position still open is force-closed at the last close.
        if let TradeState::InPosition(position) = state {
            let last = bars.last().expect("bar count validated above");
            let trade = Trade::close(&position, last.timestamp, last.close, ExitReason::EndOfData);
            cash += position.size * last.close;
            tracing::info!(
                timestamp = %last.timestamp,
                exit_price = last.close,
                pnl = trade.profit,
                final_balance = cash,
                "position closed at end of data"
            );
            trades.push(trade);
        }

        let stats = metrics::compute(
            self.request.initial_balance,
            &equity_curve,
            &trades,
            self.request.timeframe,
        );

        tracing::info!(
            symbol = %self.request.symbol,
            trades = trades.len(),
            final_balance = stats.final_balance,
            "backtest finished"
        );

        Ok(BacktestResult {
            trades,
            equity_curve,
            stats,
        })
    }
}

/// Stop loss first, then take profit, against the bar's low/high
fn protective_exit(position: &Position, bar: &Bar) -> Option<(f64, ExitReason)> {
    if bar.low <= position.stop_loss_price {
        Some((position.stop_loss_price, ExitReason::StopLoss))
    } else if bar.high >= position.take_profit_price {
        Some((position.take_profit_price, ExitReason::TakeProfit))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StrategyConfig;
    use crate::types::{Direction, Symbol, Timeframe};
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                timestamp: t0() + Duration::hours(i as i64),
                open: close,
                high: close * 1.001,
                low: close * 0.999,
                close,
                volume: 1000.0,
            })
            .collect()
    }

    fn small_config() -> StrategyConfig {
        StrategyConfig {
            ema_short_period: 3,
            ema_long_period: 6,
            rsi_period: 3,
            min_confidence: 0.0,
            min_time_between_trades: 0,
            stop_loss_percent: 5.0,
            take_profit_percent: 10.0,
            ..Default::default()
        }
    }

    fn request(strategy: StrategyConfig, bar_count: usize) -> BacktestRequest {
        BacktestRequest {
            symbol: Symbol::new("BTCUSDT"),
            timeframe: Timeframe::H1,
            start: t0(),
            end: t0() + Duration::hours(bar_count as i64),
            initial_balance: 1000.0,
            strategy,
        }
    }

    /// Falling closes, then a sharp rise: forces a golden cross after warm-up
    fn cross_up_closes() -> Vec<f64> {
        let mut closes: Vec<f64> = (0..12).map(|i| 110.0 - i as f64).collect();
        closes.extend((0..12).map(|i| 99.0 + i as f64 * 3.0));
        closes
    }

    #[test]
    fn test_invalid_config_fails_before_bars() {
        let strategy = StrategyConfig {
            ema_short_period: 30,
            ema_long_period: 20,
            ..Default::default()
        };
        assert!(matches!(
            Backtester::new(request(strategy, 10)),
            Err(EngineError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_equal_start_end_fails() {
        let mut req = request(small_config(), 10);
        req.end = req.start;
        assert!(matches!(
            Backtester::new(req),
            Err(EngineError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_insufficient_bars() {
        let bars = bars_from_closes(&[100.0, 101.0, 102.0, 103.0, 104.0]);
        let backtester = Backtester::new(request(small_config(), bars.len())).unwrap();
        assert!(matches!(
            backtester.run(&bars),
            Err(EngineError::InsufficientData { .. })
        ));
    }

    #[test]
    fn test_non_increasing_timestamps_rejected() {
        let mut bars = bars_from_closes(&cross_up_closes());
        let first_ts = bars[0].timestamp;
        bars[5].timestamp = first_ts;

        let backtester = Backtester::new(request(small_config(), bars.len())).unwrap();
        assert!(matches!(
            backtester.run(&bars),
            Err(EngineError::InvalidRange(_))
        ));
    }

    #[test]
    fn test_equity_curve_covers_every_bar() {
        let bars = bars_from_closes(&cross_up_closes());
        let backtester = Backtester::new(request(small_config(), bars.len())).unwrap();
        let result = backtester.run(&bars).unwrap();

        assert_eq!(result.equity_curve.len(), bars.len());
    }

    #[test]
    fn test_open_position_closed_at_end_of_data() {
        // protective levels far enough away that the rally never hits them
        let strategy = StrategyConfig {
            stop_loss_percent: 40.0,
            take_profit_percent: 80.0,
            ..small_config()
        };
        let bars = bars_from_closes(&cross_up_closes());
        let backtester = Backtester::new(request(strategy, bars.len())).unwrap();
        let result = backtester.run(&bars).unwrap();

        // the rally produces an entry that is still open on the last bar
        assert!(!result.trades.is_empty());
        let last = result.trades.last().unwrap();
        assert_eq!(last.exit_reason, ExitReason::EndOfData);
        assert_eq!(last.exited_at, bars.last().unwrap().timestamp);
    }

    #[test]
    fn test_stop_loss_closes_before_signals() {
        // rally into a cross, then a crash straight through the stop
        let mut closes: Vec<f64> = (0..12).map(|i| 110.0 - i as f64).collect();
        closes.extend((0..6).map(|i| 99.0 + i as f64 * 3.0));
        closes.extend((0..6).map(|i| 114.0 - i as f64 * 10.0));

        let bars = bars_from_closes(&closes);
        let backtester = Backtester::new(request(small_config(), bars.len())).unwrap();
        let result = backtester.run(&bars).unwrap();

        assert!(result
            .trades
            .iter()
            .any(|t| t.exit_reason == ExitReason::StopLoss));

        // stop fills exactly at the protective level
        let stop_trade = result
            .trades
            .iter()
            .find(|t| t.exit_reason == ExitReason::StopLoss)
            .unwrap();
        assert_eq!(stop_trade.exit_price, stop_trade.stop_loss_price);
    }

    #[test]
    fn test_positions_open_and_close_exactly_once() {
        let bars = bars_from_closes(&cross_up_closes());
        let backtester = Backtester::new(request(small_config(), bars.len())).unwrap();
        let result = backtester.run(&bars).unwrap();

        for window in result.trades.windows(2) {
            // a new entry never predates the previous exit
            assert!(window[1].opened_at >= window[0].exited_at);
        }
        for trade in &result.trades {
            assert!(trade.exited_at >= trade.opened_at);
            assert_eq!(trade.direction, Direction::Buy);
        }
    }

    #[test]
    fn test_determinism() {
        let bars = bars_from_closes(&cross_up_closes());

        let run = |bars: &[Bar]| {
            Backtester::new(request(small_config(), bars.len()))
                .unwrap()
                .run(bars)
                .unwrap()
        };

        let first = run(&bars);
        let second = run(&bars);
        assert_eq!(
            serde_json::to_string(&first).unwrap(),
            serde_json::to_string(&second).unwrap()
        );
    }

    #[test]
    fn test_cancel_token_aborts_run() {
        let bars = bars_from_closes(&cross_up_closes());
        let cancel = CancelToken::new();
        cancel.cancel();

        let backtester = Backtester::new(request(small_config(), bars.len()))
            .unwrap()
            .with_cancel(cancel);
        assert!(matches!(backtester.run(&bars), Err(EngineError::Cancelled)));
    }

    #[test]
    fn test_cooldown_limits_trade_frequency() {
        let strategy = StrategyConfig {
            // effectively infinite cooldown
            min_time_between_trades: 1_000_000_000,
            ..small_config()
        };

        let mut closes = cross_up_closes();
        // second down-up wave to offer a second entry
        closes.extend((0..12).map(|i| 130.0 - i as f64 * 2.0));
        closes.extend((0..12).map(|i| 107.0 + i as f64 * 3.0));

        let bars = bars_from_closes(&closes);
        let backtester = Backtester::new(request(strategy, bars.len())).unwrap();
        let result = backtester.run(&bars).unwrap();

        // one entry at most; everything after sits inside the cooldown
        assert!(result.trades.len() <= 1);
    }
}
