//! Risk management: signal gating, position sizing, protective levels
//!
//! The manager is stateful per strategy instance: it carries the timestamp of
//! the last accepted trade so the cooldown window can be enforced. Rejected
//! signals never advance that timestamp.

use chrono::{DateTime, Utc};

use crate::config::StrategyConfig;
use crate::types::{Direction, Position, Signal};

/// Outcome of gating a signal
#[derive(Debug, Clone, PartialEq)]
pub enum RiskDecision {
    /// Enter a long position with the attached sizing and protective levels
    OpenLong(Position),
    /// Exit the currently open long position
    CloseLong,
    /// Take no action
    Rejected(RejectReason),
}

/// Why a signal was rejected
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    LowConfidence { confidence: f64, min: f64 },
    Cooldown { elapsed_secs: i64, required_secs: u64 },
    PositionAlreadyOpen,
    NoOpenPosition,
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::LowConfidence { confidence, min } => {
                write!(f, "confidence {:.1} below minimum {:.1}", confidence, min)
            }
            RejectReason::Cooldown {
                elapsed_secs,
                required_secs,
            } => write!(
                f,
                "only {}s since last trade, {}s required",
                elapsed_secs, required_secs
            ),
            RejectReason::PositionAlreadyOpen => write!(f, "position already open"),
            RejectReason::NoOpenPosition => write!(f, "no open position to exit"),
        }
    }
}

/// Gates and sizes signals for a single long-only strategy instance
#[derive(Debug, Clone)]
pub struct RiskManager {
    config: StrategyConfig,
    last_trade_at: Option<DateTime<Utc>>,
}

impl RiskManager {
    pub fn new(config: StrategyConfig) -> Self {
        RiskManager {
            config,
            last_trade_at: None,
        }
    }

    /// Gate a signal against the confidence floor, the cooldown window and
    /// the current position state. Sizing uses the current quote balance.
    ///
    /// A sell while long is an exit; a sell while flat is a no-op (the engine
    /// never opens short positions). The last-trade timestamp advances only
    /// when an action is accepted.
    pub fn evaluate(
        &mut self,
        signal: &Signal,
        open_position: Option<&Position>,
        balance: f64,
    ) -> RiskDecision {
        if signal.confidence < self.config.min_confidence {
            return RiskDecision::Rejected(RejectReason::LowConfidence {
                confidence: signal.confidence,
                min: self.config.min_confidence,
            });
        }

        if let Some(last) = self.last_trade_at {
            let elapsed = (signal.timestamp - last).num_seconds();
            if elapsed < self.config.min_time_between_trades as i64 {
                return RiskDecision::Rejected(RejectReason::Cooldown {
                    elapsed_secs: elapsed,
                    required_secs: self.config.min_time_between_trades,
                });
            }
        }

        match signal.direction {
            Direction::Buy => {
                if open_position.is_some() {
                    return RiskDecision::Rejected(RejectReason::PositionAlreadyOpen);
                }
                let position = self.size_entry(signal, balance);
                self.last_trade_at = Some(signal.timestamp);
                RiskDecision::OpenLong(position)
            }
            Direction::Sell => {
                if open_position.is_none() {
                    return RiskDecision::Rejected(RejectReason::NoOpenPosition);
                }
                self.last_trade_at = Some(signal.timestamp);
                RiskDecision::CloseLong
            }
        }
    }

    /// Record a fill that happened outside `evaluate` (stop loss, take
    /// profit), so the cooldown window also covers protective exits.
    pub fn mark_trade(&mut self, at: DateTime<Utc>) {
        self.last_trade_at = Some(at);
    }

    pub fn last_trade_at(&self) -> Option<DateTime<Utc>> {
        self.last_trade_at
    }

    fn size_entry(&self, signal: &Signal, balance: f64) -> Position {
        let mut quote_amount = balance * self.config.trade_amount_percent / 100.0;
        if let Some(cap) = self.config.max_trade_amount {
            quote_amount = quote_amount.min(cap);
        }

        let entry_price = signal.reference_price;
        let size = quote_amount / entry_price;

        Position {
            opened_at: signal.timestamp,
            direction: Direction::Buy,
            entry_price,
            size,
            stop_loss_price: entry_price * (1.0 - self.config.stop_loss_percent / 100.0),
            take_profit_price: entry_price * (1.0 + self.config.take_profit_percent / 100.0),
        }
    }
}
