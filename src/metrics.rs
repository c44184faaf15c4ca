//! Performance statistics derived from the equity curve and trade ledger

use itertools::Itertools;
use statrs::statistics::Statistics;

use crate::types::{EquityPoint, PerformanceStats, Timeframe, Trade};

/// Derive summary statistics from a finished run.
///
/// Numeric edge cases resolve to defined values: zero standard deviation
/// gives a Sharpe ratio of 0, an empty ledger gives a win rate of 0.
pub fn compute(
    initial_balance: f64,
    equity_curve: &[EquityPoint],
    trades: &[Trade],
    timeframe: Timeframe,
) -> PerformanceStats {
    let final_balance = equity_curve
        .last()
        .map(|point| point.balance)
        .unwrap_or(initial_balance);

    let total_return = final_balance - initial_balance;
    let total_return_percent = total_return / initial_balance * 100.0;

    let winning: Vec<&Trade> = trades.iter().filter(|t| t.profit > 0.0).collect();
    let losing: Vec<&Trade> = trades.iter().filter(|t| t.profit <= 0.0).collect();

    let win_rate = if trades.is_empty() {
        0.0
    } else {
        winning.len() as f64 / trades.len() as f64 * 100.0
    };

    let total_profit: f64 = winning.iter().map(|t| t.profit).sum();
    let total_loss: f64 = losing.iter().map(|t| t.profit.abs()).sum();

    let profit_factor = if total_loss > 0.0 {
        total_profit / total_loss
    } else if total_profit > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };

    let average_profit = if winning.is_empty() {
        0.0
    } else {
        total_profit / winning.len() as f64
    };
    let average_loss = if losing.is_empty() {
        0.0
    } else {
        total_loss / losing.len() as f64
    };

    PerformanceStats {
        final_balance,
        total_return,
        total_return_percent,
        total_trades: trades.len(),
        winning_trades: winning.len(),
        losing_trades: losing.len(),
        win_rate,
        max_drawdown_percent: max_drawdown_percent(equity_curve),
        sharpe_ratio: sharpe_ratio(equity_curve, timeframe),
        profit_factor,
        total_profit,
        total_loss,
        average_profit,
        average_loss,
    }
}

/// Most negative excursion below the running peak, in percent (<= 0)
pub fn max_drawdown_percent(equity_curve: &[EquityPoint]) -> f64 {
    let mut peak = f64::MIN;
    let mut max_drawdown = 0.0_f64;

    for point in equity_curve {
        if point.balance > peak {
            peak = point.balance;
        }
        if peak > 0.0 {
            let drawdown = (point.balance - peak) / peak * 100.0;
            if drawdown < max_drawdown {
                max_drawdown = drawdown;
            }
        }
    }

    max_drawdown
}

/// Mean per-bar return over its standard deviation, annualized by the
/// timeframe's bar count per year. 0 when the deviation is 0 or the curve
/// is too short to produce two returns.
pub fn sharpe_ratio(equity_curve: &[EquityPoint], timeframe: Timeframe) -> f64 {
    let returns: Vec<f64> = equity_curve
        .iter()
        .tuple_windows()
        .filter(|(a, _)| a.balance != 0.0)
        .map(|(a, b)| (b.balance - a.balance) / a.balance)
        .collect();

    if returns.len() < 2 {
        return 0.0;
    }

    let mean = Statistics::mean(&returns);
    let std_dev = Statistics::std_dev(&returns);

    if std_dev > 0.0 {
        mean / std_dev * timeframe.bars_per_year().sqrt()
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Direction, ExitReason};
    use approx::assert_relative_eq;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn curve(balances: &[f64]) -> Vec<EquityPoint> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        balances
            .iter()
            .enumerate()
            .map(|(i, &balance)| EquityPoint {
                timestamp: start + Duration::hours(i as i64),
                balance,
            })
            .collect()
    }

    fn trade(profit: f64, at: DateTime<Utc>) -> Trade {
        Trade {
            opened_at: at,
            direction: Direction::Buy,
            entry_price: 100.0,
            size: 1.0,
            stop_loss_price: 98.0,
            take_profit_price: 104.0,
            exited_at: at + Duration::hours(1),
            exit_price: 100.0 + profit,
            exit_reason: ExitReason::Signal,
            profit,
            profit_percent: profit,
        }
    }

    #[test]
    fn test_max_drawdown_known_curve() {
        // peak 120, trough 90: -25%
        let equity = curve(&[100.0, 120.0, 90.0, 110.0]);
        assert_relative_eq!(max_drawdown_percent(&equity), -25.0);
    }

    #[test]
    fn test_max_drawdown_monotonic_curve_is_zero() {
        let equity = curve(&[100.0, 105.0, 110.0]);
        assert_relative_eq!(max_drawdown_percent(&equity), 0.0);
    }

    #[test]
    fn test_sharpe_zero_deviation_is_zero() {
        let equity = curve(&[100.0, 100.0, 100.0, 100.0]);
        assert_relative_eq!(sharpe_ratio(&equity, Timeframe::D1), 0.0);
    }

    #[test]
    fn test_sharpe_positive_for_steady_gains() {
        let equity = curve(&[100.0, 101.0, 102.5, 103.0, 104.5, 106.0]);
        assert!(sharpe_ratio(&equity, Timeframe::D1) > 0.0);
    }

    #[test]
    fn test_win_rate_and_profit_factor() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let trades = vec![trade(10.0, at), trade(-5.0, at), trade(20.0, at)];
        let equity = curve(&[1000.0, 1010.0, 1005.0, 1025.0]);

        let stats = compute(1000.0, &equity, &trades, Timeframe::H1);

        assert_eq!(stats.total_trades, 3);
        assert_eq!(stats.winning_trades, 2);
        assert_eq!(stats.losing_trades, 1);
        assert_relative_eq!(stats.win_rate, 2.0 / 3.0 * 100.0);
        assert_relative_eq!(stats.profit_factor, 30.0 / 5.0);
        assert_relative_eq!(stats.average_profit, 15.0);
        assert_relative_eq!(stats.average_loss, 5.0);
        assert_relative_eq!(stats.total_return, 25.0);
        assert_relative_eq!(stats.total_return_percent, 2.5);
    }

    #[test]
    fn test_no_trades_gives_zero_win_rate() {
        let equity = curve(&[1000.0, 1000.0]);
        let stats = compute(1000.0, &equity, &[], Timeframe::H1);

        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.total_trades, 0);
        assert_eq!(stats.profit_factor, 0.0);
    }
}
