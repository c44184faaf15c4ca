//! Technical indicators: EMA and Wilder-smoothed RSI
//!
//! Both a batch form (whole close series in, aligned values out) and an
//! incremental form (one close in, latest value out) are provided. The
//! incremental calculators carry the same arithmetic as the batch functions,
//! so extending a prefix bar-by-bar reproduces the batch values bit for bit.

use crate::config::StrategyConfig;
use crate::error::EngineError;
use crate::types::{Bar, IndicatorPoint};

// =============================================================================
// Batch Calculations
// =============================================================================

/// Exponential moving average over a close series.
///
/// Seed value is the simple average of the first `period` closes; each later
/// value is `close * k + prev * (1 - k)` with `k = 2 / (period + 1)`. Output
/// holds one value per bar from index `period - 1` onward, so its length is
/// `closes.len() - period + 1`.
pub fn ema(closes: &[f64], period: usize) -> Result<Vec<f64>, EngineError> {
    if closes.len() < period {
        return Err(EngineError::InsufficientData {
            required: period,
            actual: closes.len(),
        });
    }

    let mut calc = Ema::new(period);
    Ok(closes.iter().filter_map(|&c| calc.next(c)).collect())
}

/// Relative strength index with Wilder's smoothing.
///
/// Seed average gain/loss is the simple mean of the first `period` deltas;
/// subsequent averages use `(prev * (period - 1) + current) / period`. The
/// first value lands on bar index `period`, so the output length is
/// `closes.len() - period` and `period + 1` bars are required.
pub fn rsi(closes: &[f64], period: usize) -> Result<Vec<f64>, EngineError> {
    if closes.len() < period + 1 {
        return Err(EngineError::InsufficientData {
            required: period + 1,
            actual: closes.len(),
        });
    }

    let mut calc = Rsi::new(period);
    Ok(closes.iter().filter_map(|&c| calc.next(c)).collect())
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    let value = if avg_loss == 0.0 {
        100.0
    } else if avg_gain == 0.0 {
        0.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    };

    value.clamp(0.0, 100.0)
}

// =============================================================================
// Incremental Calculators
// =============================================================================

/// Incremental EMA. Returns `None` until `period` values have been fed.
#[derive(Debug, Clone)]
pub struct Ema {
    period: usize,
    k: f64,
    seed_sum: f64,
    seen: usize,
    value: Option<f64>,
}

impl Ema {
    pub fn new(period: usize) -> Self {
        Ema {
            period,
            k: 2.0 / (period as f64 + 1.0),
            seed_sum: 0.0,
            seen: 0,
            value: None,
        }
    }

    pub fn next(&mut self, close: f64) -> Option<f64> {
        match self.value {
            Some(prev) => {
                let value = close * self.k + prev * (1.0 - self.k);
                self.value = Some(value);
                Some(value)
            }
            None => {
                self.seed_sum += close;
                self.seen += 1;
                if self.seen == self.period {
                    let seed = self.seed_sum / self.period as f64;
                    self.value = Some(seed);
                    Some(seed)
                } else {
                    None
                }
            }
        }
    }

    /// Latest value, if warm-up is complete
    pub fn value(&self) -> Option<f64> {
        self.value
    }
}

/// Incremental Wilder RSI. Returns `None` until `period + 1` values have
/// been fed; output is always within [0, 100].
#[derive(Debug, Clone)]
pub struct Rsi {
    period: usize,
    prev_close: Option<f64>,
    gain_sum: f64,
    loss_sum: f64,
    deltas_seen: usize,
    avg_gain: f64,
    avg_loss: f64,
    seeded: bool,
}

impl Rsi {
    pub fn new(period: usize) -> Self {
        Rsi {
            period,
            prev_close: None,
            gain_sum: 0.0,
            loss_sum: 0.0,
            deltas_seen: 0,
            avg_gain: 0.0,
            avg_loss: 0.0,
            seeded: false,
        }
    }

    pub fn next(&mut self, close: f64) -> Option<f64> {
        let prev = match self.prev_close.replace(close) {
            Some(prev) => prev,
            None => return None,
        };

        let delta = close - prev;
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { -delta } else { 0.0 };

        if self.seeded {
            let n = self.period as f64;
            self.avg_gain = (self.avg_gain * (n - 1.0) + gain) / n;
            self.avg_loss = (self.avg_loss * (n - 1.0) + loss) / n;
            return Some(rsi_from_averages(self.avg_gain, self.avg_loss));
        }

        self.gain_sum += gain;
        self.loss_sum += loss;
        self.deltas_seen += 1;

        if self.deltas_seen == self.period {
            self.avg_gain = self.gain_sum / self.period as f64;
            self.avg_loss = self.loss_sum / self.period as f64;
            self.seeded = true;
            Some(rsi_from_averages(self.avg_gain, self.avg_loss))
        } else {
            None
        }
    }
}

// =============================================================================
// Combined Per-Bar Engine
// =============================================================================

/// Feeds each bar's close to both EMAs and the RSI, emitting an
/// [`IndicatorPoint`] once all three have warmed up. O(1) per bar.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    ema_short: Ema,
    ema_long: Ema,
    rsi: Rsi,
}

impl IndicatorEngine {
    pub fn new(config: &StrategyConfig) -> Self {
        IndicatorEngine {
            ema_short: Ema::new(config.ema_short_period),
            ema_long: Ema::new(config.ema_long_period),
            rsi: Rsi::new(config.rsi_period),
        }
    }

    pub fn next(&mut self, bar: &Bar) -> Option<IndicatorPoint> {
        let ema_short = self.ema_short.next(bar.close);
        let ema_long = self.ema_long.next(bar.close);
        let rsi = self.rsi.next(bar.close);

        match (ema_short, ema_long, rsi) {
            (Some(ema_short), Some(ema_long), Some(rsi)) => Some(IndicatorPoint {
                timestamp: bar.timestamp,
                ema_short,
                ema_long,
                rsi,
            }),
            _ => None,
        }
    }
}

/// Compute the indicator points for a whole bar series at once.
///
/// Fails when the series is shorter than the strategy's warm-up length;
/// otherwise one point is produced per bar from the end of warm-up onward.
pub fn indicator_points(
    bars: &[Bar],
    config: &StrategyConfig,
) -> Result<Vec<IndicatorPoint>, EngineError> {
    let warm_up = config.warm_up_bars();
    if bars.len() < warm_up {
        return Err(EngineError::InsufficientData {
            required: warm_up,
            actual: bars.len(),
        });
    }

    let mut engine = IndicatorEngine::new(config);
    Ok(bars.iter().filter_map(|bar| engine.next(bar)).collect())
}

// =============================================================================
// Tests
// =============================================================================
