//! Signal generation from EMA crossovers and RSI confirmation
//!
//! The generator is event-driven: it compares each indicator point against
//! the previous one and emits a signal only on the bar where the short EMA
//! crosses the long EMA. Bars without a crossover produce nothing.

use crate::config::StrategyConfig;
use crate::types::{Direction, IndicatorPoint, Signal, SignalStrength};

/// Base score granted to any crossover
const BASE_CONFIDENCE: f64 = 50.0;
/// Bonus when the RSI is beyond its threshold in the confirming direction
const STRONG_BONUS: f64 = 30.0;
/// Bonus when the RSI is near its threshold on the confirming side
const MODERATE_BONUS: f64 = 15.0;
/// Width of the near-threshold RSI band, in RSI points
const NEAR_BAND: f64 = 10.0;
/// Cap on the EMA-separation contribution
const MAGNITUDE_CAP: f64 = 20.0;

/// Detects crossover events and scores them
#[derive(Debug, Clone)]
pub struct SignalGenerator {
    rsi_overbought: f64,
    rsi_oversold: f64,
    prev: Option<IndicatorPoint>,
}

impl SignalGenerator {
    pub fn new(config: &StrategyConfig) -> Self {
        SignalGenerator {
            rsi_overbought: config.rsi_overbought,
            rsi_oversold: config.rsi_oversold,
            prev: None,
        }
    }

    /// Feed the next indicator point; returns a signal on crossover bars only.
    ///
    /// `reference_price` is the close of the bar the point belongs to.
    pub fn on_point(&mut self, point: &IndicatorPoint, reference_price: f64) -> Option<Signal> {
        let prev = match self.prev.replace(*point) {
            Some(prev) => prev,
            None => return None,
        };

        let crossed_up = prev.ema_short <= prev.ema_long && point.ema_short > point.ema_long;
        let crossed_down = prev.ema_short >= prev.ema_long && point.ema_short < point.ema_long;

        let direction = if crossed_up {
            Direction::Buy
        } else if crossed_down {
            Direction::Sell
        } else {
            return None;
        };

        let strength = self.classify(direction, point.rsi);
        let confidence = self.score(point, strength);
        let message = self.describe(direction, strength, point);

        let signal = Signal {
            timestamp: point.timestamp,
            direction,
            strength,
            confidence,
            reference_price,
            ema_short: point.ema_short,
            ema_long: point.ema_long,
            rsi: point.rsi,
            message,
        };

        tracing::debug!(
            direction = %signal.direction,
            strength = %signal.strength,
            confidence = signal.confidence,
            rsi = point.rsi,
            "crossover detected"
        );

        Some(signal)
    }

    fn classify(&self, direction: Direction, rsi: f64) -> SignalStrength {
        match direction {
            Direction::Buy => {
                if rsi <= self.rsi_oversold {
                    SignalStrength::Strong
                } else if rsi <= self.rsi_oversold + NEAR_BAND {
                    SignalStrength::Moderate
                } else {
                    SignalStrength::Weak
                }
            }
            Direction::Sell => {
                if rsi >= self.rsi_overbought {
                    SignalStrength::Strong
                } else if rsi >= self.rsi_overbought - NEAR_BAND {
                    SignalStrength::Moderate
                } else {
                    SignalStrength::Weak
                }
            }
        }
    }

    fn score(&self, point: &IndicatorPoint, strength: SignalStrength) -> f64 {
        let mut confidence = BASE_CONFIDENCE;

        confidence += match strength {
            SignalStrength::Strong => STRONG_BONUS,
            SignalStrength::Moderate => MODERATE_BONUS,
            SignalStrength::Weak => 0.0,
        };

        // EMA separation as a percentage of the long EMA, doubled and capped
        if point.ema_long > 0.0 {
            let separation_pct = (point.ema_short - point.ema_long).abs() / point.ema_long * 100.0;
            confidence += (separation_pct * 2.0).min(MAGNITUDE_CAP);
        }

        confidence.clamp(0.0, 100.0)
    }

    fn describe(
        &self,
        direction: Direction,
        strength: SignalStrength,
        point: &IndicatorPoint,
    ) -> String {
        let cross = match direction {
            Direction::Buy => "EMA golden cross",
            Direction::Sell => "EMA death cross",
        };

        match (direction, strength) {
            (Direction::Buy, SignalStrength::Strong) => {
                format!("{} + RSI oversold ({:.1})", cross, point.rsi)
            }
            (Direction::Buy, SignalStrength::Moderate) => {
                format!("{} + RSI near oversold ({:.1})", cross, point.rsi)
            }
            (Direction::Sell, SignalStrength::Strong) => {
                format!("{} + RSI overbought ({:.1})", cross, point.rsi)
            }
            (Direction::Sell, SignalStrength::Moderate) => {
                format!("{} + RSI near overbought ({:.1})", cross, point.rsi)
            }
            (_, SignalStrength::Weak) => {
                format!(
                    "{} ({:.2} / {:.2}), no RSI confirmation ({:.1})",
                    cross, point.ema_short, point.ema_long, point.rsi
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn point(at: DateTime<Utc>, ema_short: f64, ema_long: f64, rsi: f64) -> IndicatorPoint {
        IndicatorPoint {
            timestamp: at,
            ema_short,
            ema_long,
            rsi,
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn cross_up(generator: &mut SignalGenerator, rsi: f64) -> Option<Signal> {
        generator.on_point(&point(t0(), 99.0, 100.0, 50.0), 100.0);
        generator.on_point(&point(t0() + Duration::hours(1), 101.0, 100.0, rsi), 101.0)
    }

    #[test]
    fn test_no_signal_without_crossover() {
        let config = StrategyConfig::default();
        let mut generator = SignalGenerator::new(&config);

        assert!(generator
            .on_point(&point(t0(), 99.0, 100.0, 50.0), 100.0)
            .is_none());
        assert!(generator
            .on_point(&point(t0() + Duration::hours(1), 99.5, 100.0, 50.0), 100.0)
            .is_none());
    }

    #[test]
    fn test_up_cross_with_oversold_rsi_is_strong() {
        let config = StrategyConfig::default();
        let mut generator = SignalGenerator::new(&config);

        let signal = cross_up(&mut generator, 28.0).unwrap();
        assert_eq!(signal.direction, Direction::Buy);
        assert_eq!(signal.strength, SignalStrength::Strong);
        assert!(signal.confidence >= 80.0);
    }

    #[test]
    fn test_up_cross_near_oversold_is_moderate() {
        let config = StrategyConfig::default();
        let mut generator = SignalGenerator::new(&config);

        let signal = cross_up(&mut generator, 35.0).unwrap();
        assert_eq!(signal.strength, SignalStrength::Moderate);
    }

    #[test]
    fn test_up_cross_without_confirmation_is_weak() {
        let config = StrategyConfig::default();
        let mut generator = SignalGenerator::new(&config);

        let signal = cross_up(&mut generator, 55.0).unwrap();
        assert_eq!(signal.strength, SignalStrength::Weak);
        assert!(signal.confidence >= 50.0);
    }

    #[test]
    fn test_down_cross_mirrors_up_cross() {
        let config = StrategyConfig::default();

        let mut up = SignalGenerator::new(&config);
        up.on_point(&point(t0(), 99.0, 100.0, 50.0), 100.0);
        let buy = up
            .on_point(&point(t0() + Duration::hours(1), 101.0, 100.0, 28.0), 101.0)
            .unwrap();

        // mirrored series: short EMA falls through the long EMA
        let mut down = SignalGenerator::new(&config);
        down.on_point(&point(t0(), 101.0, 100.0, 50.0), 100.0);
        let sell = down
            .on_point(&point(t0() + Duration::hours(1), 99.0, 100.0, 72.0), 99.0)
            .unwrap();

        assert_eq!(buy.direction, Direction::Buy);
        assert_eq!(sell.direction, Direction::Sell);
        assert_eq!(sell.strength, SignalStrength::Strong);
    }

    #[test]
    fn test_touching_then_crossing_counts() {
        let config = StrategyConfig::default();
        let mut generator = SignalGenerator::new(&config);

        // equal EMAs, then short above: a crossover
        generator.on_point(&point(t0(), 100.0, 100.0, 50.0), 100.0);
        let signal = generator
            .on_point(&point(t0() + Duration::hours(1), 100.5, 100.0, 50.0), 100.5)
            .unwrap();
        assert_eq!(signal.direction, Direction::Buy);
    }

    #[test]
    fn test_confidence_non_decreasing_as_rsi_confirms() {
        let config = StrategyConfig::default();

        // fixed crossover magnitude, RSI sweeping down toward oversold
        let mut last_confidence = 0.0;
        for rsi in [55.0, 45.0, 38.0, 32.0, 29.0, 20.0, 5.0] {
            let mut generator = SignalGenerator::new(&config);
            let signal = cross_up(&mut generator, rsi).unwrap();
            assert!(
                signal.confidence >= last_confidence,
                "confidence dropped at RSI {}: {} < {}",
                rsi,
                signal.confidence,
                last_confidence
            );
            last_confidence = signal.confidence;
        }
    }

    #[test]
    fn test_confidence_clamped_to_100() {
        let config = StrategyConfig::default();
        let mut generator = SignalGenerator::new(&config);

        // enormous separation maxes out the magnitude term
        generator.on_point(&point(t0(), 50.0, 100.0, 50.0), 100.0);
        let signal = generator
            .on_point(&point(t0() + Duration::hours(1), 150.0, 100.0, 5.0), 150.0)
            .unwrap();
        assert_eq!(signal.confidence, 100.0);
    }

    #[test]
    fn test_message_names_the_condition() {
        let config = StrategyConfig::default();
        let mut generator = SignalGenerator::new(&config);

        let signal = cross_up(&mut generator, 28.0).unwrap();
        assert!(signal.message.contains("golden cross"));
        assert!(signal.message.contains("oversold"));
    }
}
