//! Performance benchmarks for ema-rsi-engine
//!
//! Run with: `cargo bench`
//! View results: `open target/criterion/report/index.html`

use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, Criterion};

use ema_rsi_engine::backtest::Backtester;
use ema_rsi_engine::config::{BacktestRequest, StrategyConfig};
use ema_rsi_engine::indicators;
use ema_rsi_engine::types::{Bar, Symbol, Timeframe};

fn synthetic_bars(count: usize) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    (0..count)
        .map(|i| {
            let close = 100.0 + (i as f64 * 0.05).sin() * 10.0 + (i as f64 * 0.01);
            Bar {
                timestamp: start + Duration::hours(i as i64),
                open: close,
                high: close * 1.002,
                low: close * 0.998,
                close,
                volume: 1000.0,
            }
        })
        .collect()
}

fn benchmark_indicators(c: &mut Criterion) {
    let bars = synthetic_bars(10_000);
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let config = StrategyConfig::default();

    c.bench_function("ema_10k", |b| {
        b.iter(|| indicators::ema(black_box(&closes), 26).unwrap())
    });
    c.bench_function("rsi_10k", |b| {
        b.iter(|| indicators::rsi(black_box(&closes), 14).unwrap())
    });
    c.bench_function("indicator_points_10k", |b| {
        b.iter(|| indicators::indicator_points(black_box(&bars), &config).unwrap())
    });
}

fn benchmark_backtest(c: &mut Criterion) {
    let bars = synthetic_bars(10_000);
    let request = BacktestRequest {
        symbol: Symbol::new("BTCUSDT"),
        timeframe: Timeframe::H1,
        start: bars.first().unwrap().timestamp,
        end: bars.last().unwrap().timestamp,
        initial_balance: 1000.0,
        strategy: StrategyConfig {
            min_confidence: 0.0,
            min_time_between_trades: 0,
            ..Default::default()
        },
    };

    c.bench_function("backtest_10k", |b| {
        b.iter(|| {
            Backtester::new(black_box(request.clone()))
                .unwrap()
                .run(black_box(&bars))
                .unwrap()
        })
    });
}

criterion_group!(benches, benchmark_indicators, benchmark_backtest);
criterion_main!(benches);
