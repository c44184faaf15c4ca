//! Scan command implementation
//!
//! Replays the indicator and signal layers over a data file and prints the
//! crossover signals found, without simulating any trades.

use anyhow::{Context, Result};
use tracing::info;

use ema_rsi_engine::config::StrategyConfig;
use ema_rsi_engine::data;
use ema_rsi_engine::indicators::IndicatorEngine;
use ema_rsi_engine::signal::SignalGenerator;
use ema_rsi_engine::types::{Signal, Symbol, Timeframe};

pub fn run(
    data_dir: String,
    config_path: Option<String>,
    symbols: String,
    timeframe: String,
    last: usize,
) -> Result<()> {
    let strategy = match &config_path {
        Some(path) => StrategyConfig::from_file(path)?,
        None => StrategyConfig::default(),
    };
    strategy.validate()?;

    let timeframe: Timeframe = timeframe
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    for symbol in symbols.split(',') {
        let symbol = Symbol::new(symbol.trim().to_uppercase());
        let path = std::path::Path::new(&data_dir).join(data::bar_file_name(&symbol, timeframe));
        let bars =
            data::load_csv(&path).context(format!("Failed to load data for {}", symbol))?;
        info!("Loaded {} bars for {}", bars.len(), symbol);

        let mut indicators = IndicatorEngine::new(&strategy);
        let mut generator = SignalGenerator::new(&strategy);
        let mut signals: Vec<Signal> = Vec::new();

        for bar in &bars {
            if let Some(point) = indicators.next(bar) {
                if let Some(signal) = generator.on_point(&point, bar.close) {
                    signals.push(signal);
                }
            }
        }

        println!("\n{} - {} signals over {} bars", symbol, signals.len(), bars.len());
        println!("{}", "-".repeat(60));
        let shown = signals.len().saturating_sub(last);
        for signal in &signals[shown..] {
            println!(
                "{}  {:<4} {:<8} conf {:>5.1}  @ {:>10.2}  {}",
                signal.timestamp.format("%Y-%m-%d %H:%M"),
                signal.direction.to_string(),
                signal.strength.to_string(),
                signal.confidence,
                signal.reference_price,
                signal.message
            );
        }
    }

    Ok(())
}
