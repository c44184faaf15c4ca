//! Backtest command implementation
//!
//! Runs one backtest per symbol. Multiple symbols are independent strategy
//! instances and run in parallel.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use tracing::info;

use ema_rsi_engine::backtest::Backtester;
use ema_rsi_engine::config::{BacktestRequest, StrategyConfig};
use ema_rsi_engine::data;
use ema_rsi_engine::types::{Bar, BacktestResult, Symbol, Timeframe};

#[allow(clippy::too_many_arguments)]
pub fn run(
    data_dir: String,
    config_path: Option<String>,
    symbols: String,
    timeframe: String,
    start: Option<String>,
    end: Option<String>,
    capital: f64,
) -> Result<()> {
    info!("Starting backtest");

    let strategy = match &config_path {
        Some(path) => {
            let config = StrategyConfig::from_file(path)?;
            info!("Loaded strategy configuration from: {}", path);
            config
        }
        None => StrategyConfig::default(),
    };

    let timeframe: Timeframe = timeframe
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;
    let start = start.as_deref().map(data::parse_date).transpose()?;
    let end = end.as_deref().map(data::parse_date).transpose()?;

    let symbols: Vec<Symbol> = symbols
        .split(',')
        .map(|s| Symbol::new(s.trim().to_uppercase()))
        .collect();

    // Load everything up front so each worker only computes
    let mut runs: Vec<(Symbol, BacktestRequest, Vec<Bar>)> = Vec::new();
    for symbol in &symbols {
        let path = std::path::Path::new(&data_dir).join(data::bar_file_name(symbol, timeframe));
        let bars =
            data::load_csv(&path).context(format!("Failed to load data for {}", symbol))?;
        info!("Loaded {} bars for {}", bars.len(), symbol);

        let (range_start, range_end) = resolve_range(&bars, start, end)?;
        let request = BacktestRequest {
            symbol: symbol.clone(),
            timeframe,
            start: range_start,
            end: range_end,
            initial_balance: capital,
            strategy: strategy.clone(),
        };

        runs.push((symbol.clone(), request, bars));
    }

    let progress = ProgressBar::new(runs.len() as u64);
    progress.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("static template"),
    );

    let results: Vec<(Symbol, Result<BacktestResult>)> = runs
        .par_iter()
        .map(|(symbol, request, bars)| {
            let result = Backtester::new(request.clone())
                .and_then(|backtester| backtester.run(bars))
                .map_err(anyhow::Error::from);
            progress.inc(1);
            (symbol.clone(), result)
        })
        .collect();
    progress.finish_and_clear();

    for (symbol, result) in results {
        match result {
            Ok(result) => print_result(&symbol, capital, &result),
            Err(e) => println!("\n{}: backtest failed: {:#}", symbol, e),
        }
    }

    info!("Backtest completed");
    Ok(())
}

/// Use the data file's own range where no explicit bounds were given
fn resolve_range(
    bars: &[Bar],
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
    let first = bars
        .first()
        .map(|b| b.timestamp)
        .context("Data file has no bars")?;
    let last = bars.last().map(|b| b.timestamp).unwrap();

    Ok((start.unwrap_or(first), end.unwrap_or(last)))
}

fn print_result(symbol: &Symbol, capital: f64, result: &BacktestResult) {
    let stats = &result.stats;

    println!("\n{}", "=".repeat(60));
    println!("BACKTEST RESULTS - {}", symbol);
    println!("{}", "=".repeat(60));
    println!("Initial Balance:    {:.2}", capital);
    println!("Final Balance:      {:.2}", stats.final_balance);
    println!(
        "Total Return:       {:.2} ({:.2}%)",
        stats.total_return, stats.total_return_percent
    );
    println!("Sharpe Ratio:       {:.2}", stats.sharpe_ratio);
    println!("Max Drawdown:       {:.2}%", stats.max_drawdown_percent);
    println!("Win Rate:           {:.2}%", stats.win_rate);
    println!("Profit Factor:      {:.2}", stats.profit_factor);
    println!("Total Trades:       {}", stats.total_trades);
    println!("Winning Trades:     {}", stats.winning_trades);
    println!("Losing Trades:      {}", stats.losing_trades);
    println!("Average Win:        {:.2}", stats.average_profit);
    println!("Average Loss:       {:.2}", stats.average_loss);
    println!("{}", "=".repeat(60));
}
