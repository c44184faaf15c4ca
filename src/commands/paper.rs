//! Paper trading command implementation
//!
//! Replays a data file through the live trading loop with the in-memory
//! paper execution adapter: same code path as live trading, no exchange.

use anyhow::{Context, Result};
use tracing::info;

use ema_rsi_engine::config::StrategyConfig;
use ema_rsi_engine::data::{self, CsvDataProvider};
use ema_rsi_engine::exchange::{ExecutionAdapter, MarketDataProvider, PaperExecutionAdapter};
use ema_rsi_engine::live::{BarOutcome, LiveTrader};
use ema_rsi_engine::types::{Symbol, Timeframe};

#[allow(clippy::too_many_arguments)]
pub fn run(
    data_dir: String,
    config_path: Option<String>,
    symbol: String,
    timeframe: String,
    start: Option<String>,
    end: Option<String>,
    capital: f64,
) -> Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(run_async(
        data_dir,
        config_path,
        symbol,
        timeframe,
        start,
        end,
        capital,
    ))
}

async fn run_async(
    data_dir: String,
    config_path: Option<String>,
    symbol: String,
    timeframe: String,
    start: Option<String>,
    end: Option<String>,
    capital: f64,
) -> Result<()> {
    let strategy = match &config_path {
        Some(path) => StrategyConfig::from_file(path)?,
        None => StrategyConfig::default(),
    };

    let symbol = Symbol::new(symbol.trim().to_uppercase());
    let timeframe: Timeframe = timeframe
        .parse()
        .map_err(|e: String| anyhow::anyhow!(e))?;

    let provider = CsvDataProvider::new(&data_dir);
    let path = std::path::Path::new(&data_dir).join(data::bar_file_name(&symbol, timeframe));
    let (file_start, file_end) = data::data_date_range(&path)?
        .context(format!("Data file for {} has no bars", symbol))?;

    let start = match start {
        Some(s) => data::parse_date(&s)?,
        None => file_start,
    };
    let end = match end {
        Some(e) => data::parse_date(&e)?,
        None => file_end,
    };

    let bars = provider.bars(&symbol, timeframe, start, end).await?;
    info!("Replaying {} bars for {}", bars.len(), symbol);

    let adapter = PaperExecutionAdapter::new("USDT", symbol.as_str(), capital);
    let mut trader = LiveTrader::new(symbol.clone(), strategy, adapter, capital)?;

    let mut opened = 0usize;
    let mut closed = 0usize;
    let mut rejected = 0usize;
    let mut failed = 0usize;

    for bar in &bars {
        match trader.on_bar(bar).await {
            BarOutcome::Opened(position) => {
                opened += 1;
                println!(
                    "{}  OPEN  {:.6} @ {:.2} (stop {:.2}, target {:.2})",
                    bar.timestamp.format("%Y-%m-%d %H:%M"),
                    position.size,
                    position.entry_price,
                    position.stop_loss_price,
                    position.take_profit_price
                );
            }
            BarOutcome::Closed(trade) => {
                closed += 1;
                println!(
                    "{}  CLOSE {:.6} @ {:.2} ({}) pnl {:+.2}",
                    bar.timestamp.format("%Y-%m-%d %H:%M"),
                    trade.size,
                    trade.exit_price,
                    trade.exit_reason,
                    trade.profit
                );
            }
            BarOutcome::SignalRejected(_) => rejected += 1,
            BarOutcome::ExecutionFailed(e) => {
                failed += 1;
                println!(
                    "{}  ORDER FAILED: {}",
                    bar.timestamp.format("%Y-%m-%d %H:%M"),
                    e
                );
            }
            BarOutcome::WarmingUp | BarOutcome::NoSignal => {}
        }
    }

    let balances = trader.adapter().balances().await?;

    println!("\n{}", "=".repeat(60));
    println!("PAPER TRADING SUMMARY - {}", symbol);
    println!("{}", "=".repeat(60));
    println!("Bars replayed:      {}", bars.len());
    println!("Positions opened:   {}", opened);
    println!("Positions closed:   {}", closed);
    println!("Signals rejected:   {}", rejected);
    println!("Orders failed:      {}", failed);
    for (asset, amount) in &balances {
        println!("Balance {:<10}  {:.6}", asset, amount);
    }
    if let Some(position) = trader.position() {
        println!(
            "Open position:      {:.6} @ {:.2}",
            position.size, position.entry_price
        );
    }
    println!("{}", "=".repeat(60));

    Ok(())
}
