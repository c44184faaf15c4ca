//! EMA/RSI signal engine - main entry point
//!
//! This binary provides three subcommands:
//! - backtest: Replay a strategy over historical bars and print statistics
//! - scan: Print the crossover signals a data file produces
//! - paper: Replay bars through the live trading loop with simulated fills

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "ema-rsi-engine")]
#[command(about = "EMA/RSI trading signal engine with risk management and backtesting", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run strategy backtests over CSV data
    Backtest {
        /// Directory containing <SYMBOL>_<timeframe>.csv files
        #[arg(short, long, default_value = "data")]
        data_dir: String,

        /// Path to a strategy configuration file (JSON)
        #[arg(short, long)]
        config: Option<String>,

        /// Symbols to test (comma-separated). E.g., "BTCUSDT,ETHUSDT"
        #[arg(short, long, default_value = "BTCUSDT")]
        symbols: String,

        /// Candle timeframe (1m, 5m, 15m, 30m, 1h, 4h, 1d)
        #[arg(short, long, default_value = "1h")]
        timeframe: String,

        /// Start date (YYYY-MM-DD), defaults to the data file's first bar
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD), defaults to the data file's last bar
        #[arg(long)]
        end: Option<String>,

        /// Initial balance
        #[arg(long, default_value = "1000.0")]
        capital: f64,
    },

    /// Scan historical data and print crossover signals
    Scan {
        /// Directory containing <SYMBOL>_<timeframe>.csv files
        #[arg(short, long, default_value = "data")]
        data_dir: String,

        /// Path to a strategy configuration file (JSON)
        #[arg(short, long)]
        config: Option<String>,

        /// Symbols to scan (comma-separated)
        #[arg(short, long, default_value = "BTCUSDT")]
        symbols: String,

        /// Candle timeframe (1m, 5m, 15m, 30m, 1h, 4h, 1d)
        #[arg(short, long, default_value = "1h")]
        timeframe: String,

        /// Number of most recent signals to print per symbol
        #[arg(short, long, default_value = "10")]
        last: usize,
    },

    /// Replay data through the live loop with a paper execution adapter
    Paper {
        /// Directory containing <SYMBOL>_<timeframe>.csv files
        #[arg(short, long, default_value = "data")]
        data_dir: String,

        /// Path to a strategy configuration file (JSON)
        #[arg(short, long)]
        config: Option<String>,

        /// Symbol to trade
        #[arg(short, long, default_value = "BTCUSDT")]
        symbol: String,

        /// Candle timeframe (1m, 5m, 15m, 30m, 1h, 4h, 1d)
        #[arg(short, long, default_value = "1h")]
        timeframe: String,

        /// Start date (YYYY-MM-DD), defaults to the data file's first bar
        #[arg(long)]
        start: Option<String>,

        /// End date (YYYY-MM-DD), defaults to the data file's last bar
        #[arg(long)]
        end: Option<String>,

        /// Initial balance
        #[arg(long, default_value = "1000.0")]
        capital: f64,
    },
}

fn setup_logging(verbose: bool, command_name: &str) -> Result<()> {
    // Create logs directory
    std::fs::create_dir_all("logs")?;

    // Create log file with naming pattern: {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // File appender
    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(true);

    // File layer - same format but without ANSI colors
    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(file_appender)
        .with_target(true)
        .with_line_number(true)
        .with_file(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    info!("Logging initialized");
    info!("Log file: {}", log_path.display());

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let command_name = match &cli.command {
        Commands::Backtest { .. } => "backtest",
        Commands::Scan { .. } => "scan",
        Commands::Paper { .. } => "paper",
    };

    setup_logging(cli.verbose, command_name)?;

    match cli.command {
        Commands::Backtest {
            data_dir,
            config,
            symbols,
            timeframe,
            start,
            end,
            capital,
        } => commands::backtest::run(data_dir, config, symbols, timeframe, start, end, capital),

        Commands::Scan {
            data_dir,
            config,
            symbols,
            timeframe,
            last,
        } => commands::scan::run(data_dir, config, symbols, timeframe, last),

        Commands::Paper {
            data_dir,
            config,
            symbol,
            timeframe,
            start,
            end,
            capital,
        } => commands::paper::run(data_dir, config, symbol, timeframe, start, end, capital),
    }
}
