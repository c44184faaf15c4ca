//! CLI subcommand implementations

pub mod backtest;
pub mod paper;
pub mod scan;
