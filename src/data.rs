//! Historical data loading
//!
//! Loads OHLCV bars from CSV files (`datetime,open,high,low,close,volume`
//! with a header row) and exposes a directory of such files as a
//! [`MarketDataProvider`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::EngineError;
use crate::exchange::MarketDataProvider;
use crate::types::{Bar, Symbol, Timeframe};

/// Load OHLCV bars from a CSV file, skipping rows that fail validation
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Bar>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path).context("Failed to open CSV file")?;

    let mut bars = Vec::new();
    let mut invalid_count = 0;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.context(format!("Failed to read row {}", row_idx + 1))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let timestamp = dt_str
            .parse::<DateTime<Utc>>()
            .or_else(|_| {
                // Try parsing without timezone and assume UTC
                chrono::NaiveDateTime::parse_from_str(dt_str, "%Y-%m-%d %H:%M:%S")
                    .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
            })
            .context(format!("Failed to parse datetime: {}", dt_str))?;

        let open: f64 = record
            .get(1)
            .context("Missing open column")?
            .parse()
            .context("Failed to parse open")?;
        let high: f64 = record
            .get(2)
            .context("Missing high column")?
            .parse()
            .context("Failed to parse high")?;
        let low: f64 = record
            .get(3)
            .context("Missing low column")?
            .parse()
            .context("Failed to parse low")?;
        let close: f64 = record
            .get(4)
            .context("Missing close column")?
            .parse()
            .context("Failed to parse close")?;
        let volume: f64 = record
            .get(5)
            .context("Missing volume column")?
            .parse()
            .context("Failed to parse volume")?;

        match Bar::new(timestamp, open, high, low, close, volume) {
            Ok(bar) => bars.push(bar),
            Err(e) => {
                invalid_count += 1;
                warn!(
                    "Skipping invalid bar at row {} in {:?}: {}",
                    row_idx + 2, // +2 for 1-indexed and header row
                    path.file_name().unwrap_or_default(),
                    e
                );
            }
        }
    }

    if invalid_count > 0 {
        warn!(
            "Skipped {} invalid bars out of {} in {:?}",
            invalid_count,
            invalid_count + bars.len(),
            path.file_name().unwrap_or_default()
        );
    }

    Ok(bars)
}

/// Filter bars by an inclusive date range
pub fn filter_bars_by_date(
    bars: Vec<Bar>,
    start: Option<DateTime<Utc>>,
    end: Option<DateTime<Utc>>,
) -> Vec<Bar> {
    bars.into_iter()
        .filter(|bar| {
            let after_start = start.is_none_or(|s| bar.timestamp >= s);
            let before_end = end.is_none_or(|e| bar.timestamp <= e);
            after_start && before_end
        })
        .collect()
}

/// Parse a date string (YYYY-MM-DD or YYYY-MM-DD HH:MM:SS) to DateTime<Utc>
pub fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    // Try full datetime format first
    if let Ok(dt) = date_str.parse::<DateTime<Utc>>() {
        return Ok(dt);
    }

    // Try YYYY-MM-DD HH:MM:SS format
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(date_str, "%Y-%m-%d %H:%M:%S") {
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
    }

    // Try YYYY-MM-DD format (assume start of day)
    if let Ok(nd) = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d") {
        let ndt = nd.and_hms_opt(0, 0, 0).unwrap();
        return Ok(DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc));
    }

    anyhow::bail!(
        "Failed to parse date: {}. Use YYYY-MM-DD or YYYY-MM-DD HH:MM:SS format",
        date_str
    )
}

/// Full timestamp range of a bar file, if it has any rows
pub fn data_date_range(path: impl AsRef<Path>) -> Result<Option<(DateTime<Utc>, DateTime<Utc>)>> {
    let bars = load_csv(path.as_ref())?;
    if bars.is_empty() {
        return Ok(None);
    }

    let min_date = bars.iter().map(|b| b.timestamp).min().unwrap();
    let max_date = bars.iter().map(|b| b.timestamp).max().unwrap();

    Ok(Some((min_date, max_date)))
}

/// File name convention shared with the provider: `<SYMBOL>_<timeframe>.csv`
pub fn bar_file_name(symbol: &Symbol, timeframe: Timeframe) -> String {
    format!("{}_{}.csv", symbol.as_str(), timeframe.as_str())
}

/// Serves bars from a directory of CSV files
#[derive(Debug, Clone)]
pub struct CsvDataProvider {
    data_dir: PathBuf,
}

impl CsvDataProvider {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        CsvDataProvider {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    fn file_for(&self, symbol: &Symbol, timeframe: Timeframe) -> PathBuf {
        self.data_dir.join(bar_file_name(symbol, timeframe))
    }
}

#[async_trait]
impl MarketDataProvider for CsvDataProvider {
    async fn bars(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Bar>, EngineError> {
        let path = self.file_for(symbol, timeframe);

        if !path.exists() {
            return Err(EngineError::DataUnavailable(format!(
                "no data file for {} {} at {}",
                symbol,
                timeframe,
                path.display()
            )));
        }

        let bars = load_csv(&path)
            .map_err(|e| EngineError::DataUnavailable(format!("{}: {:#}", symbol, e)))?;
        let total = bars.len();
        let bars = filter_bars_by_date(bars, Some(start), Some(end));

        if bars.is_empty() {
            return Err(EngineError::DataUnavailable(format!(
                "no bars for {} {} between {} and {}",
                symbol, timeframe, start, end
            )));
        }

        info!(
            "Loaded {} bars for {} {} (filtered from {} total)",
            bars.len(),
            symbol,
            timeframe,
            total
        );

        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::io::Write;

    fn write_fixture(name: &str, rows: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ema-rsi-engine-test-{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("BTCUSDT_1h.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "datetime,open,high,low,close,volume").unwrap();
        write!(file, "{}", rows).unwrap();
        dir
    }

    #[test]
    fn test_parse_date_formats() {
        assert_eq!(
            parse_date("2024-03-01").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
        );
        assert_eq!(
            parse_date("2024-03-01 12:30:00").unwrap(),
            Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap()
        );
        assert!(parse_date("not-a-date").is_err());
    }

    #[test]
    fn test_load_csv_skips_invalid_rows() {
        let dir = write_fixture(
            "invalid-rows",
            "2024-01-01 00:00:00,100,105,95,102,1000\n\
             2024-01-01 01:00:00,100,90,110,102,1000\n\
             2024-01-01 02:00:00,102,106,101,104,900\n",
        );

        let bars = load_csv(dir.join("BTCUSDT_1h.csv")).unwrap();
        // the high<low row is dropped
        assert_eq!(bars.len(), 2);
    }

    #[tokio::test]
    async fn test_provider_serves_range() {
        let dir = write_fixture(
            "provider-range",
            "2024-01-01 00:00:00,100,105,95,102,1000\n\
             2024-01-01 01:00:00,102,106,101,104,900\n\
             2024-01-01 02:00:00,104,107,103,105,800\n",
        );

        let provider = CsvDataProvider::new(&dir);
        let symbol = Symbol::new("BTCUSDT");

        let bars = provider
            .bars(
                &symbol,
                Timeframe::H1,
                Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(bars.len(), 2);

        // a range with no bars is a data error, not an empty result
        let result = provider
            .bars(
                &symbol,
                Timeframe::H1,
                Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap(),
            )
            .await;
        assert!(matches!(result, Err(EngineError::DataUnavailable(_))));
    }

    #[tokio::test]
    async fn test_provider_missing_file() {
        let provider = CsvDataProvider::new(std::env::temp_dir().join("ema-rsi-engine-nonexistent"));
        let result = provider
            .bars(
                &Symbol::new("ETHUSDT"),
                Timeframe::H1,
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
            )
            .await;

        assert!(matches!(result, Err(EngineError::DataUnavailable(_))));
    }
}
