//! Parquet OHLCV cache — one file per (symbol, timeframe).
//!
//! Layout: `{cache_dir}/{SYMBOL}_{timeframe}.parquet` with columns
//! `timestamp` (epoch seconds, UTC), `open`, `high`, `low`, `close`,
//! `volume`.
//!
//! - Atomic writes (write to .tmp, rename into place)
//! - Integrity validation on load (schema, row count, OHLC invariants,
//!   strictly increasing timestamps)
//! - Optional date-range filtering on load

use chrono::{DateTime, TimeZone, Utc};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::domain::{validate_series, Bar, Timeframe};
use crate::error::{KtrdrError, Result};

/// The OHLCV file cache.
pub struct OhlcvCache {
    cache_dir: PathBuf,
}

impl OhlcvCache {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path of the cache file for a (symbol, timeframe).
    pub fn file_path(&self, symbol: &str, timeframe: Timeframe) -> PathBuf {
        self.cache_dir
            .join(format!("{symbol}_{timeframe}.parquet"))
    }

    pub fn has(&self, symbol: &str, timeframe: Timeframe) -> bool {
        self.file_path(symbol, timeframe).exists()
    }

    /// Write a validated bar series, atomically.
    pub fn write(&self, symbol: &str, timeframe: Timeframe, bars: &[Bar]) -> Result<()> {
        if bars.is_empty() {
            return Err(KtrdrError::Data {
                message: "no bars to cache".into(),
                bar_index: None,
            });
        }
        validate_series(bars)?;
        fs::create_dir_all(&self.cache_dir)?;

        let df = bars_to_dataframe(bars)?;
        let path = self.file_path(symbol, timeframe);
        let tmp_path = path.with_extension("parquet.tmp");

        write_parquet(&df, &tmp_path)?;
        fs::rename(&tmp_path, &path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            KtrdrError::Data {
                message: format!("atomic rename failed: {e}"),
                bar_index: None,
            }
        })?;
        debug!(symbol, %timeframe, bars = bars.len(), "cache written");
        Ok(())
    }

    /// Load all cached bars for a (symbol, timeframe).
    pub fn load(&self, symbol: &str, timeframe: Timeframe) -> Result<Vec<Bar>> {
        let path = self.file_path(symbol, timeframe);
        if !path.exists() {
            return Err(KtrdrError::Data {
                message: format!("no cached data for {symbol} {timeframe}"),
                bar_index: None,
            });
        }
        let df = read_parquet(&path)?;
        let bars = dataframe_to_bars(&df)?;
        validate_series(&bars)?;
        Ok(bars)
    }

    /// Load bars inside `[start, end)`.
    pub fn load_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Bar>> {
        let bars = self.load(symbol, timeframe)?;
        Ok(bars
            .into_iter()
            .filter(|b| {
                start.map(|s| b.timestamp >= s).unwrap_or(true)
                    && end.map(|e| b.timestamp < e).unwrap_or(true)
            })
            .collect())
    }
}

// ── Parquet I/O helpers ─────────────────────────────────────────────

fn bars_to_dataframe(bars: &[Bar]) -> Result<DataFrame> {
    let timestamps: Vec<i64> = bars.iter().map(|b| b.timestamp.timestamp()).collect();
    let opens: Vec<f64> = bars.iter().map(|b| b.open).collect();
    let highs: Vec<f64> = bars.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = bars.iter().map(|b| b.low).collect();
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    DataFrame::new(vec![
        Column::new("timestamp".into(), timestamps),
        Column::new("open".into(), opens),
        Column::new("high".into(), highs),
        Column::new("low".into(), lows),
        Column::new("close".into(), closes),
        Column::new("volume".into(), volumes),
    ])
    .map_err(|e| KtrdrError::Data {
        message: format!("dataframe creation: {e}"),
        bar_index: None,
    })
}

fn write_parquet(df: &DataFrame, path: &Path) -> Result<()> {
    let file = fs::File::create(path)?;
    ParquetWriter::new(file)
        .finish(&mut df.clone())
        .map_err(|e| KtrdrError::Data {
            message: format!("write parquet: {e}"),
            bar_index: None,
        })?;
    Ok(())
}

fn read_parquet(path: &Path) -> Result<DataFrame> {
    let file = fs::File::open(path)?;
    let df = ParquetReader::new(file)
        .finish()
        .map_err(|e| KtrdrError::Data {
            message: format!("read parquet: {e}"),
            bar_index: None,
        })?;

    if df.height() == 0 {
        return Err(KtrdrError::Data {
            message: "empty cache file".into(),
            bar_index: None,
        });
    }
    for col_name in ["timestamp", "open", "high", "low", "close", "volume"] {
        if df.column(col_name).is_err() {
            return Err(KtrdrError::Data {
                message: format!("missing column '{col_name}'"),
                bar_index: None,
            });
        }
    }
    Ok(df)
}

fn dataframe_to_bars(df: &DataFrame) -> Result<Vec<Bar>> {
    let col_err = |e: PolarsError| KtrdrError::Data {
        message: format!("column read: {e}"),
        bar_index: None,
    };

    let ts = df.column("timestamp").map_err(col_err)?.i64().map_err(col_err)?;
    let open = df.column("open").map_err(col_err)?.f64().map_err(col_err)?;
    let high = df.column("high").map_err(col_err)?.f64().map_err(col_err)?;
    let low = df.column("low").map_err(col_err)?.f64().map_err(col_err)?;
    let close = df.column("close").map_err(col_err)?.f64().map_err(col_err)?;
    let volume = df.column("volume").map_err(col_err)?.f64().map_err(col_err)?;

    let n = df.height();
    let mut bars = Vec::with_capacity(n);
    for i in 0..n {
        let secs = ts.get(i).ok_or_else(|| KtrdrError::Data {
            message: format!("null timestamp at row {i}"),
            bar_index: Some(i),
        })?;
        let timestamp = Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| KtrdrError::Data {
                message: format!("invalid timestamp {secs} at row {i}"),
                bar_index: Some(i),
            })?;
        bars.push(Bar {
            timestamp,
            open: open.get(i).unwrap_or(f64::NAN),
            high: high.get(i).unwrap_or(f64::NAN),
            low: low.get(i).unwrap_or(f64::NAN),
            close: close.get(i).unwrap_or(f64::NAN),
            volume: volume.get(i).unwrap_or(f64::NAN),
        });
    }
    Ok(bars)
}
