//! CSV import for OHLCV series.
//!
//! Expected header: `timestamp,open,high,low,close,volume` with RFC 3339
//! timestamps. Import feeds the Parquet cache; the pipeline itself only
//! reads the cache.

use chrono::{DateTime, Utc};
use std::path::Path;

use crate::domain::{validate_series, Bar};
use crate::error::{KtrdrError, Result};

/// Read and validate a full OHLCV CSV file.
pub fn read_ohlcv_csv(path: &Path) -> Result<Vec<Bar>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| KtrdrError::Data {
            message: format!("open csv {}: {e}", path.display()),
            bar_index: None,
        })?;

    let mut bars = Vec::new();
    for (i, record) in reader.records().enumerate() {
        let record = record.map_err(|e| KtrdrError::Data {
            message: format!("csv parse: {e}"),
            bar_index: Some(i),
        })?;
        if record.len() != 6 {
            return Err(KtrdrError::Data {
                message: format!("expected 6 columns, found {}", record.len()),
                bar_index: Some(i),
            });
        }
        let timestamp = record[0]
            .parse::<DateTime<Utc>>()
            .map_err(|e| KtrdrError::Data {
                message: format!("bad timestamp '{}': {e}", &record[0]),
                bar_index: Some(i),
            })?;
        let field = |idx: usize, name: &str| -> Result<f64> {
            record[idx].parse::<f64>().map_err(|e| KtrdrError::Data {
                message: format!("bad {name} '{}': {e}", &record[idx]),
                bar_index: Some(i),
            })
        };
        bars.push(Bar {
            timestamp,
            open: field(1, "open")?,
            high: field(2, "high")?,
            low: field(3, "low")?,
            close: field(4, "close")?,
            volume: field(5, "volume")?,
        });
    }

    validate_series(&bars)?;
    Ok(bars)
}
