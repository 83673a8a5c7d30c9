//! Backtest report and its export surface (CSV, Parquet, JSON manifest).

use anyhow::{Context, Result};
use polars::prelude::{Column, DataFrame, ParquetWriter};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

use ktrdr_core::domain::{EquityPoint, PositionSide, Timeframe, Trade};

use crate::metrics::PerformanceMetrics;

/// Complete result of one backtest operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestReport {
    pub strategy: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub model_version: u32,
    pub initial_capital: f64,
    pub final_equity: f64,
    pub bar_count: usize,
    pub decision_count: usize,
    pub metrics: PerformanceMetrics,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub config_snapshot: String,
    pub dataset_hash: String,
}

/// Compact manifest written next to the full artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub strategy: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub model_version: u32,
    pub config_snapshot: String,
    pub dataset_hash: String,
    pub metrics: PerformanceMetrics,
}

impl BacktestReport {
    /// Deterministic run identifier: config snapshot + dataset + model.
    pub fn run_id(&self) -> String {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.config_snapshot.as_bytes());
        hasher.update(self.dataset_hash.as_bytes());
        hasher.update(&self.model_version.to_le_bytes());
        hasher.update(self.symbol.as_bytes());
        hasher.finalize().to_hex().to_string()
    }

    pub fn manifest(&self) -> RunManifest {
        RunManifest {
            run_id: self.run_id(),
            timestamp: chrono::Utc::now(),
            strategy: self.strategy.clone(),
            symbol: self.symbol.clone(),
            timeframe: self.timeframe,
            model_version: self.model_version,
            config_snapshot: self.config_snapshot.clone(),
            dataset_hash: self.dataset_hash.clone(),
            metrics: self.metrics.clone(),
        }
    }
}

pub fn write_manifest(path: &Path, report: &BacktestReport) -> Result<()> {
    let json = serde_json::to_string_pretty(&report.manifest())
        .context("Failed to serialize run manifest")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write manifest to {}", path.display()))?;
    Ok(())
}

pub fn write_trades_csv(path: &Path, trades: &[Trade]) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create trades CSV {}", path.display()))?;

    writeln!(
        file,
        "symbol,side,entry_time,entry_price,exit_time,exit_price,quantity,pnl,pnl_pct,commission,bars_held,exit_reason"
    )?;
    for trade in trades {
        let side = match trade.side {
            PositionSide::Long => "long",
            PositionSide::Short => "short",
        };
        writeln!(
            file,
            "{},{},{},{:.6},{},{:.6},{},{:.4},{:.6},{:.4},{},{}",
            trade.symbol,
            side,
            trade.entry_time.to_rfc3339(),
            trade.entry_price,
            trade.exit_time.to_rfc3339(),
            trade.exit_price,
            trade.quantity,
            trade.pnl,
            trade.pnl_pct,
            trade.commission,
            trade.bars_held,
            serde_json::to_value(trade.exit_reason)
                .expect("exit reason serializes")
                .as_str()
                .unwrap_or("unknown"),
        )?;
    }
    Ok(())
}

pub fn write_trades_json(path: &Path, trades: &[Trade]) -> Result<()> {
    let json = serde_json::to_string_pretty(trades).context("Failed to serialize trades")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write trades JSON {}", path.display()))?;
    Ok(())
}

pub fn write_equity_csv(path: &Path, equity: &[EquityPoint]) -> Result<()> {
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create equity CSV {}", path.display()))?;
    writeln!(file, "timestamp,cash,position_value,total_equity,drawdown")?;
    for point in equity {
        writeln!(
            file,
            "{},{:.4},{:.4},{:.4},{:.6}",
            point.timestamp.to_rfc3339(),
            point.cash,
            point.position_value,
            point.total_equity,
            point.drawdown
        )?;
    }
    Ok(())
}

pub fn write_equity_parquet(path: &Path, equity: &[EquityPoint]) -> Result<()> {
    let timestamps: Vec<i64> = equity.iter().map(|p| p.timestamp.timestamp()).collect();
    let cash: Vec<f64> = equity.iter().map(|p| p.cash).collect();
    let position_value: Vec<f64> = equity.iter().map(|p| p.position_value).collect();
    let total: Vec<f64> = equity.iter().map(|p| p.total_equity).collect();
    let drawdown: Vec<f64> = equity.iter().map(|p| p.drawdown).collect();

    let mut df = DataFrame::new(vec![
        Column::new("timestamp".into(), timestamps),
        Column::new("cash".into(), cash),
        Column::new("position_value".into(), position_value),
        Column::new("total_equity".into(), total),
        Column::new("drawdown".into(), drawdown),
    ])
    .context("Failed to build equity dataframe")?;

    let mut file = File::create(path)
        .with_context(|| format!("Failed to create equity parquet {}", path.display()))?;
    ParquetWriter::new(&mut file)
        .finish(&mut df)
        .context("Failed to write equity parquet")?;
    Ok(())
}
