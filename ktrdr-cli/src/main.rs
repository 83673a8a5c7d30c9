//! KTRDR CLI — train, backtest, and predict from a strategy document.
//!
//! Commands:
//! - `train`        — fit a new model version for (strategy, symbol, timeframe)
//! - `backtest`     — simulate a trained version and print the report
//! - `predict`      — decision for the latest cached bar
//! - `cache-status` — show which (symbol, timeframe) series are cached
//! - `import-csv`   — load an OHLCV CSV file into the Parquet cache

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use ktrdr_core::data::{read_ohlcv_csv, OhlcvCache};
use ktrdr_core::domain::Timeframe;
use ktrdr_core::observer::NoopObserver;
use ktrdr_runner::config::OutputFormat;
use ktrdr_runner::{
    backtest_from_cache, predict_from_cache, report, train_from_cache, StrategyConfig,
    StrategyContext,
};

#[derive(Parser)]
#[command(name = "ktrdr", about = "Neuro-fuzzy trading research platform", version)]
struct Cli {
    /// Strategy config file (TOML).
    #[arg(long, global = true, default_value = "strategy.toml")]
    strategy: PathBuf,

    /// OHLCV cache directory.
    #[arg(long, global = true, default_value = "data")]
    data_dir: PathBuf,

    /// Model artifact directory.
    #[arg(long, global = true, default_value = "models")]
    models_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a new model version.
    Train {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        timeframe: Timeframe,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
    /// Backtest a trained model version.
    Backtest {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        timeframe: Timeframe,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
        /// Model version (defaults to latest).
        #[arg(long)]
        model_version: Option<u32>,
        /// Directory for trade/equity/manifest exports.
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Print the decision for the latest cached bar.
    Predict {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        timeframe: Timeframe,
        #[arg(long)]
        model_version: Option<u32>,
    },
    /// Show cache coverage for the configured symbols.
    CacheStatus,
    /// Import an OHLCV CSV file into the cache.
    ImportCsv {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        timeframe: Timeframe,
        #[arg(long)]
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = StrategyConfig::load(&cli.strategy)
        .with_context(|| format!("loading strategy {}", cli.strategy.display()))?;
    let output_format = config.decisions.output_format;
    let ctx = StrategyContext::new(config, &cli.data_dir, &cli.models_dir)?;

    match cli.command {
        Command::Train {
            symbol,
            timeframe,
            start,
            end,
        } => {
            let range = zip_range(start, end)?;
            let report = train_from_cache(&ctx, &symbol, timeframe, range, &NoopObserver)?;
            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
                OutputFormat::Text => {
                    println!(
                        "trained {}/{}_{} v{} ({} rows)",
                        report.strategy, report.symbol, report.timeframe, report.version,
                        report.trained_rows
                    );
                    println!(
                        "  labels BUY/HOLD/SELL: {}/{}/{}",
                        report.label_counts[0], report.label_counts[1], report.label_counts[2]
                    );
                    println!(
                        "  accuracy train/val/test: {:.3}/{:.3}/{:.3}",
                        report.metrics.train.accuracy,
                        report.metrics.validation.accuracy,
                        report.metrics.test.accuracy
                    );
                }
            }
        }
        Command::Backtest {
            symbol,
            timeframe,
            start,
            end,
            model_version,
            output_dir,
        } => {
            let range = zip_range(start, end)?;
            let bt = backtest_from_cache(
                &ctx,
                &symbol,
                timeframe,
                range,
                model_version,
                &NoopObserver,
            )?;

            if let Some(dir) = output_dir {
                std::fs::create_dir_all(&dir)?;
                report::write_trades_csv(&dir.join("trades.csv"), &bt.trades)?;
                report::write_trades_json(&dir.join("trades.json"), &bt.trades)?;
                report::write_equity_csv(&dir.join("equity.csv"), &bt.equity_curve)?;
                report::write_equity_parquet(&dir.join("equity.parquet"), &bt.equity_curve)?;
                report::write_manifest(&dir.join("manifest.json"), &bt)?;
            }

            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&bt.manifest())?),
                OutputFormat::Text => {
                    let m = &bt.metrics;
                    println!(
                        "backtest {}/{}_{} v{} over {} bars",
                        bt.strategy, bt.symbol, bt.timeframe, bt.model_version, bt.bar_count
                    );
                    println!(
                        "  return {:.2}% (annualized {:.2}%), max drawdown {:.2}%",
                        m.total_return * 100.0,
                        m.annualized_return * 100.0,
                        m.max_drawdown * 100.0
                    );
                    println!(
                        "  sharpe {:.2}, sortino {:.2}, calmar {:.2}",
                        m.sharpe, m.sortino, m.calmar
                    );
                    println!(
                        "  {} trades, win rate {:.1}%, profit factor {:.2}, exposure {:.1}%",
                        m.trade_count,
                        m.win_rate * 100.0,
                        m.profit_factor,
                        m.exposure * 100.0
                    );
                    println!("  final equity {:.2}", bt.final_equity);
                }
            }
        }
        Command::Predict {
            symbol,
            timeframe,
            model_version,
        } => {
            let decision = predict_from_cache(&ctx, &symbol, timeframe, model_version)?;
            match output_format {
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&decision)?),
                OutputFormat::Text => println!(
                    "{} (confidence {:.3})",
                    decision.signal, decision.confidence
                ),
            }
        }
        Command::CacheStatus => {
            let cache = OhlcvCache::new(&ctx.data_dir);
            for symbol in &ctx.config.data.symbols {
                for &timeframe in &ctx.config.data.timeframes {
                    let status = if cache.has(symbol, timeframe) {
                        match cache.load(symbol, timeframe) {
                            Ok(bars) => format!(
                                "{} bars ({} .. {})",
                                bars.len(),
                                bars.first().map(|b| b.timestamp.to_rfc3339()).unwrap_or_default(),
                                bars.last().map(|b| b.timestamp.to_rfc3339()).unwrap_or_default()
                            ),
                            Err(e) => format!("unreadable: {e}"),
                        }
                    } else {
                        "missing".to_string()
                    };
                    println!("{symbol} {timeframe}: {status}");
                }
            }
        }
        Command::ImportCsv {
            symbol,
            timeframe,
            file,
        } => {
            let bars = read_ohlcv_csv(&file)?;
            let cache = OhlcvCache::new(&ctx.data_dir);
            cache.write(&symbol, timeframe, &bars)?;
            println!("imported {} bars into {symbol} {timeframe}", bars.len());
        }
    }

    Ok(())
}

fn zip_range(
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> Result<Option<(NaiveDate, NaiveDate)>> {
    match (start, end) {
        (Some(s), Some(e)) => {
            anyhow::ensure!(s < e, "--start must precede --end");
            Ok(Some((s, e)))
        }
        (None, None) => Ok(None),
        _ => anyhow::bail!("--start and --end must be given together"),
    }
}
