//! Full-loop orchestrator tests: cache → train → versioned artifact →
//! backtest → predict, on synthetic data.

use chrono::{TimeZone, Utc};
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use ktrdr_core::data::OhlcvCache;
use ktrdr_core::domain::{Bar, Signal, Timeframe};
use ktrdr_core::model::ArtifactStore;
use ktrdr_core::observer::{CancelFlag, NoopObserver};
use ktrdr_runner::{
    backtest_from_cache, predict_from_cache, train_from_cache, StrategyConfig, StrategyContext,
};

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

fn temp_dir(tag: &str) -> PathBuf {
    let id = TEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = std::env::temp_dir().join(format!("ktrdr_orch_{tag}_{}_{id}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn synthetic_bars(n: usize) -> Vec<Bar> {
    let base = Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap();
    (0..n)
        .map(|i| {
            let t = i as f64;
            let close = 100.0 + 12.0 * (t * 0.13).sin() + 4.0 * (t * 0.041).cos();
            let open = if i == 0 { close } else { close - 0.2 };
            Bar {
                timestamp: base + chrono::Duration::hours(i as i64),
                open,
                high: open.max(close) + 0.8,
                low: open.min(close) - 0.8,
                close,
                volume: 1_000.0 + 10.0 * (t * 0.7).cos().abs(),
            }
        })
        .collect()
}

fn test_config() -> StrategyConfig {
    StrategyConfig::from_toml(
        r#"
name = "orchestrator_test"

[data]
symbols = ["SYN"]
timeframes = ["1h"]
history_required = 100

[[indicators]]
name = "rsi"
period = 14

[model.architecture]
hidden_layers = [12, 6]

[model.training]
learning_rate = 0.01
batch_size = 32
max_epochs = 15
early_stopping_patience = 15
min_delta = 0.00001
seed = 23

[decisions]
confidence_threshold = 0.4

[training.labels]
zigzag_threshold = 0.03
label_lookahead = 12

[backtesting]
initial_capital = 100000.0
transaction_costs = 0.001
slippage = 0.001
"#,
    )
    .unwrap()
}

fn setup(tag: &str, n_bars: usize) -> StrategyContext {
    let data_dir = temp_dir(&format!("{tag}_data"));
    let artifact_dir = temp_dir(&format!("{tag}_models"));
    let cache = OhlcvCache::new(&data_dir);
    cache
        .write("SYN", Timeframe::H1, &synthetic_bars(n_bars))
        .unwrap();
    StrategyContext::new(test_config(), data_dir, artifact_dir).unwrap()
}

#[test]
fn train_backtest_predict_loop() {
    let ctx = setup("loop", 600);

    let report = train_from_cache(&ctx, "SYN", Timeframe::H1, None, &NoopObserver).unwrap();
    assert_eq!(report.version, 1);
    assert_eq!(report.strategy, "orchestrator_test");
    assert!(report.trained_rows > 400);
    assert!(report.label_counts.iter().sum::<usize>() > 400);
    assert_eq!(report.importance.len(), 3);
    assert!(!report.history.epochs.is_empty());

    let bt = backtest_from_cache(&ctx, "SYN", Timeframe::H1, None, None, &NoopObserver).unwrap();
    assert_eq!(bt.model_version, 1);
    assert_eq!(bt.bar_count, 600);
    assert!(bt.final_equity.is_finite());
    for p in &bt.equity_curve {
        assert!((p.cash + p.position_value - p.total_equity).abs() < 1e-9);
    }
    assert_eq!(bt.equity_curve.last().unwrap().position_value, 0.0);
    assert_eq!(bt.config_snapshot, report.config_snapshot);

    let decision = predict_from_cache(&ctx, "SYN", Timeframe::H1, None).unwrap();
    assert!((0.0..=1.0).contains(&decision.confidence));
    assert!(matches!(
        decision.signal,
        Signal::Buy | Signal::Hold | Signal::Sell
    ));

    let _ = fs::remove_dir_all(&ctx.data_dir);
    let _ = fs::remove_dir_all(&ctx.artifact_dir);
}

#[test]
fn each_training_run_mints_a_new_version() {
    let ctx = setup("versions", 500);

    let v1 = train_from_cache(&ctx, "SYN", Timeframe::H1, None, &NoopObserver).unwrap();
    let v2 = train_from_cache(&ctx, "SYN", Timeframe::H1, None, &NoopObserver).unwrap();
    assert_eq!(v1.version, 1);
    assert_eq!(v2.version, 2);

    let store = ArtifactStore::new(&ctx.artifact_dir);
    assert_eq!(
        store.list_versions("orchestrator_test", "SYN", Timeframe::H1),
        vec![1, 2]
    );
    assert_eq!(
        store
            .latest_version("orchestrator_test", "SYN", Timeframe::H1)
            .unwrap(),
        Some(2)
    );

    // Identical config + data → identical snapshot and dataset hashes.
    assert_eq!(v1.config_snapshot, v2.config_snapshot);
    assert_eq!(v1.dataset_hash, v2.dataset_hash);

    let _ = fs::remove_dir_all(&ctx.data_dir);
    let _ = fs::remove_dir_all(&ctx.artifact_dir);
}

#[test]
fn cancelled_training_promotes_nothing() {
    let ctx = setup("cancel", 500);

    let flag = CancelFlag::new();
    flag.cancel();
    let err = train_from_cache(&ctx, "SYN", Timeframe::H1, None, &flag).unwrap_err();
    assert_eq!(err.code(), "CANCELLED");

    let store = ArtifactStore::new(&ctx.artifact_dir);
    assert!(store
        .list_versions("orchestrator_test", "SYN", Timeframe::H1)
        .is_empty());
    assert_eq!(
        store
            .latest_version("orchestrator_test", "SYN", Timeframe::H1)
            .unwrap(),
        None
    );

    let _ = fs::remove_dir_all(&ctx.data_dir);
    let _ = fs::remove_dir_all(&ctx.artifact_dir);
}

#[test]
fn backtest_without_model_is_model_error() {
    let ctx = setup("nomodel", 300);
    let err =
        backtest_from_cache(&ctx, "SYN", Timeframe::H1, None, None, &NoopObserver).unwrap_err();
    assert_eq!(err.code(), "MODEL");

    let _ = fs::remove_dir_all(&ctx.data_dir);
    let _ = fs::remove_dir_all(&ctx.artifact_dir);
}

#[test]
fn unknown_model_version_is_model_error() {
    let ctx = setup("badversion", 500);
    train_from_cache(&ctx, "SYN", Timeframe::H1, None, &NoopObserver).unwrap();

    let err =
        backtest_from_cache(&ctx, "SYN", Timeframe::H1, None, Some(7), &NoopObserver).unwrap_err();
    assert_eq!(err.code(), "MODEL");

    let _ = fs::remove_dir_all(&ctx.data_dir);
    let _ = fs::remove_dir_all(&ctx.artifact_dir);
}

#[test]
fn too_little_history_is_insufficient_data() {
    let ctx = setup("short", 50); // below history_required = 100
    let err = train_from_cache(&ctx, "SYN", Timeframe::H1, None, &NoopObserver).unwrap_err();
    assert_eq!(err.code(), "INSUFFICIENT_DATA");

    let _ = fs::remove_dir_all(&ctx.data_dir);
    let _ = fs::remove_dir_all(&ctx.artifact_dir);
}
