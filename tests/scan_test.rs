//! Full scan orchestration against a mock upstream source.

use chrono::{Datelike, Duration, NaiveDate, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use trendscan::config::{IngestConfig, ScanConfig, StrategyConfig};
use trendscan::error::{AppError, Result};
use trendscan::services::{DataIngestor, PriceCache, ResultStore, RuleEngine, ScanOrchestrator};
use trendscan::sources::HistorySource;
use trendscan::types::{Bar, FvgStatus, RunState};

/// Serves canned per-symbol histories; configured symbols always fail.
struct MockSource {
    series: HashMap<String, Vec<Bar>>,
    failing: Vec<String>,
}

impl HistorySource for MockSource {
    async fn fetch_history(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Bar>> {
        if self.failing.iter().any(|s| s == symbol) {
            return Err(AppError::UpstreamApi {
                symbol: symbol.to_string(),
                message: "simulated outage".to_string(),
            });
        }
        Ok(self
            .series
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.date >= from && b.date <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// `count` weekday dates ending at the most recent completed trading day.
fn weekday_dates(count: usize) -> Vec<NaiveDate> {
    let end = trendscan::types::most_recent_trading_day(Utc::now().date_naive());
    let mut dates = Vec::with_capacity(count);
    let mut d = end;
    while dates.len() < count {
        if d.weekday().num_days_from_monday() < 5 {
            dates.push(d);
        }
        d -= Duration::days(1);
    }
    dates.reverse();
    dates
}

fn bar(date: NaiveDate, open: f64, high: f64, low: f64, close: f64) -> Bar {
    Bar {
        date,
        open,
        high,
        low,
        close,
        volume: 10_000,
    }
}

/// Flat history: closes pinned to 100 with opens outside the MA band, so
/// the trend gate fails and no setups form.
fn flat_series(count: usize) -> Vec<Bar> {
    weekday_dates(count)
        .into_iter()
        .map(|d| bar(d, 100.2, 100.5, 99.5, 100.0))
        .collect()
}

/// Flat history with one in-band setup 11 bars from the end, a gentle
/// 9-bar drift, and a final bar chosen by the caller.
fn pattern_series(count: usize, last: (f64, f64, f64, f64)) -> Vec<Bar> {
    let dates = weekday_dates(count);
    let mut bars: Vec<Bar> = dates[..count - 11]
        .iter()
        .map(|&d| bar(d, 100.2, 100.5, 99.5, 100.0))
        .collect();
    bars.push(bar(dates[count - 11], 100.0, 100.3, 99.7, 100.0));
    for k in 1..=9usize {
        let close = 100.0 + 0.05 * k as f64;
        bars.push(bar(
            dates[count - 11 + k],
            close - 0.01,
            close + 0.3,
            close - 0.3,
            close,
        ));
    }
    let (open, high, low, close) = last;
    bars.push(bar(dates[count - 1], open, high, low, close));
    bars
}

/// 1400 weekday bars gives 280 calendar weeks, enough for the weekly
/// SMA200 to be defined.
const HISTORY: usize = 1400;

fn universe_source() -> (MockSource, Vec<String>) {
    let mut series = HashMap::new();
    let mut symbols = Vec::new();

    // One breakout, one active-gap candidate, one outage, 17 flat.
    series.insert(
        "WIN".to_string(),
        pattern_series(HISTORY, (101.5, 102.5, 101.0, 102.0)),
    );
    series.insert(
        "CAND".to_string(),
        pattern_series(HISTORY, (100.73, 100.8, 100.72, 100.74)),
    );
    symbols.push("WIN".to_string());
    symbols.push("CAND".to_string());
    for i in 0..17 {
        let name = format!("FLAT{i:02}");
        series.insert(name.clone(), flat_series(HISTORY));
        symbols.push(name);
    }
    symbols.insert(6, "FAIL".to_string());

    let source = MockSource {
        series,
        failing: vec!["FAIL".to_string()],
    };
    (source, symbols)
}

fn test_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("trendscan_scan_{}_{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

fn orchestrator(
    source: MockSource,
    dir: &PathBuf,
) -> (Arc<ScanOrchestrator<MockSource>>, Arc<ResultStore>) {
    let cache = Arc::new(PriceCache::new_in_memory().unwrap());
    let ingest_config = IngestConfig {
        fetch_backoff_ms: 1,
        ..IngestConfig::default()
    };
    let ingestor = Arc::new(DataIngestor::new(Arc::new(source), cache, ingest_config));
    let store = Arc::new(ResultStore::new(dir).unwrap());
    let scan_config = ScanConfig {
        concurrency: 5,
        batch_size: 5,
        batch_cooldown_ms: 1,
    };
    let orchestrator = ScanOrchestrator::new(
        ingestor,
        RuleEngine::new(StrategyConfig::default()),
        store.clone(),
        scan_config,
        StrategyConfig::default().chart_tail_days,
    );
    (orchestrator, store)
}

#[tokio::test]
async fn test_scan_isolates_failures_and_publishes_summary() {
    let dir = test_dir("isolation");
    let (source, symbols) = universe_source();
    let (orchestrator, store) = orchestrator(source, &dir);
    assert_eq!(orchestrator.state(), RunState::Pending);

    let summary = orchestrator.run_scan(&symbols).await.unwrap();

    // 20 symbols, one outage: the other 19 all produce results.
    assert_eq!(summary.total_scanned, 19);
    assert_eq!(summary.failed, vec!["FAIL".to_string()]);
    assert_eq!(orchestrator.state(), RunState::PartiallyFailed);

    assert_eq!(summary.signals.len(), 1);
    assert_eq!(summary.signals[0].symbol, "WIN");
    assert_eq!(summary.candidates.len(), 1);
    assert_eq!(summary.candidates[0].symbol, "CAND");

    // Per-symbol documents exist for every non-failed symbol.
    for symbol in symbols.iter().filter(|s| *s != "FAIL") {
        assert!(
            store.load_result(symbol).unwrap().is_some(),
            "missing result for {symbol}"
        );
    }
    assert!(store.load_result("FAIL").unwrap().is_none());

    // The winner's document carries the consumed gap and its signal.
    let win = store.load_result("WIN").unwrap().unwrap();
    assert!(win.trend_check.passed);
    assert_eq!(win.signals.len(), 1);
    assert_eq!(win.fvgs[0].status, FvgStatus::Consumed);
    assert!(!win.chart.candles.is_empty());

    // Gated symbols still get a (trendless) result document.
    let flat = store.load_result("FLAT00").unwrap().unwrap();
    assert!(!flat.trend_check.passed);
    assert!(flat.setups.is_empty());

    // The latest alias points at this run.
    let latest = store.load_latest_summary().unwrap().unwrap();
    assert_eq!(latest.total_scanned, 19);
    assert_eq!(latest.scan_date, summary.scan_date);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_clean_run_completes() {
    let dir = test_dir("clean");
    let mut series = HashMap::new();
    series.insert("FLAT00".to_string(), flat_series(HISTORY));
    series.insert("FLAT01".to_string(), flat_series(HISTORY));
    let source = MockSource {
        series,
        failing: Vec::new(),
    };
    let (orchestrator, _) = orchestrator(source, &dir);

    let summary = orchestrator
        .run_scan(&["FLAT00".to_string(), "FLAT01".to_string()])
        .await
        .unwrap();
    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.total_scanned, 2);
    assert!(summary.failed.is_empty());
    assert_eq!(orchestrator.state(), RunState::Completed);

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_aborted_run_publishes_nothing() {
    let dir = test_dir("abort");
    let (source, symbols) = universe_source();
    let (orchestrator, store) = orchestrator(source, &dir);

    orchestrator.abort();
    let summary = orchestrator.run_scan(&symbols).await.unwrap();

    assert_eq!(summary.state, RunState::PartiallyFailed);
    assert_eq!(summary.total_scanned, 0);
    assert_eq!(orchestrator.state(), RunState::PartiallyFailed);
    // The latest alias was never written.
    assert!(store.load_latest_summary().unwrap().is_none());

    let _ = std::fs::remove_dir_all(dir);
}

#[tokio::test]
async fn test_analyze_requires_force_without_prior_result() {
    let dir = test_dir("analyze");
    let (source, _) = universe_source();
    let (orchestrator, store) = orchestrator(source, &dir);

    // No stored result and no force: the caller is asked to confirm.
    let err = orchestrator.analyze("WIN", false).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    // Forced analysis runs the full pipeline synchronously.
    let result = orchestrator.analyze("WIN", true).await.unwrap();
    assert_eq!(result.symbol, "WIN");
    assert_eq!(result.signals.len(), 1);
    assert!(store.load_result("WIN").unwrap().is_some());

    // From now on the stored document is returned without force.
    let stored = orchestrator.analyze("WIN", false).await.unwrap();
    assert_eq!(stored.signals.len(), 1);

    let _ = std::fs::remove_dir_all(dir);
}
