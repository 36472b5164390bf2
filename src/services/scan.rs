//! Scan orchestration.
//!
//! Drives the symbol universe through ingestion and rule evaluation under
//! bounded concurrency, with a hard cooldown between batches for upstream
//! rate limits. Per-symbol failures are logged, counted and isolated; a
//! storage failure or an operator abort halts dispatch of new batches but
//! lets in-flight symbols finish, so no half-written result is left
//! behind.

use crate::config::ScanConfig;
use crate::error::{AppError, Result};
use crate::services::chart::build_chart_data;
use crate::services::ingest::DataIngestor;
use crate::services::result_store::ResultStore;
use crate::services::rules::RuleEngine;
use crate::sources::HistorySource;
use crate::types::{
    CandidateEntry, DailySummary, FvgStatus, RunState, ScanResult, ScanStats, SignalEntry,
};
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Per-symbol contribution to the daily summary.
#[derive(Debug, Clone, Default)]
struct SymbolOutcome {
    signal: Option<SignalEntry>,
    candidate: Option<CandidateEntry>,
}

/// Drives a full scan run over the symbol universe.
pub struct ScanOrchestrator<S> {
    ingestor: Arc<DataIngestor<S>>,
    rules: RuleEngine,
    store: Arc<ResultStore>,
    config: ScanConfig,
    chart_tail_days: usize,
    state: Mutex<RunState>,
    cancelled: AtomicBool,
    /// Failed symbols for the current run, with their error messages.
    failures: DashMap<String, String>,
}

impl<S: HistorySource> ScanOrchestrator<S> {
    pub fn new(
        ingestor: Arc<DataIngestor<S>>,
        rules: RuleEngine,
        store: Arc<ResultStore>,
        config: ScanConfig,
        chart_tail_days: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            ingestor,
            rules,
            store,
            config,
            chart_tail_days,
            state: Mutex::new(RunState::Pending),
            cancelled: AtomicBool::new(false),
            failures: DashMap::new(),
        })
    }

    /// Current run state.
    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap()
    }

    /// Request cancellation: in-flight symbols finish, no new batch is
    /// dispatched, and the `latest` alias is left untouched.
    pub fn abort(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Run a full scan over `symbols` and publish the daily summary.
    pub async fn run_scan(&self, symbols: &[String]) -> Result<DailySummary> {
        *self.state.lock().unwrap() = RunState::Running;
        self.failures.clear();
        let started = Instant::now();
        info!("Scan starting for {} symbols", symbols.len());

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut outcomes: Vec<SymbolOutcome> = Vec::new();
        let mut fatal: Option<AppError> = None;

        for (batch_no, batch) in symbols.chunks(self.config.batch_size.max(1)).enumerate() {
            if self.cancelled.load(Ordering::SeqCst) || fatal.is_some() {
                break;
            }
            if batch_no > 0 {
                // Hard throttle between batches for the upstream source.
                tokio::time::sleep(Duration::from_millis(self.config.batch_cooldown_ms)).await;
            }

            let mut set: JoinSet<(String, Result<SymbolOutcome>)> = JoinSet::new();
            for symbol in batch {
                let symbol = symbol.clone();
                let semaphore = semaphore.clone();
                let ingestor = self.ingestor.clone();
                let rules = self.rules.clone();
                let store = self.store.clone();
                let chart_tail_days = self.chart_tail_days;

                set.spawn(async move {
                    let _permit = semaphore
                        .acquire_owned()
                        .await
                        .expect("scan semaphore closed");
                    let outcome =
                        scan_symbol(&ingestor, &rules, &store, chart_tail_days, &symbol).await;
                    (symbol, outcome)
                });
            }

            // Drain the whole batch: even after a fatal error, in-flight
            // symbols are allowed to finish individually.
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((_, Ok(outcome))) => outcomes.push(outcome),
                    Ok((symbol, Err(e))) if e.is_fatal() => {
                        error!("'{}': fatal storage failure: {}", symbol, e);
                        self.failures.insert(symbol, e.to_string());
                        if fatal.is_none() {
                            fatal = Some(e);
                        }
                    }
                    Ok((symbol, Err(e))) => {
                        warn!("'{}': scan failed: {}", symbol, e);
                        self.failures.insert(symbol, e.to_string());
                    }
                    Err(join_err) => {
                        warn!("Scan worker panicked: {}", join_err);
                    }
                }
            }
        }

        if let Some(e) = fatal {
            *self.state.lock().unwrap() = RunState::PartiallyFailed;
            return Err(e);
        }

        let aborted = self.cancelled.load(Ordering::SeqCst);
        let failed: Vec<String> = self.failures.iter().map(|e| e.key().clone()).collect();
        let state = if aborted || !failed.is_empty() {
            RunState::PartiallyFailed
        } else {
            RunState::Completed
        };

        let summary = self.build_summary(outcomes, failed, state, started.elapsed());

        if aborted {
            // No summary document is persisted for an aborted run; the
            // `latest` alias keeps pointing at the previous run.
            warn!("Scan aborted after {} symbols", summary.total_scanned);
            *self.state.lock().unwrap() = RunState::PartiallyFailed;
            return Ok(summary);
        }

        self.store.save_daily_summary(&summary)?;
        *self.state.lock().unwrap() = state;
        info!(
            "Scan complete: {} scanned, {} signals, {} candidates, {} failed",
            summary.total_scanned,
            summary.signals.len(),
            summary.candidates.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    /// On-demand single-symbol analysis outside the scheduled run.
    ///
    /// Without `force`, only a previously stored result is returned;
    /// NotFound signals the caller to confirm a forced analysis. With
    /// `force`, the full ingest + evaluate pipeline runs synchronously.
    pub async fn analyze(&self, symbol: &str, force: bool) -> Result<ScanResult> {
        if !force {
            return self.store.load_result(symbol)?.ok_or_else(|| {
                AppError::NotFound(format!("no stored analysis for '{symbol}'"))
            });
        }

        let (result, _) = evaluate_symbol(
            &self.ingestor,
            &self.rules,
            self.chart_tail_days,
            symbol,
        )
        .await?;
        self.store.save_result(&result)?;
        Ok(result)
    }

    fn build_summary(
        &self,
        outcomes: Vec<SymbolOutcome>,
        mut failed: Vec<String>,
        state: RunState,
        elapsed: Duration,
    ) -> DailySummary {
        let mut signals: Vec<SignalEntry> = Vec::new();
        let mut candidates: Vec<CandidateEntry> = Vec::new();
        let total_scanned = outcomes.len();
        for outcome in outcomes {
            signals.extend(outcome.signal);
            candidates.extend(outcome.candidate);
        }
        signals.sort_by(|a, b| b.score.cmp(&a.score).then(a.symbol.cmp(&b.symbol)));
        candidates.sort_by(|a, b| b.score.cmp(&a.score).then(a.symbol.cmp(&b.symbol)));
        failed.sort();

        let now = Utc::now();
        let duration_seconds = elapsed.as_secs_f64();
        DailySummary {
            scan_date: now.date_naive(),
            scan_time: now.time(),
            state,
            total_scanned,
            failed,
            signals,
            candidates,
            performance: ScanStats {
                duration_seconds,
                avg_ms_per_symbol: if total_scanned > 0 {
                    duration_seconds * 1000.0 / total_scanned as f64
                } else {
                    0.0
                },
            },
        }
    }
}

/// Ingest, evaluate and assemble the persisted result for one symbol.
async fn evaluate_symbol<S: HistorySource>(
    ingestor: &DataIngestor<S>,
    rules: &RuleEngine,
    chart_tail_days: usize,
    symbol: &str,
) -> Result<(ScanResult, SymbolOutcome)> {
    let series = ingestor.ensure_fresh(symbol).await?;
    let analysis = rules.evaluate(&series.daily, &series.weekly);
    let chart = build_chart_data(&series.daily, &series.weekly, &analysis, chart_tail_days);

    let now = Utc::now();
    let last_scan = series
        .daily
        .last()
        .map(|p| p.date)
        .unwrap_or_else(|| now.date_naive());

    // Only signals dated to this run's latest bar are new; older ones are
    // reconstructed history. The best-scoring new one represents the
    // symbol in the summary.
    let signal = analysis
        .signals
        .iter()
        .filter(|s| s.signal_date == last_scan)
        .max_by_key(|s| s.score)
        .map(|s| SignalEntry {
            symbol: symbol.to_string(),
            score: s.score,
            signal_date: s.signal_date,
        });

    let candidate = analysis
        .fvgs
        .iter()
        .filter(|f| f.status == FvgStatus::Active)
        .filter_map(|f| {
            let setup = analysis.setups.iter().find(|s| s.id == f.setup_id)?;
            Some((f, rules.score(setup, f, None)))
        })
        .max_by_key(|(_, score)| *score)
        .map(|(f, score)| CandidateEntry {
            symbol: symbol.to_string(),
            score,
            formation_date: f.formation_date,
        });

    let result = ScanResult {
        symbol: symbol.to_string(),
        last_scan,
        last_updated: now,
        trend_check: analysis.trend_check,
        setups: analysis.setups,
        fvgs: analysis.fvgs,
        signals: analysis.signals,
        chart,
    };

    Ok((result, SymbolOutcome { signal, candidate }))
}

/// One work unit: evaluate a symbol and persist its result.
async fn scan_symbol<S: HistorySource>(
    ingestor: &DataIngestor<S>,
    rules: &RuleEngine,
    store: &ResultStore,
    chart_tail_days: usize,
    symbol: &str,
) -> Result<SymbolOutcome> {
    let (result, outcome) = evaluate_symbol(ingestor, rules, chart_tail_days, symbol).await?;
    store.save_result(&result)?;
    Ok(outcome)
}
