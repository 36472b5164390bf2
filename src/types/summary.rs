use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

/// Lifecycle of a scan run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running,
    Completed,
    PartiallyFailed,
}

/// Summary row for a symbol that produced a breakout signal this run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEntry {
    pub symbol: String,
    pub score: u8,
    pub signal_date: NaiveDate,
}

/// Summary row for a symbol holding an active, unconsumed fair value gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEntry {
    pub symbol: String,
    pub score: u8,
    pub formation_date: NaiveDate,
}

/// Timing statistics for a scan run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanStats {
    pub duration_seconds: f64,
    pub avg_ms_per_symbol: f64,
}

/// One document per scan run; a "latest" alias always points at the most
/// recent run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySummary {
    pub scan_date: NaiveDate,
    pub scan_time: NaiveTime,
    pub state: RunState,
    /// Symbols successfully processed; failures are excluded.
    pub total_scanned: usize,
    pub failed: Vec<String>,
    pub signals: Vec<SignalEntry>,
    pub candidates: Vec<CandidateEntry>,
    pub performance: ScanStats,
}
