use crate::types::chart::ChartData;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Outcome of the trend gate (rule 1).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrendCheck {
    pub passed: bool,
    /// Latest close above the weekly 200-week SMA.
    pub weekly_sma200: bool,
    /// Latest close above the daily 200-day SMA.
    pub daily_sma200: bool,
    /// Latest close above the daily 200-day EMA.
    pub daily_ema200: bool,
}

/// OHLC snapshot of the bar a setup was detected on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// A daily bar whose open and close both sit inside the SMA200/EMA200 band.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Setup {
    pub id: String,
    pub date: NaiveDate,
    pub zone_upper: f64,
    pub zone_lower: f64,
    pub sma200: f64,
    pub ema200: f64,
    pub candle: Candle,
}

impl Setup {
    pub fn make_id(date: NaiveDate) -> String {
        format!("setup_{}", date.format("%Y%m%d"))
    }
}

/// Lifecycle state of a fair value gap. Consumed and violated are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FvgStatus {
    Active,
    Consumed,
    Violated,
}

/// A 3-bar gap after a setup, anchored near a moving average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FairValueGap {
    pub id: String,
    pub setup_id: String,
    pub formation_date: NaiveDate,
    /// Low of the third bar.
    pub upper_bound: f64,
    /// High of the first bar.
    pub lower_bound: f64,
    pub gap_size: f64,
    pub gap_percentage: f64,
    /// Distance of the gap center to the nearest MA, as a fraction of the MA.
    pub ma_distance_pct: f64,
    pub status: FvgStatus,
}

impl FairValueGap {
    pub fn make_id(date: NaiveDate, index: usize) -> String {
        format!("fvg_{}_{}", date.format("%Y%m%d"), index)
    }
}

/// A confirmed breakout above the resistance established between a setup
/// and its fair value gap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakoutSignal {
    pub id: String,
    pub setup_id: String,
    pub fvg_id: String,
    pub signal_date: NaiveDate,
    pub breakout_price: f64,
    pub resistance_price: f64,
    pub breakout_percentage: f64,
    pub score: u8,
}

impl BreakoutSignal {
    pub fn make_id(date: NaiveDate) -> String {
        format!("signal_{}", date.format("%Y%m%d"))
    }
}

/// Output of a single rule-engine evaluation over one symbol's history.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolAnalysis {
    pub trend_check: TrendCheck,
    pub setups: Vec<Setup>,
    pub fvgs: Vec<FairValueGap>,
    pub signals: Vec<BreakoutSignal>,
}

impl SymbolAnalysis {
    /// Gate-only result: trend recorded, nothing downstream evaluated.
    pub fn gated(trend_check: TrendCheck) -> Self {
        Self {
            trend_check,
            ..Default::default()
        }
    }

    pub fn has_active_fvg(&self) -> bool {
        self.fvgs.iter().any(|f| f.status == FvgStatus::Active)
    }
}

/// Persisted per-symbol scan result; overwrites the previous run's document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResult {
    pub symbol: String,
    pub last_scan: NaiveDate,
    pub last_updated: DateTime<Utc>,
    pub trend_check: TrendCheck,
    pub setups: Vec<Setup>,
    pub fvgs: Vec<FairValueGap>,
    pub signals: Vec<BreakoutSignal>,
    pub chart: ChartData,
}
