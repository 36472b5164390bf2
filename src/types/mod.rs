pub mod analysis;
pub mod bar;
pub mod chart;
pub mod summary;

pub use analysis::{
    BreakoutSignal, Candle, FairValueGap, FvgStatus, ScanResult, Setup, SymbolAnalysis, TrendCheck,
};
pub use bar::{most_recent_trading_day, week_start, Bar, Frequency, IndicatorBar, SymbolMetadata};
pub use chart::{CandlePoint, ChartData, EventMarker, LinePoint, ZoneKind, ZoneOverlay};
pub use summary::{CandidateEntry, DailySummary, RunState, ScanStats, SignalEntry};
