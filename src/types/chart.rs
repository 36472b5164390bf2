use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A single candle in the chart series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandlePoint {
    pub time: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

/// A point on an indicator line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinePoint {
    pub time: NaiveDate,
    pub value: f64,
}

/// Kind of a zone overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Setup,
    Fvg,
}

/// A rectangular overlay between two price levels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoneOverlay {
    pub kind: ZoneKind,
    pub id: String,
    pub start_time: NaiveDate,
    pub end_time: NaiveDate,
    pub top_value: f64,
    pub bottom_value: f64,
}

/// An event marker attached to a bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventMarker {
    pub time: NaiveDate,
    pub id: String,
    pub label: String,
}

/// Chart-ready series for one symbol: candles, indicator lines, zone
/// overlays and event markers. This is the contract consumed by the
/// presentation layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChartData {
    pub candles: Vec<CandlePoint>,
    pub sma200: Vec<LinePoint>,
    pub ema200: Vec<LinePoint>,
    pub weekly_sma200: Vec<LinePoint>,
    pub zones: Vec<ZoneOverlay>,
    pub markers: Vec<EventMarker>,
}
