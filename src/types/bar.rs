use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Bar frequency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    Daily,
    Weekly,
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Daily => write!(f, "daily"),
            Frequency::Weekly => write!(f, "weekly"),
        }
    }
}

/// A single OHLCV bar as returned by an upstream source.
///
/// Daily bars are keyed by date; weekly bars by their Monday week start.
/// The symbol is carried at the API level, not duplicated per bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
}

/// A bar annotated with its 200-period moving averages.
///
/// Both fields are None until 200 bars of history exist at that frequency.
/// Weekly rows never carry an ema200.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sma200: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ema200: Option<f64>,
}

impl IndicatorBar {
    pub fn from_bar(bar: &Bar, sma200: Option<f64>, ema200: Option<f64>) -> Self {
        Self {
            date: bar.date,
            open: bar.open,
            high: bar.high,
            low: bar.low,
            close: bar.close,
            volume: bar.volume,
            sma200,
            ema200,
        }
    }

    pub fn bar(&self) -> Bar {
        Bar {
            date: self.date,
            open: self.open,
            high: self.high,
            low: self.low,
            close: self.close,
            volume: self.volume,
        }
    }

    /// The band spanned by the two daily moving averages, if both are defined.
    pub fn ma_band(&self) -> Option<(f64, f64)> {
        let (sma, ema) = (self.sma200?, self.ema200?);
        Some((sma.min(ema), sma.max(ema)))
    }
}

/// Per-symbol freshness metadata, the single source of truth for how much
/// history is cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolMetadata {
    pub symbol: String,
    pub first_date: NaiveDate,
    pub last_date: NaiveDate,
    /// Unix millis of the last successful ingest.
    pub last_updated: i64,
    pub daily_count: i64,
    pub weekly_count: i64,
}

/// Monday of the calendar week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(date.weekday().num_days_from_monday() as i64)
}

/// The most recent completed trading day as of `today`: today itself on a
/// weekday, otherwise the preceding Friday. Market holidays are not modeled.
pub fn most_recent_trading_day(today: NaiveDate) -> NaiveDate {
    match today.weekday() {
        Weekday::Sat => today - Duration::days(1),
        Weekday::Sun => today - Duration::days(2),
        _ => today,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_week_start_is_monday() {
        // 2024-01-03 is a Wednesday
        assert_eq!(week_start(d(2024, 1, 3)), d(2024, 1, 1));
        // Monday maps to itself
        assert_eq!(week_start(d(2024, 1, 1)), d(2024, 1, 1));
        // Sunday maps back to the same week's Monday
        assert_eq!(week_start(d(2024, 1, 7)), d(2024, 1, 1));
    }

    #[test]
    fn test_most_recent_trading_day() {
        // Friday stays Friday
        assert_eq!(most_recent_trading_day(d(2024, 1, 5)), d(2024, 1, 5));
        // Saturday and Sunday fall back to Friday
        assert_eq!(most_recent_trading_day(d(2024, 1, 6)), d(2024, 1, 5));
        assert_eq!(most_recent_trading_day(d(2024, 1, 7)), d(2024, 1, 5));
        // Midweek stays put
        assert_eq!(most_recent_trading_day(d(2024, 1, 3)), d(2024, 1, 3));
    }

    #[test]
    fn test_ma_band_ordering() {
        let bar = Bar {
            date: d(2024, 1, 3),
            open: 10.0,
            high: 11.0,
            low: 9.0,
            close: 10.5,
            volume: 1000,
        };
        let point = IndicatorBar::from_bar(&bar, Some(10.4), Some(10.1));
        assert_eq!(point.ma_band(), Some((10.1, 10.4)));

        let undefined = IndicatorBar::from_bar(&bar, Some(10.4), None);
        assert_eq!(undefined.ma_band(), None);
    }
}
