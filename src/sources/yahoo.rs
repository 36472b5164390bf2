//! Yahoo Finance API client for historical stock data.
//!
//! Provides historical daily OHLC data for stocks and ETFs via the
//! unofficial chart API.

use crate::error::{AppError, Result};
use crate::sources::HistorySource;
use crate::types::Bar;
use chrono::{NaiveDate, NaiveTime, TimeZone, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Yahoo Finance chart response.
#[derive(Debug, Deserialize)]
struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Debug, Deserialize)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
    error: Option<YahooError>,
}

#[derive(Debug, Deserialize)]
struct YahooError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct YahooResult {
    timestamp: Option<Vec<i64>>,
    indicators: YahooIndicators,
}

#[derive(Debug, Deserialize)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Debug, Deserialize)]
struct YahooQuote {
    open: Option<Vec<Option<f64>>>,
    high: Option<Vec<Option<f64>>>,
    low: Option<Vec<Option<f64>>>,
    close: Option<Vec<Option<f64>>>,
    volume: Option<Vec<Option<u64>>>,
}

/// Normalize symbol for Yahoo Finance API.
/// Yahoo uses hyphens instead of dots for share classes (e.g., BRK-B not BRK.B)
fn normalize_yahoo_symbol(symbol: &str) -> String {
    symbol.to_uppercase().replace('.', "-")
}

/// Yahoo Finance API client.
pub struct YahooFinanceClient {
    client: Client,
}

impl YahooFinanceClient {
    /// Create a new Yahoo Finance client.
    pub fn new() -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .expect("Failed to create HTTP client");

        Self { client }
    }

    fn upstream_err(symbol: &str, message: impl Into<String>) -> AppError {
        AppError::UpstreamApi {
            symbol: symbol.to_string(),
            message: message.into(),
        }
    }
}

impl Default for YahooFinanceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HistorySource for YahooFinanceClient {
    async fn fetch_history(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Bar>> {
        let yahoo_symbol = normalize_yahoo_symbol(symbol);
        // period2 is exclusive; push it past the end of `to`.
        let period1 = Utc
            .from_utc_datetime(&from.and_time(NaiveTime::MIN))
            .timestamp();
        let period2 = Utc
            .from_utc_datetime(&to.succ_opt().unwrap_or(to).and_time(NaiveTime::MIN))
            .timestamp();
        let url = format!(
            "https://query1.finance.yahoo.com/v8/finance/chart/{}?period1={}&period2={}&interval=1d&includePrePost=false",
            yahoo_symbol, period1, period2
        );

        debug!("Fetching Yahoo Finance data: {}", url);

        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(Self::upstream_err(
                symbol,
                format!("API error: {}", response.status()),
            ));
        }

        let data: YahooChartResponse = response
            .json()
            .await
            .map_err(|e| Self::upstream_err(symbol, format!("Parse error: {e}")))?;

        if let Some(error) = data.chart.error {
            return Err(Self::upstream_err(
                symbol,
                format!("Yahoo API error: {} - {}", error.code, error.description),
            ));
        }

        let result = data
            .chart
            .result
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| Self::upstream_err(symbol, "No results in response"))?;

        let timestamps = result
            .timestamp
            .ok_or_else(|| Self::upstream_err(symbol, "No timestamps in response"))?;

        let quote = result
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| Self::upstream_err(symbol, "No quote data in response"))?;

        let opens = quote.open.unwrap_or_default();
        let highs = quote.high.unwrap_or_default();
        let lows = quote.low.unwrap_or_default();
        let closes = quote.close.unwrap_or_default();
        let volumes = quote.volume.unwrap_or_default();

        let mut bars: Vec<Bar> = Vec::with_capacity(timestamps.len());
        for (i, &timestamp) in timestamps.iter().enumerate() {
            let open = opens.get(i).and_then(|v| *v).unwrap_or(0.0);
            let high = highs.get(i).and_then(|v| *v).unwrap_or(0.0);
            let low = lows.get(i).and_then(|v| *v).unwrap_or(0.0);
            let close = closes.get(i).and_then(|v| *v).unwrap_or(0.0);
            let volume = volumes.get(i).and_then(|v| *v).unwrap_or(0) as i64;

            // Skip invalid data points
            if close <= 0.0 {
                continue;
            }

            let date = Utc
                .timestamp_opt(timestamp, 0)
                .single()
                .map(|dt| dt.date_naive());
            let Some(date) = date else {
                continue;
            };

            // Upstream occasionally repeats a date; keep the first slot.
            if bars.last().is_some_and(|b: &Bar| b.date == date) {
                continue;
            }

            bars.push(Bar {
                date,
                open,
                high,
                low,
                close,
                volume,
            });
        }

        Ok(bars)
    }
}
