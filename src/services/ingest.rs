//! Incremental price-history ingestion.
//!
//! Reconciles the price cache against an upstream history source: decides
//! the minimal fetch window per symbol (cold, incremental, or none),
//! merges new bars into the cached history, resamples weekly bars from
//! daily bars, and recomputes the affected moving-average tail.

use crate::config::IngestConfig;
use crate::error::Result;
use crate::services::indicators;
use crate::services::price_cache::PriceCache;
use crate::sources::HistorySource;
use crate::types::{most_recent_trading_day, week_start, Bar, Frequency, IndicatorBar};
use chrono::{Duration, NaiveDate, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// The fully annotated history for one symbol, as returned by an ingest.
#[derive(Debug, Clone, Default)]
pub struct SymbolSeries {
    pub daily: Vec<IndicatorBar>,
    pub weekly: Vec<IndicatorBar>,
}

/// Reconciles the price cache against an external quote source.
pub struct DataIngestor<S> {
    source: Arc<S>,
    cache: Arc<PriceCache>,
    config: IngestConfig,
}

impl<S: HistorySource> DataIngestor<S> {
    pub fn new(source: Arc<S>, cache: Arc<PriceCache>, config: IngestConfig) -> Self {
        Self {
            source,
            cache,
            config,
        }
    }

    /// Bring a symbol's cached history up to date and return it.
    ///
    /// The common case, a cache already ending at the most recent
    /// completed trading day, performs no network call at all. A missing symbol
    /// triggers a cold fetch of the configured lookback window; anything
    /// else fetches only the delta since the cache's last date. A failure
    /// leaves the last-known-good cache untouched.
    pub async fn ensure_fresh(&self, symbol: &str) -> Result<SymbolSeries> {
        let meta = self.cache.get_metadata(symbol)?;
        let today = Utc::now().date_naive();
        let target = most_recent_trading_day(today);

        let window = match &meta {
            None => {
                info!("'{}': first-time fetch, getting full history", symbol);
                Some((today - Duration::days(365 * self.config.lookback_years), today))
            }
            Some(m) if m.last_date >= target => None,
            Some(m) => {
                debug!(
                    "'{}': cache outdated (last: {}), fetching delta",
                    symbol, m.last_date
                );
                Some((m.last_date + Duration::days(1), today))
            }
        };

        let Some((from, to)) = window else {
            debug!("'{}': cache is up to date", symbol);
            return self.load_series(symbol);
        };

        let new_bars = self.fetch_with_retry(symbol, from, to).await?;
        if new_bars.is_empty() {
            debug!("'{}': no new bars returned upstream", symbol);
            return self.load_series(symbol);
        }

        let cached = self.cache.get_range(symbol, Frequency::Daily, None, None)?;

        // Merge by date, new bars winning; re-ingesting an already-final
        // date is a no-op, a revised same-day bar replaces the old one.
        let mut merged: BTreeMap<NaiveDate, Bar> =
            cached.iter().map(|p| (p.date, p.bar())).collect();
        for bar in &new_bars {
            merged.insert(bar.date, bar.clone());
        }
        let merged: Vec<Bar> = merged.into_values().collect();

        // Everything strictly before the earliest new date is untouched;
        // the indicator tail restarts from there, seeded by the cache.
        let earliest_new = new_bars
            .iter()
            .map(|b| b.date)
            .min()
            .expect("new_bars is non-empty");
        let split = cached.partition_point(|p| p.date < earliest_new);
        let tail: Vec<Bar> = merged[split..].to_vec();
        let daily = indicators::annotate_daily_tail(&cached[..split], &tail);

        let weekly_bars = resample_weekly(&merged);
        let weekly = indicators::annotate_weekly(&weekly_bars);

        self.cache.upsert(symbol, Frequency::Daily, &daily[split..])?;
        self.cache.upsert(symbol, Frequency::Weekly, &weekly)?;
        info!(
            "'{}': ingested {} new daily bars ({} total)",
            symbol,
            merged.len() - split,
            merged.len()
        );

        Ok(SymbolSeries { daily, weekly })
    }

    async fn fetch_with_retry(&self, symbol: &str, from: NaiveDate, to: NaiveDate) -> Result<Vec<Bar>> {
        let mut backoff = std::time::Duration::from_millis(self.config.fetch_backoff_ms);
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.source.fetch_history(symbol, from, to).await {
                Ok(bars) => return Ok(bars),
                Err(e) if e.is_transient() && attempt < self.config.fetch_retries => {
                    warn!(
                        "'{}': fetch attempt {}/{} failed: {}",
                        symbol, attempt, self.config.fetch_retries, e
                    );
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn load_series(&self, symbol: &str) -> Result<SymbolSeries> {
        Ok(SymbolSeries {
            daily: self.cache.get_range(symbol, Frequency::Daily, None, None)?,
            weekly: self.cache.get_range(symbol, Frequency::Weekly, None, None)?,
        })
    }
}

/// Resample ascending daily bars into calendar weeks: week start is
/// Monday, OHLC aggregated, volume summed. The current (partial) week is
/// included and overwritten on the next ingest.
pub fn resample_weekly(daily: &[Bar]) -> Vec<Bar> {
    let mut weeks: Vec<Bar> = Vec::new();
    for bar in daily {
        let start = week_start(bar.date);
        match weeks.last_mut() {
            Some(week) if week.date == start => {
                week.high = week.high.max(bar.high);
                week.low = week.low.min(bar.low);
                week.close = bar.close;
                week.volume += bar.volume;
            }
            _ => weeks.push(Bar {
                date: start,
                open: bar.open,
                high: bar.high,
                low: bar.low,
                close: bar.close,
                volume: bar.volume,
            }),
        }
    }
    weeks
}
