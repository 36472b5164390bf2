//! Upstream market-data sources.

pub mod yahoo;

pub use yahoo::YahooFinanceClient;

use crate::error::Result;
use crate::types::Bar;
use chrono::NaiveDate;

/// An upstream source of historical daily bars.
///
/// Implementations are typically rate-limited and subject to transient
/// failures; callers treat any error as a per-symbol failure.
pub trait HistorySource: Send + Sync + 'static {
    /// Fetch daily bars for `symbol` over the inclusive date window.
    /// Returned bars are ordered by date ascending.
    fn fetch_history(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> impl std::future::Future<Output = Result<Vec<Bar>>> + Send;
}
